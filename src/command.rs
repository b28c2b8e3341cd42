use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

use crate::error::{Result, RevoiceError};

/// Lines of stderr kept when a tool fails; ffmpeg and python engines are chatty.
const STDERR_TAIL_LINES: usize = 20;

/// External tool invocation shared by every command-line adapter.
///
/// The child is spawned with `kill_on_drop`, so dropping the future that
/// awaits it (timeout, task abort) terminates the process.
#[derive(Debug, Clone)]
pub struct ToolCommand {
    pub binary_path: String,
    pub args: Vec<String>,
    pub description: String,
}

/// Captured output of a successful tool run.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
}

impl ToolCommand {
    pub fn new<S1: Into<String>, S2: Into<String>>(binary_path: S1, description: S2) -> Self {
        Self {
            binary_path: binary_path.into(),
            args: Vec::new(),
            description: description.into(),
        }
    }

    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(|s| s.into()));
        self
    }

    pub fn path_arg<P: AsRef<Path>>(self, path: P) -> Self {
        self.arg(path.as_ref().to_string_lossy().to_string())
    }

    /// Add `flag value` only when `value` is present.
    pub fn opt_arg<S: Into<String>>(self, flag: &str, value: Option<S>) -> Self {
        match value {
            Some(value) => self.arg(flag).arg(value),
            None => self,
        }
    }

    /// Run the tool to completion, mapping failures through `classify`.
    pub async fn execute<F>(&self, classify: F) -> Result<ToolOutput>
    where
        F: Fn(String) -> RevoiceError,
    {
        debug!("Executing {}: {} {:?}", self.description, self.binary_path, self.args);

        let output = Command::new(&self.binary_path)
            .args(&self.args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    classify(format!("`{}` not found in PATH", self.binary_path))
                } else {
                    classify(format!("Failed to execute {}: {}", self.binary_path, e))
                }
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if !output.status.success() {
            return Err(classify(format!(
                "{} exited with {}: {}",
                self.description,
                output.status,
                stderr_tail(&stderr)
            )));
        }

        Ok(ToolOutput { stdout, stderr })
    }

    /// Check that the tool starts and exits cleanly.
    pub async fn probe<F>(&self, classify: F) -> Result<String>
    where
        F: Fn(String) -> RevoiceError,
    {
        let output = self.execute(classify).await?;
        let first_line = output
            .stdout
            .lines()
            .chain(output.stderr.lines())
            .find(|line| !line.trim().is_empty())
            .unwrap_or("unknown version");
        Ok(first_line.trim().to_string())
    }
}

fn stderr_tail(stderr: &str) -> String {
    let lines: Vec<&str> = stderr.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stderr_tail_keeps_last_lines() {
        let long: String = (0..50).map(|i| format!("line {}\n", i)).collect();
        let tail = stderr_tail(&long);
        assert!(tail.starts_with("line 30"));
        assert!(tail.ends_with("line 49"));
    }

    #[test]
    fn opt_arg_skips_missing_values() {
        let cmd = ToolCommand::new("tool", "Test")
            .opt_arg("--language", Some("fr"))
            .opt_arg::<String>("--threads", None);
        assert_eq!(cmd.args, vec!["--language", "fr"]);
    }

    #[tokio::test]
    async fn missing_binary_is_classified() {
        let err = ToolCommand::new("revoice-no-such-binary", "Missing tool")
            .execute(RevoiceError::Extraction)
            .await
            .unwrap_err();
        assert!(matches!(err, RevoiceError::Extraction(ref m) if m.contains("not found")));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_zero_exit_reports_stderr() {
        let err = ToolCommand::new("sh", "Failing tool")
            .args(["-c", "echo broken pipe >&2; exit 3"])
            .execute(RevoiceError::Transcription)
            .await
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("Failing tool exited"));
        assert!(message.contains("broken pipe"));
    }
}
