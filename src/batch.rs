use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use walkdir::WalkDir;

use crate::config::Config;
use crate::engine::Engines;
use crate::error::{Result, RevoiceError};
use crate::language;
use crate::workflow::{CancelFlag, Workflow, WorkflowRequest, WorkflowResult, WorkflowSettings};

/// File extensions picked up when scanning a directory for videos
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "avi", "mov", "mkv", "wmv", "flv", "webm", "m4v"];

/// Settings shared by every request discovered in a directory
#[derive(Debug, Clone)]
pub struct BatchDefaults {
    pub reference_audio_path: PathBuf,
    pub target_language: String,
    pub source_language: String,
    pub cleanup_temp_files: bool,
}

/// Runs many requests through one workflow.
///
/// Requests are independent: a failed item is reported in its slot and the
/// batch moves on. Results always come back in input order.
pub struct BatchRunner {
    workflow: Workflow,
    concurrency: usize,
    show_progress: bool,
}

impl BatchRunner {
    pub fn new(workflow: Workflow, concurrency: usize) -> Self {
        Self {
            workflow,
            concurrency: concurrency.max(1),
            show_progress: false,
        }
    }

    /// Build a runner from configuration; a non-reentrant synthesis engine is
    /// serialized when items run concurrently.
    pub fn from_config(engines: Engines, config: &Config) -> Self {
        let concurrency = config.workflow.batch_concurrency.max(1);
        let engines = if concurrency > 1 && !config.workflow.synthesis_reentrant {
            info!("Serializing synthesis across {} concurrent items", concurrency);
            engines.with_serialized_synthesis()
        } else {
            engines
        };
        Self::new(Workflow::new(engines, WorkflowSettings::from_config(config)), concurrency)
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.workflow = self.workflow.with_cancel_flag(cancel);
        self
    }

    pub fn workflow(&self) -> &Workflow {
        &self.workflow
    }

    /// Run every request; the i-th result belongs to the i-th request.
    pub async fn run_batch(&self, requests: &[WorkflowRequest]) -> Vec<WorkflowResult> {
        info!("Starting batch of {} requests (concurrency {})", requests.len(), self.concurrency);
        let progress = self.progress_bar(requests.len());

        let results = if self.concurrency == 1 {
            self.run_sequential(requests, &progress).await
        } else {
            self.run_concurrent(requests, &progress).await
        };

        progress.finish_and_clear();
        let succeeded = results.iter().filter(|r| r.success).count();
        info!("Batch finished: {} succeeded, {} failed", succeeded, results.len() - succeeded);
        results
    }

    async fn run_sequential(&self, requests: &[WorkflowRequest], progress: &ProgressBar) -> Vec<WorkflowResult> {
        let mut results = Vec::with_capacity(requests.len());
        for request in requests {
            progress.set_message(display_name(&request.video_path));
            let result = self.workflow.run_workflow(request).await;
            log_item(request, &result);
            progress.inc(1);
            results.push(result);
        }
        results
    }

    async fn run_concurrent(&self, requests: &[WorkflowRequest], progress: &ProgressBar) -> Vec<WorkflowResult> {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();

        for (index, request) in requests.iter().cloned().enumerate() {
            let workflow = self.workflow.clone();
            let semaphore = semaphore.clone();
            let progress = progress.clone();

            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                let result = workflow.run_workflow(&request).await;
                log_item(&request, &result);
                progress.inc(1);
                (index, result)
            });
        }

        let mut slots: Vec<Option<WorkflowResult>> = (0..requests.len()).map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, result)) => slots[index] = Some(result),
                Err(e) => error!("Batch item task failed: {}", e),
            }
        }

        slots
            .into_iter()
            .zip(requests)
            .map(|(slot, request)| {
                slot.unwrap_or_else(|| {
                    WorkflowResult::aborted(request, "Batch item terminated unexpectedly".to_string())
                })
            })
            .collect()
    }

    fn progress_bar(&self, len: usize) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }

        let pb = ProgressBar::new(len as u64);
        let style = ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .map(|style| style.progress_chars("#>-"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        pb.set_style(style);
        pb
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn log_item(request: &WorkflowRequest, result: &WorkflowResult) {
    if result.success {
        info!("Successfully processed: {}", request.video_path.display());
    } else {
        warn!(
            "Failed to process {}: {}",
            request.video_path.display(),
            result.error.as_deref().unwrap_or("unknown error")
        );
    }
}

/// One request per video under `input_dir`, writing `<stem>_<target>.wav`
/// into `output_dir` (the input directory when absent).
///
/// Subdirectories are mirrored under `output_dir`. Videos sharing a stem in
/// one directory keep their extension in the name: `talk_mp4_de.wav`.
pub fn discover_requests(
    input_dir: &Path,
    output_dir: Option<&Path>,
    defaults: &BatchDefaults,
) -> Result<Vec<WorkflowRequest>> {
    if !input_dir.is_dir() {
        return Err(RevoiceError::Validation(format!(
            "Input path is not a directory: {}",
            input_dir.display()
        )));
    }
    let output_dir = output_dir.unwrap_or(input_dir);
    let target = language::normalize(&defaults.target_language);

    let mut videos = Vec::new();
    for entry in WalkDir::new(input_dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
    {
        let path = entry.path();
        let Some(ext) = path.extension().map(|e| e.to_string_lossy().into_owned()) else {
            continue;
        };
        if !VIDEO_EXTENSIONS.contains(&ext.to_lowercase().as_str()) {
            continue;
        }
        let Some(stem) = path.file_stem().map(|s| s.to_string_lossy().into_owned()) else {
            continue;
        };
        let relative_dir = path
            .parent()
            .and_then(|dir| dir.strip_prefix(input_dir).ok())
            .map(Path::to_path_buf)
            .unwrap_or_default();
        videos.push((path.to_path_buf(), relative_dir, stem, ext));
    }

    let mut stems: HashMap<(PathBuf, String), usize> = HashMap::new();
    for (_, dir, stem, _) in &videos {
        *stems.entry((dir.clone(), stem.clone())).or_default() += 1;
    }

    let requests: Vec<WorkflowRequest> = videos
        .iter()
        .map(|(path, dir, stem, ext)| {
            let file_name = if stems[&(dir.clone(), stem.clone())] > 1 {
                format!("{}_{}_{}.wav", stem, ext.to_lowercase(), target)
            } else {
                format!("{}_{}.wav", stem, target)
            };
            WorkflowRequest::new(
                path,
                &defaults.reference_audio_path,
                &defaults.target_language,
                output_dir.join(dir).join(file_name),
            )
            .with_source_language(&defaults.source_language)
            .with_cleanup(defaults.cleanup_temp_files)
        })
        .collect();

    ensure_distinct_outputs(&requests)?;
    info!("Found {} video files in {}", requests.len(), input_dir.display());
    Ok(requests)
}

/// Two requests writing the same file would overwrite each other.
pub fn ensure_distinct_outputs(requests: &[WorkflowRequest]) -> Result<()> {
    let mut seen: HashMap<&Path, &Path> = HashMap::new();
    for request in requests {
        if let Some(first) = seen.insert(&request.output_path, &request.video_path) {
            return Err(RevoiceError::Validation(format!(
                "{} and {} would both write {}",
                first.display(),
                request.video_path.display(),
                request.output_path.display()
            )));
        }
    }
    Ok(())
}

/// Load requests from a JSON array. Relative paths resolve against the
/// manifest's directory.
pub fn load_manifest(path: &Path) -> Result<Vec<WorkflowRequest>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| RevoiceError::Config(format!("Failed to read manifest {}: {}", path.display(), e)))?;
    let mut requests: Vec<WorkflowRequest> = serde_json::from_str(&content)
        .map_err(|e| RevoiceError::Config(format!("Failed to parse manifest {}: {}", path.display(), e)))?;

    let base = path.parent().unwrap_or_else(|| Path::new(""));
    for request in &mut requests {
        request.video_path = resolve(base, &request.video_path);
        request.reference_audio_path = resolve(base, &request.reference_audio_path);
        request.output_path = resolve(base, &request.output_path);
    }
    ensure_distinct_outputs(&requests)?;
    Ok(requests)
}

fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

/// Serializable summary written after a batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub translated: usize,
    pub results: Vec<WorkflowResult>,
}

impl BatchReport {
    pub fn new(results: Vec<WorkflowResult>) -> Self {
        let succeeded = results.iter().filter(|r| r.success).count();
        Self {
            total: results.len(),
            succeeded,
            failed: results.len() - succeeded,
            translated: results.iter().filter(|r| r.was_translated).count(),
            results,
        }
    }
}
