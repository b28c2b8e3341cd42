use async_trait::async_trait;
use std::path::Path;
use tracing::info;

use crate::command::ToolCommand;
use crate::config::SynthesisConfig;
use crate::error::{Result, RevoiceError};
use crate::language;
use super::{VoiceSynthesizer, validate_inputs};

/// Coqui TTS command line driving a voice-cloning model (XTTS by default)
pub struct CoquiSynthesizer {
    config: SynthesisConfig,
}

impl CoquiSynthesizer {
    pub fn new(config: SynthesisConfig) -> Self {
        Self { config }
    }

    fn build_command(&self, text: &str, language: &str, reference_audio: &Path, dest: &Path) -> ToolCommand {
        let mut cmd = ToolCommand::new(&self.config.binary_path, "Voice synthesis")
            .arg("--model_name")
            .arg(&self.config.model)
            .arg("--text")
            .arg(text)
            .arg("--speaker_wav")
            .path_arg(reference_audio)
            .arg("--language_idx")
            .arg(xtts_language(language))
            .arg("--out_path")
            .path_arg(dest);

        if self.config.use_gpu {
            cmd = cmd.args(["--use_cuda", "true"]);
        }
        cmd
    }
}

/// XTTS names Mandarin `zh-cn`; every other code it knows is a bare primary subtag.
fn xtts_language(code: &str) -> String {
    match language::normalize(code).as_str() {
        "zh" => "zh-cn".to_string(),
        other => other.to_string(),
    }
}

#[async_trait]
impl VoiceSynthesizer for CoquiSynthesizer {
    async fn synthesize(
        &self,
        text: &str,
        language: &str,
        reference_audio: &Path,
        dest: &Path,
    ) -> Result<()> {
        let reference = validate_inputs(text, reference_audio, self.config.min_reference_secs)?;
        info!(
            "Synthesizing {} chars in {} with voice from {} ({:.1}s)",
            text.chars().count(),
            language,
            reference_audio.display(),
            reference.duration_secs
        );

        self.build_command(text, language, reference_audio, dest)
            .execute(RevoiceError::Synthesis)
            .await?;

        if !dest.is_file() {
            return Err(RevoiceError::Synthesis(format!(
                "Output file not created: {}",
                dest.display()
            )));
        }

        info!("Voice synthesis completed: {}", dest.display());
        Ok(())
    }

    async fn check_availability(&self) -> Result<String> {
        ToolCommand::new(&self.config.binary_path, "TTS help")
            .arg("--help")
            .probe(RevoiceError::Synthesis)
            .await
    }
}
