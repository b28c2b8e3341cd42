use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use crate::command::ToolCommand;
use crate::config::TranscriberConfig;
use crate::error::{Result, RevoiceError};
use super::{Transcriber, Transcription, TranscriptionSegment, common::*};

/// whisper.cpp `-oj` output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhisperCppOutput {
    pub result: WhisperCppResult,
    pub transcription: Vec<WhisperCppSegment>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhisperCppResult {
    pub language: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhisperCppSegment {
    pub offsets: WhisperCppOffsets,
    pub text: String,
}

/// Segment bounds in milliseconds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhisperCppOffsets {
    pub from: i64,
    pub to: i64,
}

pub struct WhisperCppMapper;

impl TranscriptionMapper<WhisperCppOutput> for WhisperCppMapper {
    fn to_transcription(output: WhisperCppOutput) -> Result<Transcription> {
        let segments: Vec<TranscriptionSegment> = output
            .transcription
            .into_iter()
            .map(|seg| TranscriptionSegment {
                start: seg.offsets.from as f64 / 1000.0,
                end: seg.offsets.to as f64 / 1000.0,
                text: seg.text.trim().to_string(),
            })
            .collect();

        let language = if output.result.language.trim().is_empty() {
            UNKNOWN_LANGUAGE.to_string()
        } else {
            output.result.language
        };

        Ok(Transcription {
            text: join_segments(&segments),
            detected_language: language,
            segments,
            // plain -oj output carries no token probabilities
            confidence: None,
        })
    }
}

/// whisper.cpp command-line transcriber
pub struct WhisperCppTranscriber {
    config: TranscriberConfig,
}

impl WhisperCppTranscriber {
    pub fn new(config: TranscriberConfig) -> Self {
        Self { config }
    }

    fn build_command(&self, audio_path: &Path, output_prefix: &Path, language: &str) -> ToolCommand {
        let threads = (self.config.threads > 0).then(|| self.config.threads.to_string());

        ToolCommand::new(&self.config.binary_path, "whisper.cpp transcription")
            .arg("-m")
            .arg(&self.config.model)
            .arg("-f")
            .path_arg(audio_path)
            .arg("-l")
            .arg(language_argument(language).unwrap_or_else(|| "auto".to_string()))
            .arg("-tp")
            .arg(self.config.temperature.to_string())
            .opt_arg("-t", threads)
            .arg("-oj")
            .arg("-of")
            .path_arg(output_prefix)
    }
}

#[async_trait]
impl Transcriber for WhisperCppTranscriber {
    async fn transcribe(&self, audio_path: &Path, language: &str) -> Result<Transcription> {
        ensure_readable_audio(audio_path)?;
        info!("Transcribing {} with whisper.cpp (hint: {})", audio_path.display(), language);

        let temp_dir = tempfile::tempdir().map_err(|e| {
            RevoiceError::Transcription(format!("Failed to create temp directory: {}", e))
        })?;
        let output_prefix = temp_dir.path().join("transcript");

        self.build_command(audio_path, &output_prefix, language)
            .execute(RevoiceError::Transcription)
            .await?;

        let output: WhisperCppOutput =
            read_json_output(&output_prefix.with_extension("json")).await?;
        let transcription = WhisperCppMapper::to_transcription(output)?;

        info!(
            "Transcription completed: {} segments, language {}",
            transcription.segments.len(),
            transcription.detected_language
        );
        Ok(transcription)
    }

    async fn check_availability(&self) -> Result<String> {
        ToolCommand::new(&self.config.binary_path, "whisper.cpp help")
            .arg("--help")
            .probe(RevoiceError::Transcription)
            .await
    }
}
