// OpenAI Whisper Python implementation
// Drives the `whisper` command-line tool and reads its JSON output

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::command::ToolCommand;
use crate::config::TranscriberConfig;
use crate::error::{Result, RevoiceError};
use super::{Transcriber, Transcription, TranscriptionSegment, common::*};

/// OpenAI Whisper specific JSON output format
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIWhisperOutput {
    pub text: String,
    pub segments: Vec<OpenAIWhisperSegment>,
    pub language: Option<String>,
}

/// OpenAI Whisper specific segment format
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIWhisperSegment {
    pub id: u64,
    pub start: f64,
    pub end: f64,
    pub text: String,
    pub avg_logprob: Option<f64>,
    pub no_speech_prob: Option<f64>,
}

/// Mapper for OpenAI Whisper format
pub struct OpenAIWhisperMapper;

impl TranscriptionMapper<OpenAIWhisperOutput> for OpenAIWhisperMapper {
    fn to_transcription(output: OpenAIWhisperOutput) -> Result<Transcription> {
        let logprobs: Vec<f64> = output.segments.iter().filter_map(|s| s.avg_logprob).collect();

        let segments: Vec<TranscriptionSegment> = output
            .segments
            .into_iter()
            .map(|seg| TranscriptionSegment {
                start: seg.start,
                end: seg.end,
                text: seg.text.trim().to_string(),
            })
            .collect();

        let text = if output.text.trim().is_empty() {
            join_segments(&segments)
        } else {
            output.text.trim().to_string()
        };

        Ok(Transcription {
            text,
            detected_language: output
                .language
                .filter(|l| !l.trim().is_empty())
                .unwrap_or_else(|| UNKNOWN_LANGUAGE.to_string()),
            segments,
            confidence: confidence_from_logprobs(&logprobs),
        })
    }
}

/// OpenAI Whisper implementation
pub struct OpenAITranscriber {
    config: TranscriberConfig,
}

impl OpenAITranscriber {
    pub fn new(config: TranscriberConfig) -> Self {
        Self { config }
    }

    fn build_command(&self, audio_path: &Path, output_dir: &Path, language: &str) -> ToolCommand {
        let threads = (self.config.threads > 0).then(|| self.config.threads.to_string());

        ToolCommand::new(&self.config.binary_path, "Whisper transcription")
            .path_arg(audio_path)
            .arg("--model")
            .arg(&self.config.model)
            .arg("--output_dir")
            .path_arg(output_dir)
            .args(["--output_format", "json"])
            .arg("--temperature")
            .arg(self.config.temperature.to_string())
            .args(["--fp16", "False", "--verbose", "False"])
            .opt_arg("--threads", threads)
            .opt_arg("--language", language_argument(language))
    }

    /// whisper names its output after the input file stem
    fn output_file(audio_path: &Path, output_dir: &Path) -> Result<PathBuf> {
        let stem = audio_path
            .file_stem()
            .ok_or_else(|| RevoiceError::Transcription("Invalid audio filename".to_string()))?;
        Ok(output_dir.join(format!("{}.json", stem.to_string_lossy())))
    }
}

#[async_trait]
impl Transcriber for OpenAITranscriber {
    async fn transcribe(&self, audio_path: &Path, language: &str) -> Result<Transcription> {
        ensure_readable_audio(audio_path)?;
        info!("Transcribing {} with model {} (hint: {})", audio_path.display(), self.config.model, language);

        let temp_dir = tempfile::tempdir().map_err(|e| {
            RevoiceError::Transcription(format!("Failed to create temp directory: {}", e))
        })?;

        self.build_command(audio_path, temp_dir.path(), language)
            .execute(RevoiceError::Transcription)
            .await?;

        let output: OpenAIWhisperOutput =
            read_json_output(&Self::output_file(audio_path, temp_dir.path())?).await?;
        let transcription = OpenAIWhisperMapper::to_transcription(output)?;

        info!(
            "Transcription completed: {} segments, language {}",
            transcription.segments.len(),
            transcription.detected_language
        );
        Ok(transcription)
    }

    async fn check_availability(&self) -> Result<String> {
        ToolCommand::new(&self.config.binary_path, "Whisper help")
            .arg("--help")
            .probe(RevoiceError::Transcription)
            .await
    }
}
