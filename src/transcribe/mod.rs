// Modular transcription architecture
//
// This module provides different transcription implementations through a factory pattern:
// - WhisperCpp: whisper.cpp command line
// - OpenAI: OpenAI Whisper Python command line
//
// Each engine parses its own JSON output and maps it onto `Transcription`
// through a `TranscriptionMapper`, so the workflow never sees engine formats.

pub mod common;
pub mod whisper_cpp;
pub mod openai;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub use common::*;
use crate::config::{TranscriberConfig, TranscriberImplementation};
use crate::error::Result;

/// One timed span of recognised speech
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptionSegment {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

/// Engine-independent transcription result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transcription {
    pub text: String,
    pub detected_language: String,
    pub segments: Vec<TranscriptionSegment>,
    /// 0.0..=1.0, absent when the engine reports no probabilities
    pub confidence: Option<f64>,
}

/// Main trait for transcription operations
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe a waveform. `language` is a language code or `"auto"`.
    ///
    /// Blocks until the engine has finished; failures are reported as
    /// `RevoiceError::Transcription`.
    async fn transcribe(&self, audio_path: &Path, language: &str) -> Result<Transcription>;

    /// Check that the engine can be launched
    async fn check_availability(&self) -> Result<String>;
}

/// Factory for creating transcriber instances
pub struct TranscriberFactory;

impl TranscriberFactory {
    /// Create a transcriber based on the configured implementation
    pub fn create_transcriber(config: TranscriberConfig) -> Box<dyn Transcriber> {
        match config.implementation {
            TranscriberImplementation::WhisperCpp => {
                Box::new(whisper_cpp::WhisperCppTranscriber::new(config))
            }
            TranscriberImplementation::OpenAI => {
                Box::new(openai::OpenAITranscriber::new(config))
            }
        }
    }
}
