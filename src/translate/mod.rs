// Modular translation architecture
//
// This module provides different translation backends through a factory pattern:
// - Ollama: local LLM prompted for a JSON translation
// - LibreTranslate: machine-translation REST service
//
// Both split long input into sentence chunks and report one merged result.

pub mod common;
pub mod ollama;
pub mod libretranslate;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use common::*;
use crate::config::{TranslateConfig, TranslationBackend};
use crate::error::Result;

/// Translated text plus what the service learned about the source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Translation {
    pub translated_text: String,
    pub detected_source_language: String,
    pub confidence: Option<f64>,
}

/// Main trait for translation operations
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Translator: Send + Sync {
    /// Translate `text` into `target_language`. `source_language` may be `"auto"`.
    ///
    /// Network failures, service errors and unsupported language pairs are
    /// reported as `RevoiceError::Translation`.
    async fn translate(
        &self,
        text: &str,
        source_language: &str,
        target_language: &str,
    ) -> Result<Translation>;

    /// Check that the service is reachable and ready
    async fn check_availability(&self) -> Result<String>;
}

/// Factory for creating translator instances
pub struct TranslatorFactory;

impl TranslatorFactory {
    /// Create a translator for the configured backend
    pub fn create_translator(config: TranslateConfig) -> Result<Box<dyn Translator>> {
        Ok(match config.backend {
            TranslationBackend::Ollama => Box::new(ollama::OllamaTranslator::new(config)?),
            TranslationBackend::LibreTranslate => {
                Box::new(libretranslate::LibreTranslateTranslator::new(config)?)
            }
        })
    }
}
