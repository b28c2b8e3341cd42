use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use crate::config::TranslateConfig;
use crate::error::{Result, RevoiceError};
use crate::language::{self, language_code_to_name};
use super::{Translation, Translator, common::*};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub model: String,
    pub prompt: String,
    pub stream: bool,
    pub format: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateResponse {
    pub response: String,
    pub done: bool,
}

/// JSON object the prompt asks the model to return
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelTranslation {
    pub text: String,
    #[serde(default)]
    pub source_language: Option<String>,
}

/// Translation through a local Ollama model
pub struct OllamaTranslator {
    client: Client,
    config: TranslateConfig,
}

impl OllamaTranslator {
    pub fn new(config: TranslateConfig) -> Result<Self> {
        Ok(Self {
            client: build_http_client(config.request_timeout_secs)?,
            config,
        })
    }

    fn build_translation_prompt(&self, text: &str, source_language: &str, target_language: &str) -> String {
        let target_name = language_code_to_name(target_language);
        let source_line = if language::is_auto(source_language) {
            "The source language is unknown; identify it and report its ISO 639-1 code.".to_string()
        } else {
            format!(
                "The source language is {} (language code: {}).",
                language_code_to_name(source_language),
                source_language
            )
        };

        format!(
            "You are a professional translator.\n\
             \n\
             CRITICAL: You must translate the text to {} ONLY. Do not translate to any other language.\n\
             The target language is: {} (language code: {})\n\
             {}\n\
             \n\
             Return ONLY JSON in the form {{\"text\":\"your {} translation here\",\"source_language\":\"source code\"}}.\n\
             Do not include any explanations, alternatives, or text in other languages.\n\
             \n\
             [Text to translate]\n\
             {}\n",
            target_name, target_name, target_language, source_line, target_name, text
        )
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let request = GenerateRequest {
            model: self.config.model.clone(),
            prompt: prompt.to_string(),
            stream: false,
            format: "json".to_string(),
        };

        let url = format!("{}/api/generate", self.config.endpoint.trim_end_matches('/'));
        debug!("Sending translation request to: {}", url);

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| RevoiceError::Translation(format!("HTTP request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(RevoiceError::Translation(format!(
                "Ollama API error {}: {}",
                status, error_text
            )));
        }

        let generated: GenerateResponse = response
            .json()
            .await
            .map_err(|e| RevoiceError::Translation(format!("Failed to parse response: {}", e)))?;

        Ok(generated.response)
    }

    async fn translate_chunk(&self, text: &str, source_language: &str, target_language: &str) -> Result<Translation> {
        let prompt = self.build_translation_prompt(text, source_language, target_language);
        let raw = with_retries(self.config.max_retries, "Ollama translation", || self.generate(&prompt)).await?;
        parse_model_output(text, &raw, source_language)
    }
}

/// Turn the model's reply into a `Translation`, tolerating non-JSON replies.
fn parse_model_output(original: &str, raw: &str, source_language: &str) -> Result<Translation> {
    let raw = raw.trim();
    debug!("Raw Ollama response: {}", raw);

    let (text, reported_source) = match serde_json::from_str::<ModelTranslation>(raw) {
        Ok(parsed) => (parsed.text.trim().to_string(), parsed.source_language),
        Err(_) => (clean_translation_response(raw), None),
    };

    if text.is_empty() {
        return Err(RevoiceError::Translation("Empty translation received".to_string()));
    }

    let detected = if language::is_auto(source_language) {
        reported_source
            .filter(|l| !l.trim().is_empty())
            .unwrap_or_else(|| crate::transcribe::UNKNOWN_LANGUAGE.to_string())
    } else {
        source_language.to_string()
    };

    Ok(Translation {
        confidence: Some(heuristic_confidence(original, &text)),
        translated_text: text,
        detected_source_language: detected,
    })
}

#[async_trait]
impl Translator for OllamaTranslator {
    async fn translate(&self, text: &str, source_language: &str, target_language: &str) -> Result<Translation> {
        info!("Translating {} chars from {} to {} with {}", text.chars().count(), source_language, target_language, self.config.model);

        let mut parts = Vec::new();
        for chunk in split_into_chunks(text, self.config.max_chunk_chars) {
            parts.push(self.translate_chunk(&chunk, source_language, target_language).await?);
        }
        merge_translations(parts, source_language)
    }

    /// Check if Ollama is running and the model is pulled
    async fn check_availability(&self) -> Result<String> {
        let url = format!("{}/api/show", self.config.endpoint.trim_end_matches('/'));

        let response = self
            .client
            .post(&url)
            .json(&json!({ "name": self.config.model }))
            .send()
            .await
            .map_err(|e| RevoiceError::Translation(format!("Failed to connect to Ollama: {}", e)))?;

        if response.status().is_success() {
            info!("Ollama model '{}' is available", self.config.model);
            Ok(format!("Ollama model {}", self.config.model))
        } else {
            Err(RevoiceError::Translation(format!(
                "Ollama model '{}' not found. Please pull the model first: ollama pull {}",
                self.config.model, self.config.model
            )))
        }
    }
}
