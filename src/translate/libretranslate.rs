use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::TranslateConfig;
use crate::error::{Result, RevoiceError};
use crate::language;
use super::{Translation, Translator, common::*};

#[derive(Debug, Clone, Serialize)]
pub struct TranslateRequest<'a> {
    pub q: &'a str,
    pub source: String,
    pub target: String,
    pub format: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<&'a str>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TranslateResponse {
    #[serde(rename = "translatedText")]
    pub translated_text: String,
    #[serde(rename = "detectedLanguage")]
    pub detected_language: Option<DetectedLanguage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DetectedLanguage {
    /// 0..=100
    pub confidence: f64,
    pub language: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SupportedLanguage {
    pub code: String,
}

/// Translation through a LibreTranslate server
pub struct LibreTranslateTranslator {
    client: Client,
    config: TranslateConfig,
}

impl LibreTranslateTranslator {
    pub fn new(config: TranslateConfig) -> Result<Self> {
        Ok(Self {
            client: build_http_client(config.request_timeout_secs)?,
            config,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.endpoint.trim_end_matches('/'), path)
    }

    async fn request(&self, text: &str, source_language: &str, target_language: &str) -> Result<TranslateResponse> {
        let request = TranslateRequest {
            q: text,
            source: source_code(source_language),
            target: language::normalize(target_language),
            format: "text",
            api_key: self.config.api_key.as_deref(),
        };

        let response = self
            .client
            .post(self.url("translate"))
            .json(&request)
            .send()
            .await
            .map_err(|e| RevoiceError::Translation(format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| RevoiceError::Translation(format!("Failed to read response: {}", e)))?;
        debug!("LibreTranslate response {}: {}", status, body);

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.error)
                .unwrap_or(body);
            return Err(RevoiceError::Translation(format!(
                "LibreTranslate error {}: {}",
                status, message
            )));
        }

        serde_json::from_str(&body)
            .map_err(|e| RevoiceError::Translation(format!("Failed to parse response: {}", e)))
    }

    async fn translate_chunk(&self, text: &str, source_language: &str, target_language: &str) -> Result<Translation> {
        let response = with_retries(self.config.max_retries, "LibreTranslate request", || {
            self.request(text, source_language, target_language)
        })
        .await?;
        Ok(to_translation(text, response, source_language))
    }
}

fn source_code(source_language: &str) -> String {
    if language::is_auto(source_language) {
        language::AUTO.to_string()
    } else {
        language::normalize(source_language)
    }
}

fn to_translation(original: &str, response: TranslateResponse, source_language: &str) -> Translation {
    let detected = match response.detected_language {
        Some(detected) if !detected.language.is_empty() => {
            debug!("Detected {} with {:.0}% confidence", detected.language, detected.confidence);
            detected.language
        }
        _ => source_language.to_string(),
    };
    let translated_text = response.translated_text.trim().to_string();

    Translation {
        confidence: Some(heuristic_confidence(original, &translated_text)),
        translated_text,
        detected_source_language: detected,
    }
}

#[async_trait]
impl Translator for LibreTranslateTranslator {
    async fn translate(&self, text: &str, source_language: &str, target_language: &str) -> Result<Translation> {
        info!("Translating {} chars from {} to {} via LibreTranslate", text.chars().count(), source_language, target_language);

        let mut parts = Vec::new();
        for chunk in split_into_chunks(text, self.config.max_chunk_chars) {
            parts.push(self.translate_chunk(&chunk, source_language, target_language).await?);
        }
        merge_translations(parts, source_language)
    }

    async fn check_availability(&self) -> Result<String> {
        let response = self
            .client
            .get(self.url("languages"))
            .send()
            .await
            .map_err(|e| RevoiceError::Translation(format!("Failed to connect to LibreTranslate: {}", e)))?;

        if !response.status().is_success() {
            return Err(RevoiceError::Translation(format!(
                "LibreTranslate returned {}",
                response.status()
            )));
        }

        let languages: Vec<SupportedLanguage> = response
            .json()
            .await
            .map_err(|e| RevoiceError::Translation(format!("Failed to parse language list: {}", e)))?;
        let codes: Vec<&str> = languages.iter().map(|l| l.code.as_str()).collect();
        Ok(format!("LibreTranslate with {} languages ({})", codes.len(), codes.join(",")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_omits_missing_api_key() {
        let request = TranslateRequest {
            q: "Hello",
            source: source_code("auto"),
            target: language::normalize("fr-FR"),
            format: "text",
            api_key: None,
        };
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["source"], "auto");
        assert_eq!(json["target"], "fr");
        assert!(json.get("api_key").is_none());
    }

    #[test]
    fn detected_language_is_reported() {
        let response: TranslateResponse = serde_json::from_str(
            r#"{"translatedText": "Bonjour", "detectedLanguage": {"confidence": 92.0, "language": "en"}}"#,
        )
        .unwrap();
        let translation = to_translation("Hello there", response, "auto");

        assert_eq!(translation.translated_text, "Bonjour");
        assert_eq!(translation.detected_source_language, "en");
    }

    #[test]
    fn explicit_source_is_kept_without_detection() {
        let response: TranslateResponse =
            serde_json::from_str(r#"{"translatedText": "Hallo"}"#).unwrap();
        let translation = to_translation("Hello", response, "en");
        assert_eq!(translation.detected_source_language, "en");
    }
}
