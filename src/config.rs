use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Result, RevoiceError};

fn default_max_chunk_chars() -> usize {
    4500
}

fn default_min_reference_secs() -> f64 {
    3.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub media: MediaConfig,
    pub transcriber: TranscriberConfig,
    pub translate: TranslateConfig,
    pub synthesis: SynthesisConfig,
    pub workflow: WorkflowConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaConfig {
    /// Path to ffmpeg binary
    pub binary_path: String,
    /// Sample rate of the extracted waveform
    pub sample_rate: u32,
    /// Channel count of the extracted waveform
    pub channels: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriberConfig {
    /// Which speech-to-text engine to drive
    pub implementation: TranscriberImplementation,
    /// Path to transcriber binary (whisper-cli or whisper)
    pub binary_path: String,
    /// Model name or model file path
    pub model: String,
    /// Decoding temperature
    pub temperature: f32,
    /// Worker threads handed to the engine, 0 lets the engine decide
    pub threads: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TranscriberImplementation {
    /// whisper.cpp command line (`whisper-cli -oj`)
    WhisperCpp,
    /// OpenAI whisper python command line
    OpenAI,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslateConfig {
    /// Translation service to call
    pub backend: TranslationBackend,
    /// Service endpoint URL
    pub endpoint: String,
    /// LLM model to use (Ollama only)
    pub model: String,
    /// API key (LibreTranslate only)
    pub api_key: Option<String>,
    /// Maximum retries for failed requests
    pub max_retries: u32,
    /// Request timeout in seconds
    pub request_timeout_secs: u64,
    /// Longest text sent in one request; longer text is split on sentences
    #[serde(default = "default_max_chunk_chars")]
    pub max_chunk_chars: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TranslationBackend {
    /// Local LLM served by Ollama
    Ollama,
    /// LibreTranslate REST API
    LibreTranslate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisConfig {
    /// Path to the Coqui `tts` binary
    pub binary_path: String,
    /// Voice-cloning model name
    pub model: String,
    /// Run the model on GPU
    pub use_gpu: bool,
    /// Shortest accepted reference sample in seconds
    #[serde(default = "default_min_reference_secs")]
    pub min_reference_secs: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Directory holding extracted audio while a run is in flight
    pub temp_dir: PathBuf,
    /// Stage timeouts in seconds, 0 disables the limit
    pub extraction_timeout_secs: u64,
    pub transcription_timeout_secs: u64,
    pub translation_timeout_secs: u64,
    pub synthesis_timeout_secs: u64,
    /// Number of batch items processed at once
    pub batch_concurrency: usize,
    /// Whether the synthesis engine may be invoked concurrently
    pub synthesis_reentrant: bool,
}

impl WorkflowConfig {
    pub fn extraction_timeout(&self) -> Option<Duration> {
        secs_to_timeout(self.extraction_timeout_secs)
    }

    pub fn transcription_timeout(&self) -> Option<Duration> {
        secs_to_timeout(self.transcription_timeout_secs)
    }

    pub fn translation_timeout(&self) -> Option<Duration> {
        secs_to_timeout(self.translation_timeout_secs)
    }

    pub fn synthesis_timeout(&self) -> Option<Duration> {
        secs_to_timeout(self.synthesis_timeout_secs)
    }
}

fn secs_to_timeout(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

impl Default for Config {
    fn default() -> Self {
        Self {
            media: MediaConfig {
                binary_path: "ffmpeg".to_string(),
                sample_rate: 22050,
                channels: 1,
            },
            transcriber: TranscriberConfig {
                implementation: TranscriberImplementation::OpenAI,
                binary_path: "whisper".to_string(),
                model: "base".to_string(),
                temperature: 0.0,
                threads: 0,
            },
            translate: TranslateConfig {
                backend: TranslationBackend::LibreTranslate,
                endpoint: "http://localhost:5000".to_string(),
                model: "llama3.2:3b".to_string(),
                api_key: None,
                max_retries: 3,
                request_timeout_secs: 60,
                max_chunk_chars: default_max_chunk_chars(),
            },
            synthesis: SynthesisConfig {
                binary_path: "tts".to_string(),
                model: "tts_models/multilingual/multi-dataset/xtts_v2".to_string(),
                use_gpu: false,
                min_reference_secs: default_min_reference_secs(),
            },
            workflow: WorkflowConfig {
                temp_dir: PathBuf::from(".revoice/tmp"),
                extraction_timeout_secs: 600,
                transcription_timeout_secs: 3600,
                translation_timeout_secs: 300,
                synthesis_timeout_secs: 3600,
                batch_concurrency: 1,
                synthesis_reentrant: false,
            },
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| RevoiceError::Config(format!("Failed to read config file: {}", e)))?;

        toml::from_str(&content)
            .map_err(|e| RevoiceError::Config(format!("Failed to parse config file: {}", e)))
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| RevoiceError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| RevoiceError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    /// Write the default configuration without reading whatever is at `path`.
    pub fn write_default<P: AsRef<Path>>(path: P, force: bool) -> Result<()> {
        let path = path.as_ref();
        if path.exists() && !force {
            return Err(RevoiceError::Config(format!(
                "{} already exists, use --force to overwrite",
                path.display()
            )));
        }
        Config::default().save_to_file(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_survives_a_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("revoice.toml");

        Config::default().save_to_file(&path).unwrap();
        let loaded = Config::from_file(&path).unwrap();

        assert_eq!(loaded.media.sample_rate, 22050);
        assert_eq!(loaded.media.channels, 1);
        assert_eq!(loaded.transcriber.implementation, TranscriberImplementation::OpenAI);
        assert_eq!(loaded.translate.backend, TranslationBackend::LibreTranslate);
        assert_eq!(loaded.workflow.batch_concurrency, 1);
    }

    #[test]
    fn missing_optional_keys_fall_back_to_defaults() {
        let raw = r#"
            [media]
            binary_path = "ffmpeg"
            sample_rate = 16000
            channels = 1

            [transcriber]
            implementation = "WhisperCpp"
            binary_path = "whisper-cli"
            model = "models/ggml-base.bin"
            temperature = 0.0
            threads = 4

            [translate]
            backend = "Ollama"
            endpoint = "http://localhost:11434"
            model = "llama3.2:3b"
            max_retries = 2
            request_timeout_secs = 30

            [synthesis]
            binary_path = "tts"
            model = "tts_models/multilingual/multi-dataset/xtts_v2"
            use_gpu = true

            [workflow]
            temp_dir = "/tmp/revoice"
            extraction_timeout_secs = 0
            transcription_timeout_secs = 10
            translation_timeout_secs = 10
            synthesis_timeout_secs = 10
            batch_concurrency = 2
            synthesis_reentrant = false
        "#;

        let config: Config = toml::from_str(raw).unwrap();
        assert_eq!(config.translate.max_chunk_chars, 4500);
        assert_eq!(config.translate.api_key, None);
        assert_eq!(config.synthesis.min_reference_secs, 3.0);
        assert_eq!(config.workflow.extraction_timeout(), None);
        assert_eq!(config.workflow.synthesis_timeout(), Some(Duration::from_secs(10)));
    }

    #[test]
    fn default_config_replaces_a_malformed_file_only_when_forced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("revoice.toml");
        std::fs::write(&path, "[media\nbinary_path = ").unwrap();
        assert!(Config::from_file(&path).is_err());

        let err = Config::write_default(&path, false).unwrap_err();
        assert!(matches!(err, RevoiceError::Config(ref m) if m.contains("--force")));

        Config::write_default(&path, true).unwrap();
        assert_eq!(Config::from_file(&path).unwrap().media.sample_rate, 22050);
    }

    #[test]
    fn unreadable_config_is_a_config_error() {
        let err = Config::from_file("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, RevoiceError::Config(_)));
    }
}
