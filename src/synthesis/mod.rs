// Voice synthesis adapter
//
// Speaks text in the timbre of a reference sample. Engines are slow and
// usually hold one loaded model, so `SerializedSynthesizer` can wrap any
// engine that must not be invoked concurrently.

pub mod coqui;

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

pub use coqui::*;
use crate::audio::{self, WavInfo};
use crate::config::SynthesisConfig;
use crate::error::{Result, RevoiceError};

/// Main trait for voice synthesis
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VoiceSynthesizer: Send + Sync {
    /// Speak `text` (in `language`) with the voice of `reference_audio`, writing to `dest`.
    ///
    /// Failures, including an empty text or an unusable reference sample,
    /// are reported as `RevoiceError::Synthesis`.
    async fn synthesize(
        &self,
        text: &str,
        language: &str,
        reference_audio: &Path,
        dest: &Path,
    ) -> Result<()>;

    /// Check that the engine can be launched
    async fn check_availability(&self) -> Result<String>;
}

/// Factory for creating synthesizer instances
pub struct SynthesizerFactory;

impl SynthesizerFactory {
    pub fn create_synthesizer(config: SynthesisConfig) -> Box<dyn VoiceSynthesizer> {
        Box::new(CoquiSynthesizer::new(config))
    }
}

/// Reject inputs no engine can work with.
pub fn validate_inputs(text: &str, reference_audio: &Path, min_reference_secs: f64) -> Result<WavInfo> {
    if text.trim().is_empty() {
        return Err(RevoiceError::Synthesis("Text to synthesize is empty".to_string()));
    }

    if !reference_audio.is_file() {
        return Err(RevoiceError::Synthesis(format!(
            "Reference audio not found: {}",
            reference_audio.display()
        )));
    }

    let info = audio::probe_wav(reference_audio)
        .map_err(|e| RevoiceError::Synthesis(format!("Invalid reference sample: {}", e)))?;

    if info.duration_secs < min_reference_secs {
        return Err(RevoiceError::Synthesis(format!(
            "Reference sample too short: {:.1}s (need at least {:.1}s)",
            info.duration_secs, min_reference_secs
        )));
    }

    Ok(info)
}

/// Serializes calls into an engine that is not safely reentrant.
pub struct SerializedSynthesizer {
    inner: Arc<dyn VoiceSynthesizer>,
    lock: Mutex<()>,
}

impl SerializedSynthesizer {
    pub fn new(inner: Arc<dyn VoiceSynthesizer>) -> Self {
        Self {
            inner,
            lock: Mutex::new(()),
        }
    }
}

#[async_trait]
impl VoiceSynthesizer for SerializedSynthesizer {
    async fn synthesize(
        &self,
        text: &str,
        language: &str,
        reference_audio: &Path,
        dest: &Path,
    ) -> Result<()> {
        let _guard = self.lock.lock().await;
        debug!("Synthesis engine acquired for {}", dest.display());
        self.inner.synthesize(text, language, reference_audio, dest).await
    }

    async fn check_availability(&self) -> Result<String> {
        self.inner.check_availability().await
    }
}
