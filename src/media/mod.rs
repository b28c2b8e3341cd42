// Media extraction adapter
//
// Pulls a PCM waveform out of a video container. The workflow only sees the
// `MediaExtractor` trait; ffmpeg is the one shipped implementation.

pub mod ffmpeg;

use async_trait::async_trait;
use std::path::Path;

pub use ffmpeg::*;

use crate::config::MediaConfig;
use crate::error::Result;

/// Main trait for audio extraction
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaExtractor: Send + Sync {
    /// Write the audio track of `source` to `dest` as PCM WAV.
    ///
    /// Creates exactly one file at `dest` and leaves `source` untouched.
    /// Failures are reported as `RevoiceError::Extraction`.
    async fn extract_audio(
        &self,
        source: &Path,
        dest: &Path,
        sample_rate: u32,
        channels: u16,
    ) -> Result<()>;

    /// Check that the underlying tool can be launched
    async fn check_availability(&self) -> Result<String>;
}

/// Factory for creating media extractor instances
pub struct MediaExtractorFactory;

impl MediaExtractorFactory {
    /// Create the default media extractor implementation (FFmpeg-based)
    pub fn create_extractor(config: MediaConfig) -> Box<dyn MediaExtractor> {
        Box::new(FfmpegExtractor::new(config))
    }
}
