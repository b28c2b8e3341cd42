use async_trait::async_trait;
use std::path::Path;
use tracing::info;

use crate::command::ToolCommand;
use crate::config::MediaConfig;
use crate::error::{Result, RevoiceError};
use super::MediaExtractor;

/// Builder for the ffmpeg invocations the extractor needs
pub struct MediaCommandBuilder {
    binary_path: String,
}

impl MediaCommandBuilder {
    pub fn new<S: Into<String>>(binary_path: S) -> Self {
        Self {
            binary_path: binary_path.into(),
        }
    }

    /// Build audio extraction command
    pub fn extract_audio<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        video_path: P,
        audio_path: Q,
        sample_rate: u32,
        channels: u16,
    ) -> ToolCommand {
        ToolCommand::new(&self.binary_path, "Audio extraction")
            .args(["-nostdin", "-hide_banner", "-loglevel", "error"])
            .arg("-i")
            .path_arg(video_path)
            .arg("-vn")
            .args(["-acodec", "pcm_s16le"])
            .arg("-ar")
            .arg(sample_rate.to_string())
            .arg("-ac")
            .arg(channels.to_string())
            .arg("-y")
            .path_arg(audio_path)
    }

    /// Build version check command
    pub fn version_check(&self) -> ToolCommand {
        ToolCommand::new(&self.binary_path, "Version check").arg("-version")
    }
}

/// FFmpeg-backed extractor
pub struct FfmpegExtractor {
    command_builder: MediaCommandBuilder,
}

impl FfmpegExtractor {
    pub fn new(config: MediaConfig) -> Self {
        Self {
            command_builder: MediaCommandBuilder::new(config.binary_path),
        }
    }
}

#[async_trait]
impl MediaExtractor for FfmpegExtractor {
    async fn extract_audio(
        &self,
        source: &Path,
        dest: &Path,
        sample_rate: u32,
        channels: u16,
    ) -> Result<()> {
        if !source.is_file() {
            return Err(RevoiceError::Extraction(format!(
                "Source media not found: {}",
                source.display()
            )));
        }

        info!("Extracting audio from {} to {}", source.display(), dest.display());

        self.command_builder
            .extract_audio(source, dest, sample_rate, channels)
            .execute(RevoiceError::Extraction)
            .await?;

        // a zero exit without output still breaks the contract
        if !dest.is_file() {
            return Err(RevoiceError::Extraction(format!(
                "Output file not created: {}",
                dest.display()
            )));
        }

        info!("Audio extraction completed");
        Ok(())
    }

    async fn check_availability(&self) -> Result<String> {
        self.command_builder
            .version_check()
            .probe(RevoiceError::Extraction)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extraction_command_requests_mono_pcm() {
        let cmd = MediaCommandBuilder::new("ffmpeg").extract_audio("in.mp4", "out.wav", 22050, 1);
        let args = cmd.args.join(" ");

        assert_eq!(cmd.binary_path, "ffmpeg");
        assert!(args.contains("-i in.mp4 -vn -acodec pcm_s16le -ar 22050 -ac 1 -y out.wav"));
    }

    #[tokio::test]
    async fn missing_source_is_an_extraction_error() {
        let extractor = FfmpegExtractor::new(MediaConfig {
            binary_path: "ffmpeg".to_string(),
            sample_rate: 22050,
            channels: 1,
        });
        let dir = tempfile::tempdir().unwrap();

        let err = extractor
            .extract_audio(&dir.path().join("missing.mp4"), &dir.path().join("out.wav"), 22050, 1)
            .await
            .unwrap_err();

        assert!(matches!(err, RevoiceError::Extraction(ref m) if m.contains("not found")));
        assert!(!dir.path().join("out.wav").exists());
    }
}
