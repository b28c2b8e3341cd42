use std::path::Path;

use crate::error::{Result, RevoiceError};
use crate::language;
use super::{Transcription, TranscriptionSegment};

/// Language reported when an engine does not name one
pub const UNKNOWN_LANGUAGE: &str = "unknown";

/// Trait for converting service-specific transcription formats
pub trait TranscriptionMapper<T> {
    fn to_transcription(service_output: T) -> Result<Transcription>;
}

/// Join segment texts into one transcript, dropping empty pieces.
pub fn join_segments(segments: &[TranscriptionSegment]) -> String {
    segments
        .iter()
        .map(|seg| seg.text.trim())
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Overall confidence from per-segment average log-probabilities.
///
/// Log-probabilities sit in roughly `[-1, 0]` for usable speech, so the mean
/// is shifted by one and clamped into `0.0..=1.0`.
pub fn confidence_from_logprobs(logprobs: &[f64]) -> Option<f64> {
    if logprobs.is_empty() {
        return None;
    }
    let mean = logprobs.iter().sum::<f64>() / logprobs.len() as f64;
    Some((mean + 1.0).clamp(0.0, 1.0))
}

/// Engine language argument for a hint: `None` lets the engine detect.
pub fn language_argument(hint: &str) -> Option<String> {
    if language::is_auto(hint) {
        None
    } else {
        Some(language::normalize(hint))
    }
}

/// Read and parse an engine's JSON output file.
pub async fn read_json_output<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content = tokio::fs::read_to_string(path).await.map_err(|e| {
        RevoiceError::Transcription(format!("Failed to read output {}: {}", path.display(), e))
    })?;

    serde_json::from_str(&content)
        .map_err(|e| RevoiceError::Transcription(format!("Failed to parse engine JSON: {}", e)))
}

/// Fail early when the waveform cannot be read.
pub fn ensure_readable_audio(audio_path: &Path) -> Result<()> {
    match std::fs::metadata(audio_path) {
        Ok(meta) if meta.is_file() && meta.len() > 0 => Ok(()),
        Ok(_) => Err(RevoiceError::Transcription(format!(
            "Audio file is empty or not a file: {}",
            audio_path.display()
        ))),
        Err(e) => Err(RevoiceError::Transcription(format!(
            "Audio file unreadable {}: {}",
            audio_path.display(),
            e
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confidence_is_shifted_mean() {
        let confidence = confidence_from_logprobs(&[-0.2, -0.4]).unwrap();
        assert!((confidence - 0.7).abs() < 1e-9);
        assert_eq!(confidence_from_logprobs(&[-3.0]), Some(0.0));
        assert_eq!(confidence_from_logprobs(&[]), None);
    }

    #[test]
    fn joined_text_skips_blank_segments() {
        let segments = vec![
            TranscriptionSegment { start: 0.0, end: 1.0, text: " Hello".into() },
            TranscriptionSegment { start: 1.0, end: 1.5, text: "  ".into() },
            TranscriptionSegment { start: 1.5, end: 2.0, text: "there ".into() },
        ];
        assert_eq!(join_segments(&segments), "Hello there");
    }

    #[test]
    fn auto_hint_means_no_language_argument() {
        assert_eq!(language_argument("auto"), None);
        assert_eq!(language_argument("en-GB"), Some("en".to_string()));
    }

    #[test]
    fn empty_audio_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.wav");
        std::fs::write(&path, b"").unwrap();

        assert!(ensure_readable_audio(&path).is_err());
        assert!(ensure_readable_audio(&dir.path().join("missing.wav")).is_err());
    }
}
