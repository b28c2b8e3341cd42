use thiserror::Error;

use crate::workflow::StageName;

#[derive(Error, Debug)]
pub enum RevoiceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Audio extraction failed: {0}")]
    Extraction(String),

    #[error("Transcription failed: {0}")]
    Transcription(String),

    #[error("Translation failed: {0}")]
    Translation(String),

    #[error("Voice synthesis failed: {0}")]
    Synthesis(String),

    #[error("Workflow cancelled before {0}")]
    Cancelled(StageName),

    #[error("Audio file error: {0}")]
    Audio(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl RevoiceError {
    /// Build the normalized error kind owned by `stage`.
    pub fn for_stage(stage: StageName, message: impl Into<String>) -> Self {
        let message = message.into();
        match stage {
            StageName::Validation => Self::Validation(message),
            StageName::AudioExtraction => Self::Extraction(message),
            StageName::Transcription => Self::Transcription(message),
            StageName::Translation => Self::Translation(message),
            StageName::Synthesis => Self::Synthesis(message),
        }
    }

    /// Reclassify an error raised inside `stage` into that stage's kind.
    ///
    /// Errors that already belong to the stage (and cancellations) pass
    /// through untouched; anything else keeps its text as the message.
    pub fn into_stage(self, stage: StageName) -> Self {
        if self.stage() == Some(stage) || matches!(self, Self::Cancelled(_)) {
            return self;
        }
        Self::for_stage(stage, self.to_string())
    }

    /// The stage this error kind belongs to, if any.
    pub fn stage(&self) -> Option<StageName> {
        match self {
            Self::Validation(_) => Some(StageName::Validation),
            Self::Extraction(_) => Some(StageName::AudioExtraction),
            Self::Transcription(_) => Some(StageName::Transcription),
            Self::Translation(_) => Some(StageName::Translation),
            Self::Synthesis(_) => Some(StageName::Synthesis),
            _ => None,
        }
    }

    /// Whether repeating the same request may succeed.
    ///
    /// Missing inputs, bad configuration and extraction failures are
    /// deterministic for a fixed input; engine and network failures are not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Transcription(_)
                | Self::Translation(_)
                | Self::Synthesis(_)
                | Self::Http(_)
                | Self::Cancelled(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, RevoiceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn foreign_errors_are_reclassified_with_message() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "disk says no");
        let err = RevoiceError::from(io).into_stage(StageName::AudioExtraction);

        assert!(matches!(err, RevoiceError::Extraction(_)));
        assert!(err.to_string().contains("disk says no"));
        assert!(err.to_string().starts_with("Audio extraction failed"));
    }

    #[test]
    fn stage_errors_keep_their_kind() {
        let err = RevoiceError::Synthesis("engine crashed".into()).into_stage(StageName::Synthesis);
        assert_eq!(err.to_string(), "Voice synthesis failed: engine crashed");
    }

    #[test]
    fn retryability_separates_input_from_engine_failures() {
        assert!(!RevoiceError::Validation("missing video".into()).is_retryable());
        assert!(!RevoiceError::Extraction("bad container".into()).is_retryable());
        assert!(RevoiceError::Translation("connection refused".into()).is_retryable());
        assert!(RevoiceError::Synthesis("timed out".into()).is_retryable());
    }
}
