//! Pipeline error taxonomy
//!
//! Every stage failure is surfaced as a [`PipelineError`]; the orchestrator
//! records its [`ErrorKind`] and message on the job before the run ends.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::job::store::StoreError;
use crate::job::TransitionError;
use crate::media::MediaError;
use crate::providers::ProviderError;

/// Pipeline errors
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("content generation failed: {0}")]
    ContentGenerationFailed(String),

    #[error("speech synthesis failed: {0}")]
    SpeechSynthesisFailed(String),

    #[error("background acquisition failed: {0}")]
    BackgroundAcquisitionFailed(String),

    #[error("caption generation failed: {0}")]
    CaptionGenerationFailed(String),

    #[error("composition failed: {0}")]
    CompositionFailed(String),

    #[error("publish failed: {0}")]
    PublishFailed(String),

    #[error("cancelled")]
    Cancelled,

    #[error("job not found: {0}")]
    NotFound(Uuid),

    #[error("invalid job parameters: {0}")]
    InvalidParams(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, PipelineError>;

/// Failure category persisted on a failed job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ContentGenerationFailed,
    SpeechSynthesisFailed,
    BackgroundAcquisitionFailed,
    CaptionGenerationFailed,
    CompositionFailed,
    PublishFailed,
    Cancelled,
    Internal,
}

impl ErrorKind {
    /// Stable identifier, matching the serialized form
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ContentGenerationFailed => "content_generation_failed",
            Self::SpeechSynthesisFailed => "speech_synthesis_failed",
            Self::BackgroundAcquisitionFailed => "background_acquisition_failed",
            Self::CaptionGenerationFailed => "caption_generation_failed",
            Self::CompositionFailed => "composition_failed",
            Self::PublishFailed => "publish_failed",
            Self::Cancelled => "cancelled",
            Self::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl PipelineError {
    /// Kind recorded on the job when this error ends a run
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ContentGenerationFailed(_) => ErrorKind::ContentGenerationFailed,
            Self::SpeechSynthesisFailed(_) => ErrorKind::SpeechSynthesisFailed,
            Self::BackgroundAcquisitionFailed(_) => ErrorKind::BackgroundAcquisitionFailed,
            Self::CaptionGenerationFailed(_) => ErrorKind::CaptionGenerationFailed,
            Self::CompositionFailed(_) => ErrorKind::CompositionFailed,
            Self::PublishFailed(_) => ErrorKind::PublishFailed,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::NotFound(_) | Self::InvalidParams(_) | Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Human-readable message stored on the failed job
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::ContentGenerationFailed(_) => {
                format!("Could not write the narration script: {self}")
            }
            Self::SpeechSynthesisFailed(_) => format!("Could not synthesize narration: {self}"),
            Self::BackgroundAcquisitionFailed(_) => {
                format!("Could not prepare a background: {self}")
            }
            Self::CaptionGenerationFailed(_) => format!("Could not build captions: {self}"),
            Self::CompositionFailed(_) => format!("Could not render the video: {self}"),
            Self::PublishFailed(_) => format!("Could not upload an asset: {self}"),
            Self::Cancelled => "Cancelled by user".to_string(),
            _ => self.to_string(),
        }
    }
}

impl From<StoreError> for PipelineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => Self::NotFound(id),
            // Only a job that already ended refuses changes during a run
            StoreError::Rejected(TransitionError::Terminal | TransitionError::AlreadyCompleted) => {
                Self::Cancelled
            }
            StoreError::Rejected(e @ TransitionError::Backward { .. }) => {
                Self::Internal(e.to_string())
            }
            StoreError::Backend(msg) => Self::Internal(msg),
        }
    }
}

impl From<ProviderError> for PipelineError {
    fn from(err: ProviderError) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<MediaError> for PipelineError {
    fn from(err: MediaError) -> Self {
        Self::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobStatus;

    #[test]
    fn kinds_follow_variants() {
        assert_eq!(
            PipelineError::ContentGenerationFailed("x".into()).kind(),
            ErrorKind::ContentGenerationFailed
        );
        assert_eq!(PipelineError::Cancelled.kind(), ErrorKind::Cancelled);
        assert_eq!(
            PipelineError::InvalidParams("x".into()).kind(),
            ErrorKind::Internal
        );
    }

    #[test]
    fn cancelled_message_is_stable() {
        assert_eq!(PipelineError::Cancelled.user_message(), "Cancelled by user");
    }

    #[test]
    fn rejected_transition_means_cancelled() {
        let err: PipelineError =
            StoreError::Rejected(TransitionError::Terminal).into();
        assert!(matches!(err, PipelineError::Cancelled));
    }

    #[test]
    fn backward_transition_is_internal() {
        let err: PipelineError = StoreError::Rejected(TransitionError::Backward {
            from: JobStatus::Uploading,
            to: JobStatus::GeneratingAudio,
        })
        .into();
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert!(err.to_string().contains("Uploading"));
    }

    #[test]
    fn kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::PublishFailed).unwrap();
        assert_eq!(json, "\"publish_failed\"");
    }
}
