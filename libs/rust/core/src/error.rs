//! Error taxonomy for registry access and promotion evaluation.

use std::time::Duration;

use thiserror::Error;

use crate::registry::ModelStage;

/// Failures reported by a [`Registry`](crate::registry::Registry) implementation.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RegistryError {
    #[error("registry unavailable: {0}")]
    Unavailable(String),

    #[error("registry call timed out after {0:?}")]
    Timeout(Duration),

    #[error("version not found: {name} v{version}")]
    VersionNotFound { name: String, version: u64 },

    #[error("invalid stage transition from {from} to {to}")]
    InvalidTransition { from: ModelStage, to: ModelStage },

    #[error("registry rejected request: {0}")]
    Rejected(String),
}

impl RegistryError {
    pub fn unavailable(msg: impl Into<String>) -> Self { Self::Unavailable(msg.into()) }
    pub fn rejected(msg: impl Into<String>) -> Self { Self::Rejected(msg.into()) }
}

/// Errors surfaced by the promotion engine. None of them are swallowed; the
/// caller decides between retry and abort using [`PromotionError::is_retryable`].
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PromotionError {
    #[error("no Staging version registered for model {model_name}")]
    NoCandidate { model_name: String },

    #[error("failed to load artifact {location}: {reason}")]
    ArtifactLoad { location: String, reason: String },

    #[error("unsupported artifact location {location}: no store handles '{scheme}' locations")]
    UnsupportedArtifact { location: String, scheme: String },

    #[error("registry unavailable: {0}")]
    RegistryUnavailable(String),

    #[error("registry rejected the request: {0}")]
    RegistryRejected(String),

    #[error("scoring failed: {0}")]
    Scoring(String),
}

pub type PromotionResult<T> = Result<T, PromotionError>;

impl PromotionError {
    pub fn artifact_load(location: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::ArtifactLoad { location: location.into(), reason: reason.to_string() }
    }

    pub fn scoring(msg: impl Into<String>) -> Self { Self::Scoring(msg.into()) }

    /// Transient failures worth retrying the whole evaluation for.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ArtifactLoad { .. } | Self::RegistryUnavailable(_))
    }

    /// Short label used for metrics attributes.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NoCandidate { .. } => "no_candidate",
            Self::ArtifactLoad { .. } => "artifact_load",
            Self::UnsupportedArtifact { .. } => "unsupported_artifact",
            Self::RegistryUnavailable(_) => "registry_unavailable",
            Self::RegistryRejected(_) => "registry_rejected",
            Self::Scoring(_) => "scoring",
        }
    }
}

impl From<RegistryError> for PromotionError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::Unavailable(_) | RegistryError::Timeout(_) => Self::RegistryUnavailable(e.to_string()),
            RegistryError::VersionNotFound { .. } | RegistryError::InvalidTransition { .. } | RegistryError::Rejected(_) => {
                Self::RegistryRejected(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_errors_map_to_retry_classes() {
        let e: PromotionError = RegistryError::Timeout(Duration::from_secs(3)).into();
        assert!(matches!(e, PromotionError::RegistryUnavailable(_)));
        assert!(e.is_retryable());

        let e: PromotionError = RegistryError::InvalidTransition { from: ModelStage::Archived, to: ModelStage::Production }.into();
        assert!(matches!(e, PromotionError::RegistryRejected(_)));
        assert!(!e.is_retryable());
    }

    #[test]
    fn only_transient_errors_are_retryable() {
        assert!(PromotionError::artifact_load("s3://bucket/m", "connection reset").is_retryable());
        assert!(!PromotionError::scoring("row count mismatch").is_retryable());
        assert!(!PromotionError::NoCandidate { model_name: "m".into() }.is_retryable());
        let unsupported = PromotionError::UnsupportedArtifact { location: "s3://b/m".into(), scheme: "s3".into() };
        assert!(!unsupported.is_retryable());
        assert!(unsupported.to_string().contains("'s3'"));
    }
}
