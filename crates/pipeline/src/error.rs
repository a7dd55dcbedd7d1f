use sparkit_core::error::CoreError;
use sparkit_core::request::Stage;
use sparkit_providers::ProviderError;

use crate::ledger::LedgerError;

/// Errors that end a pipeline run without a batch response.
///
/// Per-variant failures never surface here; they are reported inside the
/// response and the ledger.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Unknown workflow '{0}'")]
    UnknownWorkflow(String),

    /// A collaborator refused the request on safety or policy grounds.
    #[error("Content blocked during {stage}: {reason}")]
    ContentBlocked { stage: Stage, reason: String },

    #[error("{stage} stage failed: {message}")]
    StageFailed { stage: Stage, message: String },

    /// The description produced no usable guidance record.
    #[error("No usable guidance could be extracted from the description")]
    GuidanceUnavailable,

    /// Every variant failed to render.
    #[error("No variant succeeded ({} errors)", errors.len())]
    NoVariantSucceeded { errors: Vec<String> },

    #[error("{stage} stage timed out")]
    TimedOut { stage: Stage },

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("Internal pipeline error: {0}")]
    Internal(String),
}

/// Coarse error class used by the HTTP layer for status mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    InvalidRequest,
    ContentBlocked,
    Timeout,
    Upstream,
    Internal,
}

impl PipelineError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::InvalidRequest(_) | Self::UnknownWorkflow(_) => ErrorClass::InvalidRequest,
            Self::ContentBlocked { .. } => ErrorClass::ContentBlocked,
            Self::TimedOut { .. } => ErrorClass::Timeout,
            Self::StageFailed { .. } | Self::GuidanceUnavailable | Self::NoVariantSucceeded { .. } => {
                ErrorClass::Upstream
            }
            Self::Ledger(_) | Self::Internal(_) => ErrorClass::Internal,
        }
    }

    /// Classify a collaborator failure in `stage`.
    pub fn from_provider(stage: Stage, err: ProviderError) -> Self {
        if err.is_timeout() {
            return Self::TimedOut { stage };
        }
        match err {
            ProviderError::ContentBlocked { reason } => Self::ContentBlocked { stage, reason },
            other => Self::StageFailed {
                stage,
                message: other.to_string(),
            },
        }
    }
}

impl From<CoreError> for PipelineError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Validation(msg) => Self::InvalidRequest(msg),
            other => Self::Internal(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn content_block_keeps_stage_and_reason() {
        let err = PipelineError::from_provider(
            Stage::Describing,
            ProviderError::ContentBlocked {
                reason: "SAFETY".into(),
            },
        );
        assert_matches!(
            &err,
            PipelineError::ContentBlocked { stage: Stage::Describing, reason } if reason == "SAFETY"
        );
        assert_eq!(err.class(), ErrorClass::ContentBlocked);
    }

    #[test]
    fn other_provider_errors_are_upstream() {
        let err = PipelineError::from_provider(
            Stage::Deriving,
            ProviderError::EmptyResponse { expected: "image" },
        );
        assert_matches!(err, PipelineError::StageFailed { stage: Stage::Deriving, .. });
        assert_eq!(err.class(), ErrorClass::Upstream);
    }

    #[test]
    fn validation_maps_to_invalid_request() {
        let err: PipelineError = CoreError::Validation("bad".into()).into();
        assert_eq!(err.class(), ErrorClass::InvalidRequest);
        assert_eq!(PipelineError::TimedOut { stage: Stage::Rendering }.class(), ErrorClass::Timeout);
    }
}
