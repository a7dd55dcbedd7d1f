use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use sparkit_core::error::CoreError;
use sparkit_core::sanitize::OutputSanitizer;
use sparkit_pipeline::{ErrorClass, LedgerError, PipelineError};

/// Application-level error type for HTTP handlers.
///
/// Wraps domain, ledger and pipeline errors and adds HTTP-specific variants.
/// Implements [`IntoResponse`] to produce consistent `{ error, code }` JSON.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// A pipeline run ended without a batch response.
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Core(core) => match core {
                CoreError::NotFound { entity, id } => (
                    StatusCode::NOT_FOUND,
                    "NOT_FOUND",
                    format!("{entity} with id {id} not found"),
                ),
                CoreError::Validation(msg) => {
                    (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
                }
                CoreError::Unauthorized(msg) => {
                    (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg.clone())
                }
                CoreError::Internal(msg) => internal(msg),
            },

            AppError::Database(err) => internal(&err.to_string()),
            AppError::Ledger(err) => internal(&err.to_string()),
            AppError::Pipeline(err) => classify_pipeline_error(err),

            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            AppError::InternalError(msg) => internal(msg),
        };

        let body = json!({
            "error": OutputSanitizer::default().text(&message),
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}

/// Map a pipeline failure onto an HTTP status and error code.
///
/// Upstream and policy failures expose their message; internal ones do not.
fn classify_pipeline_error(err: &PipelineError) -> (StatusCode, &'static str, String) {
    match err.class() {
        ErrorClass::InvalidRequest => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", err.to_string()),
        ErrorClass::ContentBlocked => (StatusCode::BAD_REQUEST, "CONTENT_BLOCKED", err.to_string()),
        ErrorClass::Timeout => (StatusCode::GATEWAY_TIMEOUT, "TIMEOUT", err.to_string()),
        ErrorClass::Upstream => {
            tracing::warn!(error = %err, "Generation failed upstream");
            (StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR", err.to_string())
        }
        ErrorClass::Internal => internal(&err.to_string()),
    }
}

fn internal(detail: &str) -> (StatusCode, &'static str, String) {
    tracing::error!(error = %detail, "Internal error");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "INTERNAL_ERROR",
        "An internal error occurred".to_string(),
    )
}
