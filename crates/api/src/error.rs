use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use vidmood_core::error::CoreError;
use vidmood_core::orchestrator::SubmitError;
use vidmood_core::outcome::JobFailure;
use vidmood_core::query::QueryError;

/// Application-level error type for HTTP handlers.
///
/// Wraps the domain errors from `vidmood_core` and adds HTTP-specific
/// variants. Implements [`IntoResponse`] to produce consistent JSON error
/// responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A domain-level error from `vidmood_core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// The upload was refused or could not be staged.
    #[error(transparent)]
    Submit(#[from] SubmitError),

    /// An accepted job ended without a result.
    #[error(transparent)]
    Job(#[from] JobFailure),

    /// A latest-artifact lookup failed.
    #[error(transparent)]
    Query(#[from] QueryError),

    /// The multipart body could not be read.
    #[error(transparent)]
    Multipart(#[from] MultipartError),

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            // --- CoreError variants ---
            AppError::Core(core) => match core {
                CoreError::NotFound { entity, key } => (
                    StatusCode::NOT_FOUND,
                    "NOT_FOUND",
                    format!("No {entity} matching '{key}' has been published"),
                ),
                CoreError::Validation(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            },

            // --- Submission ---
            AppError::Submit(err) => match err {
                SubmitError::UnsupportedMedia { .. } => (
                    StatusCode::UNSUPPORTED_MEDIA_TYPE,
                    "UNSUPPORTED_MEDIA",
                    err.to_string(),
                ),
                SubmitError::Staging(e) => internal("Upload staging failed", e),
            },

            // --- Job outcomes ---
            AppError::Job(failure) => {
                let status = match failure {
                    JobFailure::Timeout => StatusCode::GATEWAY_TIMEOUT,
                    JobFailure::AnalysisFailed(_)
                    | JobFailure::ArtifactMissing
                    | JobFailure::ArtifactUnreadable(_) => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, failure.code(), failure.to_string())
            }

            // --- Queries ---
            AppError::Query(err) => match err {
                QueryError::Decode { .. } => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DECODE_ERROR",
                    err.to_string(),
                ),
                QueryError::Artifact(e) => internal("Artifact lookup failed", e),
            },

            // --- HTTP-specific errors ---
            AppError::Multipart(err) => {
                let status = err.status();
                let code = if status == StatusCode::PAYLOAD_TOO_LARGE {
                    "PAYLOAD_TOO_LARGE"
                } else {
                    "BAD_REQUEST"
                };
                (status, code, err.body_text())
            }
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}

/// Log the real cause and return a sanitized 500.
fn internal(
    context: &'static str,
    cause: &dyn std::fmt::Display,
) -> (StatusCode, &'static str, String) {
    tracing::error!(error = %cause, "{context}");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "INTERNAL_ERROR",
        "An internal error occurred".to_string(),
    )
}
