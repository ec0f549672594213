use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use runlet_core::error::RunnerError;
use serde_json::json;

/// Application-level error type for HTTP handlers.
///
/// Covers host-side failures around the runner. Service-level diagnostics
/// (transpile errors, spawn failures, timeouts) are not errors here: the
/// coordinator streams them into the response body itself.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A domain-level error from `runlet_core`.
    #[error(transparent)]
    Runner(#[from] RunnerError),

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// An internal error with a human-readable message.
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Runner(err) => match err {
                RunnerError::Configuration(msg) => {
                    tracing::error!(error = %msg, "Service misconfigured");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "CONFIGURATION_ERROR",
                        "Service is misconfigured".to_string(),
                    )
                }
                RunnerError::ArgvTooLarge { .. } => (
                    StatusCode::PAYLOAD_TOO_LARGE,
                    "ARGV_TOO_LARGE",
                    err.to_string(),
                ),
                other => (StatusCode::BAD_REQUEST, "RUNNER_ERROR", other.to_string()),
            },

            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            AppError::InternalError(msg) => {
                tracing::error!(error = %msg, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}
