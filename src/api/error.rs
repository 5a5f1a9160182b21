use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::pipeline::RunError;

/// Application-level error type for HTTP handlers.
///
/// Implements [`IntoResponse`] to produce consistent JSON error bodies.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Run(#[from] RunError),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let stage = match &self {
            AppError::Run(e) => e.stage(),
            AppError::Internal(_) => None,
        };

        let (status, code) = match &self {
            AppError::Run(RunError::AlreadyRunning) => (StatusCode::CONFLICT, "ALREADY_RUNNING"),
            AppError::Run(RunError::Pipeline(_)) => (StatusCode::BAD_GATEWAY, "PIPELINE_FAILED"),
            AppError::Run(RunError::Interrupted(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERRUPTED")
            }
            AppError::Internal(msg) => {
                tracing::error!(error = %msg, "Internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
            }
        };

        let body = json!({
            "error": self.to_string(),
            "code": code,
            "stage": stage,
        });

        (status, axum::Json(body)).into_response()
    }
}
