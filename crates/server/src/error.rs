use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use orchestrator::OrchestratorError;
use serde::Serialize;

#[derive(Debug)]
pub enum AppError {
    NotFound(String),
    BadRequest(String),
    Conflict(String),
    Internal(String),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg),
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {msg}");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg)
            }
        };

        let body = Json(ErrorResponse {
            error: error_type.to_string(),
            message,
        });

        (status, body).into_response()
    }
}

impl From<OrchestratorError> for AppError {
    fn from(err: OrchestratorError) -> Self {
        match err {
            OrchestratorError::RunNotFound(_) => AppError::NotFound(err.to_string()),
            OrchestratorError::Validation(_) => AppError::BadRequest(err.to_string()),
            OrchestratorError::AlreadyRunning(_)
            | OrchestratorError::NotWaiting(_)
            | OrchestratorError::InvalidTransition { .. } => AppError::Conflict(err.to_string()),
            OrchestratorError::UnknownPhase(_)
            | OrchestratorError::EmptyPlan
            | OrchestratorError::Database(_)
            | OrchestratorError::Queue(_) => AppError::Internal(err.to_string()),
        }
    }
}
