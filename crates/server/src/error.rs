use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use orchestrator::OrchestratorError;
use serde::Serialize;

#[derive(Debug)]
pub enum AppError {
    NotFound(String),
    BadRequest(String),
    Orchestrator(OrchestratorError),
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
            AppError::Orchestrator(err) => match err {
                OrchestratorError::Validation(msg) => {
                    (StatusCode::BAD_REQUEST, "validation_error", msg)
                }
                OrchestratorError::JobNotFound(id) => (
                    StatusCode::NOT_FOUND,
                    "not_found",
                    format!("Job {} not found.", id),
                ),
                err => {
                    tracing::error!("Orchestrator error: {:?}", err);
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "internal_error",
                        err.to_string(),
                    )
                }
            },
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
        AppError::Orchestrator(err)
    }
}

impl From<JsonRejection> for AppError {
    fn from(_: JsonRejection) -> Self {
        AppError::BadRequest("Invalid JSON body provided for orchestration request.".to_string())
    }
}
