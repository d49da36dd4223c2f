use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use orbit_core::AppError;
use serde::Serialize;

/// API error payload.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    code: &'static str,
    message: String,
}

/// HTTP API error wrapper around core application errors.
#[derive(Debug)]
pub struct ApiError(pub AppError);

impl From<AppError> for ApiError {
    fn from(value: AppError) -> Self {
        Self(value)
    }
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match &self.0 {
            AppError::Validation(_) => (StatusCode::BAD_REQUEST, "validation"),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            AppError::RunNotFound(_) => (StatusCode::NOT_FOUND, "run_not_found"),
            AppError::BackfillNotFound(_) => (StatusCode::NOT_FOUND, "backfill_not_found"),
            AppError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
            AppError::InvalidTransition { .. } => (StatusCode::CONFLICT, "invalid_transition"),
            AppError::InvalidWorkflowTransition { .. } => {
                (StatusCode::CONFLICT, "invalid_workflow_transition")
            }
            AppError::ClusterUnreachable { .. } => (StatusCode::BAD_GATEWAY, "cluster_unreachable"),
            AppError::UnmappableExternalState(_) => {
                (StatusCode::BAD_GATEWAY, "unmappable_external_state")
            }
            AppError::NoClusterAvailable { .. } => {
                (StatusCode::SERVICE_UNAVAILABLE, "no_cluster_available")
            }
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let payload = Json(ErrorResponse {
            code,
            message: self.0.to_string(),
        });

        (status, payload).into_response()
    }
}

/// Standard API result type.
pub type ApiResult<T> = Result<T, ApiError>;
