use http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::domain::errors::MedicationError;

/// JSON error body: `{"error": "...", "details": "..."}`.
#[derive(Debug, Serialize)]
pub struct ApiError {
    #[serde(skip)]
    pub status: StatusCode,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ApiError {
    pub fn new(status: StatusCode, error: impl Into<String>) -> Self {
        Self { status, error: error.into(), details: None }
    }

    pub fn bad_request(error: impl Into<String>) -> Self { Self::new(StatusCode::BAD_REQUEST, error) }

    pub fn not_found() -> Self { Self::new(StatusCode::NOT_FOUND, "Not found") }
}

impl From<MedicationError> for ApiError {
    fn from(err: MedicationError) -> Self {
        let status = match &err {
            MedicationError::Validation(_) | MedicationError::InvalidDate(_) => StatusCode::BAD_REQUEST,
            MedicationError::NotFound => StatusCode::NOT_FOUND,
            MedicationError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            MedicationError::Conflict(_) => StatusCode::CONFLICT,
        };
        Self::new(status, err.to_string())
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        if let Some(domain) = err.downcast_ref::<MedicationError>() {
            return domain.clone().into();
        }
        tracing::error!(error = %format!("{err:#}"), "request failed");
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            error: "Internal error".into(),
            details: Some(format!("{err:#}")),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response { (self.status, axum::Json(self)).into_response() }
}
