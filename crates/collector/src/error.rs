use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

/// Errors surfaced by the HTTP handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Client input rejected.  Carries every violation found.
    #[error("validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    #[error("{0}")]
    NotFound(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Validation(details) => (
                StatusCode::BAD_REQUEST,
                ErrorResponse {
                    error: "validation failed".to_string(),
                    details,
                },
            ),
            ApiError::NotFound(msg) => (
                StatusCode::NOT_FOUND,
                ErrorResponse {
                    error: msg,
                    details: Vec::new(),
                },
            ),
            ApiError::Internal(e) => {
                error!("request failed: {e:#}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse {
                        error: "internal error".to_string(),
                        details: Vec::new(),
                    },
                )
            }
        };

        (status, Json(body)).into_response()
    }
}
