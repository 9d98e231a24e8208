//! Mapping of failures to HTTP responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::error::GridError;

#[derive(Debug)]
pub enum ApiError {
    /// Malformed request body or parameters
    BadRequest(String),
    NotFound(String),
    /// A grid operation failed; `action` completes "Failed to ..."
    Operation {
        action: &'static str,
        source: GridError,
    },
}

impl ApiError {
    pub fn operation(action: &'static str) -> impl FnOnce(GridError) -> ApiError {
        move |source| ApiError::Operation { action, source }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
            }
            ApiError::NotFound(message) => {
                (StatusCode::NOT_FOUND, Json(json!({ "error": message }))).into_response()
            }
            ApiError::Operation { action, source } => {
                tracing::error!("Failed to {}: {}", action, source);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({
                        "error": format!("Failed to {}", action),
                        "message": source.to_string(),
                    })),
                )
                    .into_response()
            }
        }
    }
}
