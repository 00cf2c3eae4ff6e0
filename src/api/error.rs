//! API error handling for consistent JSON error responses.

use super::platform::PlatformError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// API error type that converts to `{"detail": ...}` responses.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    /// Map a platform failure. Unclassified failures are reported as
    /// `"{action}: {err}"`.
    pub fn platform(err: PlatformError, action: &str) -> Self {
        match err {
            PlatformError::NotConfigured => Self::internal(err.to_string()),
            PlatformError::NotFound(_) => Self::not_found(err.to_string()),
            PlatformError::Unauthorized => Self::unauthorized(err.to_string()),
            other => Self::internal(format!("{action}: {other}")),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({ "detail": self.message }));
        (self.status, body).into_response()
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = Result<T, ApiError>;
