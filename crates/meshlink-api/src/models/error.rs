//! Unified error handling for the API.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use std::fmt;

use meshlink_commands::DispatchError;

/// Message returned when the queue refuses a command.
pub const QUEUE_FULL_MESSAGE: &str = "Command queue is full. Please try again later.";

/// API error response with its HTTP status code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling.
    #[serde(skip)]
    pub code: String,
    /// Human-readable error message.
    #[serde(rename = "error")]
    pub message: String,
    /// HTTP status code.
    #[serde(skip)]
    pub status: StatusCode,
}

impl ErrorResponse {
    /// Create a new error response.
    pub fn new(code: impl Into<String>, message: impl Into<String>, status: StatusCode) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            status,
        }
    }

    /// Bad request (400).
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new("BAD_REQUEST", message, StatusCode::BAD_REQUEST)
    }

    /// Forbidden (403).
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new("FORBIDDEN", message, StatusCode::FORBIDDEN)
    }

    /// Validation error (422).
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(
            "VALIDATION_ERROR",
            message,
            StatusCode::UNPROCESSABLE_ENTITY,
        )
    }

    /// Too many requests (429).
    pub fn queue_full() -> Self {
        Self::new("QUEUE_FULL", QUEUE_FULL_MESSAGE, StatusCode::TOO_MANY_REQUESTS)
    }

    /// Internal server error (500).
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new("INTERNAL_ERROR", message, StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl IntoResponse for ErrorResponse {
    fn into_response(self) -> Response {
        let status = self.status;
        let body = serde_json::json!({ "error": self.message });
        (status, axum::Json(body)).into_response()
    }
}

impl fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for ErrorResponse {}

impl From<DispatchError> for ErrorResponse {
    fn from(e: DispatchError) -> Self {
        match e {
            DispatchError::QueueFull => Self::queue_full(),
            DispatchError::InvalidCommand(message) => Self::validation(message),
        }
    }
}

impl From<serde_json::Error> for ErrorResponse {
    fn from(e: serde_json::Error) -> Self {
        Self::internal(e.to_string())
    }
}

/// Result type alias for API handlers.
pub type ApiResult<T> = Result<T, ErrorResponse>;
