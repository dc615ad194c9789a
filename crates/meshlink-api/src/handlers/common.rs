//! Common API handler utilities.

use axum::Json;

use crate::models::error::ErrorResponse;

/// Result type for all API handlers.
pub type HandlerResult<T> = Result<Json<T>, ErrorResponse>;

/// Wrap a value in a successful response.
pub fn ok<T>(value: T) -> HandlerResult<T> {
    Ok(Json(value))
}
