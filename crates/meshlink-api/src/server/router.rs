//! Application router configuration.

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};

use super::types::{ServerState, MAX_REQUEST_BODY_SIZE};

/// Create the application router with a specific state.
pub fn create_router_with_state(state: ServerState) -> Router {
    use crate::handlers::{basic, commands};

    Router::new()
        // Health check endpoints
        .route("/api/health", get(basic::health_handler))
        .route("/api/health/queue", get(basic::queue_stats_handler))
        // Command submission
        .route(
            "/api/commands/send_message",
            post(commands::send_message_handler),
        )
        .route(
            "/api/commands/send_channel_message",
            post(commands::send_channel_message_handler),
        )
        .route(
            "/api/commands/send_advert",
            post(commands::send_advert_handler),
        )
        .route(
            "/api/commands/send_trace_path",
            post(commands::send_trace_path_handler),
        )
        .route("/api/commands/ping", post(commands::ping_handler))
        .route(
            "/api/commands/send_telemetry_request",
            post(commands::send_telemetry_request_handler),
        )
        .layer(RequestBodyLimitLayer::new(MAX_REQUEST_BODY_SIZE))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
