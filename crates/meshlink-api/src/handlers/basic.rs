//! Basic handlers - health check and queue status.

use axum::{extract::State, Json};
use serde::Serialize;

use super::ServerState;
use crate::models::QueueStatsDto;

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    pub status: String,
    pub service: String,
    pub version: &'static str,
    pub uptime: u64,
    pub worker_running: bool,
    pub write_enabled: bool,
}

/// Liveness check.
///
/// GET /api/health
pub async fn health_handler(State(state): State<ServerState>) -> Json<HealthStatus> {
    let uptime = chrono::Utc::now().timestamp() - state.started_at;

    Json(HealthStatus {
        status: "ok".to_string(),
        service: "meshlink".to_string(),
        version: env!("CARGO_PKG_VERSION"),
        uptime: uptime.max(0) as u64,
        worker_running: state.processor.is_running().await,
        write_enabled: state.write_enabled,
    })
}

/// Queue statistics.
///
/// GET /api/health/queue
pub async fn queue_stats_handler(State(state): State<ServerState>) -> Json<QueueStatsDto> {
    Json(state.dispatcher().stats().into())
}
