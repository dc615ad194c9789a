//! Tests for basic handlers.

use axum::extract::State;
use axum::http::StatusCode;
use serde_json::json;

use meshlink_api::handlers::basic::*;
use meshlink_commands::{CommandKind, CommandParams, DispatchConfig};

use crate::common::{call, create_test_server_state, router, test_config};

#[tokio::test]
async fn test_health_handler() {
    let (state, _mock) = create_test_server_state(test_config());
    let result = health_handler(State(state)).await;
    assert_eq!(result.0.status, "ok");
    assert_eq!(result.0.service, "meshlink");
    assert!(!result.0.version.is_empty());
    assert!(!result.0.worker_running);
    assert!(result.0.write_enabled);
}

#[tokio::test]
async fn test_queue_stats_handler() {
    let (state, _mock) = create_test_server_state(test_config());
    state
        .dispatcher()
        .enqueue(CommandKind::SendAdvert, CommandParams::new())
        .unwrap();
    state
        .dispatcher()
        .enqueue(CommandKind::SendAdvert, CommandParams::new())
        .unwrap();

    let stats = queue_stats_handler(State(state)).await.0;
    assert_eq!(stats.queue_size, 1);
    assert_eq!(stats.max_queue_size, 100);
    assert_eq!(stats.debounce_cache_size, 1);
    assert_eq!(stats.commands_debounced_total, 1);
    assert_eq!(stats.rate_limit_tokens_available, -1.0);
}

#[tokio::test]
async fn test_queue_stats_route_reports_tokens() {
    let (state, _mock) = create_test_server_state(DispatchConfig::default());
    let app = router(state);

    let (status, body) = call(&app, "GET", "/api/health/queue", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["rate_limit_tokens_available"], json!(2.0));
    assert_eq!(body["commands_processed_total"], json!(0));

    let (status, body) = call(&app, "GET", "/api/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}
