//! Tests for command submission handlers.

use std::time::Duration;

use axum::http::StatusCode;
use serde_json::json;

use meshlink_commands::{DispatchConfig, QueueFullBehavior};

use crate::common::{call, create_test_server_state, router, test_config, NODE};

#[tokio::test]
async fn test_send_message_queued() {
    let (state, _mock) = create_test_server_state(test_config());
    let app = router(state.clone());

    let (status, body) = call(
        &app,
        "POST",
        "/api/commands/send_message",
        Some(json!({ "destination": NODE, "text": "hello mesh" })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["message"], "Command queued successfully (position 0)");
    assert_eq!(body["queue_info"]["position"], json!(0));
    assert_eq!(body["queue_info"]["queue_size"], json!(1));
    assert_eq!(body["queue_info"]["debounced"], json!(false));
    assert!(body["queue_info"].get("original_submission_time").is_none());
    assert!(body.get("estimated_delivery_ms").is_none());
    assert_eq!(state.dispatcher().queue_len(), 1);
}

#[tokio::test]
async fn test_every_kind_has_a_route() {
    let (state, _mock) = create_test_server_state(DispatchConfig {
        debounce_enabled: false,
        ..test_config()
    });
    let app = router(state.clone());

    let requests = [
        ("send_message", json!({ "destination": NODE, "text": "x" })),
        ("send_channel_message", json!({ "text": "x", "flood": true })),
        ("send_advert", json!({})),
        ("send_trace_path", json!({ "destination": NODE })),
        ("ping", json!({ "destination": NODE })),
        ("send_telemetry_request", json!({ "destination": NODE })),
    ];
    for (kind, body) in requests {
        let (status, _) = call(&app, "POST", &format!("/api/commands/{}", kind), Some(body)).await;
        assert_eq!(status, StatusCode::OK, "{}", kind);
    }
    assert_eq!(state.dispatcher().queue_len(), 6);
}

#[tokio::test]
async fn test_invalid_destination_is_422() {
    let (state, _mock) = create_test_server_state(test_config());
    let app = router(state.clone());

    let (status, body) = call(
        &app,
        "POST",
        "/api/commands/ping",
        Some(json!({ "destination": "abc123" })),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["error"].as_str().unwrap().contains("destination"));
    assert_eq!(state.dispatcher().queue_len(), 0);
}

#[tokio::test]
async fn test_missing_field_is_rejected() {
    let (state, _mock) = create_test_server_state(test_config());
    let app = router(state);

    let (status, _) = call(
        &app,
        "POST",
        "/api/commands/send_message",
        Some(json!({ "destination": NODE })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_queue_full_is_429() {
    let (state, _mock) = create_test_server_state(DispatchConfig {
        queue_max_size: 1,
        queue_full_behavior: QueueFullBehavior::Reject,
        ..test_config()
    });
    let app = router(state);

    let (status, _) = call(
        &app,
        "POST",
        "/api/commands/send_channel_message",
        Some(json!({ "text": "first" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = call(
        &app,
        "POST",
        "/api/commands/send_channel_message",
        Some(json!({ "text": "second" })),
    )
    .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(
        body,
        json!({ "error": "Command queue is full. Please try again later." })
    );
}

#[tokio::test]
async fn test_read_only_is_403() {
    let (state, _mock) = create_test_server_state(test_config());
    let state = state.with_write_enabled(false);
    let app = router(state.clone());

    let (status, body) = call(&app, "POST", "/api/commands/send_advert", Some(json!({}))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(body["error"].is_string());
    assert_eq!(state.dispatcher().queue_len(), 0);
}

#[tokio::test]
async fn test_debounced_response_carries_device_fields() {
    let (state, _mock) = create_test_server_state(test_config());
    let app = router(state.clone());
    let body = json!({ "destination": NODE, "text": "dup" });

    let (_, first) = call(&app, "POST", "/api/commands/send_message", Some(body.clone())).await;
    let (status, second) =
        call(&app, "POST", "/api/commands/send_message", Some(body.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["queue_info"]["debounced"], json!(true));
    assert_eq!(second["queue_info"]["position"], json!(0));
    assert!(second["queue_info"]["original_submission_time"].is_string());
    assert_eq!(second["message"], "Command already queued (pending execution)");
    assert_ne!(first["request_id"], second["request_id"]);

    // Run the worker until the message is executed.
    state.processor.start().await;
    for _ in 0..100 {
        if state.dispatcher().stats().commands_processed_total == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    state.processor.stop().await;

    let (_, third) = call(&app, "POST", "/api/commands/send_message", Some(body)).await;
    assert_eq!(third["queue_info"]["debounced"], json!(true));
    assert_eq!(third["message"], "Command send_message executed successfully");
    let eta = third["estimated_delivery_ms"].as_u64().unwrap();
    assert!((1000..=5000).contains(&eta));
}
