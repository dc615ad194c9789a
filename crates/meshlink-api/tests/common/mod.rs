//! Common test utilities for API tests.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use tower::ServiceExt;

use meshlink_api::{create_router_with_state, ServerState};
use meshlink_commands::{DispatchConfig, Dispatcher, MockTransport};

pub const NODE: &str = "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";

/// Create a server state around a mock transport. The worker is not
/// started, so submissions stay queued.
pub fn create_test_server_state(config: DispatchConfig) -> (ServerState, Arc<MockTransport>) {
    let mock = Arc::new(MockTransport::new());
    let state = ServerState::new(Dispatcher::new(config), mock.clone());
    (state, mock)
}

pub fn test_config() -> DispatchConfig {
    DispatchConfig {
        rate_limit_enabled: false,
        ..Default::default()
    }
}

pub fn router(state: ServerState) -> Router {
    create_router_with_state(state)
}

/// Send a request and decode the JSON body.
pub async fn call(
    app: &Router,
    method: &str,
    uri: &str,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(value) => {
            builder = builder.header("content-type", "application/json");
            Body::from(value.to_string())
        }
        None => Body::empty(),
    };

    let response = app
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
    };
    (status, value)
}
