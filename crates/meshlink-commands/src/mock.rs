//! Simulated radio transport.
//!
//! Used by the CLI when no device is attached and by the tests. It records
//! every executed command, can inject latency and failures, and returns
//! payloads shaped like the companion device's responses.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::Rng;
use serde_json::json;

use crate::command::{CommandKind, CommandParams};
use crate::transport::{ExecutionError, Transport};

/// A command the mock has executed.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutedCommand {
    pub kind: CommandKind,
    pub parameters: CommandParams,
}

/// In-memory transport.
#[derive(Debug)]
pub struct MockTransport {
    latency: Duration,
    connected: AtomicBool,
    failing: Mutex<HashSet<CommandKind>>,
    executed: Mutex<Vec<ExecutedCommand>>,
    message_counter: AtomicU64,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            latency: Duration::ZERO,
            connected: AtomicBool::new(true),
            failing: Mutex::new(HashSet::new()),
            executed: Mutex::new(Vec::new()),
            message_counter: AtomicU64::new(0),
        }
    }

    /// Simulated time the device takes per command.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Make every command of `kind` fail with `Rejected`.
    pub fn fail_kind(&self, kind: CommandKind) {
        self.failing.lock().insert(kind);
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Commands executed so far, in order.
    pub fn executed(&self) -> Vec<ExecutedCommand> {
        self.executed.lock().clone()
    }

    pub fn executed_count(&self) -> usize {
        self.executed.lock().len()
    }

    fn response(&self, kind: CommandKind, parameters: &CommandParams) -> serde_json::Value {
        let param = |name: &str| parameters.get(name).cloned().unwrap_or(serde_json::Value::Null);
        let mut rng = rand::thread_rng();

        match kind {
            CommandKind::SendMessage => {
                let id = self.message_counter.fetch_add(1, Ordering::SeqCst) + 1;
                json!({
                    "type": "MSG_SENT",
                    "message_id": id,
                    "destination": param("destination"),
                    "text": param("text"),
                    "estimated_delivery_ms": rng.gen_range(1000..=5000),
                })
            }
            CommandKind::SendChannelMessage => {
                let id = self.message_counter.fetch_add(1, Ordering::SeqCst) + 1;
                json!({
                    "type": "MSG_SENT",
                    "message_id": id,
                    "text": param("text"),
                    "flood": param("flood"),
                })
            }
            CommandKind::SendAdvert => json!({ "type": "ADVERT_SENT", "flood": param("flood") }),
            CommandKind::SendTracePath => json!({
                "type": "TRACE_INITIATED",
                "destination": param("destination"),
                "initiator_tag": rng.gen::<u32>(),
            }),
            CommandKind::Ping => json!({ "type": "PING_SENT", "destination": param("destination") }),
            CommandKind::SendTelemetryRequest => json!({
                "type": "TELEMETRY_REQUEST_SENT",
                "destination": param("destination"),
            }),
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn execute(
        &self,
        kind: CommandKind,
        parameters: &CommandParams,
    ) -> Result<serde_json::Value, ExecutionError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        if !self.connected.load(Ordering::SeqCst) {
            return Err(ExecutionError::NotConnected);
        }

        self.executed.lock().push(ExecutedCommand {
            kind,
            parameters: parameters.clone(),
        });

        if self.failing.lock().contains(&kind) {
            tracing::debug!(kind = %kind, "Mock transport rejecting command");
            return Err(ExecutionError::Rejected(format!("{} disabled on mock", kind)));
        }

        tracing::info!(kind = %kind, "Mock transport executed command");
        Ok(self.response(kind, parameters))
    }

    fn name(&self) -> &str {
        "mock"
    }
}
