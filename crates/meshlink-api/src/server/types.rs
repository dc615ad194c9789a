//! Server state and types.

use std::sync::Arc;

use meshlink_commands::{CommandProcessor, Dispatcher, Transport};

/// Maximum request body size (64 KB)
pub const MAX_REQUEST_BODY_SIZE: usize = 64 * 1024;

/// Server state shared across all handlers.
#[derive(Clone)]
pub struct ServerState {
    /// Worker draining the dispatcher
    pub processor: Arc<CommandProcessor>,
    /// When false, submission endpoints answer 403
    pub write_enabled: bool,
    /// Server start time (unix seconds)
    pub started_at: i64,
}

impl ServerState {
    /// Build state around a dispatcher and the transport its worker drives.
    /// The worker is not started.
    pub fn new(dispatcher: Dispatcher, transport: Arc<dyn Transport>) -> Self {
        Self {
            processor: Arc::new(CommandProcessor::new(dispatcher, transport)),
            write_enabled: true,
            started_at: chrono::Utc::now().timestamp(),
        }
    }

    pub fn with_write_enabled(mut self, enabled: bool) -> Self {
        self.write_enabled = enabled;
        self
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        self.processor.dispatcher()
    }
}
