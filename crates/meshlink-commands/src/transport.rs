//! Transport boundary.
//!
//! The worker hands each command to a [`Transport`], which talks to the
//! companion radio. Transports do not retry; a failure is reported to every
//! waiter on the command.

use async_trait::async_trait;

use crate::command::{CommandKind, CommandParams};

/// Errors reported by a transport.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExecutionError {
    #[error("Device not connected")]
    NotConnected,

    #[error("Destination unreachable")]
    Unreachable,

    #[error("Command rejected by device: {0}")]
    Rejected(String),

    #[error("Command timed out")]
    Timeout,

    #[error("Transport error: {0}")]
    Transport(String),
}

/// Executes one command against the radio link.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Execute `kind` with validated `parameters`, returning the device's
    /// response.
    async fn execute(
        &self,
        kind: CommandKind,
        parameters: &CommandParams,
    ) -> Result<serde_json::Value, ExecutionError>;

    /// Short name for logs.
    fn name(&self) -> &str;
}
