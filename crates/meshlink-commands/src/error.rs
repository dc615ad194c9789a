//! Error types for the dispatch pipeline.

use crate::queue::QueueError;

/// Errors surfaced to producers at admission time.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    /// Admission refused under the `reject` overflow policy.
    #[error("Command queue is full")]
    QueueFull,

    /// Unknown command kind or malformed parameters. Never enters the queue.
    #[error("Invalid command: {0}")]
    InvalidCommand(String),
}

impl DispatchError {
    /// Shorthand for an invalid-command error.
    pub fn invalid(message: impl Into<String>) -> Self {
        DispatchError::InvalidCommand(message.into())
    }
}

impl From<QueueError> for DispatchError {
    fn from(e: QueueError) -> Self {
        match e {
            QueueError::Full => DispatchError::QueueFull,
        }
    }
}

/// Result alias for dispatch operations.
pub type Result<T> = std::result::Result<T, DispatchError>;
