//! Outbound command dispatch for a MeshCore radio link.
//!
//! Provides:
//! - Command validation and fingerprinting
//! - Bounded FIFO queue with reject / drop-oldest overflow
//! - Duplicate suppression sharing one outcome between submissions
//! - Token-bucket rate limiting of dispatch
//! - A single sequential worker driving a [`Transport`]

pub mod command;
pub mod config;
pub mod debounce;
pub mod dispatcher;
pub mod error;
pub mod mock;
pub mod outcome;
pub mod processor;
pub mod queue;
pub mod rate_limit;
pub mod transport;

// Re-exports
pub use command::{
    error_codes, Command, CommandKind, CommandOutcome, CommandParams, EntryState, Fingerprint,
    RequestId,
};

pub use config::{ConfigError, DispatchConfig};

pub use debounce::{Classification, DebounceCache};

pub use dispatcher::{Dispatcher, QueueInfo, QueueStats, Submission};

pub use error::DispatchError;

pub use mock::{ExecutedCommand, MockTransport};

pub use outcome::{OutcomeSlot, OutcomeWatcher};

pub use processor::CommandProcessor;

pub use queue::{Admission, CommandQueue, EntryId, QueueEntry, QueueError, QueueFullBehavior};

pub use rate_limit::TokenBucket;

pub use transport::{ExecutionError, Transport};
