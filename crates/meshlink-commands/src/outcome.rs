//! One-shot, multi-observer outcome slots.
//!
//! A slot is settled once by the worker (or by the queue when an entry is
//! evicted). Every watcher, including those handed to debounced duplicates,
//! observes the same [`CommandOutcome`].

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::command::{CommandOutcome, RequestId};

/// Resolver side of an outcome.
#[derive(Debug, Clone)]
pub struct OutcomeSlot {
    tx: Arc<watch::Sender<Option<CommandOutcome>>>,
}

impl Default for OutcomeSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl OutcomeSlot {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Settle the slot. Returns `false` if it was already settled, in which
    /// case the earlier outcome is kept.
    pub fn resolve(&self, outcome: CommandOutcome) -> bool {
        let mut outcome = Some(outcome);
        self.tx.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = outcome.take();
            true
        })
    }

    pub fn is_resolved(&self) -> bool {
        self.tx.borrow().is_some()
    }

    /// Current outcome, if settled.
    pub fn peek(&self) -> Option<CommandOutcome> {
        self.tx.borrow().clone()
    }

    /// Create an observer. `request_id` names the submission the watcher
    /// was handed to and is used if the slot is abandoned.
    pub fn watch(&self, request_id: impl Into<RequestId>) -> OutcomeWatcher {
        OutcomeWatcher {
            rx: self.tx.subscribe(),
            request_id: request_id.into(),
        }
    }
}

/// Observer side of an outcome.
#[derive(Debug, Clone)]
pub struct OutcomeWatcher {
    rx: watch::Receiver<Option<CommandOutcome>>,
    request_id: RequestId,
}

impl OutcomeWatcher {
    /// Outcome if already settled.
    pub fn peek(&self) -> Option<CommandOutcome> {
        self.rx.borrow().clone()
    }

    /// Wait for the outcome.
    ///
    /// If every resolver is dropped without settling, an `abandoned`
    /// failure is returned instead.
    pub async fn wait(mut self) -> CommandOutcome {
        match self.rx.wait_for(Option::is_some).await {
            Ok(settled) => match settled.as_ref() {
                Some(outcome) => outcome.clone(),
                None => CommandOutcome::abandoned(&self.request_id),
            },
            Err(_) => CommandOutcome::abandoned(&self.request_id),
        }
    }

    /// Wait for the outcome with a deadline. Returns `None` on timeout; the
    /// command itself keeps its place in the queue.
    pub async fn wait_timeout(self, timeout: Duration) -> Option<CommandOutcome> {
        tokio::time::timeout(timeout, self.wait()).await.ok()
    }
}
