//! Producer-facing handle to the dispatch pipeline.
//!
//! The [`Dispatcher`] owns the queue, the debounce cache and the token
//! bucket. Producers call [`Dispatcher::enqueue`]; the
//! [`CommandProcessor`](crate::CommandProcessor) drains what they admit.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::command::{Command, CommandKind, CommandOutcome, CommandParams, RequestId};
use crate::config::DispatchConfig;
use crate::debounce::{Classification, DebounceCache};
use crate::error::DispatchError;
use crate::outcome::{OutcomeSlot, OutcomeWatcher};
use crate::queue::{CommandQueue, EntryId, QueueEntry};
use crate::rate_limit::TokenBucket;

/// Where a submission landed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueInfo {
    /// Entries ahead of this command (0-based)
    pub position: usize,
    /// Expected delay before dispatch
    pub estimated_wait_seconds: f64,
    /// Queue length after the submission
    pub queue_size: usize,
    /// Whether the submission was merged into an earlier one
    pub debounced: bool,
    /// First submission time of the merged command
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_submission_time: Option<DateTime<Utc>>,
}

/// Pipeline counters and gauges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueStats {
    pub queue_size: usize,
    pub max_queue_size: usize,
    /// -1 when rate limiting is disabled
    pub rate_limit_tokens_available: f64,
    pub debounce_cache_size: usize,
    pub commands_processed_total: u64,
    pub commands_dropped_total: u64,
    pub commands_debounced_total: u64,
}

/// Immediate response to an enqueue call.
#[derive(Debug, Clone)]
pub struct Submission {
    /// ID assigned to this submission
    pub request_id: RequestId,
    pub success: bool,
    pub message: String,
    pub queue_info: QueueInfo,
    /// Settled shared outcome, for duplicates of completed commands
    pub outcome: Option<CommandOutcome>,
    /// Observer of the final outcome
    pub watcher: OutcomeWatcher,
}

struct PipelineState {
    queue: CommandQueue,
    debounce: DebounceCache,
    next_entry_id: u64,
}

struct DispatcherInner {
    state: Mutex<PipelineState>,
    limiter: TokenBucket,
    work_ready: Notify,
    config: DispatchConfig,
    processed: AtomicU64,
    dropped: AtomicU64,
    debounced: AtomicU64,
}

/// Shared handle to the pipeline. Cheap to clone.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    /// Build a pipeline from `config`.
    pub fn new(config: DispatchConfig) -> Self {
        let queue = CommandQueue::new(config.queue_max_size, config.queue_full_behavior);
        let debounce = DebounceCache::new(
            config.debounce_enabled,
            config.debounce_window(),
            config.debounce_cache_max_size,
            config.debounce_eligible_kinds.clone(),
        );
        let limiter = TokenBucket::new(
            config.rate_limit_enabled,
            config.rate_limit_per_second,
            config.rate_limit_burst,
        );

        Self {
            inner: Arc::new(DispatcherInner {
                state: Mutex::new(PipelineState {
                    queue,
                    debounce,
                    next_entry_id: 1,
                }),
                limiter,
                work_ready: Notify::new(),
                config,
                processed: AtomicU64::new(0),
                dropped: AtomicU64::new(0),
                debounced: AtomicU64::new(0),
            }),
        }
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.inner.config
    }

    pub(crate) fn limiter(&self) -> &TokenBucket {
        &self.inner.limiter
    }

    /// Validate and submit a command.
    ///
    /// Never waits on the rate limiter. A duplicate of a live command is
    /// merged into it and shares its outcome.
    pub fn enqueue(
        &self,
        kind: CommandKind,
        parameters: CommandParams,
    ) -> Result<Submission, DispatchError> {
        let command = Command::new(kind, parameters)?;
        let request_id = command.request_id.clone();
        let now = Instant::now();

        let mut state = self.inner.state.lock();
        let entry_id = EntryId(state.next_entry_id);
        state.next_entry_id += 1;

        let (slot, fingerprint) = match state.debounce.classify(&command, entry_id, now) {
            Classification::Duplicate {
                slot,
                entry_id: original,
                first_submitted_at,
            } => {
                let position = state.queue.position_of(original).unwrap_or(0);
                let queue_size = state.queue.len();
                drop(state);
                return Ok(self.merged(command, slot, position, queue_size, first_submitted_at));
            }
            Classification::NewEntry { fingerprint, slot } => (slot, Some(fingerprint)),
            Classification::NotEligible => (OutcomeSlot::new(), None),
        };

        let watcher = slot.watch(request_id.clone());
        let entry = QueueEntry::new(entry_id, command, slot);
        let admission = match state.queue.submit(entry) {
            Ok(admission) => admission,
            Err(e) => {
                if let Some(fingerprint) = &fingerprint {
                    state.debounce.forget(fingerprint);
                }
                let queue_size = state.queue.len();
                drop(state);
                self.inner.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    kind = %kind,
                    request_id = %request_id,
                    queue_size,
                    "Queue full, rejecting command"
                );
                return Err(e.into());
            }
        };
        drop(state);

        if admission.dropped.is_some() {
            self.inner.dropped.fetch_add(1, Ordering::Relaxed);
        }
        self.inner.work_ready.notify_one();

        let message = if admission.dropped.is_some() {
            format!(
                "Command queued successfully (position {}, oldest dropped)",
                admission.position
            )
        } else {
            format!("Command queued successfully (position {})", admission.position)
        };

        tracing::debug!(
            kind = %kind,
            request_id = %request_id,
            entry = %entry_id,
            position = admission.position,
            "Command queued"
        );

        Ok(Submission {
            request_id,
            success: true,
            message,
            queue_info: QueueInfo {
                position: admission.position,
                estimated_wait_seconds: self.estimate_wait(admission.position),
                queue_size: admission.queue_size,
                debounced: false,
                original_submission_time: None,
            },
            outcome: None,
            watcher,
        })
    }

    fn merged(
        &self,
        command: Command,
        slot: OutcomeSlot,
        position: usize,
        queue_size: usize,
        first_submitted_at: DateTime<Utc>,
    ) -> Submission {
        self.inner.debounced.fetch_add(1, Ordering::Relaxed);
        let outcome = slot.peek();

        tracing::debug!(
            kind = %command.kind,
            fingerprint = %command.fingerprint().short(),
            settled = outcome.is_some(),
            "Duplicate command, debouncing"
        );

        let (success, message) = match &outcome {
            Some(o) => (o.success, o.message.clone()),
            None => (
                true,
                "Command already queued (pending execution)".to_string(),
            ),
        };

        Submission {
            watcher: slot.watch(command.request_id.clone()),
            request_id: command.request_id,
            success,
            message,
            queue_info: QueueInfo {
                position,
                estimated_wait_seconds: self.estimate_wait(position),
                queue_size,
                debounced: true,
                original_submission_time: Some(first_submitted_at),
            },
            outcome,
        }
    }

    /// Seconds until a command `position` entries from the head is likely
    /// to be dispatched.
    pub fn estimate_wait(&self, position: usize) -> f64 {
        let limiter = &self.inner.limiter;
        if !limiter.is_limiting() {
            return 0.0;
        }
        let needed = (position as f64 + 1.0 - limiter.available_tokens()).max(0.0);
        needed / limiter.refill_rate()
    }

    /// Current counters and gauges.
    pub fn stats(&self) -> QueueStats {
        let (queue_size, debounce_cache_size) = {
            let state = self.inner.state.lock();
            (state.queue.len(), state.debounce.len())
        };
        QueueStats {
            queue_size,
            max_queue_size: self.inner.config.queue_max_size,
            rate_limit_tokens_available: self.inner.limiter.available_tokens(),
            debounce_cache_size,
            commands_processed_total: self.inner.processed.load(Ordering::Relaxed),
            commands_dropped_total: self.inner.dropped.load(Ordering::Relaxed),
            commands_debounced_total: self.inner.debounced.load(Ordering::Relaxed),
        }
    }

    pub fn queue_len(&self) -> usize {
        self.inner.state.lock().queue.len()
    }

    /// Request IDs currently queued, head first.
    pub fn pending_request_ids(&self) -> Vec<RequestId> {
        self.inner.state.lock().queue.request_ids()
    }

    pub(crate) fn try_dequeue(&self) -> Option<QueueEntry> {
        self.inner.state.lock().queue.dequeue_next()
    }

    /// Wait for the next entry. Cancel-safe: an entry is only removed from
    /// the queue when this returns it.
    pub(crate) async fn next_entry(&self) -> QueueEntry {
        loop {
            let notified = self.inner.work_ready.notified();
            if let Some(entry) = self.try_dequeue() {
                return entry;
            }
            notified.await;
        }
    }

    /// Put an entry the worker took but did not execute back at the head.
    pub(crate) fn requeue_front(&self, entry: QueueEntry) {
        let requeued = self.inner.state.lock().queue.requeue_front(entry);
        if requeued {
            self.inner.work_ready.notify_one();
        } else {
            self.inner.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_processed(&self) {
        self.inner.processed.fetch_add(1, Ordering::Relaxed);
    }

    /// Drop expired debounce records.
    pub fn purge_expired(&self) -> usize {
        self.inner
            .state
            .lock()
            .debounce
            .purge_expired(Instant::now())
    }

    /// Resolve every queued command as abandoned.
    pub fn abandon_pending(&self) -> usize {
        self.inner.state.lock().queue.clear()
    }
}
