//! Bounded FIFO command queue.
//!
//! The queue is a plain data structure; the [`Dispatcher`](crate::Dispatcher)
//! keeps it behind the same lock as the debounce cache so that
//! classification and admission happen as one step.

use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::command::{Command, CommandOutcome, EntryState, RequestId};
use crate::outcome::OutcomeSlot;

/// Monotonic admission sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntryId(pub u64);

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A command waiting in the queue.
#[derive(Debug)]
pub struct QueueEntry {
    /// Admission sequence
    pub id: EntryId,
    /// The command itself
    pub command: Command,
    /// Entries ahead of this one at admission time
    pub position: usize,
    /// Lifecycle state
    pub state: EntryState,
    slot: OutcomeSlot,
}

impl QueueEntry {
    pub fn new(id: EntryId, command: Command, slot: OutcomeSlot) -> Self {
        Self {
            id,
            command,
            position: 0,
            state: EntryState::Admitted,
            slot,
        }
    }

    /// Settle the entry's outcome and mark it resolved.
    pub fn resolve(&mut self, outcome: CommandOutcome) -> bool {
        self.state = EntryState::Resolved;
        self.slot.resolve(outcome)
    }

    pub fn slot(&self) -> &OutcomeSlot {
        &self.slot
    }
}

/// What to do when a submission arrives at a full queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueFullBehavior {
    /// Refuse the new command.
    #[default]
    Reject,
    /// Evict the head and admit the new command.
    DropOldest,
}

impl QueueFullBehavior {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueFullBehavior::Reject => "reject",
            QueueFullBehavior::DropOldest => "drop_oldest",
        }
    }
}

impl fmt::Display for QueueFullBehavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueueFullBehavior {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reject" => Ok(QueueFullBehavior::Reject),
            "drop_oldest" => Ok(QueueFullBehavior::DropOldest),
            other => Err(format!(
                "invalid queue full behavior '{}', expected reject or drop_oldest",
                other
            )),
        }
    }
}

/// Result of a successful submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admission {
    /// Entries ahead of the new one
    pub position: usize,
    /// Queue length after admission
    pub queue_size: usize,
    /// Request evicted to make room, under drop_oldest
    pub dropped: Option<RequestId>,
}

/// Queue error types.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    #[error("Queue is full")]
    Full,
}

/// Bounded FIFO of pending commands.
#[derive(Debug)]
pub struct CommandQueue {
    entries: VecDeque<QueueEntry>,
    max_size: usize,
    behavior: QueueFullBehavior,
}

impl CommandQueue {
    /// Create a queue holding at most `max_size` entries.
    pub fn new(max_size: usize, behavior: QueueFullBehavior) -> Self {
        Self {
            entries: VecDeque::with_capacity(max_size.min(1024)),
            max_size,
            behavior,
        }
    }

    /// Append an entry, applying the overflow policy when full.
    pub fn submit(&mut self, mut entry: QueueEntry) -> Result<Admission, QueueError> {
        let mut dropped = None;

        if self.entries.len() >= self.max_size {
            match self.behavior {
                QueueFullBehavior::Reject => return Err(QueueError::Full),
                QueueFullBehavior::DropOldest => {
                    if let Some(mut oldest) = self.entries.pop_front() {
                        let request_id = oldest.command.request_id.clone();
                        oldest.state = EntryState::DroppedByOverflow;
                        oldest.slot.resolve(CommandOutcome::dropped(&request_id));
                        tracing::warn!(
                            entry = %oldest.id,
                            request_id = %request_id,
                            kind = %oldest.command.kind,
                            "Queue full, dropped oldest command"
                        );
                        dropped = Some(request_id);
                    }
                    if self.entries.len() >= self.max_size {
                        // Only reachable with max_size == 0.
                        return Err(QueueError::Full);
                    }
                }
            }
        }

        let position = self.entries.len();
        entry.position = position;
        entry.state = EntryState::Admitted;
        self.entries.push_back(entry);

        Ok(Admission {
            position,
            queue_size: self.entries.len(),
            dropped,
        })
    }

    /// Remove the head, if any.
    pub fn dequeue_next(&mut self) -> Option<QueueEntry> {
        let mut entry = self.entries.pop_front()?;
        entry.state = EntryState::Dequeued;
        Some(entry)
    }

    /// Return a dequeued entry to the head of the queue, ahead of
    /// everything admitted since.
    ///
    /// Under drop_oldest a full queue evicts the returned entry itself,
    /// since it is the oldest; `false` is returned in that case. Under
    /// reject the entry is always kept, so the queue may briefly hold one
    /// entry over its limit.
    pub fn requeue_front(&mut self, mut entry: QueueEntry) -> bool {
        if self.entries.len() >= self.max_size && self.behavior == QueueFullBehavior::DropOldest {
            let request_id = entry.command.request_id.clone();
            entry.state = EntryState::DroppedByOverflow;
            entry.slot.resolve(CommandOutcome::dropped(&request_id));
            tracing::warn!(
                entry = %entry.id,
                request_id = %request_id,
                "Queue full, dropped returned command"
            );
            return false;
        }

        entry.position = 0;
        entry.state = EntryState::Admitted;
        self.entries.push_front(entry);
        true
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn behavior(&self) -> QueueFullBehavior {
        self.behavior
    }

    /// Current rank of a queued entry.
    pub fn position_of(&self, id: EntryId) -> Option<usize> {
        self.entries.iter().position(|e| e.id == id)
    }

    /// Request IDs in queue order.
    pub fn request_ids(&self) -> Vec<RequestId> {
        self.entries
            .iter()
            .map(|e| e.command.request_id.clone())
            .collect()
    }

    /// Empty the queue, resolving every remaining entry as abandoned.
    /// Returns the number of entries removed.
    pub fn clear(&mut self) -> usize {
        let count = self.entries.len();
        for mut entry in self.entries.drain(..) {
            let outcome = CommandOutcome::abandoned(&entry.command.request_id);
            entry.resolve(outcome);
        }
        count
    }
}
