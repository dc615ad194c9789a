//! Duplicate suppression.
//!
//! Identical commands submitted within the debounce window share the
//! outcome slot of the first submission instead of occupying the queue
//! again. Records expire lazily on lookup, through [`DebounceCache::purge_expired`],
//! and by oldest-first eviction when the cache is at capacity.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;

use crate::command::{Command, CommandKind, Fingerprint};
use crate::outcome::OutcomeSlot;
use crate::queue::EntryId;

/// How a submission relates to the cache.
#[derive(Debug, Clone)]
pub enum Classification {
    /// Debouncing disabled or kind not eligible.
    NotEligible,
    /// First submission in the window; a record now exists for it.
    NewEntry {
        fingerprint: Fingerprint,
        slot: OutcomeSlot,
    },
    /// A live record already covers this fingerprint.
    Duplicate {
        slot: OutcomeSlot,
        entry_id: EntryId,
        first_submitted_at: DateTime<Utc>,
    },
}

#[derive(Debug)]
struct DebounceRecord {
    slot: OutcomeSlot,
    entry_id: EntryId,
    first_submitted_at: DateTime<Utc>,
    /// `None` when the window reaches past the clock's range.
    expires_at: Option<Instant>,
    created_seq: u64,
}

impl DebounceRecord {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// Bounded, time-windowed fingerprint cache.
#[derive(Debug)]
pub struct DebounceCache {
    records: HashMap<Fingerprint, DebounceRecord>,
    /// Creation order; stale items are skipped when their sequence no
    /// longer matches the live record.
    order: VecDeque<(Fingerprint, u64)>,
    next_seq: u64,
    window: Duration,
    max_size: usize,
    eligible: BTreeSet<CommandKind>,
    enabled: bool,
}

impl DebounceCache {
    pub fn new(
        enabled: bool,
        window: Duration,
        max_size: usize,
        eligible: BTreeSet<CommandKind>,
    ) -> Self {
        Self {
            records: HashMap::new(),
            order: VecDeque::new(),
            next_seq: 0,
            window,
            max_size,
            eligible,
            enabled,
        }
    }

    /// A cache that never matches anything.
    pub fn disabled() -> Self {
        Self::new(false, Duration::ZERO, 0, BTreeSet::new())
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_eligible(&self, kind: CommandKind) -> bool {
        self.enabled && self.eligible.contains(&kind)
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Classify `command` and, for a first submission, record it under
    /// `entry_id` with a fresh outcome slot.
    pub fn classify(&mut self, command: &Command, entry_id: EntryId, now: Instant) -> Classification {
        if !self.is_eligible(command.kind) {
            return Classification::NotEligible;
        }

        let fingerprint = command.fingerprint();
        if let Some(record) = self.records.get(fingerprint) {
            if !record.is_expired(now) {
                return Classification::Duplicate {
                    slot: record.slot.clone(),
                    entry_id: record.entry_id,
                    first_submitted_at: record.first_submitted_at,
                };
            }
            self.records.remove(fingerprint);
        }

        if self.records.len() >= self.max_size {
            self.purge_expired(now);
        }
        while self.max_size > 0 && self.records.len() >= self.max_size {
            if !self.evict_oldest() {
                break;
            }
        }

        let slot = OutcomeSlot::new();
        let created_seq = self.next_seq;
        self.next_seq += 1;
        self.records.insert(
            fingerprint.clone(),
            DebounceRecord {
                slot: slot.clone(),
                entry_id,
                first_submitted_at: command.submitted_at,
                expires_at: now.checked_add(self.window),
                created_seq,
            },
        );
        self.order.push_back((fingerprint.clone(), created_seq));
        self.compact_order();

        Classification::NewEntry {
            fingerprint: fingerprint.clone(),
            slot,
        }
    }

    /// Remove the record for a submission that was not admitted.
    pub fn forget(&mut self, fingerprint: &Fingerprint) -> bool {
        self.records.remove(fingerprint).is_some()
    }

    /// Drop every expired record. Returns how many were removed.
    pub fn purge_expired(&mut self, now: Instant) -> usize {
        let before = self.records.len();
        self.records.retain(|_, record| !record.is_expired(now));
        self.compact_order();
        before - self.records.len()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn evict_oldest(&mut self) -> bool {
        while let Some((fingerprint, seq)) = self.order.pop_front() {
            let live = self
                .records
                .get(&fingerprint)
                .is_some_and(|r| r.created_seq == seq);
            if live {
                self.records.remove(&fingerprint);
                tracing::debug!(fingerprint = %fingerprint.short(), "Debounce cache full, evicted oldest record");
                return true;
            }
        }
        false
    }

    fn compact_order(&mut self) {
        if self.order.len() > self.records.len() * 2 + 16 {
            let records = &self.records;
            self.order
                .retain(|(fp, seq)| records.get(fp).is_some_and(|r| r.created_seq == *seq));
        }
    }
}
