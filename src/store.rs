//! Thread-safe keyed store of pending records.
//!
//! A run owns two of these: the input store filled by the source and drained
//! by the transformer workers, and the output store filled by the workers and
//! drained by the sink. Each store has exactly one lock. No code path holds
//! the locks of both stores at once, so the pair cannot deadlock.
//!
//! Waiting is never required for correctness. Consumers that find nothing to
//! do may park on [`RecordStore::wait_nonempty`] / [`RecordStore::wait_for_key`]
//! for at most a timeout; pushes wake them early.

use crate::record::Seq;
use parking_lot::{Condvar, Mutex};
use std::collections::hash_map::Entry;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

/// Stale arrival keys tolerated before the arrival queue is compacted.
const COMPACT_SLACK: usize = 64;

/// A concurrent map from sequence number to value, guarded by one mutex.
pub struct RecordStore<T = String> {
    name: &'static str,
    slots: Mutex<Slots<T>>,
    changed: Condvar,
}

struct Slots<T> {
    values: HashMap<Seq, T>,
    // Keys in push order. May hold keys already taken by `pull_by_key`;
    // those are skipped (and periodically compacted away).
    arrivals: VecDeque<Seq>,
}

impl<T> Slots<T> {
    fn compact_if_stale(&mut self) {
        if self.arrivals.len() > 2 * self.values.len() + COMPACT_SLACK {
            let values = &self.values;
            self.arrivals.retain(|k| values.contains_key(k));
        }
    }
}

impl<T> RecordStore<T> {
    /// Create an empty store. `name` only appears in diagnostics.
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            slots: Mutex::new(Slots { values: HashMap::new(), arrivals: VecDeque::new() }),
            changed: Condvar::new(),
        }
    }

    /// Name given at construction.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Insert `value` under `seq`. Never blocks beyond the store lock.
    ///
    /// # Panics
    ///
    /// Panics if `seq` is already present. Sequence numbers are unique per
    /// run, so a duplicate means a pipeline stage delivered a record twice.
    pub fn push(&self, seq: Seq, value: T) {
        {
            let mut slots = self.slots.lock();
            match slots.values.entry(seq) {
                Entry::Occupied(_) => {
                    panic!("{}: duplicate sequence number {seq}", self.name)
                }
                Entry::Vacant(slot) => {
                    slot.insert(value);
                }
            }
            slots.arrivals.push_back(seq);
        }
        self.changed.notify_all();
    }

    /// Remove and return some stored entry, or `None` if the store is empty.
    ///
    /// Entries come out roughly in the order they were pushed.
    pub fn pull_any(&self) -> Option<(Seq, T)> {
        let mut slots = self.slots.lock();
        while let Some(seq) = slots.arrivals.pop_front() {
            if let Some(value) = slots.values.remove(&seq) {
                return Some((seq, value));
            }
        }
        None
    }

    /// Remove and return the entry stored under exactly `seq`, if present.
    pub fn pull_by_key(&self, seq: Seq) -> Option<T> {
        let mut slots = self.slots.lock();
        let value = slots.values.remove(&seq)?;
        slots.compact_if_stale();
        Some(value)
    }

    /// True if an entry is stored under `seq`.
    pub fn exists(&self, seq: Seq) -> bool {
        self.slots.lock().values.contains_key(&seq)
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.slots.lock().values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.lock().values.is_empty()
    }

    /// Park until the store holds at least one entry or `timeout` elapses.
    ///
    /// Returns whether the store was non-empty on return.
    pub fn wait_nonempty(&self, timeout: Duration) -> bool {
        let mut slots = self.slots.lock();
        if slots.values.is_empty() {
            self.changed.wait_for(&mut slots, timeout);
        }
        !slots.values.is_empty()
    }

    /// Park until an entry exists under `seq` or `timeout` elapses.
    ///
    /// Returns whether the entry was present on return.
    pub fn wait_for_key(&self, seq: Seq, timeout: Duration) -> bool {
        let mut slots = self.slots.lock();
        if !slots.values.contains_key(&seq) {
            self.changed.wait_for(&mut slots, timeout);
        }
        slots.values.contains_key(&seq)
    }

    /// Wake every thread parked on this store.
    ///
    /// Used when a predicate outside the store changes, e.g. the source
    /// becoming exhausted, so idle consumers re-check their exit condition.
    pub fn notify_all(&self) {
        self.changed.notify_all();
    }
}

impl<T> std::fmt::Debug for RecordStore<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordStore")
            .field("name", &self.name)
            .field("len", &self.len())
            .finish()
    }
}
