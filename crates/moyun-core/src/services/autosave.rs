//! Coalescing autosave work queue.
//!
//! Callers report "entity changed" with the latest snapshot; the queue keeps
//! only the newest snapshot per id and releases it once the minimum interval
//! since that id's previous flush has elapsed. Timing is driven by the caller's
//! clock, never by timers of its own.

use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone)]
pub struct AutosaveQueue<T> {
    min_interval_ms: i64,
    pending: BTreeMap<String, T>,
    last_flush: HashMap<String, i64>,
}

impl<T> AutosaveQueue<T> {
    #[must_use]
    pub fn new(min_interval_ms: u64) -> Self {
        Self {
            min_interval_ms: i64::try_from(min_interval_ms).unwrap_or(i64::MAX),
            pending: BTreeMap::new(),
            last_flush: HashMap::new(),
        }
    }

    /// Record the newest snapshot of `id`, replacing any earlier one.
    pub fn notify(&mut self, id: impl Into<String>, snapshot: T) {
        self.pending.insert(id.into(), snapshot);
    }

    /// Earliest time at which `id` may be flushed again.
    fn ready_at(&self, id: &str) -> i64 {
        self.last_flush
            .get(id)
            .map_or(i64::MIN, |last| last.saturating_add(self.min_interval_ms))
    }

    /// Remove and return every snapshot that may be flushed at `now_ms`.
    pub fn take_due(&mut self, now_ms: i64) -> Vec<(String, T)> {
        let due: Vec<String> = self
            .pending
            .keys()
            .filter(|id| self.ready_at(id) <= now_ms)
            .cloned()
            .collect();

        due.into_iter()
            .filter_map(|id| {
                let snapshot = self.pending.remove(&id)?;
                self.last_flush.insert(id.clone(), now_ms);
                Some((id, snapshot))
            })
            .collect()
    }

    /// Put a snapshot back after a failed save, unless a newer one arrived.
    pub fn requeue(&mut self, id: String, snapshot: T) {
        self.last_flush.remove(&id);
        self.pending.entry(id).or_insert(snapshot);
    }

    /// Drop every pending snapshot and flush record.
    pub fn clear(&mut self) {
        self.pending.clear();
        self.last_flush.clear();
    }

    /// When the next pending snapshot becomes due, if any.
    #[must_use]
    pub fn next_due_at(&self) -> Option<i64> {
        self.pending.keys().map(|id| self.ready_at(id)).min()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
