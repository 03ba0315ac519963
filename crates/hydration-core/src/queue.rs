//! Ready queue: boundaries that are ready but not yet hydrating.
//!
//! Ordered by ascending priority (1 first), then ascending ready time, then
//! readiness sequence number so boundaries that became ready in the same
//! instant are served first-ready-first-served. Given the same sequence of
//! readiness events the dequeue order is always identical.

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};

use tokio::time::Instant;

use hydration_triggers::BoundaryId;

use crate::boundary::Priority;

/// Ordering view over a ready boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry {
    pub priority: Priority,
    pub ready_at: Instant,
    pub seq: u64,
    pub id: BoundaryId,
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| self.ready_at.cmp(&other.ready_at))
            .then_with(|| self.seq.cmp(&other.seq))
            .then_with(|| self.id.cmp(&other.id))
    }
}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Default)]
pub struct ReadyQueue {
    entries: BTreeSet<QueueEntry>,
    index: HashMap<BoundaryId, QueueEntry>,
}

impl ReadyQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entry. Returns `false` when the boundary is already queued.
    pub fn push(&mut self, entry: QueueEntry) -> bool {
        if self.index.contains_key(&entry.id) {
            return false;
        }
        self.index.insert(entry.id.clone(), entry.clone());
        self.entries.insert(entry);
        true
    }

    /// Remove and return the head of the queue.
    pub fn pop(&mut self) -> Option<QueueEntry> {
        let entry = self.entries.pop_first()?;
        self.index.remove(&entry.id);
        Some(entry)
    }

    pub fn remove(&mut self, id: &str) -> Option<QueueEntry> {
        let entry = self.index.remove(id)?;
        self.entries.remove(&entry);
        Some(entry)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Queued ids in dequeue order.
    pub fn ids(&self) -> Vec<BoundaryId> {
        self.entries.iter().map(|entry| entry.id.clone()).collect()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.index.clear();
    }
}
