//! Boundary registry: live records keyed by id plus a bounded set of
//! retained terminal snapshots.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;

use hydration_triggers::{BoundaryId, ReadinessCause, TriggerTarget};

use crate::boundary::{BoundaryDescriptor, BoundarySnapshot, BoundaryStatus, Priority, Trigger};
use crate::events::CancelReason;
use crate::readiness::ReadinessHooks;

/// A point in time on both clocks: monotonic for ordering and durations,
/// wall-clock for snapshots.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Stamp {
    pub at: Instant,
    pub wall: DateTime<Utc>,
}

impl Stamp {
    pub fn now() -> Self {
        Self {
            at: Instant::now(),
            wall: Utc::now(),
        }
    }

    pub fn millis_since(&self, earlier: &Stamp) -> u64 {
        millis(self.at.saturating_duration_since(earlier.at))
    }
}

pub(crate) fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[derive(Debug)]
pub(crate) struct BoundaryRecord {
    pub id: BoundaryId,
    pub generation: u64,
    pub priority: Priority,
    pub trigger: Trigger,
    pub target: TriggerTarget,
    pub execution_timeout: Option<Duration>,
    pub status: BoundaryStatus,
    pub registered: Stamp,
    pub ready: Option<Stamp>,
    pub started: Option<Stamp>,
    pub finished: Option<Stamp>,
    pub readiness_cause: Option<ReadinessCause>,
    pub failure: Option<String>,
    /// Set when the boundary leaves the scheduler mid-activation. The record
    /// stays live, and hydrating, until the activation settles.
    pub cancel_requested: Option<CancelReason>,
    pub hooks: ReadinessHooks,
}

impl BoundaryRecord {
    pub fn new(
        descriptor: &BoundaryDescriptor,
        priority: Priority,
        generation: u64,
        registered: Stamp,
        hooks: ReadinessHooks,
    ) -> Self {
        Self {
            id: descriptor.id.clone(),
            generation,
            priority,
            trigger: descriptor.trigger.clone(),
            target: TriggerTarget::new(descriptor.id.clone(), descriptor.anchor_or_id()),
            execution_timeout: descriptor.execution_timeout(),
            status: BoundaryStatus::Pending,
            registered,
            ready: None,
            started: None,
            finished: None,
            readiness_cause: None,
            failure: None,
            cancel_requested: None,
            hooks,
        }
    }

    /// Move to `next` when the lifecycle allows it.
    pub fn advance(&mut self, next: BoundaryStatus) -> bool {
        if !self.status.can_transition_to(next) {
            tracing::debug!(
                boundary_id = %self.id,
                from = %self.status,
                to = %next,
                "ignored illegal status transition"
            );
            return false;
        }
        self.status = next;
        true
    }

    pub fn snapshot(&self) -> BoundarySnapshot {
        BoundarySnapshot {
            id: self.id.clone(),
            generation: self.generation,
            priority: self.priority,
            trigger: self.trigger.kind(),
            status: self.status,
            registered_at: self.registered.wall,
            ready_at: self.ready.map(|s| s.wall),
            started_at: self.started.map(|s| s.wall),
            completed_at: self.finished.map(|s| s.wall),
            readiness_cause: self.readiness_cause.clone(),
            failure: self.failure.clone(),
        }
    }
}

#[derive(Debug)]
pub(crate) struct BoundaryRegistry {
    live: HashMap<BoundaryId, BoundaryRecord>,
    retained: HashMap<BoundaryId, BoundarySnapshot>,
    /// Retained ids, least recently completed first.
    retained_order: VecDeque<BoundaryId>,
    retention: usize,
    next_generation: u64,
}

impl BoundaryRegistry {
    pub fn new(retention: usize) -> Self {
        Self {
            live: HashMap::new(),
            retained: HashMap::new(),
            retained_order: VecDeque::new(),
            retention,
            next_generation: 1,
        }
    }

    pub fn next_generation(&mut self) -> u64 {
        let generation = self.next_generation;
        self.next_generation += 1;
        generation
    }

    pub fn is_live(&self, id: &str) -> bool {
        self.live.contains_key(id)
    }

    pub fn insert(&mut self, record: BoundaryRecord) {
        self.live.insert(record.id.clone(), record);
    }

    pub fn get(&self, id: &str) -> Option<&BoundaryRecord> {
        self.live.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut BoundaryRecord> {
        self.live.get_mut(id)
    }

    /// The live record for `id`, only if it belongs to `generation`.
    pub fn current_mut(&mut self, id: &str, generation: u64) -> Option<&mut BoundaryRecord> {
        self.live
            .get_mut(id)
            .filter(|record| record.generation == generation)
    }

    pub fn remove(&mut self, id: &str) -> Option<BoundaryRecord> {
        self.live.remove(id)
    }

    pub fn remove_current(&mut self, id: &str, generation: u64) -> Option<BoundaryRecord> {
        if self.live.get(id)?.generation != generation {
            return None;
        }
        self.live.remove(id)
    }

    /// Drop a terminal record from the live set, keeping its snapshot.
    pub fn retire(&mut self, record: BoundaryRecord) {
        let snapshot = record.snapshot();
        drop(record);
        if self.retention == 0 {
            return;
        }
        self.retained_order.retain(|id| id != &snapshot.id);
        self.retained_order.push_back(snapshot.id.clone());
        self.retained.insert(snapshot.id.clone(), snapshot);
        self.enforce_retention();
    }

    pub fn retained(&self, id: &str) -> Option<&BoundarySnapshot> {
        self.retained.get(id)
    }

    pub fn evict_retained(&mut self, id: &str) -> bool {
        if self.retained.remove(id).is_none() {
            return false;
        }
        self.retained_order.retain(|retained| retained.as_str() != id);
        true
    }

    #[cfg(test)]
    pub fn set_retention(&mut self, retention: usize) {
        self.retention = retention;
        self.enforce_retention();
    }

    /// Remove every pending or ready record, oldest registration first.
    /// Hydrating records stay live until their activation settles.
    pub fn drain_waiting(&mut self) -> Vec<BoundaryRecord> {
        let waiting: Vec<BoundaryId> = self
            .live
            .values()
            .filter(|record| record.status != BoundaryStatus::Hydrating)
            .map(|record| record.id.clone())
            .collect();
        let mut records: Vec<_> = waiting
            .iter()
            .filter_map(|id| self.live.remove(id))
            .collect();
        records.sort_by_key(|record| record.generation);
        records
    }

    pub fn hydrating_mut(&mut self) -> impl Iterator<Item = &mut BoundaryRecord> {
        self.live
            .values_mut()
            .filter(|record| record.status == BoundaryStatus::Hydrating)
    }

    pub fn live_len(&self) -> usize {
        self.live.len()
    }

    #[cfg(test)]
    pub fn retained_len(&self) -> usize {
        self.retained.len()
    }

    pub fn count_live(&self, status: BoundaryStatus) -> usize {
        self.live.values().filter(|r| r.status == status).count()
    }

    pub fn count_retained(&self, status: BoundaryStatus) -> usize {
        self.retained.values().filter(|s| s.status == status).count()
    }

    fn enforce_retention(&mut self) {
        while self.retained_order.len() > self.retention {
            if let Some(evicted) = self.retained_order.pop_front() {
                self.retained.remove(&evicted);
                tracing::trace!(boundary_id = %evicted, "evicted retained boundary");
            }
        }
    }
}
