//! Lifecycle events published by a scheduler.
//!
//! Subscribers receive every event emitted after they subscribe, through a
//! bounded `tokio::sync::broadcast` channel. A subscriber that falls more
//! than `event_capacity` events behind observes `RecvError::Lagged`.

use std::fmt;

use serde::Serialize;
use tokio::sync::broadcast;

use hydration_triggers::{BoundaryId, ReadinessCause};

use crate::error::HydrationFailure;

/// Why a boundary left the scheduler without completing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelReason {
    /// Unregistered while pending or ready.
    Unregistered,
    /// Unregistered while hydrating; the activation finished and was discarded.
    DiscardedAfterHydration,
    /// The scheduler was shut down.
    Shutdown,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CancelReason::Unregistered => "unregistered",
            CancelReason::DiscardedAfterHydration => "discarded_after_hydration",
            CancelReason::Shutdown => "shutdown",
        })
    }
}

#[derive(Debug, Clone)]
pub enum SchedulerEvent {
    Ready {
        id: BoundaryId,
        cause: ReadinessCause,
    },
    HydrationStart {
        id: BoundaryId,
    },
    HydrationComplete {
        id: BoundaryId,
        duration_ms: u64,
    },
    HydrationError {
        id: BoundaryId,
        error: HydrationFailure,
    },
    Cancelled {
        id: BoundaryId,
        reason: CancelReason,
    },
}

impl SchedulerEvent {
    pub fn boundary_id(&self) -> &BoundaryId {
        match self {
            SchedulerEvent::Ready { id, .. }
            | SchedulerEvent::HydrationStart { id }
            | SchedulerEvent::HydrationComplete { id, .. }
            | SchedulerEvent::HydrationError { id, .. }
            | SchedulerEvent::Cancelled { id, .. } => id,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SchedulerEvent::Ready { .. } => "ready",
            SchedulerEvent::HydrationStart { .. } => "hydration_start",
            SchedulerEvent::HydrationComplete { .. } => "hydration_complete",
            SchedulerEvent::HydrationError { .. } => "hydration_error",
            SchedulerEvent::Cancelled { .. } => "cancelled",
        }
    }
}

/// Fan-out of [`SchedulerEvent`]s to any number of subscribers.
#[derive(Debug, Clone)]
pub(crate) struct EventBus {
    tx: broadcast::Sender<SchedulerEvent>,
}

impl EventBus {
    pub(crate) fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<SchedulerEvent> {
        self.tx.subscribe()
    }

    pub(crate) fn emit(&self, event: SchedulerEvent) {
        if self.tx.send(event).is_err() {
            tracing::trace!("no event subscribers");
        }
    }
}
