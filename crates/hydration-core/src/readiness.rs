//! Readiness: arming trigger sources and timers for a pending boundary, and
//! turning their signals into queue entries.
//!
//! Providers never touch scheduler state. Every signal travels through the
//! scheduling loop channel, tagged with the boundary generation, so a
//! provider firing from inside `observe`/`listen` cannot re-enter the lock
//! and a late signal for a departed boundary is dropped.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use hydration_triggers::{BoundaryId, ReadinessCause, ReadySignal, Subscription};

use crate::boundary::{BoundaryStatus, Trigger};
use crate::events::SchedulerEvent;
use crate::obs;
use crate::queue::QueueEntry;
use crate::registry::{millis, BoundaryRecord, Stamp};
use crate::scheduler::{LoopMessage, SchedulerState, Shared};
use crate::timer::ReadinessTimer;

/// Listeners and timer held for a pending boundary.
#[derive(Debug, Default)]
pub(crate) struct ReadinessHooks {
    subscription: Option<Subscription>,
    timer: Option<ReadinessTimer>,
}

impl ReadinessHooks {
    /// Detach listeners and clear the timer. Idempotent.
    pub fn release(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.dispose();
        }
        if let Some(timer) = self.timer.take() {
            timer.cancel();
        }
    }

    #[cfg(test)]
    pub fn is_armed(&self) -> bool {
        self.subscription.is_some() || self.timer.is_some()
    }
}

/// Idle-pending boundaries sharing one outstanding idle request.
#[derive(Debug, Default)]
pub(crate) struct IdleWaiters {
    /// Keyed by generation, i.e. registration order.
    waiting: BTreeMap<u64, (BoundaryId, Duration)>,
    request: Option<(u64, JoinHandle<()>)>,
    next_request: u64,
}

impl IdleWaiters {
    pub fn add(&mut self, generation: u64, id: BoundaryId, hint: Duration) {
        self.waiting.insert(generation, (id, hint));
    }

    pub fn remove(&mut self, generation: u64) {
        if self.waiting.remove(&generation).is_some() && self.waiting.is_empty() {
            self.abort_request();
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.waiting.len()
    }

    pub fn has_request(&self) -> bool {
        self.request.is_some()
    }

    fn min_hint(&self) -> Option<Duration> {
        self.waiting.values().map(|(_, hint)| *hint).min()
    }

    /// Accept the slice for `request`; returns the waiters it serves.
    fn take_for(&mut self, request: u64) -> Option<Vec<(u64, BoundaryId)>> {
        match &self.request {
            Some((current, _)) if *current == request => {}
            _ => return None,
        }
        self.request = None;
        let served = std::mem::take(&mut self.waiting)
            .into_iter()
            .map(|(generation, (id, _))| (generation, id))
            .collect();
        Some(served)
    }

    pub fn clear(&mut self) {
        self.waiting.clear();
        self.abort_request();
    }

    fn abort_request(&mut self) {
        if let Some((_, task)) = self.request.take() {
            task.abort();
        }
    }
}

impl Drop for IdleWaiters {
    fn drop(&mut self) {
        self.abort_request();
    }
}

impl Shared {
    /// A signal that posts readiness for this exact registration to the loop.
    pub(crate) fn readiness_signal(&self, id: &BoundaryId, generation: u64) -> ReadySignal {
        let tx = self.loop_tx.clone();
        let id = id.clone();
        ReadySignal::new(move |cause| {
            let _ = tx.send(LoopMessage::Readiness {
                id: id.clone(),
                generation,
                cause,
            });
        })
    }

    /// Subscribe the boundary to its trigger source and arm its readiness
    /// timer. Immediate and manual boundaries get no source.
    pub(crate) fn arm_trigger(
        &self,
        state: &mut SchedulerState,
        record: &mut BoundaryRecord,
        readiness_timeout: Option<Duration>,
    ) {
        let generation = record.generation;
        let mut hooks = ReadinessHooks::default();
        match &record.trigger {
            Trigger::Immediate | Trigger::Manual => {}
            Trigger::Visible { options } => {
                let signal = self.readiness_signal(&record.id, generation);
                hooks.subscription = Some(self.visibility.observe(&record.target, options, signal));
            }
            Trigger::Interaction { events } => {
                let signal = self.readiness_signal(&record.id, generation);
                hooks.subscription = Some(self.interaction.listen(&record.target, events, signal));
            }
            Trigger::Idle { slice_hint_ms } => {
                state
                    .idle
                    .add(generation, record.id.clone(), Duration::from_millis(*slice_hint_ms));
                self.ensure_idle_request(state);
            }
        }
        if let Some(timeout) = readiness_timeout {
            let signal = self.readiness_signal(&record.id, generation);
            hooks.timer = Some(ReadinessTimer::arm(
                &self.runtime,
                record.registered.at,
                timeout,
                signal,
            ));
        }
        record.hooks = hooks;
    }

    /// Start an idle request for the current waiters unless one is outstanding.
    pub(crate) fn ensure_idle_request(&self, state: &mut SchedulerState) {
        if state.idle.has_request() {
            return;
        }
        let Some(hint) = state.idle.min_hint() else {
            return;
        };
        let request = state.idle.next_request;
        state.idle.next_request += 1;

        let provider = Arc::clone(&self.idle);
        let tx = self.loop_tx.clone();
        let task = self.runtime.spawn(async move {
            let slice = provider.request_idle_slice(hint).await;
            let _ = tx.send(LoopMessage::IdleSlice { request, slice });
        });
        tracing::trace!(request, hint_ms = millis(hint), "requested idle slice");
        state.idle.request = Some((request, task));
    }

    /// Every boundary waiting on `request` becomes ready, in registration order.
    pub(crate) fn on_idle_slice(&self, state: &mut SchedulerState, request: u64) {
        let Some(served) = state.idle.take_for(request) else {
            tracing::trace!(request, "ignored stale idle slice");
            return;
        };
        for (generation, id) in served {
            self.mark_ready(state, &id, generation, ReadinessCause::Idle);
        }
        self.ensure_idle_request(state);
    }

    /// `pending -> ready` for this registration; anything else is a stale
    /// signal and is ignored.
    pub(crate) fn mark_ready(
        &self,
        state: &mut SchedulerState,
        id: &BoundaryId,
        generation: u64,
        cause: ReadinessCause,
    ) -> bool {
        let Some(record) = state.registry.current_mut(id.as_str(), generation) else {
            tracing::trace!(boundary_id = %id, generation, cause = %cause, "ignored stale readiness signal");
            return false;
        };
        if record.status != BoundaryStatus::Pending {
            return false;
        }
        record.hooks.release();
        record.advance(BoundaryStatus::Ready);
        let ready = Stamp::now();
        record.ready = Some(ready);
        record.readiness_cause = Some(cause.clone());
        let waited_ms = ready.millis_since(&record.registered);
        let entry = QueueEntry {
            priority: record.priority,
            ready_at: ready.at,
            seq: state.next_seq,
            id: id.clone(),
        };
        state.next_seq += 1;
        state.idle.remove(generation);
        state.queue.push(entry);

        self.metrics.inc_ready(cause.is_timeout());
        obs::emit_boundary_ready(id, &cause, waited_ms);
        self.events.emit(SchedulerEvent::Ready {
            id: id.clone(),
            cause,
        });
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_idle_waiters_serve_in_registration_order() {
        let mut idle = IdleWaiters::default();
        idle.add(7, BoundaryId::from("late"), Duration::from_millis(50));
        idle.add(3, BoundaryId::from("early"), Duration::from_millis(20));
        assert_eq!(idle.min_hint(), Some(Duration::from_millis(20)));

        idle.request = Some((0, tokio::spawn(async {})));
        assert!(idle.take_for(1).is_none());
        let served = idle.take_for(0).unwrap();
        let ids: Vec<_> = served.iter().map(|(_, id)| id.as_str()).collect();
        assert_eq!(ids, ["early", "late"]);
        assert_eq!(idle.len(), 0);
        assert!(!idle.has_request());
    }

    #[tokio::test]
    async fn test_removing_last_waiter_aborts_request() {
        let mut idle = IdleWaiters::default();
        idle.add(1, BoundaryId::from("a"), Duration::from_millis(50));
        idle.add(2, BoundaryId::from("b"), Duration::from_millis(50));
        idle.request = Some((0, tokio::spawn(std::future::pending::<()>())));

        idle.remove(1);
        assert!(idle.has_request());
        idle.remove(2);
        assert!(!idle.has_request());
    }

    #[test]
    fn test_hooks_release_is_idempotent() {
        let released = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = Arc::clone(&released);
        let mut hooks = ReadinessHooks {
            subscription: Some(Subscription::new(move || {
                counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            })),
            timer: None,
        };
        assert!(hooks.is_armed());
        hooks.release();
        hooks.release();
        assert!(!hooks.is_armed());
        assert_eq!(released.load(std::sync::atomic::Ordering::SeqCst), 1);
    }
}
