//! Activation executor: drains the ready queue into at most
//! `max_concurrent` in-flight `hydrate` calls and settles their outcomes.
//!
//! Each activation runs on its own task under an execution-timeout guard.
//! A timed-out call is detached: it keeps running, but its eventual result
//! is ignored and its slot is released immediately. A panicking callback
//! fails only its own boundary.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinError;
use tokio::time::Instant;
use tracing::Instrument;

use hydration_triggers::BoundaryId;

use crate::boundary::{BoundaryStatus, Priority, TriggerKind};
use crate::error::{HydrateCallbackError, HydrationFailure};
use crate::events::{CancelReason, SchedulerEvent};
use crate::metrics::{HydrationOutcome, HydrationSample};
use crate::obs;
use crate::registry::{millis, Stamp};
use crate::scheduler::{LoopMessage, SchedulerState, Shared};

/// One activation in progress.
#[derive(Debug, Clone)]
pub(crate) struct InFlight {
    pub id: BoundaryId,
    pub generation: u64,
    pub priority: Priority,
    pub trigger: TriggerKind,
    pub started: Instant,
    pub queue_wait: Duration,
    /// Set when the boundary left the scheduler mid-activation.
    pub cancelled: Option<CancelReason>,
}

/// In-flight activations keyed by ticket. Its length is the active count.
#[derive(Debug, Default)]
pub(crate) struct ExecutionTable {
    in_flight: HashMap<u64, InFlight>,
    next_ticket: u64,
}

impl ExecutionTable {
    pub fn start(&mut self, flight: InFlight) -> u64 {
        let ticket = self.next_ticket;
        self.next_ticket += 1;
        self.in_flight.insert(ticket, flight);
        ticket
    }

    pub fn finish(&mut self, ticket: u64) -> Option<InFlight> {
        self.in_flight.remove(&ticket)
    }

    pub fn len(&self) -> usize {
        self.in_flight.len()
    }

    /// Flag the activation of this registration; its result will be discarded.
    pub fn cancel(&mut self, id: &str, generation: u64, reason: CancelReason) -> bool {
        match self
            .in_flight
            .values_mut()
            .find(|flight| flight.generation == generation && flight.id.as_str() == id)
        {
            Some(flight) => {
                flight.cancelled.get_or_insert(reason);
                true
            }
            None => false,
        }
    }
}

pub(crate) type ActivationOutcome = std::result::Result<(), HydrationFailure>;

impl Shared {
    /// Fill free slots from the head of the queue. Work-conserving: returns
    /// only when the queue is empty or every slot is taken.
    pub(crate) fn dispatch(&self, state: &mut SchedulerState) {
        if state.paused || state.shut_down {
            return;
        }
        while state.executions.len() < state.config.max_concurrent {
            let Some(entry) = state.queue.pop() else {
                break;
            };
            let execution_timeout = state.config.execution_timeout();
            let Some(record) = state.registry.get_mut(entry.id.as_str()) else {
                continue;
            };
            if !record.advance(BoundaryStatus::Hydrating) {
                continue;
            }
            let started = Stamp::now();
            record.started = Some(started);
            let timeout = record.execution_timeout.unwrap_or(execution_timeout);
            let flight = InFlight {
                id: record.id.clone(),
                generation: record.generation,
                priority: record.priority,
                trigger: record.trigger.kind(),
                started: started.at,
                queue_wait: started.at.saturating_duration_since(entry.ready_at),
                cancelled: None,
            };
            let queue_wait_ms = millis(flight.queue_wait);
            let ticket = state.executions.start(flight);

            self.metrics.inc_started();
            obs::emit_hydration_started(
                &entry.id,
                queue_wait_ms,
                state.executions.len(),
                state.config.max_concurrent,
            );
            self.events.emit(SchedulerEvent::HydrationStart {
                id: entry.id.clone(),
            });
            self.spawn_activation(ticket, entry.id, entry.priority, timeout);
        }
    }

    fn spawn_activation(&self, ticket: u64, id: BoundaryId, priority: Priority, timeout: Duration) {
        let hydrator = Arc::clone(&self.hydrator);
        let tx = self.loop_tx.clone();
        let runtime = self.runtime.clone();
        let span = obs::activation_span(&id, priority, ticket);
        let call_span = span.clone();

        self.runtime.spawn(
            async move {
                let mut call = runtime.spawn(
                    async move { hydrator.hydrate(&id).await }.instrument(call_span),
                );
                let outcome = match tokio::time::timeout(timeout, &mut call).await {
                    Ok(Ok(Ok(()))) => Ok(()),
                    Ok(Ok(Err(error))) => Err(HydrationFailure::Callback(
                        HydrateCallbackError::new(error),
                    )),
                    Ok(Err(join_error)) => Err(HydrationFailure::Panicked {
                        message: panic_message(join_error),
                    }),
                    Err(_) => {
                        tracing::debug!(ticket, "activation detached after execution timeout");
                        Err(HydrationFailure::ExecutionTimeout {
                            timeout_ms: millis(timeout),
                        })
                    }
                };
                let _ = tx.send(LoopMessage::Settled { ticket, outcome });
            }
            .instrument(span),
        );
    }

    /// Apply the outcome of activation `ticket`. Returns the sample for the
    /// metrics sink, recorded once the state lock is released.
    pub(crate) fn settle(
        &self,
        state: &mut SchedulerState,
        ticket: u64,
        outcome: ActivationOutcome,
    ) -> Option<HydrationSample> {
        let flight = state.executions.finish(ticket)?;
        let duration_ms = millis(flight.started.elapsed());
        let sample = |outcome| HydrationSample {
            id: flight.id.clone(),
            priority: flight.priority,
            trigger: flight.trigger,
            outcome,
            queue_wait_ms: millis(flight.queue_wait),
            duration_ms,
        };

        if let Some(reason) = flight.cancelled {
            state
                .registry
                .remove_current(flight.id.as_str(), flight.generation);
            self.metrics.inc_cancelled();
            obs::emit_boundary_cancelled(&flight.id, reason);
            self.events.emit(SchedulerEvent::Cancelled {
                id: flight.id.clone(),
                reason,
            });
            return Some(sample(HydrationOutcome::Discarded));
        }

        let mut record = state
            .registry
            .remove_current(flight.id.as_str(), flight.generation)?;
        record.finished = Some(Stamp::now());
        let recorded = match outcome {
            Ok(()) => {
                record.advance(BoundaryStatus::Complete);
                self.metrics.inc_completed();
                obs::emit_hydration_completed(&flight.id, duration_ms);
                self.events.emit(SchedulerEvent::HydrationComplete {
                    id: flight.id.clone(),
                    duration_ms,
                });
                HydrationOutcome::Complete
            }
            Err(failure) => {
                record.advance(BoundaryStatus::Failed);
                record.failure = Some(failure.to_string());
                self.metrics.inc_failed(failure.is_timeout());
                obs::emit_hydration_failed(&flight.id, duration_ms, failure.kind(), &failure);
                self.events.emit(SchedulerEvent::HydrationError {
                    id: flight.id.clone(),
                    error: failure,
                });
                HydrationOutcome::Failed
            }
        };
        state.registry.retire(record);
        Some(sample(recorded))
    }
}

fn panic_message(error: JoinError) -> String {
    if !error.is_panic() {
        return error.to_string();
    }
    describe_panic(error.into_panic())
}

fn describe_panic(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
