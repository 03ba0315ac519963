//! The scheduler handle and its scheduling loop.
//!
//! A [`Scheduler`] owns its registry, ready queue and executor; there is no
//! process-wide instance. Public operations and loop messages each run as
//! one synchronous turn under the state lock, which is never held across an
//! `.await`. Asynchronous inputs (trigger signals, idle slices, activation
//! settlements) reach the state only through the loop channel.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use serde::Serialize;
use tokio::runtime::Handle;
use tokio::sync::{broadcast, mpsc, watch};

use hydration_triggers::{
    BoundaryId, DelayIdleProvider, IdleProvider, IdleSlice, InteractionProvider,
    NullInteractionProvider, NullVisibilityProvider, ReadinessCause, VisibilityProvider,
};

use crate::boundary::{BoundaryDescriptor, BoundarySnapshot, BoundaryStatus, TriggerKind};
use crate::config::{ConfigPatch, SchedulerConfig};
use crate::error::{Result, SchedulerError};
use crate::events::{CancelReason, EventBus, SchedulerEvent};
use crate::executor::{ActivationOutcome, ExecutionTable};
use crate::hydrator::Hydrator;
use crate::metrics::{MetricsSink, SchedulerMetrics, TracingMetricsSink};
use crate::obs;
use crate::queue::ReadyQueue;
use crate::readiness::IdleWaiters;
use crate::registry::{millis, BoundaryRecord, BoundaryRegistry, Stamp};

/// Input to the scheduling loop.
#[derive(Debug)]
pub(crate) enum LoopMessage {
    Readiness {
        id: BoundaryId,
        generation: u64,
        cause: ReadinessCause,
    },
    IdleSlice {
        request: u64,
        slice: IdleSlice,
    },
    Settled {
        ticket: u64,
        outcome: ActivationOutcome,
    },
}

#[derive(Debug)]
pub(crate) struct SchedulerState {
    pub config: SchedulerConfig,
    pub registry: BoundaryRegistry,
    pub queue: ReadyQueue,
    pub executions: ExecutionTable,
    pub idle: IdleWaiters,
    /// Readiness sequence number, the final queue tie-break.
    pub next_seq: u64,
    pub paused: bool,
    pub shut_down: bool,
}

pub(crate) struct Shared {
    state: Mutex<SchedulerState>,
    pub hydrator: Arc<dyn Hydrator>,
    pub visibility: Arc<dyn VisibilityProvider>,
    pub interaction: Arc<dyn InteractionProvider>,
    pub idle: Arc<dyn IdleProvider>,
    metrics_sink: Arc<dyn MetricsSink>,
    pub metrics: SchedulerMetrics,
    pub events: EventBus,
    pub loop_tx: mpsc::UnboundedSender<LoopMessage>,
    pub runtime: Handle,
    /// Ready plus in-flight boundaries.
    runnable: watch::Sender<usize>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn handle(&self, message: LoopMessage) {
        let sample = {
            let mut state = self.lock();
            let sample = match message {
                LoopMessage::Readiness {
                    id,
                    generation,
                    cause,
                } => {
                    self.mark_ready(&mut state, &id, generation, cause);
                    None
                }
                LoopMessage::IdleSlice { request, slice } => {
                    tracing::trace!(
                        request,
                        budget_ms = millis(slice.budget),
                        did_timeout = slice.did_timeout,
                        "idle slice granted"
                    );
                    self.on_idle_slice(&mut state, request);
                    None
                }
                LoopMessage::Settled { ticket, outcome } => {
                    self.settle(&mut state, ticket, outcome)
                }
            };
            self.dispatch(&mut state);
            self.publish_load(&state);
            sample
        };
        if let Some(sample) = sample {
            self.metrics_sink.record(&sample);
        }
    }

    fn publish_load(&self, state: &SchedulerState) {
        let load = state.queue.len() + state.executions.len();
        self.runnable.send_if_modified(|current| {
            if *current == load {
                return false;
            }
            *current = load;
            true
        });
    }

    /// Tear down a pending or ready boundary that is leaving the scheduler.
    fn cancel_waiting(&self, state: &mut SchedulerState, mut record: BoundaryRecord, reason: CancelReason) {
        record.hooks.release();
        state.queue.remove(record.id.as_str());
        state.idle.remove(record.generation);
        record.advance(BoundaryStatus::Cancelled);
        self.metrics.inc_cancelled();
        obs::emit_boundary_cancelled(&record.id, reason);
        self.events.emit(SchedulerEvent::Cancelled {
            id: record.id.clone(),
            reason,
        });
    }
}

impl fmt::Debug for Shared {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("Shared")
            .field("live", &state.registry.live_len())
            .field("queued", &state.queue.len())
            .field("active", &state.executions.len())
            .field("max_concurrent", &state.config.max_concurrent)
            .field("paused", &state.paused)
            .field("shut_down", &state.shut_down)
            .finish_non_exhaustive()
    }
}

async fn drive(shared: Weak<Shared>, mut rx: mpsc::UnboundedReceiver<LoopMessage>) {
    while let Some(message) = rx.recv().await {
        let Some(shared) = shared.upgrade() else {
            break;
        };
        shared.handle(message);
    }
    tracing::debug!("hydration scheduling loop stopped");
}

/// Counts across live and retained boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct SchedulerStats {
    pub pending: usize,
    pub ready: usize,
    pub hydrating: usize,
    /// Retained terminal boundaries.
    pub complete: usize,
    pub failed: usize,
    /// In-flight activations, including ones whose boundary was cancelled.
    pub active: usize,
    pub queued: usize,
    pub max_concurrent: usize,
    pub paused: bool,
}

/// Builder for [`Scheduler`]; every collaborator except the hydrator is optional.
pub struct SchedulerBuilder {
    hydrator: Arc<dyn Hydrator>,
    config: SchedulerConfig,
    visibility: Arc<dyn VisibilityProvider>,
    interaction: Arc<dyn InteractionProvider>,
    idle: Arc<dyn IdleProvider>,
    metrics_sink: Arc<dyn MetricsSink>,
    runtime: Option<Handle>,
}

impl SchedulerBuilder {
    fn new(hydrator: Arc<dyn Hydrator>) -> Self {
        Self {
            hydrator,
            config: SchedulerConfig::default(),
            visibility: Arc::new(NullVisibilityProvider),
            interaction: Arc::new(NullInteractionProvider),
            idle: Arc::new(DelayIdleProvider::default()),
            metrics_sink: Arc::new(TracingMetricsSink),
            runtime: None,
        }
    }

    pub fn config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn visibility(mut self, provider: Arc<dyn VisibilityProvider>) -> Self {
        self.visibility = provider;
        self
    }

    pub fn interaction(mut self, provider: Arc<dyn InteractionProvider>) -> Self {
        self.interaction = provider;
        self
    }

    pub fn idle(mut self, provider: Arc<dyn IdleProvider>) -> Self {
        self.idle = provider;
        self
    }

    pub fn metrics_sink(mut self, sink: Arc<dyn MetricsSink>) -> Self {
        self.metrics_sink = sink;
        self
    }

    /// Runtime for the loop, timers and activations; the current one by default.
    pub fn runtime(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    /// Validate the configuration and start the scheduling loop.
    pub fn build(self) -> Result<Scheduler> {
        self.config.validate()?;
        let runtime = match self.runtime {
            Some(handle) => handle,
            None => Handle::try_current().map_err(|_| SchedulerError::NoRuntime)?,
        };
        let (loop_tx, loop_rx) = mpsc::unbounded_channel();
        let (runnable, _) = watch::channel(0);
        let state = SchedulerState {
            registry: BoundaryRegistry::new(self.config.completed_retention),
            queue: ReadyQueue::new(),
            executions: ExecutionTable::default(),
            idle: IdleWaiters::default(),
            next_seq: 0,
            paused: false,
            shut_down: false,
            config: self.config,
        };
        let shared = Arc::new(Shared {
            events: EventBus::new(state.config.event_capacity),
            state: Mutex::new(state),
            hydrator: self.hydrator,
            visibility: self.visibility,
            interaction: self.interaction,
            idle: self.idle,
            metrics_sink: self.metrics_sink,
            metrics: SchedulerMetrics::new(),
            loop_tx,
            runtime: runtime.clone(),
            runnable,
        });
        runtime.spawn(drive(Arc::downgrade(&shared), loop_rx));
        tracing::debug!("hydration scheduler started");
        Ok(Scheduler { shared })
    }
}

impl fmt::Debug for SchedulerBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchedulerBuilder")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Handle to a hydration scheduler. Clones share the same instance; the
/// scheduler tears down once the last handle is dropped.
#[derive(Clone)]
pub struct Scheduler {
    shared: Arc<Shared>,
}

impl Scheduler {
    pub fn builder(hydrator: impl Hydrator + 'static) -> SchedulerBuilder {
        SchedulerBuilder::new(Arc::new(hydrator))
    }

    /// A scheduler with default providers and configuration.
    pub fn new(hydrator: impl Hydrator + 'static) -> Result<Self> {
        Self::builder(hydrator).build()
    }

    /// Register a boundary.
    ///
    /// Immediate boundaries are ready (and possibly hydrating) when this
    /// returns. Other triggers subscribe to their source and arm the
    /// readiness timer. Fails with `DuplicateId` while `id` is live.
    pub fn register(&self, descriptor: BoundaryDescriptor) -> Result<BoundaryId> {
        let priority = descriptor.validate()?;
        let shared = &self.shared;
        let mut state = shared.lock();
        if state.shut_down {
            return Err(SchedulerError::ShutDown);
        }
        if state.registry.is_live(descriptor.id.as_str()) {
            return Err(SchedulerError::DuplicateId {
                id: descriptor.id.clone(),
            });
        }
        state.registry.evict_retained(descriptor.id.as_str());

        let generation = state.registry.next_generation();
        let readiness_timeout =
            descriptor.resolve_readiness_timeout(state.config.readiness_timeout());
        let mut record = BoundaryRecord::new(
            &descriptor,
            priority,
            generation,
            Stamp::now(),
            Default::default(),
        );
        shared.arm_trigger(&mut state, &mut record, readiness_timeout);
        let id = record.id.clone();
        let trigger = record.trigger.kind();
        state.registry.insert(record);

        shared.metrics.inc_registered();
        obs::emit_boundary_registered(&id, priority, trigger);
        if trigger == TriggerKind::Immediate {
            shared.mark_ready(&mut state, &id, generation, ReadinessCause::Immediate);
            shared.dispatch(&mut state);
        }
        shared.publish_load(&state);
        Ok(id)
    }

    /// Remove a boundary.
    ///
    /// Pending and ready boundaries are torn down: no further `Ready` or
    /// `HydrationStart` event fires for them. A hydrating boundary cannot be
    /// interrupted; it stays hydrating, and its id stays taken, until the
    /// activation settles, and then the result is discarded. Unregistering a
    /// retained terminal boundary forgets it.
    pub fn unregister(&self, id: &str) -> Result<()> {
        let shared = &self.shared;
        let mut state = shared.lock();
        let live = state
            .registry
            .get(id)
            .map(|record| (record.status, record.cancel_requested.is_some()));
        match live {
            Some((BoundaryStatus::Hydrating, true)) => {
                return Err(SchedulerError::UnknownBoundary { id: id.into() });
            }
            Some((BoundaryStatus::Hydrating, false)) => {
                let SchedulerState {
                    registry,
                    executions,
                    ..
                } = &mut *state;
                if let Some(record) = registry.get_mut(id) {
                    let reason = CancelReason::DiscardedAfterHydration;
                    record.cancel_requested = Some(reason);
                    executions.cancel(id, record.generation, reason);
                    tracing::debug!(boundary_id = %id, "unregistered while hydrating");
                }
            }
            Some(_) => {
                if let Some(record) = state.registry.remove(id) {
                    shared.cancel_waiting(&mut state, record, CancelReason::Unregistered);
                }
            }
            None => {
                if !state.registry.evict_retained(id) {
                    return Err(SchedulerError::UnknownBoundary { id: id.into() });
                }
            }
        }
        shared.publish_load(&state);
        Ok(())
    }

    /// Force a pending manual boundary to ready.
    pub fn trigger_manual(&self, id: &str) -> Result<()> {
        let shared = &self.shared;
        let mut state = shared.lock();
        if state.shut_down {
            return Err(SchedulerError::ShutDown);
        }
        let (generation, id) = match state.registry.get(id) {
            Some(record) => {
                if record.trigger.kind() != TriggerKind::Manual {
                    return Err(SchedulerError::ManualTriggerRejected {
                        id: id.into(),
                        reason: format!("boundary uses the {} trigger", record.trigger.kind()),
                    });
                }
                if record.status != BoundaryStatus::Pending {
                    return Err(SchedulerError::ManualTriggerRejected {
                        id: id.into(),
                        reason: format!("boundary is {}", record.status),
                    });
                }
                (record.generation, record.id.clone())
            }
            None => {
                return Err(match state.registry.retained(id) {
                    Some(snapshot) => SchedulerError::ManualTriggerRejected {
                        id: id.into(),
                        reason: format!("boundary is {}", snapshot.status),
                    },
                    None => SchedulerError::UnknownBoundary { id: id.into() },
                });
            }
        };
        shared.mark_ready(&mut state, &id, generation, ReadinessCause::Manual);
        shared.dispatch(&mut state);
        shared.publish_load(&state);
        Ok(())
    }

    /// Apply a partial configuration update. Raising `max_concurrent` fills
    /// the new slots immediately; lowering it never aborts running work.
    pub fn configure(&self, patch: ConfigPatch) -> Result<()> {
        let shared = &self.shared;
        let mut state = shared.lock();
        state.config.apply(&patch)?;
        tracing::info!(
            max_concurrent = state.config.max_concurrent,
            default_readiness_timeout_ms = state.config.default_readiness_timeout_ms,
            default_execution_timeout_ms = state.config.default_execution_timeout_ms,
            "scheduler reconfigured"
        );
        shared.dispatch(&mut state);
        shared.publish_load(&state);
        Ok(())
    }

    /// Stop starting activations. Readiness keeps accumulating in the queue.
    pub fn pause_dispatch(&self) {
        self.shared.lock().paused = true;
    }

    /// Release the queue in priority order.
    pub fn resume_dispatch(&self) {
        let shared = &self.shared;
        let mut state = shared.lock();
        state.paused = false;
        shared.dispatch(&mut state);
        shared.publish_load(&state);
    }

    /// Cancel every pending and ready boundary and refuse new registrations.
    /// In-flight activations finish; their results are discarded.
    pub fn shutdown(&self) {
        let shared = &self.shared;
        let mut state = shared.lock();
        if state.shut_down {
            return;
        }
        state.shut_down = true;
        let records = state.registry.drain_waiting();
        for record in records {
            shared.cancel_waiting(&mut state, record, CancelReason::Shutdown);
        }
        let SchedulerState {
            registry,
            executions,
            ..
        } = &mut *state;
        for record in registry.hydrating_mut() {
            let reason = *record.cancel_requested.get_or_insert(CancelReason::Shutdown);
            executions.cancel(record.id.as_str(), record.generation, reason);
        }
        state.queue.clear();
        state.idle.clear();
        shared.publish_load(&state);
        tracing::info!(active = state.executions.len(), "hydration scheduler shut down");
    }

    pub fn is_shut_down(&self) -> bool {
        self.shared.lock().shut_down
    }

    /// Resolves once no boundary is ready or hydrating.
    pub async fn settled(&self) {
        let mut load = self.shared.runnable.subscribe();
        let _ = load.wait_for(|runnable| *runnable == 0).await;
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SchedulerEvent> {
        self.shared.events.subscribe()
    }

    /// Status of a live or retained boundary.
    pub fn status(&self, id: &str) -> Option<BoundaryStatus> {
        let state = self.shared.lock();
        match state.registry.get(id) {
            Some(record) => Some(record.status),
            None => state.registry.retained(id).map(|snapshot| snapshot.status),
        }
    }

    pub fn snapshot(&self, id: &str) -> Option<BoundarySnapshot> {
        let state = self.shared.lock();
        match state.registry.get(id) {
            Some(record) => Some(record.snapshot()),
            None => state.registry.retained(id).cloned(),
        }
    }

    pub fn stats(&self) -> SchedulerStats {
        let state = self.shared.lock();
        let registry = &state.registry;
        SchedulerStats {
            pending: registry.count_live(BoundaryStatus::Pending),
            ready: registry.count_live(BoundaryStatus::Ready),
            hydrating: registry.count_live(BoundaryStatus::Hydrating),
            complete: registry.count_retained(BoundaryStatus::Complete),
            failed: registry.count_retained(BoundaryStatus::Failed),
            active: state.executions.len(),
            queued: state.queue.len(),
            max_concurrent: state.config.max_concurrent,
            paused: state.paused,
        }
    }

    /// In-flight activation count.
    pub fn active_count(&self) -> usize {
        self.shared.lock().executions.len()
    }

    pub fn queue_len(&self) -> usize {
        self.shared.lock().queue.len()
    }

    /// Ids in the order they would be dispatched.
    pub fn queued_ids(&self) -> Vec<BoundaryId> {
        self.shared.lock().queue.ids()
    }

    pub fn config(&self) -> SchedulerConfig {
        self.shared.lock().config.clone()
    }

    pub fn metrics(&self) -> &SchedulerMetrics {
        &self.shared.metrics
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("shared", &self.shared)
            .finish()
    }
}
