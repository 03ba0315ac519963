//! Hydration metrics: per-scheduler counters and the `MetricsSink` seam.
//!
//! Counters are incremented silently at the call site. Call
//! [`SchedulerMetrics::flush`] to emit current values as a single
//! `tracing::info!` event (e.g. once the page has settled).
//!
//! Every terminal outcome additionally produces one [`HydrationSample`]
//! handed to the configured [`MetricsSink`].

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use hydration_triggers::BoundaryId;

use crate::boundary::{Priority, TriggerKind};

/// Lightweight atomic counters, one set per scheduler instance.
#[derive(Debug, Default)]
pub struct SchedulerMetrics {
    registered: AtomicU64,
    ready: AtomicU64,
    readiness_timeouts: AtomicU64,
    started: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    execution_timeouts: AtomicU64,
    cancelled: AtomicU64,
}

impl SchedulerMetrics {
    pub const fn new() -> Self {
        Self {
            registered: AtomicU64::new(0),
            ready: AtomicU64::new(0),
            readiness_timeouts: AtomicU64::new(0),
            started: AtomicU64::new(0),
            completed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            execution_timeouts: AtomicU64::new(0),
            cancelled: AtomicU64::new(0),
        }
    }

    pub(crate) fn inc_registered(&self) {
        bump(&self.registered, "registered");
    }

    pub(crate) fn inc_ready(&self, forced_by_timeout: bool) {
        bump(&self.ready, "ready");
        if forced_by_timeout {
            bump(&self.readiness_timeouts, "readiness_timeouts");
        }
    }

    pub(crate) fn inc_started(&self) {
        bump(&self.started, "started");
    }

    pub(crate) fn inc_completed(&self) {
        bump(&self.completed, "completed");
    }

    pub(crate) fn inc_failed(&self, execution_timeout: bool) {
        bump(&self.failed, "failed");
        if execution_timeout {
            bump(&self.execution_timeouts, "execution_timeouts");
        }
    }

    pub(crate) fn inc_cancelled(&self) {
        bump(&self.cancelled, "cancelled");
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            registered = self.registered(),
            ready = self.ready(),
            readiness_timeouts = self.readiness_timeouts(),
            started = self.started(),
            completed = self.completed(),
            failed = self.failed(),
            execution_timeouts = self.execution_timeouts(),
            cancelled = self.cancelled(),
        );
    }

    pub fn registered(&self) -> u64 {
        self.registered.load(Ordering::Relaxed)
    }

    pub fn ready(&self) -> u64 {
        self.ready.load(Ordering::Relaxed)
    }

    /// Boundaries whose readiness was forced by the safety-net timer.
    pub fn readiness_timeouts(&self) -> u64 {
        self.readiness_timeouts.load(Ordering::Relaxed)
    }

    pub fn started(&self) -> u64 {
        self.started.load(Ordering::Relaxed)
    }

    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn execution_timeouts(&self) -> u64 {
        self.execution_timeouts.load(Ordering::Relaxed)
    }

    pub fn cancelled(&self) -> u64 {
        self.cancelled.load(Ordering::Relaxed)
    }
}

fn bump(counter: &AtomicU64, name: &'static str) {
    counter.fetch_add(1, Ordering::Relaxed);
    tracing::trace!(metric = name, "counter incremented");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HydrationOutcome {
    Complete,
    Failed,
    /// Unregistered while hydrating; the result was dropped.
    Discarded,
}

/// Duration and outcome of one activation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HydrationSample {
    pub id: BoundaryId,
    pub priority: Priority,
    pub trigger: TriggerKind,
    pub outcome: HydrationOutcome,
    /// Time spent ready in the queue before the activation started.
    pub queue_wait_ms: u64,
    /// Time from activation start to settlement (or execution timeout).
    pub duration_ms: u64,
}

/// Receiver of per-activation samples.
pub trait MetricsSink: Send + Sync {
    fn record(&self, sample: &HydrationSample);
}

/// Drops every sample.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetricsSink;

impl MetricsSink for NoopMetricsSink {
    fn record(&self, _sample: &HydrationSample) {}
}

/// Logs each sample as a structured `debug!` event.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingMetricsSink;

impl MetricsSink for TracingMetricsSink {
    fn record(&self, sample: &HydrationSample) {
        tracing::debug!(
            metric = "hydration.sample",
            boundary_id = %sample.id,
            priority = sample.priority.get(),
            trigger = %sample.trigger,
            outcome = ?sample.outcome,
            queue_wait_ms = sample.queue_wait_ms,
            duration_ms = sample.duration_ms,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_increment() {
        let m = SchedulerMetrics::new();
        assert_eq!(m.registered(), 0);
        m.inc_registered();
        m.inc_registered();
        assert_eq!(m.registered(), 2);

        m.inc_ready(false);
        m.inc_ready(true);
        assert_eq!(m.ready(), 2);
        assert_eq!(m.readiness_timeouts(), 1);

        m.inc_failed(true);
        m.inc_failed(false);
        assert_eq!(m.failed(), 2);
        assert_eq!(m.execution_timeouts(), 1);
    }

    #[test]
    fn independent_instances_do_not_share_counts() {
        let a = SchedulerMetrics::new();
        let b = SchedulerMetrics::new();
        a.inc_completed();
        a.inc_started();
        b.inc_cancelled();
        assert_eq!(a.completed(), 1);
        assert_eq!(b.completed(), 0);
        assert_eq!(b.cancelled(), 1);
        a.flush();
    }

    #[test]
    fn sample_serializes_outcome_in_snake_case() {
        let sample = HydrationSample {
            id: BoundaryId::from("hero"),
            priority: Priority::HIGHEST,
            trigger: TriggerKind::Visible,
            outcome: HydrationOutcome::Discarded,
            queue_wait_ms: 3,
            duration_ms: 40,
        };
        let json = serde_json::to_value(&sample).unwrap();
        assert_eq!(json["outcome"], "discarded");
        assert_eq!(json["priority"], 1);
        TracingMetricsSink.record(&sample);
        NoopMetricsSink.record(&sample);
    }
}
