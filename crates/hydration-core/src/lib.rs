//! Prioritized hydration scheduler.
//!
//! Server-rendered pages are split into hydration boundaries. Each boundary
//! waits for its trigger (immediate, visible, interaction, idle or manual),
//! is queued by priority once ready, and is activated through the host's
//! [`Hydrator`] with at most `max_concurrent` activations in flight.
//!
//! # Module layout
//!
//! - [`boundary`]: descriptors, triggers, priorities, lifecycle status
//! - [`scheduler`]: the [`Scheduler`] handle and its builder
//! - [`queue`]: deterministic ready-queue ordering
//! - [`hydrator`]: the activation callback seam
//! - [`events`]: lifecycle events for subscribers
//! - [`config`]: `SchedulerConfig` and runtime patches
//! - [`metrics`]: counters and per-activation samples
//! - [`obs`], [`telemetry`]: structured tracing
//! - [`error`]: `SchedulerError`, `HydrationFailure`

pub mod boundary;
pub mod config;
pub mod error;
pub mod events;
mod executor;
pub mod hydrator;
pub mod metrics;
pub mod obs;
pub mod queue;
mod readiness;
mod registry;
pub mod scheduler;
pub mod telemetry;
mod timer;

pub use boundary::{
    BoundaryDescriptor, BoundarySnapshot, BoundaryStatus, Priority, ReadinessTimeout, Trigger,
    TriggerKind,
};
pub use config::{ConfigPatch, SchedulerConfig};
pub use error::{HydrateCallbackError, HydrationFailure, Result, SchedulerError};
pub use events::{CancelReason, SchedulerEvent};
pub use hydrator::{hydrator_fn, FnHydrator, Hydrator};
pub use metrics::{
    HydrationOutcome, HydrationSample, MetricsSink, NoopMetricsSink, SchedulerMetrics,
    TracingMetricsSink,
};
pub use scheduler::{Scheduler, SchedulerBuilder, SchedulerStats};

pub use hydration_triggers::{
    BoundaryId, IdleProvider, IdleSlice, InteractionEvent, InteractionProvider, ReadinessCause,
    VisibilityOptions, VisibilityProvider,
};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
