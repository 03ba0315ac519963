//! Readiness trigger sources for the hydration scheduler.
//!
//! A hydration boundary becomes eligible for activation when one of its
//! trigger sources reports readiness. Each source wraps one platform
//! capability behind a small injectable trait so that browser adapters and
//! deterministic test fakes are interchangeable.
//!
//! # Module layout
//!
//! - [`id`]: `BoundaryId`, `TriggerTarget`
//! - [`signal`]: `ReadinessCause`, `ReadySignal`, `Subscription`
//! - [`visibility`]: `VisibilityOptions`, `VisibilityProvider`
//! - [`interaction`]: `InteractionEvent`, `InteractionProvider`
//! - [`idle`]: `IdleSlice`, `IdleProvider`, `DelayIdleProvider`
//! - [`fakes`]: in-memory providers driven by the test
//! - [`error`]: `TriggerError`

pub mod error;
pub mod fakes;
pub mod id;
pub mod idle;
pub mod interaction;
pub mod signal;
pub mod visibility;

pub use error::TriggerError;
pub use id::{BoundaryId, TriggerTarget};
pub use idle::{DelayIdleProvider, IdleProvider, IdleSlice, DEFAULT_IDLE_SLICE_HINT};
pub use interaction::{
    default_interaction_events, InteractionEvent, InteractionProvider, NullInteractionProvider,
    DEFAULT_INTERACTION_EVENTS,
};
pub use signal::{ReadinessCause, ReadySignal, Subscription};
pub use visibility::{
    NullVisibilityProvider, ObserverKey, VisibilityOptions, VisibilityProvider,
    DEFAULT_ROOT_MARGIN, DEFAULT_VISIBILITY_THRESHOLD,
};
