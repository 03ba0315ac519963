//! Readiness signalling between trigger sources and the scheduler.
//!
//! A provider receives a [`ReadySignal`] when it starts watching a boundary
//! and hands back a [`Subscription`]. Firing the signal reports readiness;
//! disposing the subscription tears down every observer, listener or timer
//! the provider created for that boundary.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::interaction::InteractionEvent;

/// Why a boundary became ready.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReadinessCause {
    /// Registered with the `immediate` trigger.
    Immediate,
    /// Intersection ratio reached the configured threshold.
    Visible,
    /// First matching user interaction on the anchor.
    Interaction { event: InteractionEvent },
    /// An idle slice was granted.
    Idle,
    /// The host called `trigger_manual`.
    Manual,
    /// The readiness timer elapsed before any natural trigger.
    Timeout,
}

impl ReadinessCause {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReadinessCause::Immediate => "immediate",
            ReadinessCause::Visible => "visible",
            ReadinessCause::Interaction { .. } => "interaction",
            ReadinessCause::Idle => "idle",
            ReadinessCause::Manual => "manual",
            ReadinessCause::Timeout => "timeout",
        }
    }

    /// `true` when readiness was forced by the safety-net timer.
    pub fn is_timeout(&self) -> bool {
        matches!(self, ReadinessCause::Timeout)
    }
}

impl fmt::Display for ReadinessCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadinessCause::Interaction { event } => write!(f, "interaction:{event}"),
            other => f.write_str(other.as_str()),
        }
    }
}

/// Callback handle a provider fires when its boundary becomes ready.
///
/// Cloneable and cheap. Firing more than once is harmless: the scheduler
/// only honours the first readiness report of each registration.
#[derive(Clone)]
pub struct ReadySignal {
    notify: Arc<dyn Fn(ReadinessCause) + Send + Sync>,
}

impl ReadySignal {
    pub fn new<F>(notify: F) -> Self
    where
        F: Fn(ReadinessCause) + Send + Sync + 'static,
    {
        Self {
            notify: Arc::new(notify),
        }
    }

    /// Report readiness with the given cause.
    pub fn fire(&self, cause: ReadinessCause) {
        (self.notify)(cause);
    }
}

impl fmt::Debug for ReadySignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadySignal").finish_non_exhaustive()
    }
}

/// Dispose handle for whatever a provider attached on behalf of a boundary.
///
/// Released exactly once: either through [`Subscription::dispose`] or when
/// the handle is dropped.
pub struct Subscription {
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new<F>(release: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            release: Some(Box::new(release)),
        }
    }

    /// A subscription with nothing to release.
    pub fn noop() -> Self {
        Self { release: None }
    }

    /// Whether the release action has not run yet.
    pub fn is_active(&self) -> bool {
        self.release.is_some()
    }

    /// Tear down the provider-side resources now.
    pub fn dispose(mut self) {
        self.release_now();
    }

    fn release_now(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release_now();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}
