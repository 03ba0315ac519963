//! Interaction trigger: readiness on the first user interaction with the anchor.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TriggerError;
use crate::id::TriggerTarget;
use crate::signal::{ReadySignal, Subscription};

/// DOM event kinds an interaction trigger can listen for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InteractionEvent {
    PointerEnter,
    PointerDown,
    MouseOver,
    Click,
    Focus,
    FocusIn,
    KeyDown,
    TouchStart,
}

/// Events listened for when a boundary configures none.
pub const DEFAULT_INTERACTION_EVENTS: [InteractionEvent; 3] = [
    InteractionEvent::PointerEnter,
    InteractionEvent::Focus,
    InteractionEvent::TouchStart,
];

pub fn default_interaction_events() -> Vec<InteractionEvent> {
    DEFAULT_INTERACTION_EVENTS.to_vec()
}

impl InteractionEvent {
    /// The DOM event name.
    pub fn as_str(&self) -> &'static str {
        match self {
            InteractionEvent::PointerEnter => "pointerenter",
            InteractionEvent::PointerDown => "pointerdown",
            InteractionEvent::MouseOver => "mouseover",
            InteractionEvent::Click => "click",
            InteractionEvent::Focus => "focus",
            InteractionEvent::FocusIn => "focusin",
            InteractionEvent::KeyDown => "keydown",
            InteractionEvent::TouchStart => "touchstart",
        }
    }
}

impl fmt::Display for InteractionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InteractionEvent {
    type Err = TriggerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pointerenter" => Ok(InteractionEvent::PointerEnter),
            "pointerdown" => Ok(InteractionEvent::PointerDown),
            "mouseover" => Ok(InteractionEvent::MouseOver),
            "click" => Ok(InteractionEvent::Click),
            "focus" => Ok(InteractionEvent::Focus),
            "focusin" => Ok(InteractionEvent::FocusIn),
            "keydown" => Ok(InteractionEvent::KeyDown),
            "touchstart" => Ok(InteractionEvent::TouchStart),
            _ => Err(TriggerError::UnknownInteractionEvent {
                name: s.to_string(),
            }),
        }
    }
}

/// Adapter over DOM event listeners.
///
/// Contract:
/// - attach passive listeners for every event in `events` on `target.anchor`;
/// - on the first matching event, fire `signal` with
///   [`crate::ReadinessCause::Interaction`] and detach *all* listeners of
///   that target;
/// - detach all listeners when the returned [`Subscription`] is disposed.
///
/// `listen` and the subscription release run while the scheduler holds its
/// state lock, so they must not call back into the scheduler.
pub trait InteractionProvider: Send + Sync {
    fn listen(
        &self,
        target: &TriggerTarget,
        events: &[InteractionEvent],
        signal: ReadySignal,
    ) -> Subscription;
}

/// Provider for environments without DOM events. Never fires.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullInteractionProvider;

impl InteractionProvider for NullInteractionProvider {
    fn listen(
        &self,
        target: &TriggerTarget,
        _events: &[InteractionEvent],
        _signal: ReadySignal,
    ) -> Subscription {
        tracing::debug!(
            boundary_id = %target.boundary,
            "interaction listeners unavailable; waiting for readiness timeout"
        );
        Subscription::noop()
    }
}
