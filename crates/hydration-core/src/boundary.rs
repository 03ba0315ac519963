//! Hydration boundary data model: priorities, triggers, descriptors, status.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use hydration_triggers::{
    default_interaction_events, BoundaryId, InteractionEvent, ReadinessCause, VisibilityOptions,
    DEFAULT_IDLE_SLICE_HINT,
};

use crate::error::{Result, SchedulerError};
use crate::registry::millis;

/// Importance of a boundary: 1 is the most important, 5 the least.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Priority(u8);

impl Priority {
    pub const HIGHEST: Priority = Priority(1);
    pub const DEFAULT: Priority = Priority(3);
    pub const LOWEST: Priority = Priority(5);

    pub fn new(value: u8) -> Result<Self> {
        if (Self::HIGHEST.0..=Self::LOWEST.0).contains(&value) {
            Ok(Self(value))
        } else {
            Err(SchedulerError::InvalidPriority { value })
        }
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl Default for Priority {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl TryFrom<u8> for Priority {
    type Error = SchedulerError;

    fn try_from(value: u8) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Priority> for u8 {
    fn from(priority: Priority) -> Self {
        priority.0
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "p{}", self.0)
    }
}

/// Condition class deciding how a boundary becomes ready, with its
/// trigger-specific constraints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Trigger {
    Immediate,
    Visible {
        #[serde(flatten)]
        options: VisibilityOptions,
    },
    Interaction {
        #[serde(default = "default_interaction_events")]
        events: Vec<InteractionEvent>,
    },
    Idle {
        #[serde(default = "default_slice_hint_ms")]
        slice_hint_ms: u64,
    },
    Manual,
}

fn default_slice_hint_ms() -> u64 {
    millis(DEFAULT_IDLE_SLICE_HINT)
}

impl Trigger {
    /// Visible at the default threshold (0.1) and root margin.
    pub fn visible() -> Self {
        Trigger::Visible {
            options: VisibilityOptions::default(),
        }
    }

    pub fn visible_with(options: VisibilityOptions) -> Self {
        Trigger::Visible { options }
    }

    /// Interaction on the default event set (`pointerenter`, `focus`, `touchstart`).
    pub fn interaction() -> Self {
        Trigger::Interaction {
            events: default_interaction_events(),
        }
    }

    pub fn interaction_on(events: impl IntoIterator<Item = InteractionEvent>) -> Self {
        Trigger::Interaction {
            events: events.into_iter().collect(),
        }
    }

    pub fn idle() -> Self {
        Trigger::Idle {
            slice_hint_ms: default_slice_hint_ms(),
        }
    }

    pub fn idle_with_hint(hint: Duration) -> Self {
        Trigger::Idle {
            slice_hint_ms: millis(hint),
        }
    }

    pub fn kind(&self) -> TriggerKind {
        match self {
            Trigger::Immediate => TriggerKind::Immediate,
            Trigger::Visible { .. } => TriggerKind::Visible,
            Trigger::Interaction { .. } => TriggerKind::Interaction,
            Trigger::Idle { .. } => TriggerKind::Idle,
            Trigger::Manual => TriggerKind::Manual,
        }
    }
}

/// Trigger class without constraints, for events, snapshots and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    Immediate,
    Visible,
    Interaction,
    Idle,
    Manual,
}

impl TriggerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerKind::Immediate => "immediate",
            TriggerKind::Visible => "visible",
            TriggerKind::Interaction => "interaction",
            TriggerKind::Idle => "idle",
            TriggerKind::Manual => "manual",
        }
    }
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Safety-net readiness deadline of a boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadinessTimeout {
    /// Scheduler default; immediate and manual boundaries get none.
    #[default]
    Default,
    AfterMs(u64),
    Never,
}

/// Everything the host supplies when registering a boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundaryDescriptor {
    pub id: BoundaryId,
    #[serde(default = "default_priority")]
    pub priority: u8,
    pub trigger: Trigger,
    /// Anchor the trigger sources attach to; the id when absent.
    #[serde(default)]
    pub anchor: Option<String>,
    #[serde(default)]
    pub readiness_timeout: ReadinessTimeout,
    /// Cap on the activation call; the scheduler default when absent.
    #[serde(default)]
    pub execution_timeout_ms: Option<u64>,
}

fn default_priority() -> u8 {
    Priority::DEFAULT.get()
}

impl BoundaryDescriptor {
    pub fn new(id: impl Into<BoundaryId>, trigger: Trigger) -> Self {
        Self {
            id: id.into(),
            priority: default_priority(),
            trigger,
            anchor: None,
            readiness_timeout: ReadinessTimeout::Default,
            execution_timeout_ms: None,
        }
    }

    pub fn immediate(id: impl Into<BoundaryId>) -> Self {
        Self::new(id, Trigger::Immediate)
    }

    pub fn manual(id: impl Into<BoundaryId>) -> Self {
        Self::new(id, Trigger::Manual)
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_anchor(mut self, anchor: impl Into<String>) -> Self {
        self.anchor = Some(anchor.into());
        self
    }

    pub fn with_readiness_timeout(mut self, timeout: Duration) -> Self {
        self.readiness_timeout = ReadinessTimeout::AfterMs(millis(timeout));
        self
    }

    pub fn without_readiness_timeout(mut self) -> Self {
        self.readiness_timeout = ReadinessTimeout::Never;
        self
    }

    pub fn with_execution_timeout(mut self, timeout: Duration) -> Self {
        self.execution_timeout_ms = Some(millis(timeout));
        self
    }

    pub fn anchor_or_id(&self) -> &str {
        self.anchor.as_deref().unwrap_or(self.id.as_str())
    }

    /// Check the descriptor and return its validated priority.
    pub fn validate(&self) -> Result<Priority> {
        if self.id.is_empty() {
            return Err(self.invalid("id must not be empty"));
        }
        let priority = Priority::new(self.priority)?;

        match &self.trigger {
            Trigger::Visible { options } => options
                .validate()
                .map_err(|err| self.invalid(err.to_string()))?,
            Trigger::Interaction { events } if events.is_empty() => {
                return Err(self.invalid("interaction trigger needs at least one event"));
            }
            Trigger::Idle { slice_hint_ms: 0 } => {
                return Err(self.invalid("idle slice hint must be positive"));
            }
            Trigger::Manual if matches!(self.readiness_timeout, ReadinessTimeout::AfterMs(_)) => {
                return Err(self.invalid("manual boundaries have no readiness timeout"));
            }
            _ => {}
        }

        if matches!(self.readiness_timeout, ReadinessTimeout::AfterMs(0)) {
            return Err(self.invalid("readiness timeout must be positive"));
        }
        if self.execution_timeout_ms == Some(0) {
            return Err(self.invalid("execution timeout must be positive"));
        }
        if matches!(&self.anchor, Some(anchor) if anchor.trim().is_empty()) {
            return Err(self.invalid("anchor must not be blank"));
        }

        Ok(priority)
    }

    /// The readiness deadline this boundary is armed with, if any.
    pub fn resolve_readiness_timeout(&self, default: Duration) -> Option<Duration> {
        match (&self.trigger, self.readiness_timeout) {
            (Trigger::Immediate, _) | (Trigger::Manual, _) => None,
            (_, ReadinessTimeout::Default) => Some(default),
            (_, ReadinessTimeout::AfterMs(ms)) => Some(Duration::from_millis(ms)),
            (_, ReadinessTimeout::Never) => None,
        }
    }

    pub fn execution_timeout(&self) -> Option<Duration> {
        self.execution_timeout_ms.map(Duration::from_millis)
    }

    fn invalid(&self, reason: impl Into<String>) -> SchedulerError {
        SchedulerError::InvalidDescriptor {
            id: self.id.clone(),
            reason: reason.into(),
        }
    }
}

/// Lifecycle of a boundary.
///
/// `pending → ready → hydrating → (complete | failed)`; `cancelled` is
/// reachable from `pending` or `ready` only. Terminal states are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundaryStatus {
    Pending,
    Ready,
    Hydrating,
    Complete,
    Failed,
    Cancelled,
}

impl BoundaryStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            BoundaryStatus::Complete | BoundaryStatus::Failed | BoundaryStatus::Cancelled
        )
    }

    pub fn can_transition_to(self, next: BoundaryStatus) -> bool {
        use BoundaryStatus::*;
        matches!(
            (self, next),
            (Pending, Ready)
                | (Pending, Cancelled)
                | (Ready, Hydrating)
                | (Ready, Cancelled)
                | (Hydrating, Complete)
                | (Hydrating, Failed)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BoundaryStatus::Pending => "pending",
            BoundaryStatus::Ready => "ready",
            BoundaryStatus::Hydrating => "hydrating",
            BoundaryStatus::Complete => "complete",
            BoundaryStatus::Failed => "failed",
            BoundaryStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for BoundaryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time view of one boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundarySnapshot {
    pub id: BoundaryId,
    pub generation: u64,
    pub priority: Priority,
    pub trigger: TriggerKind,
    pub status: BoundaryStatus,
    pub registered_at: DateTime<Utc>,
    pub ready_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub readiness_cause: Option<ReadinessCause>,
    pub failure: Option<String>,
}
