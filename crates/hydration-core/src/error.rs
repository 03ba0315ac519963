//! Error taxonomy for the hydration scheduler.

use std::fmt;
use std::sync::Arc;

use hydration_triggers::BoundaryId;

/// Errors returned synchronously by the public scheduler operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchedulerError {
    #[error("boundary already registered: {id}")]
    DuplicateId { id: BoundaryId },

    #[error("unknown boundary: {id}")]
    UnknownBoundary { id: BoundaryId },

    #[error("priority must be between 1 and 5, got {value}")]
    InvalidPriority { value: u8 },

    #[error("invalid descriptor for boundary {id}: {reason}")]
    InvalidDescriptor { id: BoundaryId, reason: String },

    #[error("invalid scheduler configuration: {0}")]
    InvalidConfig(String),

    #[error("manual trigger rejected for {id}: {reason}")]
    ManualTriggerRejected { id: BoundaryId, reason: String },

    #[error("no tokio runtime available to drive the scheduler")]
    NoRuntime,

    #[error("scheduler has been shut down")]
    ShutDown,
}

/// Result type for scheduler operations.
pub type Result<T> = std::result::Result<T, SchedulerError>;

/// Rejection returned by the host activation callback, kept verbatim.
///
/// Cheap to clone so one failure can be fanned out to every event
/// subscriber. The original error stays reachable through [`inner`].
///
/// [`inner`]: HydrateCallbackError::inner
#[derive(Debug, Clone)]
pub struct HydrateCallbackError(Arc<anyhow::Error>);

impl HydrateCallbackError {
    pub fn new(error: anyhow::Error) -> Self {
        Self(Arc::new(error))
    }

    /// The error exactly as the callback returned it.
    pub fn inner(&self) -> &anyhow::Error {
        &self.0
    }

    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: fmt::Display + fmt::Debug + Send + Sync + 'static,
    {
        self.0.downcast_ref::<E>()
    }
}

impl fmt::Display for HydrateCallbackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#}", self.0)
    }
}

impl std::error::Error for HydrateCallbackError {}

impl From<anyhow::Error> for HydrateCallbackError {
    fn from(error: anyhow::Error) -> Self {
        Self::new(error)
    }
}

/// Why an activation ended in `failed`.
#[derive(Debug, Clone, thiserror::Error)]
pub enum HydrationFailure {
    #[error("activation did not settle within {timeout_ms}ms")]
    ExecutionTimeout { timeout_ms: u64 },

    #[error("hydrate callback failed: {0}")]
    Callback(#[from] HydrateCallbackError),

    #[error("hydrate callback panicked: {message}")]
    Panicked { message: String },
}

impl HydrationFailure {
    /// The callback's own error, when the failure is a rejection.
    pub fn callback_error(&self) -> Option<&anyhow::Error> {
        match self {
            HydrationFailure::Callback(err) => Some(err.inner()),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, HydrationFailure::ExecutionTimeout { .. })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            HydrationFailure::ExecutionTimeout { .. } => "execution_timeout",
            HydrationFailure::Callback(_) => "callback",
            HydrationFailure::Panicked { .. } => "panicked",
        }
    }
}
