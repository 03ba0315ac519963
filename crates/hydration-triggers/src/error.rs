//! Error types for trigger sources.

/// Errors produced while parsing or validating trigger configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TriggerError {
    #[error("unknown interaction event: {name}")]
    UnknownInteractionEvent { name: String },

    #[error("visibility threshold must be within [0, 1], got {threshold}")]
    InvalidThreshold { threshold: String },

    #[error("interaction trigger needs at least one event")]
    EmptyEventSet,
}

/// Result type for trigger operations.
pub type TriggerResult<T> = std::result::Result<T, TriggerError>;
