//! Structured observability hooks for boundary lifecycle events.
//!
//! One emission function per transition, so every log line for a
//! transition carries the same field names. Events are emitted at `info!`
//! (failures at `warn!`); filter with `HYDRATION_LOG`, see
//! [`crate::telemetry::init_tracing`].

use hydration_triggers::{BoundaryId, ReadinessCause};
use tracing::{info, warn};

use crate::boundary::{Priority, TriggerKind};
use crate::events::CancelReason;

/// Span wrapping one activation call.
pub fn activation_span(id: &BoundaryId, priority: Priority, ticket: u64) -> tracing::Span {
    tracing::info_span!(
        "hydration.boundary",
        boundary_id = %id,
        priority = priority.get(),
        ticket = ticket,
    )
}

pub fn emit_boundary_registered(id: &BoundaryId, priority: Priority, trigger: TriggerKind) {
    info!(
        event = "boundary.registered",
        boundary_id = %id,
        priority = priority.get(),
        trigger = %trigger,
    );
}

pub fn emit_boundary_ready(id: &BoundaryId, cause: &ReadinessCause, waited_ms: u64) {
    info!(
        event = "boundary.ready",
        boundary_id = %id,
        cause = %cause,
        waited_ms = waited_ms,
    );
}

pub fn emit_hydration_started(id: &BoundaryId, queue_wait_ms: u64, active: usize, max_concurrent: usize) {
    info!(
        event = "hydration.started",
        boundary_id = %id,
        queue_wait_ms = queue_wait_ms,
        active = active,
        max_concurrent = max_concurrent,
    );
}

pub fn emit_hydration_completed(id: &BoundaryId, duration_ms: u64) {
    info!(event = "hydration.completed", boundary_id = %id, duration_ms = duration_ms);
}

/// Emit event: activation failed (warning level).
pub fn emit_hydration_failed(id: &BoundaryId, duration_ms: u64, kind: &str, error: &dyn std::fmt::Display) {
    warn!(
        event = "hydration.failed",
        boundary_id = %id,
        duration_ms = duration_ms,
        kind = kind,
        error = %error,
    );
}

pub fn emit_boundary_cancelled(id: &BoundaryId, reason: CancelReason) {
    info!(event = "boundary.cancelled", boundary_id = %id, reason = %reason);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emitters_do_not_panic_without_subscriber() {
        let id = BoundaryId::from("hero");
        emit_boundary_registered(&id, Priority::HIGHEST, TriggerKind::Visible);
        emit_boundary_ready(&id, &ReadinessCause::Timeout, 2000);
        emit_hydration_started(&id, 4, 1, 3);
        emit_hydration_completed(&id, 12);
        emit_hydration_failed(&id, 5000, "execution_timeout", &"did not settle");
        emit_boundary_cancelled(&id, CancelReason::Unregistered);
        let span = activation_span(&id, Priority::DEFAULT, 7);
        let _entered = span.enter();
    }
}
