//! Visibility trigger: readiness once the anchor intersects the viewport.

use serde::{Deserialize, Serialize};

use crate::error::{TriggerError, TriggerResult};
use crate::id::TriggerTarget;
use crate::signal::{ReadySignal, Subscription};

/// Intersection ratio that counts as visible when none is configured.
pub const DEFAULT_VISIBILITY_THRESHOLD: f64 = 0.1;

/// Root margin used when none is configured.
pub const DEFAULT_ROOT_MARGIN: &str = "0px";

/// Parameters of an intersection observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisibilityOptions {
    /// Ratio in `[0, 1]` the observed intersection must meet or exceed.
    pub threshold: f64,
    /// CSS-style margin grown around the root before intersecting.
    pub root_margin: String,
}

impl Default for VisibilityOptions {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_VISIBILITY_THRESHOLD,
            root_margin: DEFAULT_ROOT_MARGIN.to_string(),
        }
    }
}

impl VisibilityOptions {
    pub fn with_threshold(threshold: f64) -> Self {
        Self {
            threshold,
            ..Self::default()
        }
    }

    pub fn root_margin(mut self, margin: impl Into<String>) -> Self {
        self.root_margin = margin.into();
        self
    }

    pub fn validate(&self) -> TriggerResult<()> {
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(TriggerError::InvalidThreshold {
                threshold: self.threshold.to_string(),
            });
        }
        Ok(())
    }

    /// Whether an observed ratio satisfies this observation.
    pub fn is_met_by(&self, ratio: f64) -> bool {
        ratio >= self.threshold
    }

    /// Key under which boundaries may share one underlying observer.
    pub fn observer_key(&self) -> ObserverKey {
        ObserverKey {
            threshold_bits: self.threshold.to_bits(),
            root_margin: self.root_margin.clone(),
        }
    }
}

/// Identity of an observer instance: boundaries with equal
/// `(threshold, root_margin)` can be multiplexed onto one observer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObserverKey {
    threshold_bits: u64,
    root_margin: String,
}

impl ObserverKey {
    pub fn threshold(&self) -> f64 {
        f64::from_bits(self.threshold_bits)
    }

    pub fn root_margin(&self) -> &str {
        &self.root_margin
    }
}

/// Adapter over an intersection-observation capability.
///
/// Contract:
/// - fire `signal` with [`crate::ReadinessCause::Visible`] the first time the
///   intersection ratio of `target.anchor` meets `options.threshold`;
/// - stop observing the target right after firing;
/// - stop observing when the returned [`Subscription`] is disposed.
///
/// `observe` and the subscription release run while the scheduler holds its
/// state lock. They must not call back into the scheduler. Firing `signal`
/// from inside `observe`, for an anchor that is already visible, is fine.
pub trait VisibilityProvider: Send + Sync {
    fn observe(
        &self,
        target: &TriggerTarget,
        options: &VisibilityOptions,
        signal: ReadySignal,
    ) -> Subscription;
}

/// Provider for environments without intersection observation. Never
/// fires; visible boundaries rely on their readiness timeout.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullVisibilityProvider;

impl VisibilityProvider for NullVisibilityProvider {
    fn observe(
        &self,
        target: &TriggerTarget,
        _options: &VisibilityOptions,
        _signal: ReadySignal,
    ) -> Subscription {
        tracing::debug!(
            boundary_id = %target.boundary,
            "visibility observation unavailable; waiting for readiness timeout"
        );
        Subscription::noop()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = VisibilityOptions::default();
        assert_eq!(options.threshold, 0.1);
        assert_eq!(options.root_margin, "0px");
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let options = VisibilityOptions::with_threshold(0.5);
        assert!(!options.is_met_by(0.49));
        assert!(options.is_met_by(0.5));
        assert!(options.is_met_by(0.6));
    }

    #[test]
    fn test_out_of_range_threshold_rejected() {
        assert!(VisibilityOptions::with_threshold(1.2).validate().is_err());
        assert!(VisibilityOptions::with_threshold(-0.1).validate().is_err());
        assert!(VisibilityOptions::with_threshold(f64::NAN).validate().is_err());
        assert!(VisibilityOptions::with_threshold(1.0).validate().is_ok());
    }

    #[test]
    fn test_observer_key_groups_identical_options() {
        let a = VisibilityOptions::with_threshold(0.25).root_margin("10px");
        let b = VisibilityOptions::with_threshold(0.25).root_margin("10px");
        let c = VisibilityOptions::with_threshold(0.25);
        assert_eq!(a.observer_key(), b.observer_key());
        assert_ne!(a.observer_key(), c.observer_key());
        assert_eq!(a.observer_key().threshold(), 0.25);
    }

    #[test]
    fn test_options_deserialize_with_defaults() {
        let options: VisibilityOptions = serde_json::from_str(r#"{"threshold":0.5}"#).unwrap();
        assert_eq!(options.threshold, 0.5);
        assert_eq!(options.root_margin, DEFAULT_ROOT_MARGIN);
    }
}
