//! Scheduler configuration.
//!
//! Defaults match a browser page with a handful of islands: three
//! concurrent activations, a 2s readiness safety net and a 5s cap on each
//! activation call. Values can be overlaid from `HYDRATION_*` environment
//! variables or deserialized from any serde format.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SchedulerError};
use crate::registry::millis;

pub const ENV_MAX_CONCURRENT: &str = "HYDRATION_MAX_CONCURRENT";
pub const ENV_READINESS_TIMEOUT_MS: &str = "HYDRATION_READINESS_TIMEOUT_MS";
pub const ENV_EXECUTION_TIMEOUT_MS: &str = "HYDRATION_EXECUTION_TIMEOUT_MS";
pub const ENV_COMPLETED_RETENTION: &str = "HYDRATION_COMPLETED_RETENTION";
pub const ENV_EVENT_CAPACITY: &str = "HYDRATION_EVENT_CAPACITY";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Simultaneous in-flight activation calls.
    pub max_concurrent: usize,
    /// Readiness deadline for boundaries that do not set their own.
    pub default_readiness_timeout_ms: u64,
    /// Activation deadline for boundaries that do not set their own.
    pub default_execution_timeout_ms: u64,
    /// Terminal boundaries kept for introspection before eviction.
    pub completed_retention: usize,
    /// Buffer of the event broadcast channel.
    pub event_capacity: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 3,
            default_readiness_timeout_ms: 2_000,
            default_execution_timeout_ms: 5_000,
            completed_retention: 64,
            event_capacity: 256,
        }
    }
}

impl SchedulerConfig {
    /// Defaults overlaid with the `HYDRATION_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overlaid with values from `lookup`, keyed by the
    /// `HYDRATION_*` variable names.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(value) = parse_var(&lookup, ENV_MAX_CONCURRENT)? {
            config.max_concurrent = value;
        }
        if let Some(value) = parse_var(&lookup, ENV_READINESS_TIMEOUT_MS)? {
            config.default_readiness_timeout_ms = value;
        }
        if let Some(value) = parse_var(&lookup, ENV_EXECUTION_TIMEOUT_MS)? {
            config.default_execution_timeout_ms = value;
        }
        if let Some(value) = parse_var(&lookup, ENV_COMPLETED_RETENTION)? {
            config.completed_retention = value;
        }
        if let Some(value) = parse_var(&lookup, ENV_EVENT_CAPACITY)? {
            config.event_capacity = value;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent == 0 {
            return Err(SchedulerError::InvalidConfig(
                "max_concurrent must be at least 1".to_string(),
            ));
        }
        if self.default_readiness_timeout_ms == 0 {
            return Err(SchedulerError::InvalidConfig(
                "default_readiness_timeout_ms must be positive".to_string(),
            ));
        }
        if self.default_execution_timeout_ms == 0 {
            return Err(SchedulerError::InvalidConfig(
                "default_execution_timeout_ms must be positive".to_string(),
            ));
        }
        if self.event_capacity == 0 {
            return Err(SchedulerError::InvalidConfig(
                "event_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Apply a partial update. The config is left untouched when the merged
    /// result would be invalid.
    pub fn apply(&mut self, patch: &ConfigPatch) -> Result<()> {
        let mut next = self.clone();
        if let Some(max_concurrent) = patch.max_concurrent {
            next.max_concurrent = max_concurrent;
        }
        if let Some(ms) = patch.default_readiness_timeout_ms {
            next.default_readiness_timeout_ms = ms;
        }
        if let Some(ms) = patch.default_execution_timeout_ms {
            next.default_execution_timeout_ms = ms;
        }
        next.validate()?;
        *self = next;
        Ok(())
    }

    pub fn readiness_timeout(&self) -> Duration {
        Duration::from_millis(self.default_readiness_timeout_ms)
    }

    pub fn execution_timeout(&self) -> Duration {
        Duration::from_millis(self.default_execution_timeout_ms)
    }
}

fn parse_var<F, T>(lookup: &F, key: &str) -> Result<Option<T>>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| SchedulerError::InvalidConfig(format!("{key}={raw:?} is not a valid number"))),
    }
}

/// Runtime update accepted by `Scheduler::configure`. Absent fields keep
/// their current value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigPatch {
    pub max_concurrent: Option<usize>,
    pub default_readiness_timeout_ms: Option<u64>,
    pub default_execution_timeout_ms: Option<u64>,
}

impl ConfigPatch {
    pub fn max_concurrent(mut self, value: usize) -> Self {
        self.max_concurrent = Some(value);
        self
    }

    pub fn readiness_timeout(mut self, timeout: Duration) -> Self {
        self.default_readiness_timeout_ms = Some(millis(timeout));
        self
    }

    pub fn execution_timeout(mut self, timeout: Duration) -> Self {
        self.default_execution_timeout_ms = Some(millis(timeout));
        self
    }

    pub fn is_empty(&self) -> bool {
        self == &ConfigPatch::default()
    }
}
