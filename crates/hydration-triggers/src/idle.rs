//! Idle trigger: readiness on the next slice of otherwise unused time.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Slice length requested when a boundary gives no hint.
pub const DEFAULT_IDLE_SLICE_HINT: Duration = Duration::from_millis(50);

/// A granted unit of background processing time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdleSlice {
    /// Time the host expects to stay idle.
    pub budget: Duration,
    /// Set when the slice was granted because the request deadline passed
    /// rather than because the host went idle.
    pub did_timeout: bool,
}

impl IdleSlice {
    pub fn new(budget: Duration) -> Self {
        Self {
            budget,
            did_timeout: false,
        }
    }
}

/// Cooperative idle-time primitive.
///
/// `request_idle_slice` suspends until the host grants an idle slice.
/// `deadline` is the caller's preferred slice length; implementations backed
/// by idle callbacks pass it as the callback timeout.
#[async_trait]
pub trait IdleProvider: Send + Sync {
    async fn request_idle_slice(&self, deadline: Duration) -> IdleSlice;
}

/// Treats the host as idle after a fixed delay and grants the full
/// requested budget. Used as the default outside browsers.
#[derive(Debug, Clone, Copy)]
pub struct DelayIdleProvider {
    delay: Duration,
}

impl DelayIdleProvider {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }
}

impl Default for DelayIdleProvider {
    fn default() -> Self {
        Self::new(Duration::from_millis(16))
    }
}

#[async_trait]
impl IdleProvider for DelayIdleProvider {
    async fn request_idle_slice(&self, deadline: Duration) -> IdleSlice {
        tokio::time::sleep(self.delay).await;
        IdleSlice::new(deadline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn test_delay_provider_grants_after_delay() {
        let provider = DelayIdleProvider::new(Duration::from_millis(40));
        let start = Instant::now();
        let slice = provider
            .request_idle_slice(Duration::from_millis(25))
            .await;
        assert!(start.elapsed() >= Duration::from_millis(40));
        assert_eq!(slice.budget, Duration::from_millis(25));
        assert!(!slice.did_timeout);
    }
}
