//! Readiness timer: the per-boundary safety net forcing readiness when no
//! natural trigger fires in time.

use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use hydration_triggers::{ReadinessCause, ReadySignal};

/// A single cancellable timer. Cancelled on drop, so a timer can never fire
/// after its boundary has moved on.
#[derive(Debug)]
pub struct ReadinessTimer {
    task: JoinHandle<()>,
}

impl ReadinessTimer {
    /// Fire `signal` with [`ReadinessCause::Timeout`] once `timeout` has
    /// elapsed from `armed_at`.
    pub fn arm(runtime: &Handle, armed_at: Instant, timeout: Duration, signal: ReadySignal) -> Self {
        let deadline = armed_at + timeout;
        let task = runtime.spawn(async move {
            tokio::time::sleep_until(deadline).await;
            signal.fire(ReadinessCause::Timeout);
        });
        Self { task }
    }

    pub fn cancel(self) {
        drop(self);
    }
}

impl Drop for ReadinessTimer {
    fn drop(&mut self) {
        self.task.abort();
    }
}
