//! The host activation callback.
//!
//! The scheduler never looks inside an activation: it awaits the returned
//! future and interprets settlement. Any `Err` is a hydration failure and is
//! forwarded verbatim to `HydrationError` subscribers.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use hydration_triggers::BoundaryId;

/// Performs the actual activation of the UI fragment behind a boundary.
#[async_trait]
pub trait Hydrator: Send + Sync {
    async fn hydrate(&self, id: &BoundaryId) -> anyhow::Result<()>;
}

#[async_trait]
impl<H: Hydrator + ?Sized> Hydrator for Arc<H> {
    async fn hydrate(&self, id: &BoundaryId) -> anyhow::Result<()> {
        (**self).hydrate(id).await
    }
}

/// [`Hydrator`] backed by an async closure.
pub struct FnHydrator<F> {
    hydrate: F,
}

/// Adapt `Fn(BoundaryId) -> impl Future<Output = anyhow::Result<()>>` into a
/// [`Hydrator`]. Inject a deterministic stub in tests; wire to the real
/// rendering runtime in production.
pub fn hydrator_fn<F, Fut>(hydrate: F) -> FnHydrator<F>
where
    F: Fn(BoundaryId) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    FnHydrator { hydrate }
}

#[async_trait]
impl<F, Fut> Hydrator for FnHydrator<F>
where
    F: Fn(BoundaryId) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    async fn hydrate(&self, id: &BoundaryId) -> anyhow::Result<()> {
        (self.hydrate)(id.clone()).await
    }
}

impl<F> fmt::Debug for FnHydrator<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnHydrator").finish_non_exhaustive()
    }
}
