//! Provider contracts as seen by a scheduler: signals fire once, and
//! disposing a subscription leaves nothing attached.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use hydration_triggers::fakes::{FakeInteractionProvider, FakeVisibilityProvider, ManualIdleProvider};
use hydration_triggers::{
    BoundaryId, DelayIdleProvider, IdleProvider, InteractionEvent, InteractionProvider,
    ReadinessCause, ReadySignal, TriggerTarget, VisibilityOptions, VisibilityProvider,
    DEFAULT_INTERACTION_EVENTS,
};

fn recorder() -> (ReadySignal, Arc<Mutex<Vec<ReadinessCause>>>) {
    let causes = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&causes);
    let signal = ReadySignal::new(move |cause| sink.lock().unwrap().push(cause));
    (signal, causes)
}

fn target(id: &str, anchor: &str) -> TriggerTarget {
    TriggerTarget::new(BoundaryId::from(id), anchor)
}

#[test]
fn visibility_targets_fire_independently_per_anchor() {
    let provider = FakeVisibilityProvider::new();
    let options = VisibilityOptions::with_threshold(0.5);
    let (first, first_causes) = recorder();
    let (second, second_causes) = recorder();

    let _a = provider.observe(&target("a", "#a"), &options, first);
    let _b = provider.observe(&target("b", "#b"), &options, second);
    assert_eq!(provider.observer_count(), 1);

    assert_eq!(provider.set_intersection("#a", 0.5), 1);
    assert_eq!(provider.set_intersection("#a", 0.9), 0);

    assert_eq!(*first_causes.lock().unwrap(), [ReadinessCause::Visible]);
    assert!(second_causes.lock().unwrap().is_empty());
    assert!(provider.is_observed("#b"));
    assert!(!provider.is_observed("#a"));
}

#[test]
fn dropping_subscriptions_leaves_no_listeners() {
    let provider = FakeInteractionProvider::new();
    let (signal, causes) = recorder();

    let subscription = provider.listen(
        &target("card", "#card"),
        &DEFAULT_INTERACTION_EVENTS,
        signal,
    );
    assert_eq!(provider.listener_count(), DEFAULT_INTERACTION_EVENTS.len());

    drop(subscription);
    assert_eq!(provider.listener_count(), 0);
    assert_eq!(provider.dispatch("#card", InteractionEvent::PointerEnter), 0);
    assert!(causes.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn delay_provider_grants_requested_budget() {
    let provider = DelayIdleProvider::new(Duration::from_millis(16));
    let start = tokio::time::Instant::now();

    let slice = provider.request_idle_slice(Duration::from_millis(50)).await;

    assert!(start.elapsed() >= Duration::from_millis(16));
    assert_eq!(slice.budget, Duration::from_millis(50));
    assert!(!slice.did_timeout);
}

#[tokio::test(start_paused = true)]
async fn manual_idle_serves_concurrent_requests_with_one_grant() {
    let provider = Arc::new(ManualIdleProvider::new());
    let first = tokio::spawn({
        let provider = Arc::clone(&provider);
        async move { provider.request_idle_slice(Duration::from_millis(50)).await }
    });
    let second = tokio::spawn({
        let provider = Arc::clone(&provider);
        async move { provider.request_idle_slice(Duration::from_millis(50)).await }
    });
    while provider.waiting() < 2 {
        tokio::task::yield_now().await;
    }

    assert_eq!(provider.grant(Duration::from_millis(8)), 2);
    assert_eq!(first.await.unwrap().budget, Duration::from_millis(8));
    assert_eq!(second.await.unwrap().budget, Duration::from_millis(8));
    assert_eq!(provider.requests(), 2);
}
