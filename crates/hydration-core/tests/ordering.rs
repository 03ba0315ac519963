//! Dispatch order, the concurrency cap and runtime reconfiguration.

mod common;

use std::time::Duration;

use tokio::time::Instant;

use common::{drain, wait_for_completion, yield_many, Probe};
use hydration_core::{
    BoundaryDescriptor, BoundaryStatus, ConfigPatch, Scheduler, SchedulerConfig, SchedulerError,
    SchedulerEvent,
};

fn config(max_concurrent: usize) -> SchedulerConfig {
    SchedulerConfig {
        max_concurrent,
        ..SchedulerConfig::default()
    }
}

fn start_order(events: &[SchedulerEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|event| match event {
            SchedulerEvent::HydrationStart { id } => Some(id.to_string()),
            _ => None,
        })
        .collect()
}

#[tokio::test(start_paused = true)]
async fn immediate_boundaries_start_in_priority_order() {
    let probe = Probe::with_delay(Duration::from_millis(10));
    let scheduler = Scheduler::builder(probe.clone())
        .config(config(1))
        .build()
        .unwrap();
    let mut events = scheduler.subscribe();

    scheduler
        .register(BoundaryDescriptor::immediate("A").with_priority(1))
        .unwrap();
    scheduler
        .register(BoundaryDescriptor::immediate("B").with_priority(2))
        .unwrap();
    scheduler
        .register(BoundaryDescriptor::immediate("C").with_priority(4))
        .unwrap();
    wait_for_completion(&mut events, "C").await;

    assert_eq!(probe.started(), ["A", "B", "C"]);
}

#[tokio::test(start_paused = true)]
async fn held_queue_releases_highest_priority_first() {
    let probe = Probe::with_delay(Duration::from_millis(10));
    let scheduler = Scheduler::builder(probe.clone())
        .config(config(1))
        .build()
        .unwrap();
    let mut events = scheduler.subscribe();

    scheduler.pause_dispatch();
    for (id, priority) in [("low", 5), ("mid-1", 3), ("top", 1), ("mid-2", 3)] {
        scheduler
            .register(BoundaryDescriptor::immediate(id).with_priority(priority))
            .unwrap();
    }
    assert_eq!(scheduler.queue_len(), 4);
    let queued: Vec<String> = scheduler
        .queued_ids()
        .into_iter()
        .map(|id| id.to_string())
        .collect();
    assert_eq!(queued, ["top", "mid-1", "mid-2", "low"]);

    scheduler.resume_dispatch();
    scheduler.settled().await;

    let all = drain(&mut events);
    assert_eq!(start_order(&all), ["top", "mid-1", "mid-2", "low"]);
    assert_eq!(probe.started(), ["top", "mid-1", "mid-2", "low"]);
}

#[tokio::test(start_paused = true)]
async fn concurrency_cap_is_never_exceeded_and_slots_are_refilled() {
    let probe = Probe::with_delay(Duration::from_millis(100));
    let scheduler = Scheduler::builder(probe.clone())
        .config(config(2))
        .build()
        .unwrap();

    let start = Instant::now();
    for i in 0..6 {
        scheduler
            .register(BoundaryDescriptor::immediate(format!("b{i}")))
            .unwrap();
        assert!(scheduler.active_count() <= 2);
    }
    assert_eq!(scheduler.active_count(), 2);
    assert_eq!(scheduler.queue_len(), 4);

    scheduler.settled().await;
    let elapsed = start.elapsed();

    assert_eq!(probe.peak(), 2);
    assert_eq!(probe.started().len(), 6);
    // Three waves of two; any idle slot would add a fourth wave.
    assert!(elapsed >= Duration::from_millis(300), "{elapsed:?}");
    assert!(elapsed < Duration::from_millis(400), "{elapsed:?}");
    assert_eq!(scheduler.metrics().completed(), 6);
}

#[tokio::test(start_paused = true)]
async fn raising_the_cap_fills_new_slots_in_the_same_turn() {
    let probe = Probe::with_delay(Duration::from_millis(100));
    let scheduler = Scheduler::builder(probe.clone())
        .config(config(1))
        .build()
        .unwrap();

    for i in 0..4 {
        scheduler
            .register(BoundaryDescriptor::immediate(format!("b{i}")))
            .unwrap();
    }
    assert_eq!(scheduler.active_count(), 1);

    scheduler
        .configure(ConfigPatch::default().max_concurrent(3))
        .unwrap();
    assert_eq!(scheduler.active_count(), 3);
    assert_eq!(scheduler.queue_len(), 1);

    // Lowering never aborts running work.
    scheduler
        .configure(ConfigPatch::default().max_concurrent(1))
        .unwrap();
    assert_eq!(scheduler.active_count(), 3);

    scheduler.settled().await;
    assert_eq!(probe.peak(), 3);
    assert_eq!(scheduler.stats().complete, 4);
}

#[tokio::test(start_paused = true)]
async fn invalid_patch_leaves_configuration_untouched() {
    let scheduler = Scheduler::new(Probe::with_delay(Duration::ZERO)).unwrap();
    let before = scheduler.config();

    let err = scheduler
        .configure(
            ConfigPatch::default()
                .max_concurrent(5)
                .execution_timeout(Duration::ZERO),
        )
        .unwrap_err();
    assert!(matches!(err, SchedulerError::InvalidConfig(_)));
    assert_eq!(scheduler.config(), before);
}

#[tokio::test(start_paused = true)]
async fn new_default_execution_timeout_applies_to_later_starts() {
    let probe = Probe::with_delay(Duration::from_millis(500));
    let scheduler = Scheduler::builder(probe.clone())
        .config(config(1))
        .build()
        .unwrap();
    let mut events = scheduler.subscribe();

    scheduler
        .register(BoundaryDescriptor::immediate("first"))
        .unwrap();
    scheduler
        .register(BoundaryDescriptor::immediate("second"))
        .unwrap();
    scheduler
        .configure(ConfigPatch::default().execution_timeout(Duration::from_millis(200)))
        .unwrap();

    wait_for_completion(&mut events, "first").await;
    scheduler.settled().await;
    yield_many().await;

    assert_eq!(scheduler.status("first"), Some(BoundaryStatus::Complete));
    assert_eq!(scheduler.status("second"), Some(BoundaryStatus::Failed));
    assert_eq!(scheduler.metrics().execution_timeouts(), 1);
}
