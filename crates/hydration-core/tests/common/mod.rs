//! Helpers shared by the scheduler integration tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;

use hydration_core::{BoundaryId, Hydrator, SchedulerEvent};

/// Hydrator that sleeps for a fixed time and records starts and peak
/// concurrency, overall and per boundary.
#[derive(Debug, Default)]
pub struct Probe {
    pub delay: Duration,
    active: AtomicUsize,
    peak: AtomicUsize,
    started: Mutex<Vec<String>>,
    /// Per boundary: (in flight, peak in flight).
    per_boundary: Mutex<HashMap<String, (usize, usize)>>,
}

impl Probe {
    pub fn with_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            ..Self::default()
        })
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn started(&self) -> Vec<String> {
        self.started.lock().unwrap().clone()
    }

    /// Most `hydrate` calls ever in flight at once for `id`.
    pub fn peak_for(&self, id: &str) -> usize {
        self.per_boundary
            .lock()
            .unwrap()
            .get(id)
            .map_or(0, |(_, peak)| *peak)
    }
}

#[async_trait]
impl Hydrator for Probe {
    async fn hydrate(&self, id: &BoundaryId) -> anyhow::Result<()> {
        self.started.lock().unwrap().push(id.to_string());
        {
            let mut per_boundary = self.per_boundary.lock().unwrap();
            let (active, peak) = per_boundary.entry(id.to_string()).or_default();
            *active += 1;
            *peak = (*peak).max(*active);
        }
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.active.fetch_sub(1, Ordering::SeqCst);
        if let Some((active, _)) = self.per_boundary.lock().unwrap().get_mut(id.as_str()) {
            *active -= 1;
        }
        Ok(())
    }
}

pub async fn next_event(rx: &mut broadcast::Receiver<SchedulerEvent>) -> SchedulerEvent {
    tokio::time::timeout(Duration::from_secs(60), rx.recv())
        .await
        .expect("timed out waiting for a scheduler event")
        .expect("event channel closed")
}

/// Skip events until one matches.
pub async fn wait_for<F>(rx: &mut broadcast::Receiver<SchedulerEvent>, matches: F) -> SchedulerEvent
where
    F: Fn(&SchedulerEvent) -> bool,
{
    loop {
        let event = next_event(rx).await;
        if matches(&event) {
            return event;
        }
    }
}

pub async fn wait_for_completion(rx: &mut broadcast::Receiver<SchedulerEvent>, id: &str) -> u64 {
    match wait_for(rx, |e| matches!(e, SchedulerEvent::HydrationComplete { id: done, .. } if done.as_str() == id)).await {
        SchedulerEvent::HydrationComplete { duration_ms, .. } => duration_ms,
        other => panic!("unexpected event {other:?}"),
    }
}

/// Everything already published.
pub fn drain(rx: &mut broadcast::Receiver<SchedulerEvent>) -> Vec<SchedulerEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

pub fn events_for<'a>(events: &'a [SchedulerEvent], id: &str) -> Vec<&'a SchedulerEvent> {
    events
        .iter()
        .filter(|event| event.boundary_id().as_str() == id)
        .collect()
}

/// Let spawned tasks run without advancing the paused clock.
pub async fn yield_many() {
    for _ in 0..32 {
        tokio::task::yield_now().await;
    }
}
