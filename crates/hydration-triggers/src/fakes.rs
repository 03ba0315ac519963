//! In-memory trigger providers (testing only)
//!
//! Each fake honours its provider contract but is driven explicitly by the
//! test instead of a browser: intersections are set, events dispatched and
//! idle slices granted by hand, so readiness order is fully deterministic.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::oneshot;

use crate::id::TriggerTarget;
use crate::idle::{IdleProvider, IdleSlice};
use crate::interaction::{InteractionEvent, InteractionProvider};
use crate::signal::{ReadinessCause, ReadySignal, Subscription};
use crate::visibility::{ObserverKey, VisibilityOptions, VisibilityProvider};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// FakeVisibilityProvider
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct ObservedTarget {
    target: TriggerTarget,
    signal: ReadySignal,
}

#[derive(Debug)]
struct FakeObserver {
    options: VisibilityOptions,
    targets: HashMap<u64, ObservedTarget>,
}

#[derive(Debug, Default)]
struct VisibilityState {
    observers: HashMap<ObserverKey, FakeObserver>,
    next_token: u64,
}

impl VisibilityState {
    fn unobserve(&mut self, key: &ObserverKey, token: u64) {
        if let Some(observer) = self.observers.get_mut(key) {
            observer.targets.remove(&token);
            if observer.targets.is_empty() {
                self.observers.remove(key);
            }
        }
    }
}

/// Intersection observer fake. Targets with identical
/// `(threshold, root_margin)` share one observer, like a real adapter would.
#[derive(Debug, Default)]
pub struct FakeVisibilityProvider {
    state: Arc<Mutex<VisibilityState>>,
}

impl FakeVisibilityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report an intersection ratio for `anchor`. Every observed target on
    /// that anchor whose threshold is met fires once and stops being
    /// observed. Returns the number of signals fired.
    pub fn set_intersection(&self, anchor: &str, ratio: f64) -> usize {
        let fired: Vec<ReadySignal> = {
            let mut state = lock(&self.state);
            let mut fired = Vec::new();
            for observer in state.observers.values_mut() {
                if !observer.options.is_met_by(ratio) {
                    continue;
                }
                let tokens: Vec<u64> = observer
                    .targets
                    .iter()
                    .filter(|(_, observed)| observed.target.anchor == anchor)
                    .map(|(token, _)| *token)
                    .collect();
                for token in tokens {
                    if let Some(observed) = observer.targets.remove(&token) {
                        fired.push(observed.signal);
                    }
                }
            }
            state.observers.retain(|_, observer| !observer.targets.is_empty());
            fired
        };

        for signal in &fired {
            signal.fire(ReadinessCause::Visible);
        }
        fired.len()
    }

    /// Number of live observer instances.
    pub fn observer_count(&self) -> usize {
        lock(&self.state).observers.len()
    }

    /// Number of targets currently observed across all observers.
    pub fn observed_count(&self) -> usize {
        lock(&self.state)
            .observers
            .values()
            .map(|observer| observer.targets.len())
            .sum()
    }

    pub fn is_observed(&self, anchor: &str) -> bool {
        lock(&self.state).observers.values().any(|observer| {
            observer
                .targets
                .values()
                .any(|observed| observed.target.anchor == anchor)
        })
    }
}

impl VisibilityProvider for FakeVisibilityProvider {
    fn observe(
        &self,
        target: &TriggerTarget,
        options: &VisibilityOptions,
        signal: ReadySignal,
    ) -> Subscription {
        let key = options.observer_key();
        let token = {
            let mut state = lock(&self.state);
            let token = state.next_token;
            state.next_token += 1;
            state
                .observers
                .entry(key.clone())
                .or_insert_with(|| FakeObserver {
                    options: options.clone(),
                    targets: HashMap::new(),
                })
                .targets
                .insert(
                    token,
                    ObservedTarget {
                        target: target.clone(),
                        signal,
                    },
                );
            token
        };

        let state: Weak<Mutex<VisibilityState>> = Arc::downgrade(&self.state);
        Subscription::new(move || {
            if let Some(state) = state.upgrade() {
                lock(&state).unobserve(&key, token);
            }
        })
    }
}

// ---------------------------------------------------------------------------
// FakeInteractionProvider
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct FakeListener {
    target: TriggerTarget,
    events: Vec<InteractionEvent>,
    signal: ReadySignal,
}

#[derive(Debug, Default)]
struct InteractionState {
    listeners: HashMap<u64, FakeListener>,
    next_token: u64,
}

/// DOM event-listener fake. Tracks one passive listener per
/// `(target, event)` pair so tests can assert nothing leaks.
#[derive(Debug, Default)]
pub struct FakeInteractionProvider {
    state: Arc<Mutex<InteractionState>>,
}

impl FakeInteractionProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dispatch `event` on `anchor`. Each listening target fires once and
    /// loses all of its listeners. Returns the number of signals fired.
    pub fn dispatch(&self, anchor: &str, event: InteractionEvent) -> usize {
        let fired: Vec<ReadySignal> = {
            let mut state = lock(&self.state);
            let tokens: Vec<u64> = state
                .listeners
                .iter()
                .filter(|(_, listener)| {
                    listener.target.anchor == anchor && listener.events.contains(&event)
                })
                .map(|(token, _)| *token)
                .collect();
            tokens
                .into_iter()
                .filter_map(|token| state.listeners.remove(&token))
                .map(|listener| listener.signal)
                .collect()
        };

        for signal in &fired {
            signal.fire(ReadinessCause::Interaction { event });
        }
        fired.len()
    }

    /// Number of attached DOM listeners (one per target and event kind).
    pub fn listener_count(&self) -> usize {
        lock(&self.state)
            .listeners
            .values()
            .map(|listener| listener.events.len())
            .sum()
    }

    pub fn is_listening(&self, anchor: &str) -> bool {
        lock(&self.state)
            .listeners
            .values()
            .any(|listener| listener.target.anchor == anchor)
    }
}

impl InteractionProvider for FakeInteractionProvider {
    fn listen(
        &self,
        target: &TriggerTarget,
        events: &[InteractionEvent],
        signal: ReadySignal,
    ) -> Subscription {
        let mut unique: Vec<InteractionEvent> = Vec::with_capacity(events.len());
        for event in events {
            if !unique.contains(event) {
                unique.push(*event);
            }
        }

        let token = {
            let mut state = lock(&self.state);
            let token = state.next_token;
            state.next_token += 1;
            state.listeners.insert(
                token,
                FakeListener {
                    target: target.clone(),
                    events: unique,
                    signal,
                },
            );
            token
        };

        let state = Arc::downgrade(&self.state);
        Subscription::new(move || {
            if let Some(state) = state.upgrade() {
                lock(&state).listeners.remove(&token);
            }
        })
    }
}

// ---------------------------------------------------------------------------
// ManualIdleProvider
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct IdleState {
    waiters: Vec<oneshot::Sender<IdleSlice>>,
    banked: Option<IdleSlice>,
    requests: usize,
}

/// Idle provider whose slices are granted by the test.
///
/// A grant with nobody waiting is banked and handed to the next request.
#[derive(Debug, Default)]
pub struct ManualIdleProvider {
    state: Mutex<IdleState>,
}

impl ManualIdleProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Grant one idle slice to every outstanding request. Returns the number
    /// of requests served (0 means the slice was banked).
    pub fn grant(&self, budget: Duration) -> usize {
        let slice = IdleSlice::new(budget);
        let mut state = lock(&self.state);
        let waiters = std::mem::take(&mut state.waiters);
        let mut served = 0;
        for waiter in waiters {
            if waiter.send(slice).is_ok() {
                served += 1;
            }
        }
        if served == 0 {
            state.banked = Some(slice);
        }
        served
    }

    /// Requests currently suspended waiting for a slice.
    pub fn waiting(&self) -> usize {
        lock(&self.state)
            .waiters
            .iter()
            .filter(|waiter| !waiter.is_closed())
            .count()
    }

    /// Total requests received so far.
    pub fn requests(&self) -> usize {
        lock(&self.state).requests
    }
}

#[async_trait]
impl IdleProvider for ManualIdleProvider {
    async fn request_idle_slice(&self, _deadline: Duration) -> IdleSlice {
        let receiver = {
            let mut state = lock(&self.state);
            state.requests += 1;
            if let Some(slice) = state.banked.take() {
                return slice;
            }
            let (tx, rx) = oneshot::channel();
            state.waiters.push(tx);
            rx
        };

        match receiver.await {
            Ok(slice) => slice,
            Err(_) => std::future::pending().await,
        }
    }
}

// ---------------------------------------------------------------------------
// NeverIdleProvider
// ---------------------------------------------------------------------------

/// Idle provider for a host that is never idle.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverIdleProvider;

#[async_trait]
impl IdleProvider for NeverIdleProvider {
    async fn request_idle_slice(&self, _deadline: Duration) -> IdleSlice {
        std::future::pending().await
    }
}
