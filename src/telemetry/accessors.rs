//! Typed, throttled reads over the telemetry store.
//!
//! Every read selects a slice of the current snapshot, drops updates the matching
//! comparator reports as unchanged, and hands the rest to a [`Throttle`]. Missing keys
//! and kind mismatches read as the documented default (`None` or an empty vector).

use std::{fmt::Debug, sync::Arc, time::Duration};

use log::debug;
use tokio::sync::watch;

use crate::OverlayError;

use super::{
    SessionStore, Telemetry, TelemetryPrimitive, TelemetryStore, TelemetryVar,
    compare::{list_compare, option_compare, telemetry_compare},
    store::StoreSubscription,
    throttle::{Scheduler, Throttle, TokioScheduler},
};

trait Stage: Send + Sync {
    fn cancel(&self);
}

impl<T: Send> Stage for Throttle<T> {
    fn cancel(&self) {
        Throttle::cancel(self);
    }
}

/// A live, throttled read. Dropping it unsubscribes and cancels any pending emission.
pub struct Throttled<T> {
    receiver: watch::Receiver<T>,
    _subscription: StoreSubscription,
    stages: Vec<Arc<dyn Stage>>,
}

impl<T: Clone> Throttled<T> {
    /// The most recently emitted value.
    pub fn get(&self) -> T {
        self.receiver.borrow().clone()
    }

    /// Whether a value was emitted since the last [`Throttled::mark_seen`].
    pub fn has_changed(&self) -> bool {
        self.receiver.has_changed().unwrap_or(false)
    }

    pub fn mark_seen(&mut self) {
        self.receiver.mark_unchanged();
    }

    /// Waits for the next emission.
    pub async fn changed(&mut self) -> Result<(), OverlayError> {
        self.receiver
            .changed()
            .await
            .map_err(|_| OverlayError::StoreClosed)
    }

    pub fn unsubscribe(self) {}
}

impl<T> Drop for Throttled<T> {
    fn drop(&mut self) {
        for stage in &self.stages {
            stage.cancel();
        }
    }
}

fn select_var(telemetry: Option<&Telemetry>, key: &str) -> Option<TelemetryVar> {
    telemetry.and_then(|t| t.get(key)).cloned()
}

fn select_value<T: TelemetryPrimitive>(telemetry: Option<&Telemetry>, key: &str) -> Option<T> {
    telemetry
        .and_then(|t| t.get(key))
        .and_then(|var| T::slice(&var.value))
        .and_then(|values| values.first().cloned())
}

fn select_values<T: TelemetryPrimitive>(telemetry: Option<&Telemetry>, key: &str) -> Vec<T> {
    telemetry
        .and_then(|t| t.get(key))
        .and_then(|var| T::slice(&var.value))
        .map(|values| values.to_vec())
        .unwrap_or_default()
}

/// Shared handles for everything that reads or feeds telemetry.
///
/// Created once at start-up and passed to whoever needs it; tests build a fresh one
/// per case.
#[derive(Clone)]
pub struct TelemetryContext {
    pub telemetry: TelemetryStore,
    pub sessions: SessionStore,
    scheduler: Arc<dyn Scheduler>,
}

impl TelemetryContext {
    pub fn new(scheduler: Arc<dyn Scheduler>) -> Self {
        Self {
            telemetry: TelemetryStore::new(),
            sessions: SessionStore::new(),
            scheduler,
        }
    }

    /// Context whose throttle timers run on the current Tokio runtime.
    pub fn with_tokio() -> Result<Self, OverlayError> {
        Ok(Self::new(Arc::new(TokioScheduler::current()?)))
    }

    pub fn scheduler(&self) -> Arc<dyn Scheduler> {
        Arc::clone(&self.scheduler)
    }

    /// Builds the select -> compare -> throttle chain and returns the throttle together
    /// with the store subscription feeding it.
    fn throttled<R, Sel, Cmp>(
        &self,
        log_key: String,
        selector: Sel,
        equals: Cmp,
        delay: Duration,
        sink: impl FnMut(R) + Send + 'static,
    ) -> (Arc<Throttle<R>>, StoreSubscription)
    where
        R: Clone + Send + Sync + Debug + 'static,
        Sel: Fn(Option<&Telemetry>) -> R + Clone + Send + Sync + 'static,
        Cmp: Fn(&R, &R) -> bool + Clone + Send + Sync + 'static,
    {
        let initial = self.telemetry.select(|t| selector(t));
        let throttle = Arc::new(
            Throttle::new(initial.clone(), delay, self.scheduler(), sink).with_log_key(&log_key),
        );

        let feed = Arc::clone(&throttle);
        let (current, subscription) =
            self.telemetry
                .subscribe(selector, equals.clone(), move |next: &R| {
                    feed.push(next.clone())
                });
        // the snapshot may have been replaced between select and subscribe
        if !equals(&initial, &current) {
            throttle.push(current);
        }
        debug!("{} subscribed, throttle {:?}", log_key, delay);
        (throttle, subscription)
    }

    fn watched<R, Sel, Cmp>(
        &self,
        log_key: String,
        selector: Sel,
        equals: Cmp,
        delay: Duration,
    ) -> Throttled<R>
    where
        R: Clone + Send + Sync + Debug + 'static,
        Sel: Fn(Option<&Telemetry>) -> R + Clone + Send + Sync + 'static,
        Cmp: Fn(&R, &R) -> bool + Clone + Send + Sync + 'static,
    {
        let initial = self.telemetry.select(|t| selector(t));
        let (tx, receiver) = watch::channel(initial);
        let emitted_equals = equals.clone();
        // a value that went A -> B -> A inside one window is not a change for readers
        let (throttle, subscription) = self.throttled(log_key, selector, equals, delay, move |v| {
            tx.send_if_modified(|current| {
                if emitted_equals(current, &v) {
                    false
                } else {
                    *current = v;
                    true
                }
            });
        });
        Throttled {
            receiver,
            _subscription: subscription,
            stages: vec![throttle as Arc<dyn Stage>],
        }
    }

    /// The whole telemetry variable for `key`, `None` while it is absent.
    pub fn telemetry(&self, key: &str, throttle: Duration) -> Throttled<Option<TelemetryVar>> {
        let select_key = key.to_string();
        let drift_key = key.to_string();
        self.watched(
            format!("telemetry[{}]", key),
            move |t| select_var(t, &select_key),
            move |a: &Option<TelemetryVar>, b: &Option<TelemetryVar>| {
                if let (Some(a), Some(b)) = (a, b) {
                    if !a.value.same_shape(&b.value) {
                        debug!(
                            "{}: value shape changed from {:?}x{} to {:?}x{}",
                            drift_key,
                            a.value.kind(),
                            a.value.len(),
                            b.value.kind(),
                            b.value.len()
                        );
                    }
                }
                telemetry_compare(a.as_ref(), b.as_ref())
            },
            throttle,
        )
    }

    /// First element of the value sequence for `key`.
    pub fn telemetry_value<T: TelemetryPrimitive>(
        &self,
        key: &str,
        throttle: Duration,
    ) -> Throttled<Option<T>> {
        let select_key = key.to_string();
        self.watched(
            format!("telemetry_value[{}]", key),
            move |t| select_value::<T>(t, &select_key),
            option_compare::<T>,
            throttle,
        )
    }

    /// Full value sequence for `key`, empty while absent.
    pub fn telemetry_values<T: TelemetryPrimitive>(
        &self,
        key: &str,
        throttle: Duration,
    ) -> Throttled<Vec<T>> {
        let select_key = key.to_string();
        self.watched(
            format!("telemetry_values[{}]", key),
            move |t| select_values::<T>(t, &select_key),
            |a: &Vec<T>, b: &Vec<T>| list_compare(a, b),
            throttle,
        )
    }

    /// Value sequence for `key` with `map_fn` applied element-wise.
    ///
    /// The raw sequence is throttled first; `map_fn` only runs when an emitted raw
    /// sequence differs from the one it last mapped, and its output goes through a
    /// second throttle with the same window. `map_fn` must be pure.
    pub fn telemetry_values_mapped<T, U, F>(
        &self,
        key: &str,
        map_fn: F,
        throttle: Duration,
    ) -> Throttled<Vec<U>>
    where
        T: TelemetryPrimitive,
        U: TelemetryPrimitive,
        F: Fn(T) -> U + Send + Sync + 'static,
    {
        let raw: Vec<T> = self.telemetry.select(|t| select_values(t, key));
        let initial: Vec<U> = raw.iter().cloned().map(&map_fn).collect();
        let (tx, receiver) = watch::channel(initial.clone());
        let mapped = Arc::new(
            Throttle::new(initial, throttle, self.scheduler(), move |v: Vec<U>| {
                tx.send_if_modified(|current| {
                    if list_compare(current.as_slice(), v.as_slice()) {
                        false
                    } else {
                        *current = v;
                        true
                    }
                });
            })
            .with_log_key(format!("telemetry_values_mapped[{}]", key)),
        );

        let feed = Arc::clone(&mapped);
        let mut last_input = raw;
        let select_key = key.to_string();
        let (source, subscription) = self.throttled(
            format!("telemetry_values[{}]", key),
            move |t| select_values::<T>(t, &select_key),
            |a: &Vec<T>, b: &Vec<T>| list_compare(a, b),
            throttle,
            move |values: Vec<T>| {
                if list_compare(&last_input, &values) {
                    return;
                }
                let output = values.iter().cloned().map(&map_fn).collect();
                last_input = values;
                feed.push(output);
            },
        );

        Throttled {
            receiver,
            _subscription: subscription,
            stages: vec![source as Arc<dyn Stage>, mapped as Arc<dyn Stage>],
        }
    }
}
