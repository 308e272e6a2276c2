use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
};

use log::{debug, trace};
use tokio::sync::watch;

use crate::OverlayError;

use super::{SessionInfo, Telemetry};

type Listener<S> = Arc<dyn Fn(Option<&S>) + Send + Sync>;

/// A listener panicking must not take every other subscriber down with it.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Shared<S> {
    state: Option<Arc<S>>,
    listeners: BTreeMap<u64, Listener<S>>,
    next_id: u64,
}

/// A single-writer, multi-reader container for the latest published state.
///
/// The state is replaced wholesale on every [`Store::set`] and is never mutated in
/// place, so readers holding an `Arc` from [`Store::get`] keep a consistent view.
/// Cloning a store clones the handle, not the state.
pub struct Store<S> {
    inner: Arc<Mutex<Shared<S>>>,
}

pub type TelemetryStore = Store<Telemetry>;
pub type SessionStore = Store<SessionInfo>;

impl<S> Clone for Store<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: Send + Sync + 'static> Default for Store<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Send + Sync + 'static> Store<S> {
    /// Creates an empty store. The state stays `None` until the first `set`.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Shared {
                state: None,
                listeners: BTreeMap::new(),
                next_id: 0,
            })),
        }
    }

    /// Replaces the current state and synchronously notifies every listener.
    ///
    /// The new state is visible to `get` before the first listener runs. Listeners
    /// registered while the notification pass is running are not called for this
    /// update.
    pub fn set(&self, state: Option<S>) {
        let state = state.map(Arc::new);
        let listeners: Vec<Listener<S>> = {
            let mut shared = lock(&self.inner);
            shared.state = state.clone();
            shared.listeners.values().cloned().collect()
        };
        trace!("Store updated, notifying {} listeners", listeners.len());
        for listener in &listeners {
            listener(state.as_deref());
        }
    }

    pub fn get(&self) -> Option<Arc<S>> {
        lock(&self.inner).state.clone()
    }

    /// Derives a value from the current state without copying it.
    pub fn select<R>(&self, selector: impl FnOnce(Option<&S>) -> R) -> R {
        let state = self.get();
        selector(state.as_deref())
    }

    /// Registers a listener on a derived value.
    ///
    /// On every update `selector` is re-run and the listener is called only if
    /// `equals` reports the result as different from the last one it saw. Returns the
    /// value selected from the current state along with the subscription guard;
    /// dropping the guard unregisters the listener.
    ///
    /// `selector` runs while the store is locked and must not call back into it.
    pub fn subscribe<R, Sel, Cmp, F>(
        &self,
        selector: Sel,
        equals: Cmp,
        listener: F,
    ) -> (R, StoreSubscription)
    where
        R: Clone + Send + 'static,
        Sel: Fn(Option<&S>) -> R + Send + Sync + 'static,
        Cmp: Fn(&R, &R) -> bool + Send + Sync + 'static,
        F: Fn(&R) + Send + Sync + 'static,
    {
        let mut shared = lock(&self.inner);
        let initial = selector(shared.state.as_deref());
        let previous = Mutex::new(initial.clone());
        let entry: Listener<S> = Arc::new(move |state: Option<&S>| {
            let next = selector(state);
            {
                let mut previous = lock(&previous);
                if equals(&previous, &next) {
                    return;
                }
                *previous = next.clone();
            }
            listener(&next);
        });

        let id = shared.next_id;
        shared.next_id += 1;
        shared.listeners.insert(id, entry);
        debug!("Store listener {} registered ({} total)", id, shared.listeners.len());
        drop(shared);

        let store: Weak<Mutex<Shared<S>>> = Arc::downgrade(&self.inner);
        let subscription = StoreSubscription {
            unsubscribe: Some(Box::new(move || {
                if let Some(inner) = store.upgrade() {
                    lock(&inner).listeners.remove(&id);
                    debug!("Store listener {} removed", id);
                }
            })),
        };
        (initial, subscription)
    }

    /// Unthrottled subscription exposing the selected value through a watch channel.
    pub fn watch<R, Sel, Cmp>(&self, selector: Sel, equals: Cmp) -> Selected<R>
    where
        R: Clone + Send + Sync + 'static,
        Sel: Fn(Option<&S>) -> R + Send + Sync + 'static,
        Cmp: Fn(&R, &R) -> bool + Send + Sync + 'static,
    {
        let (tx, rx) = watch::channel::<Option<R>>(None);
        let (initial, subscription) = self.subscribe(selector, equals, move |next: &R| {
            tx.send_replace(Some(next.clone()));
        });
        Selected {
            initial,
            receiver: rx,
            _subscription: subscription,
        }
    }

    pub fn listener_count(&self) -> usize {
        lock(&self.inner).listeners.len()
    }
}

impl Store<Telemetry> {
    pub fn set_telemetry(&self, telemetry: Option<Telemetry>) {
        self.set(telemetry);
    }
}

impl Store<SessionInfo> {
    pub fn set_session(&self, session: Option<SessionInfo>) {
        self.set(session);
    }
}

/// Guard returned by [`Store::subscribe`]. Unregisters the listener when dropped.
pub struct StoreSubscription {
    unsubscribe: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl StoreSubscription {
    pub fn unsubscribe(mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            unsubscribe();
        }
    }
}

impl Drop for StoreSubscription {
    fn drop(&mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            unsubscribe();
        }
    }
}

/// A derived value tracked without throttling, see [`Store::watch`].
pub struct Selected<R> {
    initial: R,
    // None until the first change after subscribing
    receiver: watch::Receiver<Option<R>>,
    _subscription: StoreSubscription,
}

impl<R: Clone> Selected<R> {
    pub fn get(&self) -> R {
        self.receiver
            .borrow()
            .clone()
            .unwrap_or_else(|| self.initial.clone())
    }

    pub fn has_changed(&self) -> bool {
        self.receiver.has_changed().unwrap_or(false)
    }

    pub fn mark_seen(&mut self) {
        self.receiver.mark_unchanged();
    }

    /// Waits until the selected value changes.
    pub async fn changed(&mut self) -> Result<(), OverlayError> {
        self.receiver
            .changed()
            .await
            .map_err(|_| OverlayError::StoreClosed)
    }
}
