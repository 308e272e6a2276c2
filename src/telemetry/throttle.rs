use std::{
    collections::BTreeMap,
    fmt::Debug,
    sync::{Arc, Mutex, Weak},
    time::Duration,
};

use log::trace;
use tokio::runtime::Handle;

use crate::OverlayError;

use super::store::lock;

/// Throttle window used when a caller does not ask for a specific one.
pub const DEFAULT_THROTTLE: Duration = Duration::from_millis(100);

pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// A delayed-task primitive: run `task` once after `delay`, unless cancelled.
pub trait Scheduler: Send + Sync {
    fn schedule(&self, delay: Duration, task: Task) -> TimerHandle;
}

/// Cancellation handle for a scheduled task.
///
/// Dropping the handle detaches the timer, it does not cancel it.
pub struct TimerHandle {
    cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl TimerHandle {
    pub fn new(cancel: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    pub fn cancel(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

/// Runs timers as tasks on a Tokio runtime.
#[derive(Clone)]
pub struct TokioScheduler {
    handle: Handle,
}

impl TokioScheduler {
    /// Uses the runtime the caller is running on.
    pub fn current() -> Result<Self, OverlayError> {
        let handle =
            Handle::try_current().map_err(|e| OverlayError::NoAsyncRuntime { source: e })?;
        Ok(Self { handle })
    }

    pub fn from_handle(handle: Handle) -> Self {
        Self { handle }
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&self, delay: Duration, task: Task) -> TimerHandle {
        // fixed now so a late first poll of the task does not stretch the window
        let deadline = tokio::time::Instant::now() + delay;
        let join = self.handle.spawn(async move {
            tokio::time::sleep_until(deadline).await;
            task();
        });
        let abort = join.abort_handle();
        TimerHandle::new(move || abort.abort())
    }
}

#[derive(Default)]
struct ManualClock {
    now: Duration,
    next_id: u64,
    timers: BTreeMap<(Duration, u64), Task>,
}

/// A scheduler driven by an explicit virtual clock.
///
/// Nothing fires until [`ManualScheduler::advance`] is called; timers due within the
/// advanced span then run in deadline order, on the calling thread.
#[derive(Clone, Default)]
pub struct ManualScheduler {
    clock: Arc<Mutex<ManualClock>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Time elapsed on the virtual clock.
    pub fn now(&self) -> Duration {
        lock(&self.clock).now
    }

    /// Number of timers scheduled and not yet fired or cancelled.
    pub fn pending(&self) -> usize {
        lock(&self.clock).timers.len()
    }

    pub fn advance(&self, by: Duration) {
        let target = lock(&self.clock).now + by;
        loop {
            let due = {
                let mut clock = lock(&self.clock);
                match clock.timers.first_key_value().map(|(key, _)| *key) {
                    Some(key) if key.0 <= target => {
                        clock.now = key.0;
                        clock.timers.remove(&key)
                    }
                    _ => None,
                }
            };
            // run unlocked, tasks may schedule new timers
            match due {
                Some(task) => task(),
                None => break,
            }
        }
        lock(&self.clock).now = target;
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, delay: Duration, task: Task) -> TimerHandle {
        let key = {
            let mut clock = lock(&self.clock);
            let key = (clock.now + delay, clock.next_id);
            clock.next_id += 1;
            clock.timers.insert(key, task);
            key
        };
        let clock: Weak<Mutex<ManualClock>> = Arc::downgrade(&self.clock);
        TimerHandle::new(move || {
            if let Some(clock) = clock.upgrade() {
                lock(&clock).timers.remove(&key);
            }
        })
    }
}

type Sink<T> = Box<dyn FnMut(T) + Send>;

struct ThrottledCell<T> {
    emitted: T,
    pending: T,
    timer: Option<TimerHandle>,
    closed: bool,
    sink: Sink<T>,
}

/// Coalesces a fast stream of values into at most one emission per window.
///
/// Every pushed value overwrites the pending slot. The first push after an idle
/// period starts a timer for `delay`; when it fires the pending value (always the most
/// recent one) is handed to the sink. Values pushed while the timer is running are
/// coalesced into that single emission.
pub struct Throttle<T> {
    cell: Arc<Mutex<ThrottledCell<T>>>,
    scheduler: Arc<dyn Scheduler>,
    delay: Duration,
    log_key: String,
}

impl<T: Clone + Send + Debug + 'static> Throttle<T> {
    pub fn new(
        initial: T,
        delay: Duration,
        scheduler: Arc<dyn Scheduler>,
        sink: impl FnMut(T) + Send + 'static,
    ) -> Self {
        Self {
            cell: Arc::new(Mutex::new(ThrottledCell {
                emitted: initial.clone(),
                pending: initial,
                timer: None,
                closed: false,
                sink: Box::new(sink),
            })),
            scheduler,
            delay,
            log_key: "throttle".to_string(),
        }
    }

    /// Name used to tag trace output for this throttle.
    pub fn with_log_key(mut self, log_key: impl Into<String>) -> Self {
        self.log_key = log_key.into();
        self
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn push(&self, value: T) {
        let mut cell = lock(&self.cell);
        if cell.closed {
            return;
        }
        cell.pending = value;
        if cell.timer.is_some() {
            return;
        }

        let target = Arc::downgrade(&self.cell);
        let log_key = self.log_key.clone();
        let timer = self
            .scheduler
            .schedule(self.delay, Box::new(move || fire(&target, &log_key)));
        cell.timer = Some(timer);
    }

    /// The last value handed to the sink, or the initial value.
    pub fn value(&self) -> T {
        lock(&self.cell).emitted.clone()
    }

    pub fn is_scheduled(&self) -> bool {
        lock(&self.cell).timer.is_some()
    }
}

impl<T> Throttle<T> {
    /// Stops the throttle. Pending values are dropped and nothing is emitted once this
    /// returns.
    pub fn cancel(&self) {
        let timer = {
            let mut cell = lock(&self.cell);
            cell.closed = true;
            cell.timer.take()
        };
        if let Some(timer) = timer {
            trace!("{}: cancelling pending emission", self.log_key);
            timer.cancel();
        }
    }
}

impl<T> Drop for Throttle<T> {
    fn drop(&mut self) {
        self.cancel();
    }
}

fn fire<T: Clone + Debug>(target: &Weak<Mutex<ThrottledCell<T>>>, log_key: &str) {
    let Some(cell) = target.upgrade() else {
        return;
    };
    let mut guard = lock(&cell);
    let cell = &mut *guard;
    cell.timer = None;
    if cell.closed {
        return;
    }
    let value = cell.pending.clone();
    cell.emitted = value.clone();
    trace!("{}: {:?}", log_key, value);
    // emitted under the lock so a concurrent cancel cannot be overtaken
    (cell.sink)(value);
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn recorder<T: Send + 'static>() -> (Arc<Mutex<Vec<T>>>, impl FnMut(T) + Send + 'static) {
        let emitted = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&emitted);
        (emitted, move |value| sink.lock().unwrap().push(value))
    }

    fn ms(ms: u64) -> Duration {
        Duration::from_millis(ms)
    }

    #[test]
    fn test_first_push_emits_after_exactly_delay() {
        let scheduler = ManualScheduler::new();
        let (emitted, sink) = recorder();
        let throttle = Throttle::new(0, ms(100), Arc::new(scheduler.clone()), sink);

        throttle.push(1);
        assert!(throttle.is_scheduled());
        scheduler.advance(ms(99));
        assert!(emitted.lock().unwrap().is_empty());
        assert_eq!(throttle.value(), 0);

        scheduler.advance(ms(1));
        assert_eq!(*emitted.lock().unwrap(), vec![1]);
        assert_eq!(throttle.value(), 1);
        assert!(!throttle.is_scheduled());
    }

    #[test]
    fn test_values_within_window_coalesce_to_latest() {
        let scheduler = ManualScheduler::new();
        let (emitted, sink) = recorder();
        let throttle = Throttle::new(0, ms(100), Arc::new(scheduler.clone()), sink);

        throttle.push(1);
        scheduler.advance(ms(30));
        throttle.push(2);
        scheduler.advance(ms(30));
        throttle.push(3);
        scheduler.advance(ms(40));

        assert_eq!(*emitted.lock().unwrap(), vec![3]);
        // a single timer per window
        assert_eq!(scheduler.pending(), 0);
    }

    #[test]
    fn test_new_window_starts_on_next_push() {
        let scheduler = ManualScheduler::new();
        let (emitted, sink) = recorder();
        let throttle = Throttle::new(0, ms(100), Arc::new(scheduler.clone()), sink);

        throttle.push(1);
        scheduler.advance(ms(100));
        scheduler.advance(ms(500));
        throttle.push(2);
        scheduler.advance(ms(50));
        assert_eq!(*emitted.lock().unwrap(), vec![1]);
        scheduler.advance(ms(50));
        assert_eq!(*emitted.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn test_idle_throttle_never_emits() {
        let scheduler = ManualScheduler::new();
        let (emitted, sink) = recorder::<i32>();
        let _throttle = Throttle::new(0, ms(100), Arc::new(scheduler.clone()), sink);
        scheduler.advance(ms(1000));
        assert!(emitted.lock().unwrap().is_empty());
    }

    #[test]
    fn test_cancel_before_fire_suppresses_emission() {
        let scheduler = ManualScheduler::new();
        let (emitted, sink) = recorder();
        let throttle = Throttle::new(0, ms(100), Arc::new(scheduler.clone()), sink);

        throttle.push(1);
        throttle.cancel();
        assert_eq!(scheduler.pending(), 0);
        throttle.push(2);
        scheduler.advance(ms(500));
        assert!(emitted.lock().unwrap().is_empty());
    }

    #[test]
    fn test_drop_cancels_timer() {
        let scheduler = ManualScheduler::new();
        let (emitted, sink) = recorder();
        let throttle = Throttle::new(0, ms(100), Arc::new(scheduler.clone()), sink);

        throttle.push(1);
        drop(throttle);
        assert_eq!(scheduler.pending(), 0);
        scheduler.advance(ms(500));
        assert!(emitted.lock().unwrap().is_empty());
    }

    #[test]
    fn test_manual_scheduler_runs_timers_in_deadline_order() {
        let scheduler = ManualScheduler::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for (delay, tag) in [(30, "c"), (10, "a"), (20, "b")] {
            let order = Arc::clone(&order);
            let _ = scheduler.schedule(ms(delay), Box::new(move || order.lock().unwrap().push(tag)));
        }
        scheduler.advance(ms(25));
        assert_eq!(*order.lock().unwrap(), vec!["a", "b"]);
        assert_eq!(scheduler.now(), ms(25));
        scheduler.advance(ms(5));
        assert_eq!(*order.lock().unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_tokio_scheduler_requires_runtime() {
        assert!(matches!(
            TokioScheduler::current(),
            Err(OverlayError::NoAsyncRuntime { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokio_scheduler_emits_latest_after_delay() {
        let scheduler: Arc<dyn Scheduler> = Arc::new(TokioScheduler::current().unwrap());
        let (emitted, sink) = recorder();
        let throttle = Throttle::new(0, ms(100), scheduler, sink);

        throttle.push(1);
        throttle.push(2);
        tokio::time::sleep(ms(50)).await;
        assert!(emitted.lock().unwrap().is_empty());

        throttle.push(3);
        tokio::time::sleep(ms(60)).await;
        assert_eq!(*emitted.lock().unwrap(), vec![3]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokio_scheduler_cancel() {
        let scheduler: Arc<dyn Scheduler> = Arc::new(TokioScheduler::current().unwrap());
        let (emitted, sink) = recorder();
        let throttle = Throttle::new(0, ms(100), scheduler, sink);

        throttle.push(1);
        throttle.cancel();
        tokio::time::sleep(ms(300)).await;
        assert!(emitted.lock().unwrap().is_empty());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_burst_within_window_emits_last_value_once(
            values in prop::collection::vec(any::<i64>(), 1..50),
            gaps in prop::collection::vec(0u64..3, 50),
        ) {
            let scheduler = ManualScheduler::new();
            let (emitted, sink) = recorder();
            let throttle = Throttle::new(0i64, ms(100), Arc::new(scheduler.clone()), sink);

            // at most 49 * 2ms elapses between the first and last push
            for (value, gap) in values.iter().zip(&gaps) {
                throttle.push(*value);
                scheduler.advance(ms(*gap));
            }
            prop_assert!(emitted.lock().unwrap().is_empty());

            scheduler.advance(ms(100));
            let emitted = emitted.lock().unwrap();
            prop_assert_eq!(emitted.len(), 1);
            prop_assert_eq!(emitted[0], *values.last().unwrap());
        }
    }
}
