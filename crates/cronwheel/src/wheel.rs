//! Hashed wheel timer: the deferred-dispatch core.
//!
//! A single ring of power-of-two buckets. One worker task owns the buckets
//! exclusively; producers talk to it through two unbounded MPSC queues
//! (pending insertions and cancellations), so `submit` and `cancel` never
//! block. Each tick the worker drains both queues, then expires the current
//! bucket: entries whose round count reached zero fire, the rest wait one
//! more rotation.
//!
//! Dispatch accuracy is approximate by design: a timeout fires on the first
//! tick at or after its deadline, never before it.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::mpsc::{self, error::TryRecvError};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::Dispatch;
use crate::error::ShutdownError;

/// Pending insertions drained per tick, so a submit storm cannot starve
/// bucket expiry.
const MAX_PENDING_DRAIN: usize = 100_000;

const STATE_INIT: u8 = 0;
const STATE_CANCELLED: u8 = 1;
const STATE_EXPIRED: u8 = 2;

const WORKER_STARTED: u8 = 0;
const WORKER_SHUTDOWN: u8 = 1;

/// "Not linked into any bucket."
const UNLINKED: u64 = u64::MAX;

/// An opaque deferred task body.
///
/// `run` is invoked once, when the timeout expires. Panics and errors inside
/// the returned future are caught and logged; they never stop the wheel.
pub trait TimerTask: Send + Sync + 'static {
    fn run(&self, timeout: Timeout) -> BoxFuture<'static, ()>;
}

impl<F> TimerTask for F
where
    F: Fn(Timeout) -> BoxFuture<'static, ()> + Send + Sync + 'static,
{
    fn run(&self, timeout: Timeout) -> BoxFuture<'static, ()> {
        (self)(timeout)
    }
}

/// The state of one timeout. Transitions are monotonic and exclusive:
/// `Init -> Cancelled` or `Init -> Expired`, decided by a single CAS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutState {
    Init,
    Cancelled,
    Expired,
}

struct TimeoutInner {
    deadline: Instant,
    state: AtomicU8,
    /// `bucket << 32 | slot` while linked; only the worker moves a linked
    /// handle, so this is single-writer once placed.
    position: AtomicU64,
    task: Arc<dyn TimerTask>,
}

impl TimeoutInner {
    fn state(&self) -> TimeoutState {
        match self.state.load(Ordering::Acquire) {
            STATE_CANCELLED => TimeoutState::Cancelled,
            STATE_EXPIRED => TimeoutState::Expired,
            _ => TimeoutState::Init,
        }
    }
}

/// A cancellable reference to one pending timeout.
#[derive(Clone)]
pub struct Timeout {
    inner: Arc<TimeoutInner>,
    cancel_tx: mpsc::UnboundedSender<Arc<TimeoutInner>>,
    shared: Arc<Shared>,
}

impl Timeout {
    /// Absolute expiry target on the wheel's monotonic clock.
    pub fn deadline(&self) -> Instant {
        self.inner.deadline
    }

    pub fn state(&self) -> TimeoutState {
        self.inner.state()
    }

    pub fn is_cancelled(&self) -> bool {
        self.state() == TimeoutState::Cancelled
    }

    pub fn is_expired(&self) -> bool {
        self.state() == TimeoutState::Expired
    }

    /// Neither fired nor cancelled yet.
    pub fn is_pending(&self) -> bool {
        self.state() == TimeoutState::Init
    }

    /// Prevent an unfired timeout from firing. Non-blocking and idempotent;
    /// returns `true` iff this call performed the `Init -> Cancelled`
    /// transition. A timeout that already expired (or was already
    /// cancelled) returns `false`. A body that is currently executing is
    /// not interrupted.
    pub fn cancel(&self) -> bool {
        let cancelled = self
            .inner
            .state
            .compare_exchange(
                STATE_INIT,
                STATE_CANCELLED,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();
        if cancelled {
            self.shared.cancelled.fetch_add(1, Ordering::Relaxed);
            // The worker unlinks the handle on its next tick. After
            // shutdown there is no worker, and nothing left to unlink.
            let _ = self.cancel_tx.send(Arc::clone(&self.inner));
        }
        cancelled
    }

    /// Whether two handles refer to the same timeout.
    pub fn same_handle(&self, other: &Timeout) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl std::fmt::Debug for Timeout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Timeout")
            .field("deadline", &self.inner.deadline)
            .field("state", &self.inner.state())
            .finish()
    }
}

struct Shared {
    worker_state: AtomicU8,
    shutdown: Notify,
    submitted: AtomicU64,
    fired: AtomicU64,
    cancelled: AtomicU64,
}

struct BucketEntry {
    handle: Arc<TimeoutInner>,
    /// Full rotations left before this bucket visit expires the entry.
    rounds: u64,
}

/// One slot of the ring: entries in insertion order. Cancellation leaves a
/// tombstone (`None`) which the next visit compacts away.
#[derive(Default)]
struct WheelBucket {
    entries: Vec<Option<BucketEntry>>,
}

/// Ring-of-buckets timer with a single background worker.
///
/// Construct inside a tokio runtime; the worker is spawned immediately.
/// Dropping the timer without [`shutdown`](Self::shutdown) aborts the
/// worker.
pub struct HashedWheelTimer {
    pending_tx: mpsc::UnboundedSender<Arc<TimeoutInner>>,
    cancel_tx: mpsc::UnboundedSender<Arc<TimeoutInner>>,
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<Vec<Timeout>>>>,
    tick_duration: Duration,
    wheel_size: usize,
}

impl HashedWheelTimer {
    /// `wheel_size` is rounded up to the next power of two.
    pub fn new(tick_duration: Duration, wheel_size: usize, dispatch: Dispatch) -> Self {
        let size = wheel_size.max(1).next_power_of_two();
        let (pending_tx, pending_rx) = mpsc::unbounded_channel();
        let (cancel_tx, cancel_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            worker_state: AtomicU8::new(WORKER_STARTED),
            shutdown: Notify::new(),
            submitted: AtomicU64::new(0),
            fired: AtomicU64::new(0),
            cancelled: AtomicU64::new(0),
        });

        let worker = Worker {
            buckets: (0..size).map(|_| WheelBucket::default()).collect(),
            mask: size as u64 - 1,
            tick_nanos: tick_duration.as_nanos().max(1) as u64,
            tick: 0,
            start: Instant::now(),
            pending_rx,
            cancel_rx,
            cancel_tx: cancel_tx.clone(),
            shared: Arc::clone(&shared),
            dispatch,
        };
        let handle = tokio::spawn(worker.run());

        Self {
            pending_tx,
            cancel_tx,
            shared,
            worker: Mutex::new(Some(handle)),
            tick_duration,
            wheel_size: size,
        }
    }

    pub fn tick_duration(&self) -> Duration {
        self.tick_duration
    }

    pub fn wheel_size(&self) -> usize {
        self.wheel_size
    }

    /// Schedule `task` to run `delay` from now. Returns the cancellation
    /// handle, or an error after [`shutdown`](Self::shutdown).
    pub fn submit(
        &self,
        task: Arc<dyn TimerTask>,
        delay: Duration,
    ) -> Result<Timeout, ShutdownError> {
        if self.is_shutdown() {
            return Err(ShutdownError);
        }
        let inner = Arc::new(TimeoutInner {
            deadline: Instant::now() + delay,
            state: AtomicU8::new(STATE_INIT),
            position: AtomicU64::new(UNLINKED),
            task,
        });
        self.shared.submitted.fetch_add(1, Ordering::Relaxed);
        if self.pending_tx.send(Arc::clone(&inner)).is_err() {
            return Err(ShutdownError);
        }
        Ok(Timeout {
            inner,
            cancel_tx: self.cancel_tx.clone(),
            shared: Arc::clone(&self.shared),
        })
    }

    pub fn is_shutdown(&self) -> bool {
        self.shared.worker_state.load(Ordering::Acquire) == WORKER_SHUTDOWN
    }

    /// Stop the worker and return the handles that never fired. Idempotent;
    /// later calls return an empty set.
    pub async fn shutdown(&self) -> Vec<Timeout> {
        self.shared
            .worker_state
            .store(WORKER_SHUTDOWN, Ordering::Release);
        self.shared.shutdown.notify_waiters();
        let handle = self.worker.lock().take();
        match handle {
            Some(h) => match h.await {
                Ok(unfired) => unfired,
                Err(e) => {
                    tracing::error!(error = %e, "wheel worker ended abnormally");
                    Vec::new()
                }
            },
            None => Vec::new(),
        }
    }

    /// Timeouts accepted over the wheel's lifetime.
    pub fn submitted(&self) -> u64 {
        self.shared.submitted.load(Ordering::Relaxed)
    }

    /// Timeouts that expired and ran (or were dispatched to run).
    pub fn fired(&self) -> u64 {
        self.shared.fired.load(Ordering::Relaxed)
    }

    /// Timeouts cancelled before firing.
    pub fn cancelled(&self) -> u64 {
        self.shared.cancelled.load(Ordering::Relaxed)
    }
}

impl Drop for HashedWheelTimer {
    fn drop(&mut self) {
        if let Some(handle) = self.worker.lock().take() {
            handle.abort();
        }
    }
}

struct Worker {
    buckets: Vec<WheelBucket>,
    mask: u64,
    tick_nanos: u64,
    tick: u64,
    start: Instant,
    pending_rx: mpsc::UnboundedReceiver<Arc<TimeoutInner>>,
    cancel_rx: mpsc::UnboundedReceiver<Arc<TimeoutInner>>,
    cancel_tx: mpsc::UnboundedSender<Arc<TimeoutInner>>,
    shared: Arc<Shared>,
    dispatch: Dispatch,
}

impl Worker {
    async fn run(mut self) -> Vec<Timeout> {
        // The monotonic anchor: tick n ends at start + (n+1) * tick_duration.
        self.start = Instant::now();
        loop {
            let boundary =
                self.start + Duration::from_nanos(self.tick_nanos.saturating_mul(self.tick + 1));
            tokio::select! {
                _ = tokio::time::sleep_until(boundary) => {}
                _ = self.shared.shutdown.notified() => {}
            }
            if self.is_shutdown() {
                return self.drain_on_shutdown();
            }

            self.tick += 1;
            let idx = (self.tick & self.mask) as usize;
            self.drain_pending();
            self.drain_cancelled();
            self.expire_bucket(idx).await;

            if self.is_shutdown() {
                return self.drain_on_shutdown();
            }
        }
    }

    fn is_shutdown(&self) -> bool {
        self.shared.worker_state.load(Ordering::Acquire) == WORKER_SHUTDOWN
    }

    fn drain_pending(&mut self) {
        for _ in 0..MAX_PENDING_DRAIN {
            let handle = match self.pending_rx.try_recv() {
                Ok(h) => h,
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
            };
            if handle.state.load(Ordering::Acquire) == STATE_CANCELLED {
                // Cancelled before placement; nothing to unlink later.
                continue;
            }
            self.place(handle);
        }
    }

    fn place(&mut self, handle: Arc<TimeoutInner>) {
        let elapsed = handle
            .deadline
            .saturating_duration_since(self.start)
            .as_nanos() as u64;
        // Ceiling: the first tick whose boundary is at or past the deadline,
        // so nothing fires early.
        let due_tick = elapsed.div_ceil(self.tick_nanos);

        let (idx, rounds) = if due_tick <= self.tick {
            // Already due (misfire): current bucket, fires this very tick.
            ((self.tick & self.mask) as usize, 0)
        } else {
            let ticks_until = due_tick - self.tick;
            (
                ((self.tick + ticks_until) & self.mask) as usize,
                ticks_until / self.buckets.len() as u64,
            )
        };

        let slot = self.buckets[idx].entries.len() as u64;
        handle
            .position
            .store((idx as u64) << 32 | slot, Ordering::Release);
        self.buckets[idx]
            .entries
            .push(Some(BucketEntry { handle, rounds }));
    }

    fn drain_cancelled(&mut self) {
        loop {
            let handle = match self.cancel_rx.try_recv() {
                Ok(h) => h,
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
            };
            self.unlink(&handle);
        }
    }

    /// O(1) removal using the position the handle carries.
    fn unlink(&mut self, handle: &Arc<TimeoutInner>) {
        let pos = handle.position.swap(UNLINKED, Ordering::AcqRel);
        if pos == UNLINKED {
            return;
        }
        let (bucket, slot) = ((pos >> 32) as usize, (pos & u64::from(u32::MAX)) as usize);
        if let Some(entry) = self
            .buckets
            .get_mut(bucket)
            .and_then(|b| b.entries.get_mut(slot))
        {
            if entry
                .as_ref()
                .is_some_and(|e| Arc::ptr_eq(&e.handle, handle))
            {
                *entry = None;
            }
        }
    }

    async fn expire_bucket(&mut self, idx: usize) {
        if self.buckets[idx].entries.is_empty() {
            return;
        }
        let entries = std::mem::take(&mut self.buckets[idx].entries);
        let mut due = Vec::new();
        let mut survivors = Vec::new();
        for entry in entries.into_iter().flatten() {
            if entry.handle.state.load(Ordering::Acquire) == STATE_CANCELLED {
                entry.handle.position.store(UNLINKED, Ordering::Release);
                continue;
            }
            if entry.rounds > 0 {
                survivors.push(BucketEntry {
                    rounds: entry.rounds - 1,
                    handle: entry.handle,
                });
            } else {
                due.push(entry.handle);
            }
        }

        // Re-slot the survivors; their positions shift with compaction.
        let bucket = &mut self.buckets[idx];
        bucket.entries = Vec::with_capacity(survivors.len());
        for entry in survivors {
            let slot = bucket.entries.len() as u64;
            entry
                .handle
                .position
                .store((idx as u64) << 32 | slot, Ordering::Release);
            bucket.entries.push(Some(entry));
        }

        // Fire in insertion order.
        for handle in due {
            handle.position.store(UNLINKED, Ordering::Release);
            if handle
                .state
                .compare_exchange(
                    STATE_INIT,
                    STATE_EXPIRED,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_err()
            {
                // A concurrent cancellation won the race.
                continue;
            }
            self.shared.fired.fetch_add(1, Ordering::Relaxed);
            let timeout = Timeout {
                inner: Arc::clone(&handle),
                cancel_tx: self.cancel_tx.clone(),
                shared: Arc::clone(&self.shared),
            };
            let fut = handle.task.run(timeout);
            match self.dispatch {
                Dispatch::Spawned => {
                    tokio::spawn(async move {
                        if std::panic::AssertUnwindSafe(fut).catch_unwind().await.is_err() {
                            tracing::error!("timer task panicked");
                        }
                    });
                }
                Dispatch::Inline => {
                    if std::panic::AssertUnwindSafe(fut).catch_unwind().await.is_err() {
                        tracing::error!("timer task panicked");
                    }
                }
            }
        }
    }

    fn drain_on_shutdown(&mut self) -> Vec<Timeout> {
        let mut unfired = Vec::new();
        let keep = |handle: Arc<TimeoutInner>, unfired: &mut Vec<Timeout>| {
            handle.position.store(UNLINKED, Ordering::Release);
            if handle.state.load(Ordering::Acquire) == STATE_INIT {
                unfired.push(Timeout {
                    inner: handle,
                    cancel_tx: self.cancel_tx.clone(),
                    shared: Arc::clone(&self.shared),
                });
            }
        };

        for bucket in std::mem::take(&mut self.buckets) {
            for entry in bucket.entries.into_iter().flatten() {
                keep(entry.handle, &mut unfired);
            }
        }
        self.pending_rx.close();
        while let Ok(handle) = self.pending_rx.try_recv() {
            keep(handle, &mut unfired);
        }
        tracing::debug!(unfired = unfired.len(), "wheel worker stopped");
        unfired
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    fn timer(tick_ms: u64, dispatch: Dispatch) -> HashedWheelTimer {
        HashedWheelTimer::new(Duration::from_millis(tick_ms), 512, dispatch)
    }

    fn recording_task(log: Arc<Mutex<Vec<Instant>>>) -> Arc<dyn TimerTask> {
        Arc::new(move |_timeout: Timeout| -> BoxFuture<'static, ()> {
            let log = Arc::clone(&log);
            async move {
                log.lock().push(Instant::now());
            }
            .boxed()
        })
    }

    fn counting_task(count: Arc<AtomicUsize>) -> Arc<dyn TimerTask> {
        Arc::new(move |_timeout: Timeout| -> BoxFuture<'static, ()> {
            let count = Arc::clone(&count);
            async move {
                count.fetch_add(1, Ordering::SeqCst);
            }
            .boxed()
        })
    }

    #[tokio::test(start_paused = true)]
    async fn fires_within_one_tick_of_deadline_and_never_before() {
        let timer = timer(100, Dispatch::Inline);
        let log = Arc::new(Mutex::new(Vec::new()));
        let submitted_at = Instant::now();
        let delay = Duration::from_millis(250);
        let timeout = timer
            .submit(recording_task(Arc::clone(&log)), delay)
            .unwrap();

        tokio::time::sleep(Duration::from_secs(1)).await;

        let fired_at = log.lock()[0];
        let deadline = submitted_at + delay;
        assert!(fired_at >= deadline, "fired before the deadline");
        assert!(
            fired_at <= deadline + Duration::from_millis(150),
            "fired more than one tick late"
        );
        assert!(timeout.is_expired());
        assert_eq!(timer.fired(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn misfire_fires_on_the_first_tick_after_the_deadline() {
        // A 50 ms delay in a 200 ms wheel: the deadline passes while the
        // worker is still asleep; the handle fires on the first tick.
        let timer = timer(200, Dispatch::Inline);
        let log = Arc::new(Mutex::new(Vec::new()));
        let t0 = Instant::now();
        timer
            .submit(recording_task(Arc::clone(&log)), Duration::from_millis(50))
            .unwrap();

        tokio::time::sleep(Duration::from_millis(500)).await;

        let fired_at = log.lock()[0];
        assert!(fired_at >= t0 + Duration::from_millis(50));
        assert!(
            fired_at <= t0 + Duration::from_millis(210),
            "misfired handle must fire on the first tick"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_before_fire_wins() {
        let timer = timer(100, Dispatch::Inline);
        let count = Arc::new(AtomicUsize::new(0));
        let timeout = timer
            .submit(counting_task(Arc::clone(&count)), Duration::from_secs(5))
            .unwrap();

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(timeout.cancel(), "first cancel performs the transition");
        assert!(!timeout.cancel(), "second cancel is a no-op");

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0, "cancelled body must not run");
        assert!(timeout.is_cancelled());
        assert_eq!(timer.cancelled(), 1);
        assert_eq!(timer.fired(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_after_expiry_returns_false() {
        let timer = timer(100, Dispatch::Inline);
        let count = Arc::new(AtomicUsize::new(0));
        let timeout = timer
            .submit(counting_task(Arc::clone(&count)), Duration::from_millis(100))
            .unwrap();

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!timeout.cancel(), "cancel after expiry is a no-op");
        assert!(timeout.is_expired());
    }

    #[tokio::test(start_paused = true)]
    async fn distinct_deadlines_fire_in_deadline_order() {
        let timer = timer(100, Dispatch::Inline);
        let order = Arc::new(Mutex::new(Vec::new()));
        for (tag, delay_ms) in [("late", 800u64), ("early", 300), ("middle", 500)] {
            let order = Arc::clone(&order);
            let task: Arc<dyn TimerTask> =
                Arc::new(move |_t: Timeout| -> BoxFuture<'static, ()> {
                    let order = Arc::clone(&order);
                    async move {
                        order.lock().push(tag);
                    }
                    .boxed()
                });
            timer.submit(task, Duration::from_millis(delay_ms)).unwrap();
        }

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(*order.lock(), vec!["early", "middle", "late"]);
    }

    #[tokio::test(start_paused = true)]
    async fn same_deadline_fires_in_submission_order() {
        let timer = timer(100, Dispatch::Inline);
        let order = Arc::new(Mutex::new(Vec::new()));
        for i in 0..5usize {
            let order = Arc::clone(&order);
            let task: Arc<dyn TimerTask> =
                Arc::new(move |_t: Timeout| -> BoxFuture<'static, ()> {
                    let order = Arc::clone(&order);
                    async move {
                        order.lock().push(i);
                    }
                    .boxed()
                });
            timer.submit(task, Duration::from_millis(250)).unwrap();
        }

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(*order.lock(), vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test(start_paused = true)]
    async fn long_delays_survive_multiple_rotations() {
        // An 8-bucket wheel at 10 ms per tick covers 80 ms per rotation;
        // a 500 ms timeout needs several rounds.
        let timer = HashedWheelTimer::new(Duration::from_millis(10), 8, Dispatch::Inline);
        let log = Arc::new(Mutex::new(Vec::new()));
        let t0 = Instant::now();
        timer
            .submit(recording_task(Arc::clone(&log)), Duration::from_millis(500))
            .unwrap();

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(log.lock().is_empty(), "must not fire rotations early");

        tokio::time::sleep(Duration::from_millis(400)).await;
        let fired_at = log.lock()[0];
        assert!(fired_at >= t0 + Duration::from_millis(500));
        assert!(fired_at <= t0 + Duration::from_millis(520));
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_task_does_not_stop_the_worker() {
        let timer = timer(100, Dispatch::Inline);
        let panicking: Arc<dyn TimerTask> =
            Arc::new(move |_t: Timeout| -> BoxFuture<'static, ()> {
                async move { panic!("task body blew up") }.boxed()
            });
        timer.submit(panicking, Duration::from_millis(100)).unwrap();

        let count = Arc::new(AtomicUsize::new(0));
        timer
            .submit(counting_task(Arc::clone(&count)), Duration::from_millis(400))
            .unwrap();

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1, "worker must keep ticking");
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_returns_unfired_handles() {
        let timer = timer(100, Dispatch::Inline);
        let count = Arc::new(AtomicUsize::new(0));
        timer
            .submit(counting_task(Arc::clone(&count)), Duration::from_millis(100))
            .unwrap();
        let far = timer
            .submit(counting_task(Arc::clone(&count)), Duration::from_secs(60))
            .unwrap();

        tokio::time::sleep(Duration::from_millis(350)).await;
        let unfired = timer.shutdown().await;

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(unfired.len(), 1);
        assert!(unfired[0].same_handle(&far));
        assert!(unfired[0].is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn submit_after_shutdown_is_rejected() {
        let timer = timer(100, Dispatch::Inline);
        timer.shutdown().await;
        let count = Arc::new(AtomicUsize::new(0));
        let result = timer.submit(counting_task(count), Duration::from_millis(100));
        assert_eq!(result.err(), Some(ShutdownError));
    }

    #[tokio::test(start_paused = true)]
    async fn lifetime_conservation_of_handles() {
        let timer = timer(100, Dispatch::Inline);
        let count = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for i in 0..6u64 {
            let delay = Duration::from_millis(200 + 200 * i);
            handles.push(
                timer
                    .submit(counting_task(Arc::clone(&count)), delay)
                    .unwrap(),
            );
        }
        // Cancel two of the later ones before they can fire.
        assert!(handles[4].cancel());
        assert!(handles[5].cancel());

        tokio::time::sleep(Duration::from_millis(650)).await;
        let unfired = timer.shutdown().await;

        assert_eq!(timer.submitted(), 6);
        assert_eq!(timer.fired(), 3);
        assert_eq!(timer.cancelled(), 2);
        assert_eq!(unfired.len(), 1);
        assert_eq!(
            timer.fired() + timer.cancelled() + unfired.len() as u64,
            timer.submitted()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn spawned_dispatch_runs_bodies_off_the_worker() {
        let timer = timer(100, Dispatch::Spawned);
        let count = Arc::new(AtomicUsize::new(0));
        timer
            .submit(counting_task(Arc::clone(&count)), Duration::from_millis(100))
            .unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn wheel_size_rounds_up_to_power_of_two() {
        let timer = HashedWheelTimer::new(Duration::from_millis(100), 500, Dispatch::Inline);
        assert_eq!(timer.wheel_size(), 512);
        timer.shutdown().await;
    }
}
