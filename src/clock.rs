//! Injectable time sources.
//!
//! `allow`'s only notion of "now" is a [`Clock`]; the cleanup worker's only
//! notion of periodic wakeup is a [`Ticker`]. Both are swapped for
//! deterministic stubs in tests.

use std::sync::mpsc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// A source of the current instant, expressed as nanoseconds since an
/// arbitrary but fixed epoch.
pub trait Clock: Send + Sync + 'static {
    fn now_ns(&self) -> i64;
}

/// Real wall-clock time, nanoseconds since the Unix epoch.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ns(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock is before the Unix epoch")
            .as_nanos() as i64
    }
}

/// A periodic wakeup source for the cleanup worker.
///
/// `tick` blocks the calling thread until the next period elapses, or
/// returns immediately with `false` once the ticker has been stopped (so the
/// worker can observe shutdown without a separate channel).
pub trait Ticker: Send + 'static {
    fn tick(&mut self) -> bool;
}

/// A [`Ticker`] that simply sleeps for its period and always fires.
///
/// This is the default ticker the limiter's background worker uses: the
/// worker's own lifecycle (weak-reference upgrade failing, or the category
/// map going empty) is what stops it, not an external signal, so there is
/// nothing for a stop channel to buy in the common case.
pub struct SleepTicker {
    period: Duration,
}

impl SleepTicker {
    pub fn new(period: Duration) -> Self {
        Self { period }
    }
}

impl Ticker for SleepTicker {
    fn tick(&mut self) -> bool {
        std::thread::sleep(self.period);
        true
    }
}

/// A [`Ticker`] backed by a fixed period, stoppable from another thread.
///
/// Useful when a host wants to force the worker to wake up and re-evaluate
/// immediately (tests), or wants an explicit external shutdown signal rather
/// than relying on the worker's own weak-reference/empty-map detection.
pub struct ThreadTicker {
    period: Duration,
    stop_rx: mpsc::Receiver<()>,
}

/// The stop handle paired with a [`ThreadTicker`].
pub struct ThreadTickerHandle {
    stop_tx: mpsc::Sender<()>,
}

impl ThreadTickerHandle {
    pub fn stop(&self) {
        let _ = self.stop_tx.send(());
    }
}

impl ThreadTicker {
    pub fn new(period: Duration) -> (Self, ThreadTickerHandle) {
        let (stop_tx, stop_rx) = mpsc::channel();
        (Self { period, stop_rx }, ThreadTickerHandle { stop_tx })
    }
}

impl Ticker for ThreadTicker {
    fn tick(&mut self) -> bool {
        match self.stop_rx.recv_timeout(self.period) {
            // A stop signal (or a disconnected sender, meaning the handle
            // was dropped) both mean "stop ticking".
            Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => false,
            Err(mpsc::RecvTimeoutError::Timeout) => true,
        }
    }
}

/// A controllable clock for tests: advances only when told to.
#[cfg(any(test, feature = "test-util"))]
pub mod test_util {
    use super::{Clock, Ticker};
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicI64, Ordering};
    use std::sync::Arc;

    #[derive(Debug, Default, Clone)]
    pub struct StubClock {
        now_ns: Arc<AtomicI64>,
    }

    impl StubClock {
        pub fn new(start_ns: i64) -> Self {
            Self { now_ns: Arc::new(AtomicI64::new(start_ns)) }
        }

        pub fn set(&self, ns: i64) {
            self.now_ns.store(ns, Ordering::SeqCst);
        }

        pub fn advance(&self, delta_ns: i64) {
            self.now_ns.fetch_add(delta_ns, Ordering::SeqCst);
        }
    }

    impl Clock for StubClock {
        fn now_ns(&self) -> i64 {
            self.now_ns.load(Ordering::SeqCst)
        }
    }

    /// A manually-driven ticker: `tick()` blocks until `fire()` is called
    /// from the test thread, or returns `false` once `stop()` has been
    /// called.
    #[derive(Clone)]
    pub struct StubTicker {
        inner: Arc<Mutex<StubTickerInner>>,
        condvar: Arc<parking_lot::Condvar>,
    }

    struct StubTickerInner {
        pending_fires: u64,
        stopped: bool,
    }

    impl StubTicker {
        pub fn new() -> Self {
            Self {
                inner: Arc::new(Mutex::new(StubTickerInner { pending_fires: 0, stopped: false })),
                condvar: Arc::new(parking_lot::Condvar::new()),
            }
        }

        pub fn fire(&self) {
            let mut inner = self.inner.lock();
            inner.pending_fires += 1;
            self.condvar.notify_all();
        }

        pub fn stop(&self) {
            let mut inner = self.inner.lock();
            inner.stopped = true;
            self.condvar.notify_all();
        }
    }

    impl Default for StubTicker {
        fn default() -> Self {
            Self::new()
        }
    }

    impl Ticker for StubTicker {
        fn tick(&mut self) -> bool {
            let mut inner = self.inner.lock();
            loop {
                if inner.pending_fires > 0 {
                    inner.pending_fires -= 1;
                    return true;
                }
                if inner.stopped {
                    return false;
                }
                self.condvar.wait(&mut inner);
            }
        }
    }
}
