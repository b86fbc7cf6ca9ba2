//! The concurrent, per-category admission controller.

use std::hash::Hash;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::{debug, trace, warn};

use crate::clock::{Clock, SleepTicker, SystemClock, Ticker};
use crate::error::LimiterError;
use crate::filter;
use crate::invariants::{debug_assert_non_decreasing, debug_assert_worker_stop_precondition};
use crate::rate::RateLimits;
use crate::record::{CategoryRecord, RecordPool, NO_BLOCK};

/// The ring each category's history starts at before it ever grows.
const INITIAL_RING_CAPACITY: usize = 8;

/// Builds a fresh [`Ticker`] for a given period. The cleanup worker calls
/// this once, lazily, the first time it starts.
pub type TickerFactory = dyn Fn(Duration) -> Box<dyn Ticker> + Send + Sync;

/// The result of one [`Limiter::allow`] call.
///
/// `next_allowed_ns` is expressed in the same nanosecond timebase as the
/// limiter's [`Clock`]; with the default [`SystemClock`] that is nanoseconds
/// since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllowResult {
    pub admitted: bool,
    pub next_allowed_ns: Option<i64>,
}

struct Inner<K> {
    rates: RateLimits,
    retention_ns: i64,
    categories: DashMap<K, Arc<CategoryRecord>>,
    pool: RecordPool,
    clock: Arc<dyn Clock>,
    ticker_factory: Arc<TickerFactory>,
    worker_running: AtomicBool,
    /// Reader side: held across `allow`. Writer side: held across the
    /// cleanup worker's delete phase and its running-flag transition to
    /// false. This is what lets `allow` run concurrently with itself while
    /// still excluding it from a live category deletion.
    guard: RwLock<()>,
}

/// A concurrent sliding-window multi-rate categorical rate limiter.
///
/// Cloning a `Limiter` is cheap (an `Arc` bump) and shares all state,
/// including the background cleanup worker, with the original.
pub struct Limiter<K> {
    inner: Arc<Inner<K>>,
}

impl<K> Clone for Limiter<K> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<K> Limiter<K>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
{
    /// Validates `rates` and constructs a limiter using the real system
    /// clock and a sleep-based cleanup ticker.
    pub fn new<R>(rates: R) -> Result<Self, LimiterError>
    where
        RateLimits: TryFrom<R, Error = LimiterError>,
    {
        let rates = RateLimits::try_from(rates)?;
        Ok(Self::from_rates(rates))
    }

    /// Constructs a limiter from an already-validated [`RateLimits`].
    pub fn from_rates(rates: RateLimits) -> Self {
        Self::with_collaborators(
            rates,
            Arc::new(SystemClock),
            Arc::new(|period| Box::new(SleepTicker::new(period)) as Box<dyn Ticker>),
        )
    }

    /// Constructs a limiter with injected collaborators, for deterministic
    /// tests of timing-dependent behavior.
    pub fn with_collaborators(
        rates: RateLimits,
        clock: Arc<dyn Clock>,
        ticker_factory: Arc<TickerFactory>,
    ) -> Self {
        let retention_ns = rates.retention().as_nanos() as i64;
        let inner = Arc::new(Inner {
            rates,
            retention_ns,
            categories: DashMap::new(),
            pool: RecordPool::new(INITIAL_RING_CAPACITY),
            clock,
            ticker_factory,
            worker_running: AtomicBool::new(false),
            guard: RwLock::new(()),
        });
        Self { inner }
    }

    /// The number of categories currently tracked. Exposed for tests and
    /// diagnostics; not part of the admission contract.
    pub fn category_count(&self) -> usize {
        self.inner.categories.len()
    }

    /// Decides whether an event in `category` may proceed right now.
    ///
    /// Never blocks on anything but the limiter's internal locks, and never
    /// fails: a limiter built with no rates admits unconditionally.
    pub fn allow(&self, category: K) -> AllowResult {
        if self.inner.rates.is_empty() {
            return AllowResult { admitted: true, next_allowed_ns: None };
        }

        let _read_guard = self.inner.guard.read();
        let now_ns = self.inner.clock.now_ns();

        self.ensure_worker_running();

        let pool = &self.inner.pool;
        let record: Arc<CategoryRecord> =
            self.inner.categories.entry(category).or_insert_with(|| pool.acquire(now_ns)).clone();

        // Lock-free fast path: a category that is known-blocked short-
        // circuits without touching the per-category mutex at all.
        let cached = record.next_allowed.load(Ordering::Acquire);
        if cached != NO_BLOCK && now_ns < cached {
            return AllowResult { admitted: false, next_allowed_ns: Some(cached) };
        }

        let mut history = record.history.lock();

        // Re-check under the lock: the fast-path read above may have been
        // stale relative to a concurrent `allow` for the same category.
        let cached = record.next_allowed.load(Ordering::Acquire);
        if cached != NO_BLOCK && now_ns < cached {
            return AllowResult { admitted: false, next_allowed_ns: Some(cached) };
        }

        let last_activity = record.last_activity.load(Ordering::Relaxed);
        if last_activity < now_ns {
            record.last_activity.store(now_ns, Ordering::Relaxed);
        }

        let insert_at = history.search_first_ge(now_ns);
        history
            .insert_at(insert_at, now_ns)
            .expect("insert_at is within [0, len] by construction of search_first_ge");

        if insert_at > 0 {
            let prev = history.get(insert_at - 1).expect("insert_at - 1 is within bounds");
            debug_assert_non_decreasing!(prev, now_ns);
        }
        if insert_at + 1 < history.len() {
            let next = history.get(insert_at + 1).expect("insert_at + 1 is within bounds");
            debug_assert_non_decreasing!(now_ns, next);
        }

        let wait = filter::evaluate(now_ns, &self.inner.rates, &mut history);
        drop(history);

        if wait <= 0 {
            record.next_allowed.store(NO_BLOCK, Ordering::Release);
            AllowResult { admitted: true, next_allowed_ns: None }
        } else {
            let next = now_ns + wait;
            record.next_allowed.store(next, Ordering::Release);
            AllowResult { admitted: true, next_allowed_ns: Some(next) }
        }
    }

    /// Spawns the cleanup worker on the 0->1 transition of the running
    /// flag. The worker holds only a [`Weak`] reference to `Inner`, so it
    /// exits on its own once every `Limiter` handle referencing this state
    /// has been dropped.
    fn ensure_worker_running(&self) {
        if self
            .inner
            .worker_running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
        {
            let weak = Arc::downgrade(&self.inner);
            let spawned = std::thread::Builder::new()
                .name("ratecat-cleanup".to_string())
                .spawn(move || cleanup_worker_loop(weak));
            if let Err(err) = spawned {
                warn!(error = %err, "failed to spawn cleanup worker; clearing running flag");
                self.inner.worker_running.store(false, Ordering::Release);
            } else {
                debug!("cleanup worker spawned");
            }
        }
    }
}

fn cleanup_worker_loop<K>(weak: Weak<Inner<K>>)
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
{
    let period = {
        let Some(inner) = weak.upgrade() else { return };
        let half_retention = Duration::from_nanos((inner.retention_ns / 2).max(0) as u64);
        half_retention.max(Duration::from_secs(1))
    };
    let mut ticker = {
        let Some(inner) = weak.upgrade() else { return };
        (inner.ticker_factory)(period)
    };

    loop {
        if !ticker.tick() {
            trace!("cleanup ticker stopped");
            return;
        }
        let Some(inner) = weak.upgrade() else {
            trace!("limiter dropped; cleanup worker exiting");
            return;
        };
        run_cleanup_tick(&inner);
        if !inner.worker_running.load(Ordering::Acquire) {
            trace!("cleanup worker parked");
            return;
        }
    }
}

fn run_cleanup_tick<K>(inner: &Inner<K>)
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
{
    let scan_threshold = inner.clock.now_ns() - inner.retention_ns;
    let mut candidates = Vec::new();
    for entry in inner.categories.iter() {
        if entry.value().last_activity.load(Ordering::Relaxed) < scan_threshold {
            candidates.push(entry.key().clone());
        }
    }

    if candidates.is_empty() {
        park_if_empty(inner);
        return;
    }

    let _write_guard = inner.guard.write();
    let recheck_threshold = inner.clock.now_ns() - inner.retention_ns;
    let mut evicted = 0usize;
    for key in candidates {
        let removed = inner
            .categories
            .remove_if(&key, |_, record| record.last_activity.load(Ordering::Relaxed) < recheck_threshold);
        if let Some((_, record)) = removed {
            inner.pool.release(record);
            evicted += 1;
        }
    }
    if evicted > 0 {
        debug!(evicted, "cleanup worker evicted stale categories");
    }

    if inner.categories.is_empty() {
        debug_assert_worker_stop_precondition!(inner.categories.is_empty());
        inner.worker_running.store(false, Ordering::Release);
        debug!("cleanup worker parking: no categories remain");
    }
}

/// Handles the tick where nothing was stale enough to evict, but the map
/// may already be empty (e.g. a prior tick evicted everything and a race
/// kept the flag alive only long enough for one more tick).
fn park_if_empty<K>(inner: &Inner<K>)
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
{
    if !inner.categories.is_empty() {
        return;
    }
    let _write_guard = inner.guard.write();
    if inner.categories.is_empty() {
        debug_assert_worker_stop_precondition!(inner.categories.is_empty());
        inner.worker_running.store(false, Ordering::Release);
        debug!("cleanup worker parking: map observed empty");
    }
}
