//! Per-category state and the pool that recycles it.

use crossbeam_queue::SegQueue;
use crossbeam_utils::CachePadded;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use crate::ring::Ring;

/// Sentinel value of `next_allowed` meaning "no known block".
pub const NO_BLOCK: i64 = i64::MIN;

/// Rings larger than this are discarded rather than recycled, to keep the
/// pool from pinning memory for one category's burst forever.
const MAX_POOLED_RING_CAPACITY: usize = 1024;

/// The state the limiter tracks for one category.
///
/// `next_allowed` and `last_activity` each get their own cache line: the
/// lock-free fast path in [`crate::limiter::Limiter::allow`] reads
/// `next_allowed` from any thread, and sharing a line with other per-category
/// fields would force unrelated categories' fast-path reads to contend over
/// the same line under concurrent load.
pub struct CategoryRecord {
    pub next_allowed: CachePadded<AtomicI64>,
    pub last_activity: CachePadded<AtomicI64>,
    pub history: Mutex<Ring<i64>>,
}

impl CategoryRecord {
    fn fresh(initial_ring_capacity: usize, now_ns: i64) -> Self {
        Self {
            next_allowed: CachePadded::new(AtomicI64::new(NO_BLOCK)),
            last_activity: CachePadded::new(AtomicI64::new(now_ns)),
            history: Mutex::new(Ring::new(initial_ring_capacity).expect("power of two")),
        }
    }

    /// Resets a recycled record in place for reuse under a new key.
    fn reset(&self, now_ns: i64) {
        self.next_allowed.store(NO_BLOCK, Ordering::Relaxed);
        self.last_activity.store(now_ns, Ordering::Relaxed);
        self.history.lock().clear();
    }
}

/// A free-list of recycled [`CategoryRecord`]s.
///
/// Backed by a lock-free queue rather than a locked `Vec`, matching how this
/// codebase builds object pools elsewhere: the pool itself should never be
/// the contention point between unrelated categories.
pub struct RecordPool {
    free: SegQueue<Box<CategoryRecord>>,
    initial_ring_capacity: usize,
}

impl RecordPool {
    pub fn new(initial_ring_capacity: usize) -> Self {
        Self { free: SegQueue::new(), initial_ring_capacity: initial_ring_capacity.next_power_of_two() }
    }

    /// Takes a record from the pool, resetting it for `now_ns`, or allocates
    /// a fresh one if the pool is empty. Returns it already wrapped in the
    /// `Arc` the category map stores, since `Arc::from(Box<T>)` reuses the
    /// existing heap allocation instead of copying.
    pub fn acquire(&self, now_ns: i64) -> Arc<CategoryRecord> {
        match self.free.pop() {
            Some(record) => {
                record.reset(now_ns);
                Arc::from(record)
            }
            None => Arc::new(CategoryRecord::fresh(self.initial_ring_capacity, now_ns)),
        }
    }

    /// Returns a record to the pool, unless it is still shared (some caller
    /// is mid-`allow`) or its ring has grown too large to be worth
    /// recycling.
    pub fn release(&self, record: Arc<CategoryRecord>) {
        let Ok(record) = Arc::try_unwrap(record) else {
            return;
        };
        if record.history.lock().capacity() <= MAX_POOLED_RING_CAPACITY {
            self.free.push(Box::new(record));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_then_release_recycles() {
        let pool = RecordPool::new(16);
        let rec = pool.acquire(100);
        rec.next_allowed.store(500, Ordering::Relaxed);
        rec.history.lock().insert_at(0, 1).unwrap();
        pool.release(rec);

        let rec2 = pool.acquire(200);
        assert_eq!(rec2.next_allowed.load(Ordering::Relaxed), NO_BLOCK);
        assert_eq!(rec2.last_activity.load(Ordering::Relaxed), 200);
        assert_eq!(rec2.history.lock().len(), 0);
    }

    #[test]
    fn oversized_ring_is_not_pooled() {
        let pool = RecordPool::new(2);
        let rec = pool.acquire(0);
        {
            let mut h = rec.history.lock();
            for i in 0..2000i64 {
                h.insert_at(h.len(), i).unwrap();
            }
            assert!(h.capacity() > MAX_POOLED_RING_CAPACITY);
        }
        pool.release(rec);
        assert!(pool.free.is_empty());
    }

    #[test]
    fn still_shared_record_is_not_pooled() {
        let pool = RecordPool::new(16);
        let rec = pool.acquire(0);
        let _clone = Arc::clone(&rec);
        pool.release(rec);
        assert!(pool.free.is_empty());
    }
}
