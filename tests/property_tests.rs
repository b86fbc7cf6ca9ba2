//! Property-based tests for the ring buffer and the multi-rate filter.

use proptest::prelude::*;
use ratecat::{evaluate, RateLimits, Ring};
use std::collections::VecDeque;
use std::time::Duration;

#[derive(Debug, Clone)]
enum RingOp {
    InsertAtFront(i64),
    InsertAtBack(i64),
    InsertAtMid(i64),
    TrimFront(usize),
}

fn ring_op_strategy() -> impl Strategy<Value = RingOp> {
    prop_oneof![
        any::<i64>().prop_map(RingOp::InsertAtFront),
        any::<i64>().prop_map(RingOp::InsertAtBack),
        any::<i64>().prop_map(RingOp::InsertAtMid),
        (0usize..8).prop_map(RingOp::TrimFront),
    ]
}

proptest! {
    /// === Ring matches a reference VecDeque under random insert/trim ===
    ///
    /// For any sequence of index-clamped inserts and trims, the ring's
    /// logical contents equal the same operations replayed on a
    /// `VecDeque`.
    #[test]
    fn prop_ring_matches_reference(ops in prop::collection::vec(ring_op_strategy(), 0..200)) {
        let mut ring: Ring<i64> = Ring::new(1).unwrap();
        let mut reference: VecDeque<i64> = VecDeque::new();

        for op in ops {
            match op {
                RingOp::InsertAtFront(v) => {
                    ring.insert_at(0, v).unwrap();
                    reference.push_front(v);
                }
                RingOp::InsertAtBack(v) => {
                    ring.insert_at(ring.len(), v).unwrap();
                    reference.push_back(v);
                }
                RingOp::InsertAtMid(v) => {
                    let i = reference.len() / 2;
                    ring.insert_at(i, v).unwrap();
                    reference.insert(i, v);
                }
                RingOp::TrimFront(k) => {
                    let k = k.min(reference.len());
                    ring.trim_front(k).unwrap();
                    reference.drain(0..k);
                }
            }
            prop_assert_eq!(ring.to_vec(), reference.iter().copied().collect::<Vec<_>>());
        }
    }

    /// === Ring never loses elements ===
    ///
    /// After N inserts and T trimmed elements, `len()` equals N minus the
    /// total trimmed, regardless of growth.
    #[test]
    fn prop_ring_bounded_count(
        inserts in prop::collection::vec(any::<i64>(), 0..100),
        trim_fracs in prop::collection::vec(0usize..100, 0..20),
    ) {
        let mut ring: Ring<i64> = Ring::new(1).unwrap();
        let mut inserted = 0usize;
        let mut trimmed = 0usize;

        for v in &inserts {
            ring.insert_at(ring.len(), *v).unwrap();
            inserted += 1;
        }
        for frac in trim_fracs {
            let k = (ring.len() * frac) / 100;
            ring.trim_front(k).unwrap();
            trimmed += k;
        }

        prop_assert_eq!(ring.len(), inserted - trimmed);
    }

    /// === search_first_ge brackets the target in a sorted ring ===
    #[test]
    fn prop_search_first_ge_brackets(mut values in prop::collection::vec(-1000i64..1000, 0..64), target in -1000i64..1000) {
        values.sort_unstable();
        let mut ring: Ring<i64> = Ring::new(1).unwrap();
        for v in &values {
            ring.insert_at(ring.len(), *v).unwrap();
        }

        let idx = ring.search_first_ge(target);
        if idx < ring.len() {
            prop_assert!(ring.get(idx).unwrap() >= target);
        }
        if idx > 0 {
            prop_assert!(ring.get(idx - 1).unwrap() < target);
        }
    }
}

fn valid_rates_strategy() -> impl Strategy<Value = Vec<(Duration, u32)>> {
    prop::collection::vec((1u64..=10, 1u32..=5), 1..4).prop_map(|mut pairs| {
        pairs.sort_by_key(|(d, _)| *d);
        pairs.dedup_by_key(|(d, _)| *d);
        let mut out = Vec::new();
        let mut last_limit = 0u32;
        let mut last_rate = f64::INFINITY;
        for (d, base_limit) in pairs {
            // Force strict monotonicity in both limit and effective rate by
            // construction, since random pairs rarely satisfy it on their own.
            let limit = (last_limit + base_limit).max(last_limit + 1);
            let rate = f64::from(limit) / d as f64;
            if rate < last_rate {
                out.push((Duration::from_secs(d), limit));
                last_limit = limit;
                last_rate = rate;
            }
        }
        out
    })
}

fn naive_count_in_window(history: &[i64], now: i64, duration: Duration) -> usize {
    let boundary = now - duration.as_nanos() as i64;
    history.iter().filter(|&&t| t > boundary && t <= now).count()
}

proptest! {
    /// === Filter agrees with a naive per-rate counter on which events
    /// remain inside at least one window ===
    #[test]
    fn prop_filter_equivalent_to_naive_counter(
        mut events in prop::collection::vec(-20_000_000_000i64..0, 0..30),
        rates in valid_rates_strategy(),
    ) {
        prop_assume!(!rates.is_empty());
        events.sort_unstable();
        let now = 0i64;
        let rates = RateLimits::try_from(rates).unwrap();

        let mut ring: Ring<i64> = Ring::new(1).unwrap();
        for &e in &events {
            ring.insert_at(ring.len(), e).unwrap();
        }

        let mut scratch = ring.clone();
        evaluate(now, &rates, &mut scratch);

        let retained = scratch.to_vec();
        for &e in &events {
            let still_relevant = rates.rates().iter().any(|&(d, _)| e > now - d.as_nanos() as i64);
            if retained.contains(&e) {
                prop_assert!(still_relevant, "retained event {} not relevant to any window", e);
            }
        }
    }

    /// === wait > 0 iff some rate is saturated, per the naive counter ===
    #[test]
    fn prop_wait_positivity_matches_naive_saturation(
        mut events in prop::collection::vec(-20_000_000_000i64..1, 0..30),
        rates in valid_rates_strategy(),
    ) {
        prop_assume!(!rates.is_empty());
        events.sort_unstable();
        let now = 0i64;
        let rates = RateLimits::try_from(rates.clone()).unwrap();

        let mut ring: Ring<i64> = Ring::new(1).unwrap();
        for &e in &events {
            ring.insert_at(ring.len(), e).unwrap();
        }

        let wait = evaluate(now, &rates, &mut ring);

        let any_saturated = rates
            .rates()
            .iter()
            .any(|&(d, lim)| naive_count_in_window(&events, now, d) >= lim as usize);

        prop_assert_eq!(wait > 0, any_saturated);
    }
}
