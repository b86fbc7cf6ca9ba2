//! Multi-rate sliding-window evaluation over a single category's history.

use crate::rate::RateLimits;
use crate::ring::Ring;

/// Evaluates `history` against `rates` at `now_ns`, trimming `history`'s
/// prefix to only the events still relevant to some rate, and returning the
/// nanoseconds to wait before one more event would fit every rate (zero if
/// admission is possible right now).
///
/// An event exactly `duration` old is on the expiring edge and is treated as
/// outside the window: `search_first_ge(boundary + 1)` excludes it.
pub fn evaluate(now_ns: i64, rates: &RateLimits, history: &mut Ring<i64>) -> i64 {
    let n = history.len();
    let mut first_relevant = n;
    let mut wait = 0i64;

    for &(duration, limit) in rates.rates() {
        let boundary = now_ns - duration.as_nanos() as i64;
        let idx = history.search_first_ge(boundary + 1);
        first_relevant = first_relevant.min(idx);

        let count_in_window = n - idx;
        if count_in_window >= limit as usize {
            // The limit-th most recent event is the one that must age out
            // before another admission fits this rate.
            let pivot = history
                .get(n - limit as usize)
                .expect("n - limit is within [0, n) because count_in_window >= limit > 0");
            let shortfall = pivot - boundary;
            wait = wait.max(shortfall);
        }
    }

    history
        .trim_front(first_relevant)
        .expect("first_relevant is always <= history.len()");

    wait
}
