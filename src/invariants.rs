//! Debug assertion macros for ring-buffer and limiter invariants.
//!
//! Only active in debug builds (`#[cfg(debug_assertions)]`), so there is
//! zero overhead in release builds.

// =============================================================================
// INV-RING-01: Bounded Length
// =============================================================================

/// **Invariant**: `0 <= len <= capacity`.
///
/// Used in: `Ring::insert_at`, `Ring::trim_front`, after mutating `len`.
macro_rules! debug_assert_len_le_capacity {
    ($len:expr, $capacity:expr) => {
        debug_assert!(
            $len <= $capacity,
            "INV-RING-01 violated: len {} exceeds capacity {}",
            $len,
            $capacity
        )
    };
}

// =============================================================================
// INV-RING-02: Power-of-Two Capacity
// =============================================================================

/// **Invariant**: `capacity` is a power of two (so masking replaces modulo).
///
/// Used in: `Ring::new`, `Ring::grow`.
macro_rules! debug_assert_power_of_two {
    ($capacity:expr) => {
        debug_assert!(
            $capacity.is_power_of_two(),
            "INV-RING-02 violated: capacity {} is not a power of two",
            $capacity
        )
    };
}

// =============================================================================
// INV-RATE-01: Non-Decreasing History
// =============================================================================

/// **Invariant**: consecutive timestamps inserted into a category's history
/// are non-decreasing, within the jitter tolerance the caller accepts by
/// always inserting at `search_first_ge(now)`.
///
/// Used in: `Limiter::allow` after `insert_at`.
macro_rules! debug_assert_non_decreasing {
    ($prev:expr, $next:expr) => {
        debug_assert!(
            $prev <= $next,
            "INV-RATE-01 violated: timestamp {} precedes {}",
            $next,
            $prev
        )
    };
}

// =============================================================================
// INV-LIM-01: Worker Flag / Map Emptiness Coupling
// =============================================================================

/// **Invariant**: the worker-running flag may only transition 1 -> 0 while
/// the limiter-wide write lock is held and the category map is empty.
///
/// Used in: `Limiter` cleanup worker, just before parking.
macro_rules! debug_assert_worker_stop_precondition {
    ($map_is_empty:expr) => {
        debug_assert!(
            $map_is_empty,
            "INV-LIM-01 violated: worker parked with categories still present"
        )
    };
}

pub(crate) use debug_assert_len_le_capacity;
pub(crate) use debug_assert_non_decreasing;
pub(crate) use debug_assert_power_of_two;
pub(crate) use debug_assert_worker_stop_precondition;
