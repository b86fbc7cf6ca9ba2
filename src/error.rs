//! Error types for rate configuration and ring-buffer invariants.

use std::time::Duration;

/// Errors returned when constructing a [`crate::Limiter`] or a [`crate::RateLimits`].
///
/// Not `Eq`: [`LimiterError::NonDecreasingEffectiveRate`] carries `f64`
/// rates, which only implement `PartialEq`.
#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum LimiterError {
    #[error("duration {0:?} must be positive")]
    NonPositiveDuration(Duration),

    #[error("limit for duration {duration:?} must be positive, got {limit}")]
    NonPositiveLimit { duration: Duration, limit: u32 },

    #[error(
        "rate limits must be strictly increasing with duration: {shorter:?} allows {shorter_limit} \
         but {longer:?} allows only {longer_limit}"
    )]
    NonMonotonicLimit {
        shorter: Duration,
        shorter_limit: u32,
        longer: Duration,
        longer_limit: u32,
    },

    #[error(
        "effective rate must strictly decrease with duration: {shorter:?} allows {shorter_rate} \
         events/sec but {longer:?} allows {longer_rate} events/sec, which is not lower"
    )]
    NonDecreasingEffectiveRate {
        shorter: Duration,
        shorter_rate: f64,
        longer: Duration,
        longer_rate: f64,
    },
}

/// Errors returned by [`crate::ring::Ring`] operations.
///
/// These indicate a programmer error in the caller of `Ring`'s API. The
/// `Limiter`'s own use of `Ring` never triggers them; they exist so
/// `Ring` can be tested and used standalone without panicking across an
/// API boundary.
#[derive(Debug, thiserror::Error, Clone, Copy, PartialEq, Eq)]
pub enum RingError {
    #[error("ring capacity must be a power of two, got {0}")]
    InvalidCapacity(usize),

    #[error("index {index} out of range for length {len}")]
    OutOfRange { index: usize, len: usize },
}
