//! ratecat - a concurrent sliding-window multi-rate categorical rate limiter.
//!
//! Register events against arbitrary category keys and get back, without
//! blocking, whether the event is admitted and the earliest instant a
//! further event in that category would be. A category may be governed by
//! several simultaneous rates (e.g. "10/second and 1000/hour"); admission
//! refuses if any configured rate would be exceeded.
//!
//! ```
//! use ratecat::{Limiter, RateLimits};
//! use std::time::Duration;
//!
//! let rates = RateLimits::try_from(vec![(Duration::from_secs(1), 2)]).unwrap();
//! let limiter: Limiter<&str> = Limiter::from_rates(rates);
//!
//! assert!(limiter.allow("user-42").admitted);
//! assert!(limiter.allow("user-42").admitted);
//! assert!(!limiter.allow("user-42").admitted);
//! ```

mod clock;
mod error;
pub mod filter;
mod invariants;
mod limiter;
mod rate;
mod record;
mod ring;

pub use clock::{Clock, SleepTicker, SystemClock, ThreadTicker, ThreadTickerHandle, Ticker};
pub use error::{LimiterError, RingError};
pub use filter::evaluate;
pub use limiter::{AllowResult, Limiter, TickerFactory};
pub use rate::RateLimits;
pub use ring::Ring;

#[cfg(any(test, feature = "test-util"))]
pub use clock::test_util;
