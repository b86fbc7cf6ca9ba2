//! Rate configuration: validated (duration, limit) pairs and the retention
//! window they imply.

use std::collections::BTreeMap;
use std::time::Duration;

use crate::error::LimiterError;

/// A validated table of sliding-window rates: "at most `limit` events in any
/// trailing `duration`", for one or more durations.
///
/// Validity (checked once, at construction):
/// - every duration and limit is strictly positive;
/// - limits strictly increase with duration;
/// - the effective rate `limit / duration` strictly decreases with duration.
///
/// The last rule is what makes the longest window's events always a
/// superset of every shorter window's relevant events, which is what lets
/// [`crate::filter::evaluate`] compute a single combined trim point.
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimits {
    // Sorted ascending by duration.
    rates: Vec<(Duration, u32)>,
}

impl RateLimits {
    /// The largest configured window. Events older than this cannot affect
    /// any rate and are safe to discard unconditionally.
    pub fn retention(&self) -> Duration {
        self.rates.last().map_or(Duration::ZERO, |(d, _)| *d)
    }

    pub fn rates(&self) -> &[(Duration, u32)] {
        &self.rates
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }

    /// A rate table with no configured rates: [`crate::Limiter::allow`]
    /// admits unconditionally and never tracks any category state.
    pub fn unconditional() -> Self {
        Self { rates: Vec::new() }
    }

    fn validate(mut rates: Vec<(Duration, u32)>) -> Result<Self, LimiterError> {
        rates.sort_by_key(|(d, _)| *d);

        for (d, limit) in &rates {
            if *d == Duration::ZERO {
                return Err(LimiterError::NonPositiveDuration(*d));
            }
            if *limit == 0 {
                return Err(LimiterError::NonPositiveLimit { duration: *d, limit: *limit });
            }
        }

        for pair in rates.windows(2) {
            let (shorter, shorter_limit) = pair[0];
            let (longer, longer_limit) = pair[1];
            if longer_limit <= shorter_limit {
                return Err(LimiterError::NonMonotonicLimit {
                    shorter,
                    shorter_limit,
                    longer,
                    longer_limit,
                });
            }
            let shorter_rate = f64::from(shorter_limit) / shorter.as_secs_f64();
            let longer_rate = f64::from(longer_limit) / longer.as_secs_f64();
            if longer_rate >= shorter_rate {
                return Err(LimiterError::NonDecreasingEffectiveRate {
                    shorter,
                    shorter_rate,
                    longer,
                    longer_rate,
                });
            }
        }

        Ok(Self { rates })
    }
}

impl TryFrom<BTreeMap<Duration, u32>> for RateLimits {
    type Error = LimiterError;

    fn try_from(map: BTreeMap<Duration, u32>) -> Result<Self, Self::Error> {
        Self::validate(map.into_iter().collect())
    }
}

impl TryFrom<Vec<(Duration, u32)>> for RateLimits {
    type Error = LimiterError;

    fn try_from(rates: Vec<(Duration, u32)>) -> Result<Self, Self::Error> {
        Self::validate(rates)
    }
}

impl<const N: usize> TryFrom<[(Duration, u32); N]> for RateLimits {
    type Error = LimiterError;

    fn try_from(rates: [(Duration, u32); N]) -> Result<Self, Self::Error> {
        Self::validate(rates.to_vec())
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for RateLimits {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.rates.serialize(serializer)
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for RateLimits {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let rates = Vec::<(Duration, u32)>::deserialize(deserializer)?;
        Self::validate(rates).map_err(serde::de::Error::custom)
    }
}
