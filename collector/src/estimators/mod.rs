//! # Estimators Module
//!
//! Stateful estimators that turn raw observations into comparable metrics.
//!
//! - **`BitrateEstimator`**: cumulative byte counters to Mbit/s
//! - **`RttEstimator`**: ICMP round trips of publisher hosts to smoothed milliseconds
//!
//! Neither estimator keeps state in memory. Everything that has to survive a cycle
//! lives in the injected [`Cache`](crate::cache::Cache), and anything unreadable
//! there is treated as a cold start.

mod bitrate;
mod probe;
mod rtt;

pub use bitrate::BitrateEstimator;
pub use probe::{
    parse_ping_output,
    PingProbe,
    Probe,
};
pub use rtt::RttEstimator;

use crate::cache::Cache;
use chrono::{
    DateTime,
    Utc,
};

/// Rounds to two decimals, the precision every published metric uses.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Exponentially weighted moving average, `alpha` weighs the newest sample.
pub(crate) fn ewma(alpha: f64, sample: f64, previous: f64) -> f64 {
    alpha * sample + (1.0 - alpha) * previous
}

pub(crate) fn seconds_between(earlier: DateTime<Utc>, later: DateTime<Utc>) -> f64 {
    (later - earlier).num_microseconds().unwrap_or(i64::MAX) as f64 / 1_000_000.0
}

pub(crate) fn encode_timestamp(ts: DateTime<Utc>) -> String {
    ts.timestamp_micros().to_string()
}

fn decode_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_micros(raw.trim().parse().ok()?)
}

/// Reads and parses `key`. Missing, unreadable and malformed values all yield `None`.
pub(crate) fn read_parsed<T: std::str::FromStr>(cache: &dyn Cache, key: &str) -> Option<T> {
    match cache.get(key) {
        Ok(value) => value?.trim().parse().ok(),
        Err(err) => {
            debug!(%key, %err, "Failed to read estimator state");
            None
        }
    }
}

pub(crate) fn read_timestamp(cache: &dyn Cache, key: &str) -> Option<DateTime<Utc>> {
    match cache.get(key) {
        Ok(value) => decode_timestamp(&value?),
        Err(err) => {
            debug!(%key, %err, "Failed to read estimator timestamp");
            None
        }
    }
}


#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn rounds_to_two_decimals() {
        assert_eq!(round2(1.23456), 1.23);
        assert_eq!(round2(1.235001), 1.24);
        assert_eq!(round2(0.004), 0.0);
        assert_eq!(round2(0.0), 0.0);
    }

    #[test]
    fn ewma_weighs_newest_sample_with_alpha() {
        assert_eq!(ewma(0.5, 4.0, 2.0), 3.0);
        assert_eq!(ewma(1.0, 4.0, 2.0), 4.0);
        assert!((ewma(0.25, 10.0, 2.0) - 4.0).abs() < 1e-12);
    }

    #[test]
    fn timestamps_round_trip_through_the_cache_encoding() {
        let ts = testing::at(12.345678);
        assert_eq!(decode_timestamp(&encode_timestamp(ts)), Some(ts));
        assert_eq!(decode_timestamp("not a number"), None);
    }
}
