use super::{
    encode_timestamp,
    ewma,
    read_parsed,
    read_timestamp,
    seconds_between,
};
use crate::cache::{
    Cache,
    CacheResult,
};
use chrono::{
    DateTime,
    Utc,
};
use mediamtx_monitor_config::BitrateConfig;
use std::time::Duration;

const PREV_BYTES: &str = "prev_bytes";
const PREV_TS: &str = "prev_ts";
const EWMA_MBPS: &str = "ewma_mbps";

/// Last accepted counter sample of one traffic direction.
#[derive(Debug, Clone, Copy, PartialEq)]
struct CounterSample {
    counter: u64,
    observed_at: DateTime<Utc>,
}

/// Derives Mbit/s from two timestamped samples of a cumulative byte counter.
///
/// The state of every key lives in the cache under `<key>:prev_bytes`,
/// `<key>:prev_ts` and, with smoothing enabled, `<key>:ewma_mbps`. All of it
/// expires after `ttl` without a new sample.
#[derive(Debug, Clone, PartialEq)]
pub struct BitrateEstimator {
    min_interval: Duration,
    smoothing_alpha: Option<f64>,
    ttl: Duration,
}

impl From<&BitrateConfig> for BitrateEstimator {
    fn from(config: &BitrateConfig) -> Self {
        Self::new(config.min_interval(), config.smooth_alpha, config.ttl())
    }
}

impl BitrateEstimator {
    pub fn new(min_interval: Duration, smoothing_alpha: Option<f64>, ttl: Duration) -> Self {
        Self {
            min_interval,
            smoothing_alpha,
            ttl,
        }
    }

    /// Feeds one counter sample for `key` and returns the rate in Mbit/s once one
    /// can be computed.
    ///
    /// Returns `None` on the first sample of a key, when less than `min_interval`
    /// passed since the last accepted sample (state is left untouched then), after
    /// a counter reset and whenever the cache fails. The value is not rounded.
    pub fn estimate(&self, cache: &dyn Cache, key: &str, counter: u64, now: Option<DateTime<Utc>>) -> Option<f64> {
        if key.is_empty() {
            debug!("Bitrate estimation skipped for an empty key");
            return None;
        }
        let now = now.unwrap_or_else(Utc::now);

        match self.try_estimate(cache, key, counter, now) {
            Ok(rate) => rate,
            Err(err) => {
                debug!(%key, %err, "Bitrate estimation failed");
                // keep the next cycle from diffing against stale state
                if let Err(err) = self.store_sample(cache, key, counter, now) {
                    debug!(%key, %err, "Failed to store bitrate state after an error");
                }
                None
            }
        }
    }

    fn try_estimate(&self, cache: &dyn Cache, key: &str, counter: u64, now: DateTime<Utc>) -> CacheResult<Option<f64>> {
        let Some(previous) = self.load_sample(cache, key) else {
            trace!(%key, counter, "Cold start");
            self.store_sample(cache, key, counter, now)?;
            return Ok(None);
        };

        let dt = seconds_between(previous.observed_at, now);
        if dt <= 0.0 || dt < self.min_interval.as_secs_f64() {
            trace!(%key, dt, "Sample interval too short");
            return Ok(None);
        }

        let Some(delta) = counter.checked_sub(previous.counter) else {
            debug!(%key, previous = previous.counter, counter, "Counter reset detected");
            self.store_sample(cache, key, counter, now)?;
            return Ok(None);
        };

        let raw = (delta as f64 * 8.0) / (dt * 1_000_000.0);
        let mbps = self.smooth(cache, key, raw);

        self.store_sample(cache, key, counter, now)?;
        trace!(%key, delta, dt, raw, mbps, "Bitrate estimated");

        Ok(Some(mbps))
    }

    /// Blends `raw` into the stored average. Failures only cost the smoothing.
    fn smooth(&self, cache: &dyn Cache, key: &str, raw: f64) -> f64 {
        let Some(alpha) = self.smoothing_alpha else {
            return raw;
        };

        let ewma_key = state_key(key, EWMA_MBPS);
        let mbps = match read_parsed::<f64>(cache, &ewma_key) {
            Some(previous) if previous.is_finite() => ewma(alpha, raw, previous),
            _ => raw,
        };

        if let Err(err) = cache.set(&ewma_key, mbps.to_string(), Some(self.ttl)) {
            debug!(%key, %err, "Failed to store smoothed bitrate");
        }
        mbps
    }

    fn load_sample(&self, cache: &dyn Cache, key: &str) -> Option<CounterSample> {
        let counter = read_parsed::<u64>(cache, &state_key(key, PREV_BYTES))?;
        let observed_at = read_timestamp(cache, &state_key(key, PREV_TS))?;
        Some(CounterSample { counter, observed_at })
    }

    fn store_sample(&self, cache: &dyn Cache, key: &str, counter: u64, now: DateTime<Utc>) -> CacheResult<()> {
        cache.set_many(
            vec![
                (state_key(key, PREV_BYTES), counter.to_string()),
                (state_key(key, PREV_TS), encode_timestamp(now)),
            ],
            Some(self.ttl),
        )
    }

    /// Forgets everything stored for `key`.
    pub fn reset_state(cache: &dyn Cache, key: &str) {
        for suffix in [PREV_BYTES, PREV_TS, EWMA_MBPS] {
            if let Err(err) = cache.delete(&state_key(key, suffix)) {
                debug!(%key, %err, "Failed to reset bitrate state");
            }
        }
    }
}

fn state_key(key: &str, suffix: &str) -> String {
    format!("{key}:{suffix}")
}
