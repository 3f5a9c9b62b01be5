use super::{
    encode_timestamp,
    ewma,
    read_parsed,
    read_timestamp,
    seconds_between,
    Probe,
};
use crate::{
    cache::Cache,
    metrics::parse_host,
};
use chrono::{
    DateTime,
    Utc,
};
use mediamtx_monitor_config::RttConfig;
use std::time::Duration;

/// Cache keys of one probed host.
struct RttKeys {
    ewma_ms: String,
    last_ms: String,
    last_ts: String,
}

impl RttKeys {
    fn new(prefix: &str, host: &str) -> Self {
        let base = format!("{prefix}:{host}");
        Self {
            ewma_ms: format!("{base}:ewma_ms"),
            last_ms: format!("{base}:last_ms"),
            last_ts: format!("{base}:last_ts"),
        }
    }

    /// Smoothed value if present, otherwise the last raw one.
    fn best_cached(&self, cache: &dyn Cache) -> Option<f64> {
        read_parsed::<f64>(cache, &self.ewma_ms).or_else(|| read_parsed::<f64>(cache, &self.last_ms))
    }
}

/// Round-trip time of publisher hosts, measured with one ICMP echo at a time.
///
/// Publishers connect from ephemeral ports, so a transport level handshake
/// towards them is not possible. Pinging the host is the closest obtainable
/// approximation. State is kept per host, so reconnects of the same encoder keep
/// their history.
#[derive(Debug, Clone, PartialEq)]
pub struct RttEstimator {
    alpha: f64,
    min_period: Duration,
    ttl: Duration,
    probe_timeout: Duration,
    key_prefix: String,
}

impl From<&RttConfig> for RttEstimator {
    fn from(config: &RttConfig) -> Self {
        Self::new(
            config.ewma_alpha,
            config.min_period(),
            config.ttl(),
            config.timeout(),
            config.key_prefix.clone(),
        )
    }
}

impl RttEstimator {
    pub fn new(
        alpha: f64,
        min_period: Duration,
        ttl: Duration,
        probe_timeout: Duration,
        key_prefix: impl Into<String>,
    ) -> Self {
        Self {
            alpha,
            min_period,
            ttl,
            probe_timeout,
            key_prefix: key_prefix.into(),
        }
    }

    /// Returns the smoothed RTT in milliseconds towards the host of `remote_addr`.
    ///
    /// Probes at most once per `min_period` and host, in between the cached value
    /// is returned. A failed probe keeps the cache and answers from it, but still
    /// counts as an attempt for the rate limit.
    pub async fn estimate(
        &self,
        cache: &dyn Cache,
        probe: &dyn Probe,
        remote_addr: &str,
        now: Option<DateTime<Utc>>,
    ) -> Option<f64> {
        let host = parse_host(remote_addr)?;
        let keys = RttKeys::new(&self.key_prefix, host);
        let now = now.unwrap_or_else(Utc::now);

        if let Some(last_attempt) = read_timestamp(cache, &keys.last_ts) {
            if seconds_between(last_attempt, now) < self.min_period.as_secs_f64() {
                trace!(%host, "RTT served from cache");
                return keys.best_cached(cache);
            }
        }

        let Some(raw) = probe.probe(host, self.probe_timeout).await else {
            let cached = keys.best_cached(cache);
            debug!(%host, ?cached, "RTT probe got no reply");
            if cached.is_some() {
                if let Err(err) = cache.set(&keys.last_ts, encode_timestamp(now), Some(self.ttl)) {
                    debug!(%host, %err, "Failed to store RTT attempt");
                }
            }
            return cached;
        };

        let smoothed = match read_parsed::<f64>(cache, &keys.ewma_ms) {
            Some(previous) if previous.is_finite() => ewma(self.alpha, raw, previous),
            _ => raw,
        };

        let stored = cache.set_many(
            vec![
                (keys.ewma_ms, smoothed.to_string()),
                (keys.last_ms, raw.to_string()),
                (keys.last_ts, encode_timestamp(now)),
            ],
            Some(self.ttl),
        );
        if let Err(err) = stored {
            debug!(%host, %err, "Failed to store RTT state");
        }

        trace!(%host, raw, smoothed, "RTT measured");
        Some(smoothed)
    }
}
