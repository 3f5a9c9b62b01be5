use crate::{
    cache::Cache,
    estimators::{
        round2,
        BitrateEstimator,
        Probe,
        RttEstimator,
    },
    metrics::{
        is_loopback,
        AggregatedEntry,
        Bitrate,
        ConnectionDetail,
        ConnectionRef,
        Direction,
        Listings,
        PathDescriptor,
        ReaderEntry,
        Resolution,
        SourceEntry,
    },
};
use chrono::{
    DateTime,
    Utc,
};
use futures::future::join_all;
use mediamtx_monitor_config::Config;
use std::sync::Arc;

/// Knobs of the join that come from configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinSettings {
    /// Drop readers connected from this machine.
    pub ignore_loopback: bool,
    pub bitrate: BitrateEstimator,
    /// `None` disables publisher RTT probing.
    pub rtt: Option<RttEstimator>,
}

impl From<&Config> for JoinSettings {
    fn from(config: &Config) -> Self {
        Self {
            ignore_loopback: config.bitrate.ignore_loopback,
            bitrate: BitrateEstimator::from(&config.bitrate),
            rtt: config.rtt.enabled.then(|| RttEstimator::from(&config.rtt)),
        }
    }
}

/// Joins the path listing with the connection listings into published entries.
pub struct SnapshotJoiner {
    cache: Arc<dyn Cache>,
    probe: Arc<dyn Probe>,
    settings: JoinSettings,
}

impl SnapshotJoiner {
    pub fn new(cache: Arc<dyn Cache>, probe: Arc<dyn Probe>, settings: JoinSettings) -> Self {
        Self { cache, probe, settings }
    }

    /// Produces one entry per path, in path order.
    ///
    /// Nothing here fails as a whole. A reference that cannot be resolved yields
    /// empty details and an unmeasured bitrate for that one connection.
    pub async fn join(&self, paths: &[PathDescriptor], listings: &Listings, now: DateTime<Utc>) -> Vec<AggregatedEntry> {
        join_all(paths.iter().map(|path| self.join_path(path, listings, now))).await
    }

    async fn join_path(&self, path: &PathDescriptor, listings: &Listings, now: DateTime<Utc>) -> AggregatedEntry {
        let source = self.join_source(path, listings, now).await;
        let readers = path
            .readers
            .iter()
            .filter_map(|reader| self.join_reader(path, reader, listings, now))
            .collect();

        AggregatedEntry {
            name: path.name.clone(),
            source,
            tracks: path.tracks.clone(),
            bytes_received: path.bytes_received.unwrap_or_default(),
            bytes_sent: path.bytes_sent.unwrap_or_default(),
            readers,
        }
    }

    async fn join_source(&self, path: &PathDescriptor, listings: &Listings, now: DateTime<Utc>) -> SourceEntry {
        let Some(reference) = &path.source else {
            return SourceEntry {
                kind: None,
                id: None,
                details: ConnectionDetail::default(),
                bitrate: Bitrate::Unmeasured,
                rtt_ms: None,
            };
        };

        let detail = self.resolve(listings, reference, path);
        // some listings carry no counter or leave it at zero, the path's own
        // ingest total is the same figure
        let counter = detail
            .and_then(|detail| detail.counter(Direction::Publish))
            .filter(|counter| *counter > 0)
            .or(path.bytes_received);
        let bitrate = self.bitrate(Direction::Publish, path, reference, detail, counter, now);

        let rtt_ms = match (&self.settings.rtt, detail.and_then(ConnectionDetail::remote_addr)) {
            (Some(rtt), Some(remote_addr)) if !reports_link_stats(reference) => rtt
                .estimate(self.cache.as_ref(), self.probe.as_ref(), remote_addr, Some(now))
                .await
                .map(round2),
            _ => None,
        };

        SourceEntry {
            kind: reference.kind.clone(),
            id: reference.id.clone(),
            details: detail.cloned().unwrap_or_default(),
            bitrate,
            rtt_ms,
        }
    }

    fn join_reader(
        &self,
        path: &PathDescriptor,
        reference: &ConnectionRef,
        listings: &Listings,
        now: DateTime<Utc>,
    ) -> Option<ReaderEntry> {
        let detail = self.resolve(listings, reference, path);

        if self.settings.ignore_loopback {
            if let Some(remote_addr) = detail.and_then(ConnectionDetail::remote_addr) {
                if is_loopback(remote_addr) {
                    trace!(path = %path.name, %remote_addr, "Skipping loopback reader");
                    return None;
                }
            }
        }

        let counter = detail.and_then(|detail| detail.counter(Direction::Read));
        let bitrate = self.bitrate(Direction::Read, path, reference, detail, counter, now);

        Some(ReaderEntry {
            kind: reference.kind.clone(),
            id: reference.id.clone(),
            bitrate,
            details: detail.cloned().unwrap_or_default(),
        })
    }

    fn resolve<'a>(
        &self,
        listings: &'a Listings,
        reference: &ConnectionRef,
        path: &PathDescriptor,
    ) -> Option<&'a ConnectionDetail> {
        match listings.resolve(reference, &path.name) {
            Resolution::Resolved(detail) => Some(detail),
            Resolution::Unresolved(reason) => {
                debug!(path = %path.name, %reason, "Connection not resolved");
                None
            }
        }
    }

    /// A positive native rate wins, then the counter estimate, then a native zero.
    ///
    /// The counter estimate is computed even when the native rate wins so its
    /// history stays warm for the cycles where the native rate is missing.
    fn bitrate(
        &self,
        direction: Direction,
        path: &PathDescriptor,
        reference: &ConnectionRef,
        detail: Option<&ConnectionDetail>,
        counter: Option<u64>,
        now: DateTime<Utc>,
    ) -> Bitrate {
        let key = estimator_key(direction, &path.name, reference, detail);
        let estimated = counter
            .filter(|counter| *counter > 0)
            .and_then(|counter| self.settings.bitrate.estimate(self.cache.as_ref(), &key, counter, Some(now)));

        match (detail.and_then(|detail| detail.reported_mbps(direction)), estimated) {
            (Some(reported), _) if reported > 0.0 => Bitrate::Reported(reported),
            (_, Some(estimated)) => Bitrate::Estimated(estimated),
            (Some(reported), None) => Bitrate::Reported(reported),
            (None, None) => Bitrate::Unmeasured,
        }
    }
}

fn reports_link_stats(reference: &ConnectionRef) -> bool {
    reference
        .kind
        .as_ref()
        .and_then(|kind| kind.listing())
        .is_some_and(|kind| kind.reports_link_stats())
}

/// `<pub|rd>:<path>:<type>:<id>`, falling back to the remote address when the
/// reference has no id.
fn estimator_key(
    direction: Direction,
    path_name: &str,
    reference: &ConnectionRef,
    detail: Option<&ConnectionDetail>,
) -> String {
    let kind = reference.kind.as_ref().map_or("n/a", |kind| kind.as_str());
    let identity = reference
        .id
        .as_deref()
        .filter(|id| !id.is_empty())
        .or_else(|| detail.and_then(ConnectionDetail::remote_addr))
        .unwrap_or("n/a");
    format!("{}:{path_name}:{kind}:{identity}", direction.as_str())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        cache::MemoryCache,
        estimators::testing::{
            at,
            FailingCache,
            ScriptedProbe,
        },
        metrics::ListingKind,
    };
    use pretty_assertions::assert_eq;
    use serde_json::{
        json,
        Value,
    };
    use std::time::Duration;

    fn settings() -> JoinSettings {
        JoinSettings {
            ignore_loopback: true,
            bitrate: BitrateEstimator::new(Duration::from_millis(500), None, Duration::from_secs(300)),
            rtt: Some(RttEstimator::new(
                0.5,
                Duration::from_secs(30),
                Duration::from_secs(300),
                Duration::from_millis(900),
                "rtt:pub",
            )),
        }
    }

    struct Fixture {
        cache: Arc<MemoryCache>,
        probe: Arc<ScriptedProbe>,
        joiner: SnapshotJoiner,
    }

    fn fixture(settings: JoinSettings, replies: Vec<Option<f64>>) -> Fixture {
        let cache = Arc::new(MemoryCache::new());
        let probe = Arc::new(ScriptedProbe::new(replies));
        let joiner = SnapshotJoiner::new(cache.clone(), probe.clone(), settings);
        Fixture { cache, probe, joiner }
    }

    fn fixture_with(settings: JoinSettings) -> Fixture {
        fixture(settings, vec![])
    }

    fn paths(items: Value) -> Vec<PathDescriptor> {
        serde_json::from_value::<Vec<Value>>(items)
            .unwrap()
            .into_iter()
            .filter_map(PathDescriptor::from_item)
            .collect()
    }

    fn listings(entries: Vec<(ListingKind, Value)>) -> Listings {
        let mut listings = Listings::new();
        for (kind, items) in entries {
            listings.insert_items(kind, serde_json::from_value(items).unwrap());
        }
        listings
    }

    fn rtmp_cam(bytes_received: u64) -> (Vec<PathDescriptor>, Listings) {
        let paths = paths(json!([{
            "name": "cam1",
            "source": {"type": "rtmpConn", "id": "c1"},
            "tracks": ["H264"],
            "bytesReceived": bytes_received,
            "readers": [{"type": "webRTCSession", "id": "w1"}],
        }]));
        let listings = listings(vec![
            (
                ListingKind::Rtmp,
                json!([{"id": "c1", "remoteAddr": "10.0.0.5:40000", "bytesReceived": bytes_received}]),
            ),
            (
                ListingKind::WebRtc,
                json!([{"id": "w1", "remoteAddr": "10.0.0.9:50000", "bytesSent": bytes_received / 2}]),
            ),
        ]);
        (paths, listings)
    }

    #[tokio::test]
    async fn estimates_bitrates_across_cycles() {
        let fixture = fixture(settings(), vec![Some(12.0)]);

        let (paths, listings) = rtmp_cam(1_000_000);
        let first = fixture.joiner.join(&paths, &listings, at(0.0)).await;
        assert_eq!(first[0].source.bitrate, Bitrate::Unmeasured);
        assert_eq!(first[0].source.rtt_ms, Some(12.0));
        assert_eq!(first[0].readers[0].bitrate, Bitrate::Unmeasured);

        let (paths, listings) = rtmp_cam(2_250_000);
        let second = fixture.joiner.join(&paths, &listings, at(10.0)).await;
        // 1.25 MB in 10 s
        assert_eq!(second[0].source.bitrate, Bitrate::Estimated(1.0));
        assert_eq!(second[0].readers[0].bitrate, Bitrate::Estimated(0.5));
        // within the probe period the cached value is reused
        assert_eq!(second[0].source.rtt_ms, Some(12.0));
        assert_eq!(fixture.probe.calls(), 1);
        assert!(fixture.cache.get("pub:cam1:rtmpConn:c1:prev_bytes").unwrap().is_some());
        assert!(fixture.cache.get("rd:cam1:webRTCSession:w1:prev_bytes").unwrap().is_some());
    }

    #[tokio::test]
    async fn prefers_native_srt_rate_and_skips_probing() {
        let fixture = fixture(settings(), vec![Some(5.0)]);
        let paths = paths(json!([{
            "name": "live",
            "source": {"type": "srtConn", "id": "s1"},
            "bytesReceived": 4000,
        }]));
        let listings = listings(vec![(
            ListingKind::Srt,
            json!([{"id": "s1", "remoteAddr": "10.0.0.5:9000", "bytesReceived": 4000, "mbpsReceiveRate": 3.456, "msRTT": 20.0}]),
        )]);

        let entries = fixture.joiner.join(&paths, &listings, at(0.0)).await;
        assert_eq!(entries[0].source.bitrate, Bitrate::Reported(3.456));
        assert_eq!(entries[0].source.rtt_ms, None);
        assert_eq!(entries[0].source.details.extra.get("msRTT"), Some(&json!(20.0)));
        assert_eq!(fixture.probe.calls(), 0);
        // counter history is kept even though the native rate won
        assert!(fixture.cache.get("pub:live:srtConn:s1:prev_bytes").unwrap().is_some());

        let wire = serde_json::to_value(&entries[0]).unwrap();
        assert_eq!(wire["source"]["bitrate_mbps"], json!(3.46));
    }

    #[tokio::test]
    async fn native_rate_wins_over_warm_estimate() {
        let fixture = fixture(settings(), vec![]);
        let srt = |bytes: u64| {
            listings(vec![(
                ListingKind::Srt,
                json!([{"id": "s1", "bytesReceived": bytes, "mbpsReceiveRate": 3.456}]),
            )])
        };
        let paths = paths(json!([{"name": "live", "source": {"type": "srtConn", "id": "s1"}}]));

        fixture.joiner.join(&paths, &srt(1_000_000), at(0.0)).await;
        // 1.25 MB in 1 s would estimate 10 Mbit/s
        let second = fixture.joiner.join(&paths, &srt(2_250_000), at(1.0)).await;
        assert_eq!(second[0].source.bitrate, Bitrate::Reported(3.456));
        assert_eq!(
            fixture.cache.get("pub:live:srtConn:s1:prev_bytes").unwrap().as_deref(),
            Some("2250000")
        );

        // once the native rate is gone the warm history answers right away
        let third = fixture
            .joiner
            .join(
                &paths,
                &listings(vec![(ListingKind::Srt, json!([{"id": "s1", "bytesReceived": 3_500_000}]))]),
                at(2.0),
            )
            .await;
        assert_eq!(third[0].source.bitrate, Bitrate::Estimated(10.0));
    }

    #[tokio::test]
    async fn native_zero_yields_to_estimate() {
        let fixture = fixture(settings(), vec![]);
        let srt = |bytes: u64| {
            listings(vec![(
                ListingKind::Srt,
                json!([{"id": "s1", "bytesReceived": bytes, "mbpsReceiveRate": 0.0}]),
            )])
        };
        let paths = paths(json!([{"name": "live", "source": {"type": "srtConn", "id": "s1"}}]));

        let first = fixture.joiner.join(&paths, &srt(1_000), at(0.0)).await;
        assert_eq!(first[0].source.bitrate, Bitrate::Reported(0.0));
        let second = fixture.joiner.join(&paths, &srt(126_000), at(1.0)).await;
        assert_eq!(second[0].source.bitrate, Bitrate::Estimated(1.0));
    }

    #[tokio::test]
    async fn loopback_readers_are_dropped() {
        let fixture = fixture(settings(), vec![None]);
        let paths = paths(json!([{
            "name": "cam1",
            "source": {"type": "rtmpConn", "id": "c1"},
            "readers": [
                {"type": "rtmpConn", "id": "local"},
                {"type": "rtmpConn", "id": "local6"},
                {"type": "rtmpConn", "id": "remote"},
            ],
        }]));
        let listings = listings(vec![(
            ListingKind::Rtmp,
            json!([
                {"id": "c1", "remoteAddr": "10.0.0.5:1"},
                {"id": "local", "remoteAddr": "127.0.0.1:5000"},
                {"id": "local6", "remoteAddr": "[::1]:5000"},
                {"id": "remote", "remoteAddr": "10.0.0.7:5000"},
            ]),
        )]);

        let entries = fixture.joiner.join(&paths, &listings, at(0.0)).await;
        let ids: Vec<_> = entries[0].readers.iter().filter_map(|reader| reader.id.as_deref()).collect();
        assert_eq!(ids, vec!["remote"]);

        let mut keep_all = settings();
        keep_all.ignore_loopback = false;
        let fixture = fixture_with(keep_all);
        let entries = fixture.joiner.join(&paths, &listings, at(0.0)).await;
        assert_eq!(entries[0].readers.len(), 3);
    }

    #[tokio::test]
    async fn unresolved_connections_do_not_affect_siblings() {
        let fixture = fixture(settings(), vec![]);
        let paths = paths(json!([
            {
                "name": "broken",
                "source": {"type": "rtmpConn", "id": "gone"},
                "readers": [{"type": "webRTCSession", "id": "gone-too"}, {"type": "mysteryReader", "id": "x"}],
            },
            {"name": "fine", "source": {"type": "rtmpConn", "id": "c1"}},
        ]));
        let listings = listings(vec![(ListingKind::Rtmp, json!([{"id": "c1", "bytesReceived": 10}]))]);

        let entries = fixture.joiner.join(&paths, &listings, at(0.0)).await;
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "broken");
        assert_eq!(entries[0].source.details, ConnectionDetail::default());
        assert_eq!(entries[0].source.bitrate, Bitrate::Unmeasured);
        assert_eq!(entries[0].readers.len(), 2);
        assert!(entries[0].readers.iter().all(|reader| reader.details == ConnectionDetail::default()));
        assert_eq!(entries[1].source.details.bytes_received, Some(10));
    }

    #[tokio::test]
    async fn unresolved_reader_does_not_affect_resolved_siblings() {
        let fixture = fixture(settings(), vec![Some(7.0)]);
        let paths = paths(json!([{
            "name": "cam1",
            "source": {"type": "rtmpConn", "id": "c1"},
            "readers": [
                {"type": "webRTCSession", "id": "w1"},
                {"type": "webRTCSession", "id": "ghost"},
            ],
        }]));
        let listings_at = |bytes: u64| {
            listings(vec![
                (
                    ListingKind::Rtmp,
                    json!([{"id": "c1", "remoteAddr": "10.0.0.5:40000", "bytesReceived": bytes}]),
                ),
                (
                    ListingKind::WebRtc,
                    json!([{"id": "w1", "remoteAddr": "10.0.0.9:50000", "bytesSent": bytes / 2}]),
                ),
            ])
        };

        fixture.joiner.join(&paths, &listings_at(1_000_000), at(0.0)).await;
        let entries = fixture.joiner.join(&paths, &listings_at(2_250_000), at(10.0)).await;
        let entry = &entries[0];

        assert_eq!(entry.source.details.remote_addr(), Some("10.0.0.5:40000"));
        assert_eq!(entry.source.details.bytes_received, Some(2_250_000));
        assert_eq!(entry.source.bitrate, Bitrate::Estimated(1.0));
        assert_eq!(entry.source.rtt_ms, Some(7.0));

        assert_eq!(entry.readers.len(), 2);
        assert_eq!(entry.readers[0].id.as_deref(), Some("w1"));
        assert_eq!(entry.readers[0].details.remote_addr(), Some("10.0.0.9:50000"));
        assert_eq!(entry.readers[0].details.bytes_sent, Some(1_125_000));
        assert_eq!(entry.readers[0].bitrate, Bitrate::Estimated(0.5));

        assert_eq!(entry.readers[1].id.as_deref(), Some("ghost"));
        assert_eq!(entry.readers[1].details, ConnectionDetail::default());
        assert_eq!(entry.readers[1].bitrate, Bitrate::Unmeasured);
    }

    #[tokio::test]
    async fn path_without_source_has_no_publisher() {
        let fixture = fixture(settings(), vec![Some(1.0)]);
        let paths = paths(json!([{"name": "idle", "bytesReceived": 900, "tracks": []}]));
        let entries = fixture.joiner.join(&paths, &Listings::new(), at(0.0)).await;

        let wire = serde_json::to_value(&entries[0]).unwrap();
        assert_eq!(
            wire,
            json!({
                "name": "idle",
                "source": {"type": null, "id": null, "details": {}, "bitrate_mbps": 0.0},
                "tracks": [],
                "bytesReceived": 900,
                "bytesSent": 0,
                "readers": [],
            })
        );
        assert_eq!(fixture.probe.calls(), 0);
        assert!(fixture.cache.is_empty());
    }

    #[tokio::test]
    async fn hls_readers_are_keyed_by_path() {
        let fixture = fixture(settings(), vec![]);
        let paths = paths(json!([{
            "name": "cam1",
            "readers": [{"type": "hlsMuxer", "id": ""}],
        }]));
        let listings = listings(vec![(
            ListingKind::Hls,
            json!([{"path": "cam1", "bytesSent": 1000, "lastRequest": "2024-01-01T00:00:00Z"}]),
        )]);

        let entries = fixture.joiner.join(&paths, &listings, at(0.0)).await;
        assert_eq!(entries[0].readers[0].details.bytes_sent, Some(1000));
        assert!(fixture.cache.get("rd:cam1:hlsMuxer:n/a:prev_bytes").unwrap().is_some());
    }

    #[tokio::test]
    async fn publisher_falls_back_to_path_counter() {
        let fixture = fixture(settings(), vec![]);
        let path_at = |bytes: u64| {
            paths(json!([{
                "name": "cam1",
                "source": {"type": "webRTCSession", "id": "w9"},
                "bytesReceived": bytes,
            }]))
        };
        let listings = listings(vec![(ListingKind::WebRtc, json!([{"id": "w9", "remoteAddr": "10.0.0.5:1"}]))]);

        fixture.joiner.join(&path_at(500_000), &listings, at(0.0)).await;
        let entries = fixture.joiner.join(&path_at(750_000), &listings, at(2.0)).await;
        assert_eq!(entries[0].source.bitrate, Bitrate::Estimated(1.0));
    }

    #[tokio::test]
    async fn zero_listing_counter_falls_back_to_path_counter() {
        let fixture = fixture(settings(), vec![]);
        let path_at = |bytes: u64| {
            paths(json!([{
                "name": "cam1",
                "source": {"type": "rtmpConn", "id": "c1"},
                "bytesReceived": bytes,
            }]))
        };
        let listings = listings(vec![(
            ListingKind::Rtmp,
            json!([{"id": "c1", "remoteAddr": "10.0.0.5:1", "bytesReceived": 0}]),
        )]);

        fixture.joiner.join(&path_at(500_000), &listings, at(0.0)).await;
        let entries = fixture.joiner.join(&path_at(750_000), &listings, at(2.0)).await;
        assert_eq!(entries[0].source.bitrate, Bitrate::Estimated(1.0));
    }

    #[tokio::test]
    async fn rtt_disabled_never_probes() {
        let mut settings = settings();
        settings.rtt = None;
        let fixture = fixture(settings, vec![Some(3.0)]);
        let (paths, listings) = rtmp_cam(1_000);
        let entries = fixture.joiner.join(&paths, &listings, at(0.0)).await;
        assert_eq!(entries[0].source.rtt_ms, None);
        assert_eq!(fixture.probe.calls(), 0);
    }

    #[tokio::test]
    async fn unavailable_cache_still_produces_entries() {
        let probe = Arc::new(ScriptedProbe::new([Some(8.0)]));
        let joiner = SnapshotJoiner::new(Arc::new(FailingCache), probe, settings());
        let (paths, listings) = rtmp_cam(1_000);

        let entries = joiner.join(&paths, &listings, at(0.0)).await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].source.bitrate, Bitrate::Unmeasured);
        assert_eq!(entries[0].source.rtt_ms, Some(8.0));
    }

    #[test]
    fn estimator_keys() {
        let reference = ConnectionRef::new("rtmpConn", "c1");
        assert_eq!(estimator_key(Direction::Publish, "cam1", &reference, None), "pub:cam1:rtmpConn:c1");

        let anonymous = ConnectionRef {
            id: None,
            ..ConnectionRef::new("rtmpConn", "")
        };
        let detail = ConnectionDetail {
            remote_addr: Some("10.0.0.5:1".to_string()),
            ..Default::default()
        };
        assert_eq!(
            estimator_key(Direction::Read, "cam1", &anonymous, Some(&detail)),
            "rd:cam1:rtmpConn:10.0.0.5:1"
        );
        assert_eq!(estimator_key(Direction::Read, "cam1", &ConnectionRef::default(), None), "rd:cam1:n/a:n/a");
    }

    #[test]
    fn settings_from_config() {
        let mut config = Config::default();
        config.rtt.enabled = false;
        config.bitrate.ignore_loopback = false;
        let settings = JoinSettings::from(&config);
        assert!(!settings.ignore_loopback);
        assert_eq!(settings.rtt, None);
        assert_eq!(JoinSettings::from(&Config::default()).rtt, Some(RttEstimator::from(&Config::default().rtt)));
    }
}
