use crate::{
    cache::Cache,
    collectors::{
        Collector,
        JoinSettings,
        MediaMtxClient,
        SnapshotJoiner,
        REQUEST_TIMEOUT,
    },
    estimators::Probe,
    metrics::{
        AggregatedEntry,
        Bitrate,
        Snapshot,
    },
};
use chrono::{
    DateTime,
    Utc,
};
use comfy_table::{
    presets,
    Attribute,
    Cell,
    Color,
    ContentArrangement,
    Table,
};
use eyre::{
    Context as _,
    Result,
};
use mediamtx_monitor_config::Config;
use reqwest::Client as HttpClient;
use std::{
    future::Future,
    path::{
        Path,
        PathBuf,
    },
    pin::Pin,
    sync::Arc,
    time::Duration,
};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Polls MediaMTX, joins the listings and publishes the snapshot.
///
/// The snapshot goes to the cache under `snapshot_key` without expiry and,
/// when configured, to a JSON file next to it.
pub struct StreamCollector {
    client: MediaMtxClient,
    joiner: SnapshotJoiner,
    cache: Arc<dyn Cache>,
    snapshot_key: String,
    output_json_path: Option<PathBuf>,
    interval: Duration,
    snapshot: Option<Snapshot>,
}

impl StreamCollector {
    pub fn new(config: &Config, cache: Arc<dyn Cache>, probe: Arc<dyn Probe>) -> Result<Self> {
        let http_client = HttpClient::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .wrap_err("Failed to build the HTTP client")?;
        let client = MediaMtxClient::new(http_client, config.api_base_url.clone());
        Ok(Self::with_client(config, client, cache, probe))
    }

    pub fn with_client(config: &Config, client: MediaMtxClient, cache: Arc<dyn Cache>, probe: Arc<dyn Probe>) -> Self {
        Self {
            client,
            joiner: SnapshotJoiner::new(cache.clone(), probe, JoinSettings::from(config)),
            cache,
            snapshot_key: config.snapshot_key.clone(),
            output_json_path: config.output_json_path.clone(),
            interval: config.interval(),
            snapshot: None,
        }
    }

    /// The snapshot of the last completed cycle.
    pub fn snapshot(&self) -> Option<&Snapshot> {
        self.snapshot.as_ref()
    }

    /// Collects every `interval` until `cancel` fires. A slow cycle delays the
    /// following tick.
    pub async fn run(mut self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(api = %self.client.base_url(), interval = ?self.interval, "Stream collector started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => self.collect_cycle(Utc::now()).await,
            }
        }

        info!("Stream collector stopped");
    }

    /// A cycle cannot fail. Unreachable endpoints read as empty listings and
    /// cache or file errors are logged, so an outage publishes an empty snapshot.
    async fn collect_cycle(&mut self, now: DateTime<Utc>) {
        let (paths, listings) = tokio::join!(self.client.fetch_paths(), self.client.fetch_listings());
        let entries = self.joiner.join(&paths, &listings, now).await;

        match self.cache.purge_expired() {
            Ok(0) => {}
            Ok(purged) => trace!(purged, "Purged expired cache entries"),
            Err(err) => debug!(%err, "Failed to purge the cache"),
        }

        let snapshot = Snapshot::new(now, entries);
        self.publish(&snapshot).await;
        info!(
            paths = snapshot.entries.len(),
            readers = snapshot.reader_count(),
            ingest_mbps = snapshot.ingest_mbps(),
            "Snapshot collected"
        );
        self.snapshot = Some(snapshot);
    }

    /// Stores the snapshot in the cache and mirrors it to the file. Failures are
    /// logged, the next cycle simply tries again.
    async fn publish(&self, snapshot: &Snapshot) {
        if let Some(path) = &self.output_json_path {
            if let Err(err) = write_json_file(path, &snapshot.entries).await {
                warn!(path = %path.display(), "Failed to write snapshot file: {err:?}");
            }
        }

        let stored = serde_json::to_string(&snapshot.entries)
            .wrap_err("Failed to encode the snapshot")
            .and_then(|json| {
                self.cache
                    .set(&self.snapshot_key, json, None)
                    .wrap_err("Failed to store the snapshot")
            });
        if let Err(err) = stored {
            error!(key = %self.snapshot_key, "{err:?}");
        }
    }
}

/// Replaces `path` through a sibling temp file.
async fn write_json_file(path: &Path, entries: &[AggregatedEntry]) -> Result<()> {
    let json = serde_json::to_string_pretty(entries)?;
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    let staging = path.with_extension("json.tmp");
    tokio::fs::write(&staging, json).await?;
    tokio::fs::rename(&staging, path).await?;
    Ok(())
}

impl Collector for StreamCollector {
    fn collect(&mut self, now: DateTime<Utc>) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            self.collect_cycle(now).await;
            Ok(())
        })
    }

    fn format(&self) -> String {
        let snapshot = match &self.snapshot {
            Some(snapshot) => snapshot,
            None => return "No streams collected yet. Call collect() first.".to_string(),
        };

        let mut table = Table::new();
        table
            .load_preset(presets::UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_header(vec![
                Cell::new("Path").add_attribute(Attribute::Bold).fg(Color::Cyan),
                Cell::new("Role").add_attribute(Attribute::Bold).fg(Color::Cyan),
                Cell::new("Type").add_attribute(Attribute::Bold).fg(Color::Cyan),
                Cell::new("Remote").add_attribute(Attribute::Bold).fg(Color::Cyan),
                Cell::new("Mbit/s").add_attribute(Attribute::Bold).fg(Color::Cyan),
                Cell::new("RTT").add_attribute(Attribute::Bold).fg(Color::Cyan),
            ]);

        for entry in &snapshot.entries {
            let source = &entry.source;
            table.add_row(vec![
                Cell::new(&entry.name).add_attribute(Attribute::Bold),
                Cell::new("publisher"),
                Cell::new(source.kind.as_ref().map_or("-", |kind| kind.as_str())),
                Cell::new(source.details.remote_addr().unwrap_or("-")),
                bitrate_cell(source.bitrate),
                Cell::new(source.rtt_ms.map_or_else(|| "-".to_string(), |rtt| format!("{rtt:.1} ms"))),
            ]);

            for reader in &entry.readers {
                table.add_row(vec![
                    Cell::new(""),
                    Cell::new("reader"),
                    Cell::new(reader.kind.as_ref().map_or("-", |kind| kind.as_str())),
                    Cell::new(reader.details.remote_addr().unwrap_or("-")),
                    bitrate_cell(reader.bitrate),
                    Cell::new("-"),
                ]);
            }
        }

        format!(
            "{table}\n{} paths, {} readers, {:.2} Mbit/s in, {:.2} Mbit/s out",
            snapshot.entries.len(),
            snapshot.reader_count(),
            snapshot.ingest_mbps(),
            snapshot.egress_mbps()
        )
    }

    fn summary(&self) -> serde_json::Value {
        match &self.snapshot {
            Some(snapshot) => serde_json::json!({
                "collected_at": snapshot.collected_at,
                "paths": snapshot.entries.len(),
                "readers": snapshot.reader_count(),
                "ingest_mbps": snapshot.ingest_mbps(),
                "egress_mbps": snapshot.egress_mbps(),
            }),
            None => serde_json::json!({"error": "No streams collected"}),
        }
    }

    fn name(&self) -> &'static str {
        "Streams"
    }
}

fn bitrate_cell(bitrate: Bitrate) -> Cell {
    match bitrate {
        Bitrate::Unmeasured => Cell::new("-").fg(Color::DarkGrey),
        Bitrate::Reported(_) => Cell::new(format!("{:.2}", bitrate.mbps())).fg(Color::Green),
        Bitrate::Estimated(_) => Cell::new(format!("{:.2}", bitrate.mbps())),
    }
}
