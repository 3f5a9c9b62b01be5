use super::{
    ConnectionDetail,
    ConnectionType,
};
use crate::estimators::round2;
use chrono::{
    DateTime,
    Utc,
};
use serde::{
    Serialize,
    Serializer,
};
use serde_json::Value;

/// Bitrate of one publisher or reader in Mbit/s.
///
/// Kept apart from a plain number so "no measurement yet" and "measured zero"
/// stay distinguishable internally. Both are published as `0.0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Bitrate {
    Unmeasured,
    /// Rate MediaMTX measured itself.
    Reported(f64),
    /// Rate derived from byte counter deltas.
    Estimated(f64),
}

impl Bitrate {
    /// Published value, two decimals.
    pub fn mbps(&self) -> f64 {
        match self {
            Bitrate::Unmeasured => 0.0,
            Bitrate::Reported(mbps) | Bitrate::Estimated(mbps) => round2(*mbps),
        }
    }
}

impl Serialize for Bitrate {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_f64(self.mbps())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceEntry {
    #[serde(rename = "type")]
    pub kind: Option<ConnectionType>,
    pub id: Option<String>,
    pub details: ConnectionDetail,
    #[serde(rename = "bitrate_mbps")]
    pub bitrate: Bitrate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rtt_ms: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReaderEntry {
    #[serde(rename = "type")]
    pub kind: Option<ConnectionType>,
    pub id: Option<String>,
    #[serde(rename = "bitrate_mbps")]
    pub bitrate: Bitrate,
    pub details: ConnectionDetail,
}

/// Published view of one path, its publisher and its readers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedEntry {
    pub name: String,
    pub source: SourceEntry,
    pub tracks: Vec<Value>,
    pub bytes_received: u64,
    pub bytes_sent: u64,
    pub readers: Vec<ReaderEntry>,
}

/// Result of one collection cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub collected_at: DateTime<Utc>,
    pub entries: Vec<AggregatedEntry>,
}

impl Snapshot {
    pub fn new(collected_at: DateTime<Utc>, entries: Vec<AggregatedEntry>) -> Self {
        Self { collected_at, entries }
    }

    pub fn reader_count(&self) -> usize {
        self.entries.iter().map(|entry| entry.readers.len()).sum()
    }

    /// Sum of all publisher bitrates.
    pub fn ingest_mbps(&self) -> f64 {
        round2(self.entries.iter().map(|entry| entry.source.bitrate.mbps()).sum())
    }

    /// Sum of all reader bitrates.
    pub fn egress_mbps(&self) -> f64 {
        round2(
            self.entries
                .iter()
                .flat_map(|entry| entry.readers.iter())
                .map(|reader| reader.bitrate.mbps())
                .sum(),
        )
    }
}
