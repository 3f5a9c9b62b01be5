use serde::{
    Deserialize,
    Serialize,
};
use serde_json::{
    Map,
    Value,
};
use std::{
    fmt,
    str::FromStr,
};
use strum::{
    AsRefStr,
    Display,
    EnumIter,
    EnumString,
};

/// Connection kinds MediaMTX publishes a listing endpoint for.
///
/// Each kind knows which field of its listing identifies a connection, and
/// therefore how a path's reference to it has to be looked up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, EnumString, AsRefStr)]
pub enum ListingKind {
    #[strum(serialize = "srtConn")]
    Srt,
    #[strum(serialize = "rtmpConn")]
    Rtmp,
    #[strum(serialize = "webRTCSession")]
    WebRtc,
    #[strum(serialize = "rtspSession")]
    Rtsp,
    #[strum(serialize = "hlsMuxer")]
    Hls,
}

/// How a listing is indexed and which part of a reference selects an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    /// Listing keyed by `id`, the reference carries the same id.
    ById,
    /// Listing keyed by the `session` the connection belongs to, the reference carries the session id.
    BySession,
    /// Listing keyed by `path`, one entry per path.
    ByPath,
}

impl ListingKind {
    /// Control API endpoint serving the listing of this kind.
    pub fn endpoint(self) -> &'static str {
        match self {
            ListingKind::Srt => "/v3/srtconns/list",
            ListingKind::Rtmp => "/v3/rtmpconns/list",
            ListingKind::WebRtc => "/v3/webrtcsessions/list",
            ListingKind::Rtsp => "/v3/rtspconns/list",
            ListingKind::Hls => "/v3/hlsmuxers/list",
        }
    }

    pub fn lookup(self) -> Lookup {
        match self {
            ListingKind::Srt | ListingKind::Rtmp | ListingKind::WebRtc => Lookup::ById,
            ListingKind::Rtsp => Lookup::BySession,
            ListingKind::Hls => Lookup::ByPath,
        }
    }

    /// Only SRT connections carry native rates and their own round trip.
    pub fn reports_link_stats(self) -> bool {
        matches!(self, ListingKind::Srt)
    }
}

impl Lookup {
    /// Value a listing entry is indexed under.
    pub fn index_key(self, detail: &ConnectionDetail) -> Option<&str> {
        let key = match self {
            Lookup::ById => detail.id.as_deref(),
            Lookup::BySession => detail.session.as_deref(),
            Lookup::ByPath => detail.path.as_deref(),
        };
        key.filter(|key| !key.is_empty())
    }

    /// Value a reference found on `path_name` is looked up with.
    pub fn reference_key<'a>(self, reference: &'a ConnectionRef, path_name: &'a str) -> Option<&'a str> {
        let key = match self {
            Lookup::ById | Lookup::BySession => reference.id.as_deref(),
            Lookup::ByPath => Some(path_name),
        };
        key.filter(|key| !key.is_empty())
    }
}

/// Type tag of a source or reader as it appears on a path.
///
/// Anything that is not a listed kind (`rtspSource`, `hlsSource`, ...) is kept
/// verbatim so it can still be shown.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ConnectionType {
    Listed(ListingKind),
    Other(String),
}

impl ConnectionType {
    pub fn as_str(&self) -> &str {
        match self {
            ConnectionType::Listed(kind) => kind.as_ref(),
            ConnectionType::Other(other) => other,
        }
    }

    pub fn listing(&self) -> Option<ListingKind> {
        match self {
            ConnectionType::Listed(kind) => Some(*kind),
            ConnectionType::Other(_) => None,
        }
    }
}

impl<T: AsRef<str>> From<T> for ConnectionType {
    fn from(arg: T) -> Self {
        match ListingKind::from_str(arg.as_ref()) {
            Ok(kind) => ConnectionType::Listed(kind),
            Err(_) => ConnectionType::Other(arg.as_ref().to_string()),
        }
    }
}

impl fmt::Display for ConnectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ConnectionType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ConnectionType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        Ok(String::deserialize(deserializer)?.into())
    }
}

/// A path's pointer to its source or to one of its readers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectionRef {
    #[serde(rename = "type", default)]
    pub kind: Option<ConnectionType>,
    #[serde(default)]
    pub id: Option<String>,
}

impl ConnectionRef {
    pub fn new(kind: impl Into<ConnectionType>, id: impl Into<String>) -> Self {
        Self {
            kind: Some(kind.into()),
            id: Some(id.into()),
        }
    }
}

/// Which side of a connection is measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Bytes flowing from the publisher into MediaMTX.
    Publish,
    /// Bytes flowing from MediaMTX out to a reader.
    Read,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Publish => "pub",
            Direction::Read => "rd",
        }
    }
}

/// One entry of a connection listing.
///
/// The fields the monitor works with are typed, everything else MediaMTX
/// reports is carried along untouched in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionDetail {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_addr: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bytes_received: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bytes_sent: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mbps_receive_rate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mbps_send_rate: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ConnectionDetail {
    /// Cumulative byte counter of the given direction.
    pub fn counter(&self, direction: Direction) -> Option<u64> {
        match direction {
            Direction::Publish => self.bytes_received,
            Direction::Read => self.bytes_sent,
        }
    }

    /// Rate MediaMTX measured itself, if it is a usable number.
    pub fn reported_mbps(&self, direction: Direction) -> Option<f64> {
        let rate = match direction {
            Direction::Publish => self.mbps_receive_rate,
            Direction::Read => self.mbps_send_rate,
        };
        rate.filter(|rate| rate.is_finite() && *rate >= 0.0)
    }

    pub fn remote_addr(&self) -> Option<&str> {
        self.remote_addr
            .as_deref()
            .map(str::trim)
            .filter(|addr| !addr.is_empty())
    }
}
