//! Stream health collection for a MediaMTX server.
//!
//! Each cycle reads the path listing and the per protocol connection listings
//! from the control API, joins them, derives publisher and reader bitrates from
//! byte counters, probes publisher round trips and publishes the result as one
//! JSON snapshot.

#[macro_use]
extern crate tracing;

pub mod cache;
pub mod collectors;
pub mod estimators;
pub mod metrics;

pub use cache::{
    Cache,
    CacheError,
    MemoryCache,
};
pub use collectors::{
    Collector,
    JoinSettings,
    MediaMtxClient,
    SnapshotJoiner,
    StreamCollector,
};
pub use estimators::{
    BitrateEstimator,
    PingProbe,
    Probe,
    RttEstimator,
};
