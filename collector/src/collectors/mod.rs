//! # Collectors Module
//!
//! The collection cycle and the pieces it is assembled from.
//!
//! ## Architecture
//!
//! - **`Collector` trait**: interface of a collector that can be run and printed
//! - **`MediaMtxClient`**: paginated, failure tolerant reads of the control API
//! - **`SnapshotJoiner`**: joins paths with connection listings and runs the estimators
//! - **`StreamCollector`**: drives the cycle on an interval and publishes the snapshot
//!
//! ## Failure handling
//!
//! An unreachable endpoint reads as an empty listing and an unresolvable
//! connection as empty details, so a cycle always produces a snapshot. Failing to
//! store it is logged and retried with the next cycle.

pub mod api_client;
pub mod collector;
pub mod joiner;
pub mod stream_collector;

pub use api_client::{
    ApiError,
    MediaMtxClient,
    REQUEST_TIMEOUT,
};
pub use collector::Collector;
pub use joiner::{
    JoinSettings,
    SnapshotJoiner,
};
pub use stream_collector::StreamCollector;
