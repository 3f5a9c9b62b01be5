//! # Metrics Module
//!
//! Data model of the MediaMTX control API and of the published snapshot.
//!
//! - **`PathDescriptor`**: one path with its source and reader references
//! - **`Listings`**: the per-kind connection listings of a cycle, indexed for lookup
//! - **`AggregatedEntry`**: one path joined with its connections and metrics

pub mod address;
pub mod connection;
pub mod listings;
pub mod snapshot;
pub mod topology;

pub use address::{
    is_loopback,
    parse_host,
};
pub use connection::*;
pub use listings::*;
pub use snapshot::*;
pub use topology::*;
