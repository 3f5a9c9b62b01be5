use chrono::{
    DateTime,
    Utc,
};
use eyre::Result;
use std::{
    future::Future,
    pin::Pin,
};

/// Trait for collecting and formatting data
pub trait Collector {
    /// Run one collection cycle stamped with `now`
    fn collect(&mut self, now: DateTime<Utc>) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Format data for display
    fn format(&self) -> String;

    /// Get data summary as JSON
    fn summary(&self) -> serde_json::Value;

    /// Get the name of this collector
    fn name(&self) -> &'static str;
}
