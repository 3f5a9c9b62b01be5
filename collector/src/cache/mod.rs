//! # Cache Module
//!
//! Key/value store with per-key expiry that carries estimator state from one
//! collection cycle to the next.
//!
//! Values are plain strings, callers own their encoding. Every operation may fail,
//! callers treat a failure like a missing value.

mod memory;

pub use memory::MemoryCache;
use std::time::Duration;

#[derive(thiserror::Error, Debug)]
pub enum CacheError {
    #[error("The cache lock was poisoned by a panicking writer")]
    Poisoned,
    #[error("The cache backend is unavailable: {0}")]
    Unavailable(String),
}

pub type CacheResult<T> = Result<T, CacheError>;

/// Shared state store used by the estimators and the snapshot publisher.
pub trait Cache: Send + Sync {
    /// Returns the live value for `key`, `None` when missing or expired.
    fn get(&self, key: &str) -> CacheResult<Option<String>>;

    /// Stores `value` under `key`. `None` as `ttl` keeps the value until it is overwritten.
    fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> CacheResult<()>;

    fn delete(&self, key: &str) -> CacheResult<()>;

    /// Stores all entries with the same `ttl`. Either every entry is written or none is.
    fn set_many(&self, entries: Vec<(String, String)>, ttl: Option<Duration>) -> CacheResult<()>;

    /// Drops expired entries and returns how many were removed. Backends that
    /// expire keys on their own have nothing to do here.
    fn purge_expired(&self) -> CacheResult<usize> {
        Ok(0)
    }
}
