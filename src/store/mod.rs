//! Key-value store adapters.
//!
//! [`KeyValueStore`] is the whole contract the widget pipeline relies on:
//! whole-value `get`/`set` in one namespace, callable from either process at
//! any time. There is no compare-and-swap and no append, so every writer
//! replaces the full value and the last write wins.

use std::future::Future;

use thiserror::Error;

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The namespace itself cannot be reached (missing app group
    /// container, entitlement not granted, ...).
    #[error("shared store unavailable: {0}")]
    Unavailable(String),

    #[error("store request for '{key}' timed out after {after_ms} ms")]
    Timeout { key: String, after_ms: u64 },

    #[error("store backend error: {0:#}")]
    Backend(#[from] anyhow::Error),
}

pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<String>, StoreError>> + Send;

    fn set(&self, key: &str, value: &str) -> impl Future<Output = Result<(), StoreError>> + Send;
}

/// Process-local store with the extra operations the metrics recorder
/// needs. The shared namespace never exposes these.
pub trait LocalStore: KeyValueStore {
    fn remove(&self, key: &str) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Every `(key, value)` pair, ordered by key.
    fn entries(&self) -> impl Future<Output = Result<Vec<(String, String)>, StoreError>> + Send;
}
