//! Persistent string key-value storage.
//!
//! All cached data ultimately lives in a flat, string-keyed map with no
//! transactions: the platform's local storage on a device, a directory of
//! small files on desktop. The [`KeyValueStore`] trait abstracts over that
//! substrate so the cache logic runs unchanged against an in-memory fake in
//! tests.

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use async_trait::async_trait;
use thiserror::Error;

/// Errors raised by a key-value store.
///
/// Writes can fail (quota, I/O); the cache layer treats every failure as
/// non-fatal and the read path treats it as a miss.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("storage quota exceeded writing key {key}")]
    QuotaExceeded { key: String },

    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// A string-keyed map with no transactions and fallible writes.
///
/// Keys written by unrelated code (e.g. provider session tokens) may be
/// present; callers enumerating keys must filter by pattern rather than
/// assume ownership of the whole namespace.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read the raw value for a key, `None` if absent.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Write a value, replacing any existing one.
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Delete a key. Deleting an absent key is not an error.
    async fn remove(&self, key: &str) -> Result<(), StoreError>;

    /// Enumerate every key currently present.
    async fn keys(&self) -> Result<Vec<String>, StoreError>;
}
