//! Versioned, timestamped, checksummed envelope around cached payloads.
//!
//! Storage is untrusted: the platform can truncate a write, another process
//! can scribble over a key, clocks can jump. `decode` therefore never
//! returns an error - anything that fails validation is `None`, which
//! callers must treat exactly like an absent key.

use chrono::{DateTime, Duration, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::debug;

/// Current envelope schema version. Entries written under any other version
/// are treated as misses on read.
pub const CACHE_SCHEMA_VERSION: &str = "1";

/// Tolerance for entry timestamps ahead of the local clock.
/// Small skew between devices is normal; anything beyond this is treated
/// as corruption.
const FUTURE_TIMESTAMP_TOLERANCE_SECS: i64 = 300;

#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("failed to serialize cache payload: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    pub data: T,
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub ttl_ms: u64,
    pub checksum: String,
}

impl<T> CacheEntry<T> {
    /// An entry older than `timestamp + ttl_ms` is stale. Stale is a
    /// read-time classification, not an eviction trigger.
    pub fn is_stale(&self) -> bool {
        self.is_stale_at(Utc::now())
    }

    pub fn is_stale_at(&self, now: DateTime<Utc>) -> bool {
        now > self.timestamp + Duration::milliseconds(self.ttl_ms as i64)
    }
}

/// Hex SHA-256 over the canonical JSON rendering of the payload.
fn checksum_of(payload: &serde_json::Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(payload.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

/// Build and serialize an envelope for `data` with the given TTL.
pub fn encode<T: Serialize>(data: &T, ttl_ms: u64) -> Result<String, EncodeError> {
    let payload = serde_json::to_value(data)?;
    let entry = CacheEntry {
        checksum: checksum_of(&payload),
        data: payload,
        version: CACHE_SCHEMA_VERSION.to_string(),
        timestamp: Utc::now(),
        ttl_ms,
    };
    Ok(serde_json::to_string(&entry)?)
}

/// Parse and validate a stored envelope.
///
/// Returns `None` on parse failure, version mismatch, checksum mismatch, or
/// an implausibly-future timestamp. Callers must treat `None` identically
/// to "key not found".
pub fn decode<T: DeserializeOwned>(raw: &str) -> Option<CacheEntry<T>> {
    let entry: CacheEntry<serde_json::Value> = match serde_json::from_str(raw) {
        Ok(entry) => entry,
        Err(e) => {
            debug!(error = %e, "cache entry failed to parse");
            return None;
        }
    };

    if entry.version != CACHE_SCHEMA_VERSION {
        debug!(version = %entry.version, "cache entry version mismatch");
        return None;
    }

    if checksum_of(&entry.data) != entry.checksum {
        debug!("cache entry checksum mismatch");
        return None;
    }

    let horizon = Utc::now() + Duration::seconds(FUTURE_TIMESTAMP_TOLERANCE_SECS);
    if entry.timestamp > horizon {
        debug!(timestamp = %entry.timestamp, "cache entry timestamp is in the future");
        return None;
    }

    let data: T = match serde_json::from_value(entry.data) {
        Ok(data) => data,
        Err(e) => {
            debug!(error = %e, "cache payload failed to deserialize");
            return None;
        }
    };

    Some(CacheEntry {
        data,
        version: entry.version,
        timestamp: entry.timestamp,
        ttl_ms: entry.ttl_ms,
        checksum: entry.checksum,
    })
}

// ============================================================================
// Tests
// ============================================================================
