//! The unified cache service: sole gateway to the persistent store for
//! cache data.
//!
//! Reads never throw - storage and decode failures are recorded and
//! reported as misses. Writes are fail-soft: a failed cache write must
//! never break the caller's primary operation. Writes also honor the
//! logout guard, including a post-write re-check that rolls back any write
//! that landed while a purge was running underneath it.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::auth::SessionGuard;
use crate::store::{KeyValueStore, StoreError};

use super::{codec, events, CacheEvent, Freshness};

/// Aggregate cache metrics, purely diagnostic.
#[derive(Debug, Clone)]
pub struct CacheHealth {
    pub hit_rate: f64,
    pub error_count: u64,
    pub last_checked_at: Option<DateTime<Utc>>,
}

/// Result of a pattern purge sweep.
#[derive(Debug, Default)]
pub struct PurgeOutcome {
    pub cleared: Vec<String>,
    /// Keys that matched but could not be deleted.
    pub failed: Vec<String>,
}

#[derive(Debug, Default)]
struct Metrics {
    hits: AtomicU64,
    misses: AtomicU64,
    errors: AtomicU64,
    /// Millisecond timestamp of the most recent read, 0 if never.
    last_checked_ms: AtomicI64,
}

impl Metrics {
    fn touch(&self) {
        self.last_checked_ms
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }
}

pub struct CacheManager {
    store: Arc<dyn KeyValueStore>,
    guard: Arc<SessionGuard>,
    metrics: Metrics,
    events: broadcast::Sender<CacheEvent>,
}

impl CacheManager {
    pub fn new(store: Arc<dyn KeyValueStore>, guard: Arc<SessionGuard>) -> Self {
        Self {
            store,
            guard,
            metrics: Metrics::default(),
            events: events::channel(),
        }
    }

    /// Subscribe to change notifications. Events are delivered only after
    /// the corresponding store write committed.
    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.events.subscribe()
    }

    /// Read a cached value, fresh or stale. `None` means miss, corrupt,
    /// or storage failure - indistinguishable by design.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.get_with_freshness(key).await.map(|(data, _)| data)
    }

    /// Read a cached value along with its freshness classification.
    pub async fn get_with_freshness<T: DeserializeOwned>(
        &self,
        key: &str,
    ) -> Option<(T, Freshness)> {
        self.metrics.touch();

        let raw = match self.store.get(key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                self.metrics.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
            Err(e) => {
                self.metrics.errors.fetch_add(1, Ordering::Relaxed);
                self.metrics.misses.fetch_add(1, Ordering::Relaxed);
                debug!(key, error = %e, "cache read failed; treating as miss");
                return None;
            }
        };

        match codec::decode::<T>(&raw) {
            Some(entry) => {
                self.metrics.hits.fetch_add(1, Ordering::Relaxed);
                let freshness = if entry.is_stale() {
                    Freshness::Stale
                } else {
                    Freshness::Fresh
                };
                Some((entry.data, freshness))
            }
            None => {
                // Corrupt entries must behave exactly like absent keys.
                self.metrics.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Read a value stored in the legacy raw shape (the payload serialized
    /// directly, no envelope). Always classified stale so callers refresh
    /// it into the enveloped shape.
    pub async fn get_legacy<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.store.get(key).await.ok()??;
        let data = serde_json::from_str(&raw).ok()?;
        self.metrics.hits.fetch_add(1, Ordering::Relaxed);
        Some(data)
    }

    /// Write a value under `key` with the given TTL.
    ///
    /// Fail-soft: encode and storage errors are logged and swallowed. A
    /// write attempted during logout is a silent no-op, and a write that
    /// lands while a purge is running is rolled back - no write may be
    /// observed to survive a logout that began before it committed.
    pub async fn set<T: Serialize>(&self, key: &str, data: &T, ttl_ms: u64) {
        if self.guard.is_logout_in_progress() {
            debug!(key, "cache write rejected: logout in progress");
            return;
        }

        let generation = self.guard.purge_generation();

        let raw = match codec::encode(data, ttl_ms) {
            Ok(raw) => raw,
            Err(e) => {
                self.metrics.errors.fetch_add(1, Ordering::Relaxed);
                warn!(key, error = %e, "failed to encode cache entry");
                return;
            }
        };

        if let Err(e) = self.store.set(key, &raw).await {
            self.metrics.errors.fetch_add(1, Ordering::Relaxed);
            warn!(key, error = %e, "cache write failed");
            return;
        }

        if self.guard.purge_generation() != generation {
            debug!(key, "cache write landed during logout; rolling back");
            if let Err(e) = self.store.remove(key).await {
                warn!(key, error = %e, "failed to roll back post-logout write");
            }
            return;
        }

        let _ = self.events.send(CacheEvent::Updated {
            key: key.to_string(),
        });
    }

    pub async fn remove(&self, key: &str) {
        if let Err(e) = self.store.remove(key).await {
            self.metrics.errors.fetch_add(1, Ordering::Relaxed);
            warn!(key, error = %e, "cache remove failed");
            return;
        }
        let _ = self.events.send(CacheEvent::Removed {
            key: key.to_string(),
        });
    }

    /// Delete every key beginning with `prefix`. Returns how many were
    /// removed.
    pub async fn invalidate_prefix(&self, prefix: &str) -> usize {
        let keys = match self.store.keys().await {
            Ok(keys) => keys,
            Err(e) => {
                self.metrics.errors.fetch_add(1, Ordering::Relaxed);
                warn!(prefix, error = %e, "cache invalidation could not enumerate keys");
                return 0;
            }
        };

        let mut removed = 0;
        for key in keys.iter().filter(|k| k.starts_with(prefix)) {
            match self.store.remove(key).await {
                Ok(()) => removed += 1,
                Err(e) => {
                    self.metrics.errors.fetch_add(1, Ordering::Relaxed);
                    warn!(key = %key, error = %e, "cache invalidation failed for key");
                }
            }
        }

        let _ = self.events.send(CacheEvent::Invalidated {
            prefix: prefix.to_string(),
            removed,
        });
        removed
    }

    /// Delete every key matching `predicate`. Used by the logout purge.
    ///
    /// Enumeration failure is a hard error (the purge cannot claim
    /// success without knowing what was in the store); individual delete
    /// failures are collected and reported, not fatal to the sweep.
    pub async fn purge_matching(
        &self,
        predicate: impl Fn(&str) -> bool,
    ) -> Result<PurgeOutcome, StoreError> {
        let keys = self.store.keys().await?;

        let mut outcome = PurgeOutcome::default();
        for key in keys.into_iter().filter(|k| predicate(k)) {
            match self.store.remove(&key).await {
                Ok(()) => outcome.cleared.push(key),
                Err(e) => {
                    warn!(key = %key, error = %e, "purge failed to delete key");
                    outcome.failed.push(key);
                }
            }
        }

        let _ = self.events.send(CacheEvent::Purged {
            removed: outcome.cleared.len(),
        });
        Ok(outcome)
    }

    pub fn health_status(&self) -> CacheHealth {
        let hits = self.metrics.hits.load(Ordering::Relaxed);
        let misses = self.metrics.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        let hit_rate = if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        };

        let last_ms = self.metrics.last_checked_ms.load(Ordering::Relaxed);
        let last_checked_at = if last_ms == 0 {
            None
        } else {
            Utc.timestamp_millis_opt(last_ms).single()
        };

        CacheHealth {
            hit_rate,
            error_count: self.metrics.errors.load(Ordering::Relaxed),
            last_checked_at,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
