//! Read-path data access: the contract every consumer goes through.
//!
//! Per collection, in order: try the cache (orders of magnitude faster
//! than the network); on a fresh hit return immediately; on a stale hit
//! return the cached rows and revalidate in the background; on a miss or
//! corruption fetch from the backend and opportunistically write back; if
//! the network also fails, surface a typed error - never an empty list a
//! caller could mistake for a legitimately empty collection.
//!
//! Consumers only ever see unwrapped domain records, never envelopes.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, warn};

use crate::api::{ApiError, ConferenceBackend};
use crate::auth::SessionGuard;
use crate::cache::{CacheManager, Freshness};
use crate::models::{
    AgendaSession, Announcement, Attendee, AttendeeProfile, SeatingAssignment, Sponsor,
};
use crate::sync::{Collection, SyncManager};

#[derive(Error, Debug)]
pub enum DataError {
    #[error("couldn't load {collection}: not cached and the network request failed")]
    Unavailable {
        collection: &'static str,
        #[source]
        source: ApiError,
    },

    #[error("{collection} rows did not match the expected shape")]
    Malformed { collection: &'static str },
}

pub struct DataAccess {
    cache: Arc<CacheManager>,
    sync: Arc<SyncManager>,
    backend: Arc<dyn ConferenceBackend>,
    guard: Arc<SessionGuard>,
}

impl DataAccess {
    pub fn new(
        cache: Arc<CacheManager>,
        sync: Arc<SyncManager>,
        backend: Arc<dyn ConferenceBackend>,
        guard: Arc<SessionGuard>,
    ) -> Self {
        Self {
            cache,
            sync,
            backend,
            guard,
        }
    }

    pub async fn attendees(&self) -> Result<Vec<Attendee>, DataError> {
        self.collection(Collection::Attendees).await
    }

    pub async fn agenda(&self) -> Result<Vec<AgendaSession>, DataError> {
        self.collection(Collection::Sessions).await
    }

    pub async fn seating(&self) -> Result<Vec<SeatingAssignment>, DataError> {
        self.collection(Collection::Seating).await
    }

    pub async fn sponsors(&self) -> Result<Vec<Sponsor>, DataError> {
        self.collection(Collection::Sponsors).await
    }

    pub async fn announcements(&self) -> Result<Vec<Announcement>, DataError> {
        self.collection(Collection::Announcements).await
    }

    pub async fn profile(&self) -> Result<Option<AttendeeProfile>, DataError> {
        let rows: Vec<AttendeeProfile> = self.collection(Collection::Profile).await?;
        Ok(rows.into_iter().next())
    }

    async fn collection<T: DeserializeOwned>(
        &self,
        collection: Collection,
    ) -> Result<Vec<T>, DataError> {
        let key = collection.cache_key();

        match self.cache.get_with_freshness::<Vec<T>>(key).await {
            Some((rows, Freshness::Fresh)) => return Ok(rows),
            Some((rows, Freshness::Stale)) => {
                // Stale-while-revalidate: serve what we have, refresh in
                // the background.
                debug!(key, "serving stale rows; revalidating in background");
                self.spawn_revalidate(collection);
                return Ok(rows);
            }
            None => {}
        }

        // Older releases stored the payload without an envelope. Accept
        // it once, classified stale so it gets rewritten enveloped.
        if let Some(rows) = self.cache.get_legacy::<Vec<T>>(key).await {
            debug!(key, "serving legacy-shaped rows; revalidating in background");
            self.spawn_revalidate(collection);
            return Ok(rows);
        }

        self.fetch_and_backfill(collection).await
    }

    /// Network fallback: fetch, sanitize, opportunistically cache (the
    /// write is subject to the logout guard), return typed rows.
    async fn fetch_and_backfill<T: DeserializeOwned>(
        &self,
        collection: Collection,
    ) -> Result<Vec<T>, DataError> {
        let mut rows = self
            .backend
            .fetch_rows(collection.endpoint())
            .await
            .map_err(|source| DataError::Unavailable {
                collection: collection.endpoint(),
                source,
            })?;

        collection.sanitize_rows(&mut rows);
        self.cache
            .set(collection.cache_key(), &rows, collection.ttl_ms())
            .await;

        rows.into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<T>, _>>()
            .map_err(|e| {
                warn!(collection = collection.endpoint(), error = %e, "fetched rows failed to deserialize");
                DataError::Malformed {
                    collection: collection.endpoint(),
                }
            })
    }

    fn spawn_revalidate(&self, collection: Collection) {
        if self.guard.is_logout_in_progress() {
            return;
        }
        let sync = Arc::clone(&self.sync);
        tokio::spawn(async move {
            if let Err(e) = sync.refresh_collection(collection).await {
                debug!(collection = collection.endpoint(), error = %e, "background revalidation failed");
            }
        });
    }
}

// ============================================================================
// Tests
// ============================================================================
