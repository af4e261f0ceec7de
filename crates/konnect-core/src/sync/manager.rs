//! The sync orchestrator.
//!
//! Owns the login-time "fetch everything and populate the cache" pass and
//! the recurring background revalidation timer, and cooperates with the
//! logout guard: no sync starts during logout, and an in-flight pass can
//! be aborted so logout never waits on the network.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::api::ConferenceBackend;
use crate::auth::SessionGuard;
use crate::cache::CacheManager;

use super::{Collection, SyncError};

/// Maximum collections fetched concurrently within one pass.
/// Keeps a full sync fast without hammering the backend from a hall full
/// of devices syncing at once.
const MAX_CONCURRENT_SYNCS: usize = 4;

/// Aggregated outcome of one full sync pass.
#[derive(Debug)]
pub struct SyncResult {
    /// True only when every collection synced.
    pub success: bool,
    pub synced_keys: Vec<String>,
    pub errors: Vec<SyncError>,
    pub timestamp: DateTime<Utc>,
}

impl SyncResult {
    fn rejected(error: SyncError) -> Self {
        Self {
            success: false,
            synced_keys: Vec::new(),
            errors: vec![error],
            timestamp: Utc::now(),
        }
    }
}

struct PeriodicTask {
    shutdown: watch::Sender<bool>,
    // Held so the task is observably armed; the task exits via the
    // shutdown signal, not via abort, so a tick mid-sync can finish
    // cleanly.
    _handle: JoinHandle<()>,
}

pub struct SyncManager {
    backend: Arc<dyn ConferenceBackend>,
    cache: Arc<CacheManager>,
    guard: Arc<SessionGuard>,
    /// Cancel handle for the in-flight pass, if any.
    cancel: Mutex<Option<watch::Sender<bool>>>,
    periodic: Mutex<Option<PeriodicTask>>,
}

impl SyncManager {
    pub fn new(
        backend: Arc<dyn ConferenceBackend>,
        cache: Arc<CacheManager>,
        guard: Arc<SessionGuard>,
    ) -> Self {
        Self {
            backend,
            cache,
            guard,
            cancel: Mutex::new(None),
            periodic: Mutex::new(None),
        }
    }

    /// Fetch every collection and populate the cache.
    ///
    /// One collection's failure never aborts the others; the result lists
    /// which collections synced and which errored. Refuses to run during
    /// logout, and refuses to overlap with another pass (mutual
    /// exclusion, not a queue).
    pub async fn sync_all(&self) -> SyncResult {
        if self.guard.is_logout_in_progress() {
            debug!("sync rejected: logout in progress");
            return SyncResult::rejected(SyncError::LogoutInProgress);
        }

        if !self.guard.try_begin_sync() {
            debug!("sync rejected: another pass is running");
            return SyncResult::rejected(SyncError::AlreadyRunning);
        }

        let (cancel_tx, cancel_rx) = watch::channel(false);
        if let Ok(mut slot) = self.cancel.lock() {
            *slot = Some(cancel_tx);
        }

        info!("full sync started");

        let outcomes: Vec<Result<String, SyncError>> = stream::iter(Collection::ALL)
            .map(|collection| {
                let cancel = cancel_rx.clone();
                async move { self.sync_collection(collection, cancel).await }
            })
            .buffer_unordered(MAX_CONCURRENT_SYNCS)
            .collect()
            .await;

        if let Ok(mut slot) = self.cancel.lock() {
            *slot = None;
        }
        self.guard.end_sync();

        let mut synced_keys = Vec::new();
        let mut errors = Vec::new();
        for outcome in outcomes {
            match outcome {
                Ok(key) => synced_keys.push(key),
                Err(e) => errors.push(e),
            }
        }
        synced_keys.sort();

        let success = errors.is_empty();
        if success {
            info!(collections = synced_keys.len(), "full sync completed");
        } else {
            warn!(
                synced = synced_keys.len(),
                failed = errors.len(),
                "full sync completed with errors"
            );
        }

        SyncResult {
            success,
            synced_keys,
            errors,
            timestamp: Utc::now(),
        }
    }

    /// Fetch, sanitize and cache one collection as part of a pass.
    async fn sync_collection(
        &self,
        collection: Collection,
        mut cancel: watch::Receiver<bool>,
    ) -> Result<String, SyncError> {
        if self.guard.is_logout_in_progress() {
            return Err(SyncError::LogoutInProgress);
        }

        let fetched = tokio::select! {
            biased;
            _ = cancel.wait_for(|cancelled| *cancelled) => {
                debug!(collection = collection.endpoint(), "fetch aborted");
                return Err(SyncError::Aborted {
                    collection: collection.endpoint(),
                });
            }
            fetched = self.backend.fetch_rows(collection.endpoint()) => fetched,
        };

        let mut rows = fetched.map_err(|source| SyncError::Fetch {
            collection: collection.endpoint(),
            source,
        })?;

        collection.sanitize_rows(&mut rows);
        self.cache
            .set(collection.cache_key(), &rows, collection.ttl_ms())
            .await;

        Ok(collection.cache_key().to_string())
    }

    /// Refresh a single collection outside a full pass, e.g. when the
    /// read path serves a stale entry. Subject to the logout guard; the
    /// cache write additionally rolls itself back if a purge intervenes.
    pub async fn refresh_collection(&self, collection: Collection) -> Result<String, SyncError> {
        if self.guard.is_logout_in_progress() {
            return Err(SyncError::LogoutInProgress);
        }

        let mut rows = self
            .backend
            .fetch_rows(collection.endpoint())
            .await
            .map_err(|source| SyncError::Fetch {
                collection: collection.endpoint(),
                source,
            })?;

        collection.sanitize_rows(&mut rows);
        self.cache
            .set(collection.cache_key(), &rows, collection.ttl_ms())
            .await;

        Ok(collection.cache_key().to_string())
    }

    /// Arm the recurring revalidation timer. No-op if already armed or if
    /// a logout is underway.
    pub fn start_periodic_sync(self: &Arc<Self>, every: Duration) {
        if self.guard.is_logout_in_progress() {
            debug!("periodic sync not armed: logout in progress");
            return;
        }

        let Ok(mut slot) = self.periodic.lock() else {
            return;
        };
        if slot.is_some() {
            debug!("periodic sync already armed");
            return;
        }

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let manager = Arc::clone(self);

        let handle = tokio::spawn(async move {
            let mut ticker = interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // interval() fires immediately; the login sync just ran, so
            // the first revalidation belongs one full interval out.
            ticker.tick().await;

            info!(every_secs = every.as_secs(), "periodic sync started");

            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            debug!("periodic sync shutting down");
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        if manager.guard.is_logout_in_progress() {
                            debug!("skipping periodic sync tick: logout in progress");
                            continue;
                        }
                        let result = manager.sync_all().await;
                        if !result.success {
                            warn!(errors = result.errors.len(), "periodic sync pass had errors");
                        }
                    }
                }
            }
        });

        *slot = Some(PeriodicTask {
            shutdown: shutdown_tx,
            _handle: handle,
        });
    }

    /// Cancel the recurring timer. Idempotent: safe to call twice or when
    /// no timer is armed.
    pub fn stop_periodic_sync(&self) {
        let task = match self.periodic.lock() {
            Ok(mut slot) => slot.take(),
            Err(_) => None,
        };
        if let Some(task) = task {
            let _ = task.shutdown.send(true);
            debug!("periodic sync stopped");
        }
    }

    /// Abort the in-flight pass, if any, and force the mutual-exclusion
    /// flag down. Used by the logout path; after this returns, no sync
    /// write can complete (in-flight fetches cancel at their next await
    /// point, and any write that already passed the guard rolls itself
    /// back against the purge generation).
    pub fn abort_pending_sync(&self) {
        if let Ok(mut slot) = self.cancel.lock() {
            if let Some(cancel) = slot.take() {
                let _ = cancel.send(true);
                debug!("in-flight sync aborted");
            }
        }
        self.guard.end_sync();
    }

    pub fn is_sync_in_progress(&self) -> bool {
        self.guard.is_sync_in_progress()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ApiError;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use serde_json::json;

    #[derive(Default)]
    struct MockBackend {
        fetches: AtomicUsize,
        fail: HashSet<&'static str>,
        /// When set, fetches park forever (until aborted).
        hang: bool,
    }

    impl MockBackend {
        fn failing(collections: &[&'static str]) -> Self {
            Self {
                fail: collections.iter().copied().collect(),
                ..Default::default()
            }
        }

        fn fetch_count(&self) -> usize {
            self.fetches.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ConferenceBackend for MockBackend {
        async fn fetch_rows(
            &self,
            collection: &str,
        ) -> Result<Vec<serde_json::Value>, ApiError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            if self.hang {
                std::future::pending::<()>().await;
            }
            if self.fail.contains(collection) {
                return Err(ApiError::ServerError(format!("{collection} unavailable")));
            }
            Ok(vec![json!({ "id": 1, "collection": collection })])
        }

        async fn sign_in(&self, _access_code: &str) -> Result<crate::api::ProviderSession, ApiError> {
            unimplemented!("not used by sync tests")
        }

        async fn sign_out(&self) -> Result<(), ApiError> {
            Ok(())
        }
    }

    fn rig(backend: MockBackend) -> (Arc<SyncManager>, Arc<CacheManager>, Arc<SessionGuard>, Arc<MockBackend>) {
        let guard = Arc::new(SessionGuard::new());
        let cache = Arc::new(CacheManager::new(
            Arc::new(MemoryStore::new()),
            Arc::clone(&guard),
        ));
        let backend = Arc::new(backend);
        let sync = Arc::new(SyncManager::new(
            Arc::clone(&backend) as Arc<dyn ConferenceBackend>,
            Arc::clone(&cache),
            Arc::clone(&guard),
        ));
        (sync, cache, guard, backend)
    }

    #[tokio::test]
    async fn test_sync_all_populates_every_collection() {
        let (sync, cache, _guard, _backend) = rig(MockBackend::default());

        let result = sync.sync_all().await;
        assert!(result.success);
        assert_eq!(result.synced_keys.len(), Collection::ALL.len());

        for collection in Collection::ALL {
            let rows: Vec<serde_json::Value> = cache.get(collection.cache_key()).await.unwrap();
            assert_eq!(rows.len(), 1, "{}", collection.cache_key());
        }
    }

    #[tokio::test]
    async fn test_sync_during_logout_issues_no_fetches() {
        let (sync, _cache, guard, backend) = rig(MockBackend::default());

        guard.begin_logout();
        let result = sync.sync_all().await;

        assert!(!result.success);
        assert!(matches!(result.errors[0], SyncError::LogoutInProgress));
        assert_eq!(backend.fetch_count(), 0);
    }

    #[tokio::test]
    async fn test_overlapping_sync_is_rejected_not_queued() {
        let (sync, _cache, guard, backend) = rig(MockBackend::default());

        // Simulate a pass already holding the slot.
        assert!(guard.try_begin_sync());
        let result = sync.sync_all().await;
        guard.end_sync();

        assert!(!result.success);
        assert!(matches!(result.errors[0], SyncError::AlreadyRunning));
        assert_eq!(backend.fetch_count(), 0);
    }

    #[tokio::test]
    async fn test_one_failing_collection_does_not_abort_the_rest() {
        let (sync, cache, _guard, _backend) = rig(MockBackend::failing(&["attendees"]));

        let result = sync.sync_all().await;

        assert!(!result.success);
        assert_eq!(result.errors.len(), 1);
        assert!(matches!(
            result.errors[0],
            SyncError::Fetch { collection: "attendees", .. }
        ));
        assert_eq!(result.synced_keys.len(), Collection::ALL.len() - 1);

        // The failed collection stays absent; the sibling synced fine.
        assert!(cache
            .get::<Vec<serde_json::Value>>("kn_cache_attendees")
            .await
            .is_none());
        assert!(cache
            .get::<Vec<serde_json::Value>>("kn_cache_sessions")
            .await
            .is_some());
    }

    #[tokio::test]
    async fn test_stop_periodic_sync_is_idempotent() {
        let (sync, _cache, _guard, _backend) = rig(MockBackend::default());

        // Never armed: both calls are no-ops.
        sync.stop_periodic_sync();
        sync.stop_periodic_sync();

        sync.start_periodic_sync(Duration::from_secs(60));
        sync.stop_periodic_sync();
        sync.stop_periodic_sync();
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_sync_ticks_then_stops() {
        let (sync, _cache, _guard, backend) = rig(MockBackend::default());

        sync.start_periodic_sync(Duration::from_millis(100));
        // First revalidation is one interval out, not immediate.
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(backend.fetch_count(), 0);

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(backend.fetch_count() >= Collection::ALL.len());

        sync.stop_periodic_sync();
        let after_stop = backend.fetch_count();
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(backend.fetch_count(), after_stop);
    }

    #[tokio::test]
    async fn test_abort_cancels_in_flight_pass_and_clears_flag() {
        let (sync, _cache, guard, _backend) = rig(MockBackend {
            hang: true,
            ..Default::default()
        });

        let pass = {
            let sync = Arc::clone(&sync);
            tokio::spawn(async move { sync.sync_all().await })
        };

        // Let the pass reach its parked fetches, then pull the plug.
        tokio::task::yield_now().await;
        assert!(guard.is_sync_in_progress());
        sync.abort_pending_sync();

        let result = pass.await.unwrap();
        assert!(!result.success);
        assert!(result
            .errors
            .iter()
            .all(|e| matches!(e, SyncError::Aborted { .. })));
        assert!(!guard.is_sync_in_progress());
    }
}
