//! Logout: a point of no return for cached data.
//!
//! The sequence is strictly ordered and each step's side effects are
//! preconditions for the next:
//!
//! 0. Stop the world: raise the guard flag (first synchronous action),
//!    cancel the periodic timer, abort the in-flight sync.
//! 1. Purge persisted data by key pattern.
//! 2. Clear secondary stores (offline assets), best-effort.
//! 3. Provider sign-out, best-effort - logout must work offline.
//! 4. Reset in-memory auth state, last, so observers only see the flag
//!    flip once the data is already gone.
//!
//! Every step is wrapped so one failure cannot stop the steps after it.
//! Only a failed Step 1 marks the whole operation unsuccessful; that is
//! the security-critical guarantee.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::api::ConferenceBackend;
use crate::cache::{keys, CacheManager};
use crate::store::KeyValueStore;
use crate::sync::SyncManager;

use super::{CredentialStore, Session, SessionGuard};

/// What a logout accomplished.
#[derive(Debug, Default)]
pub struct LogoutReport {
    /// False only when the core local-data purge (Step 1) failed.
    pub success: bool,
    /// Keys removed from the primary store.
    pub cleared_keys: Vec<String>,
    /// Non-fatal problems encountered along the way.
    pub errors: Vec<String>,
}

pub struct LogoutManager {
    guard: Arc<SessionGuard>,
    cache: Arc<CacheManager>,
    sync: Arc<SyncManager>,
    session: Arc<Session>,
    backend: Arc<dyn ConferenceBackend>,
    /// Secondary stores holding offline assets; cleared wholesale.
    aux_stores: Vec<Arc<dyn KeyValueStore>>,
    /// Keychain memory of the access code, if the app keeps one.
    credentials: Option<CredentialStore>,
}

impl LogoutManager {
    pub fn new(
        guard: Arc<SessionGuard>,
        cache: Arc<CacheManager>,
        sync: Arc<SyncManager>,
        session: Arc<Session>,
        backend: Arc<dyn ConferenceBackend>,
    ) -> Self {
        Self {
            guard,
            cache,
            sync,
            session,
            backend,
            aux_stores: Vec::new(),
            credentials: None,
        }
    }

    pub fn with_aux_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.aux_stores.push(store);
        self
    }

    pub fn with_credentials(mut self, credentials: CredentialStore) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Run the full logout sequence. Never panics, never throws; the
    /// report says what was cleared and what went wrong.
    pub async fn logout(&self) -> LogoutReport {
        let mut report = LogoutReport {
            success: true,
            ..Default::default()
        };

        info!("logout started");

        // Step 0 - stop the world. The flag raise is the very first
        // synchronous action: from this instant cache writes and sync
        // starts self-reject, before anything here awaits.
        self.guard.begin_logout();
        self.sync.stop_periodic_sync();
        self.sync.abort_pending_sync();

        // Step 1 - purge persisted data by pattern.
        match self.cache.purge_matching(keys::is_purged_on_logout).await {
            Ok(outcome) => {
                report.cleared_keys = outcome.cleared;
                if !outcome.failed.is_empty() {
                    report.success = false;
                    for key in outcome.failed {
                        report.errors.push(format!("failed to delete key {key}"));
                    }
                }
            }
            Err(e) => {
                error!(error = %e, "core data purge failed");
                report.success = false;
                report.errors.push(format!("core data purge failed: {e}"));
            }
        }

        // Step 2 - secondary stores, best-effort.
        for store in &self.aux_stores {
            if let Err(e) = Self::clear_store(store.as_ref()).await {
                warn!(error = %e, "failed to clear secondary store");
                report.errors.push(format!("secondary store: {e}"));
            }
        }

        // Step 3 - provider sign-out, best-effort. A dead network must
        // not keep confidential data on the device.
        if let Err(e) = self.backend.sign_out().await {
            warn!(error = %e, "provider sign-out failed");
            report.errors.push(format!("provider sign-out: {e}"));
        }

        if let Some(credentials) = &self.credentials {
            if credentials.has_credentials() {
                if let Err(e) = credentials.delete() {
                    warn!(error = %e, "failed to forget saved access code");
                    report.errors.push(format!("credential store: {e}"));
                }
            }
        }

        // Step 4 - in-memory reset, last.
        self.session.reset();
        self.guard.end_logout();

        if report.success {
            info!(cleared = report.cleared_keys.len(), "logout completed");
        } else {
            error!(
                cleared = report.cleared_keys.len(),
                errors = report.errors.len(),
                "logout completed with a failed data purge"
            );
        }

        report
    }

    async fn clear_store(store: &dyn KeyValueStore) -> Result<(), crate::store::StoreError> {
        for key in store.keys().await? {
            if let Err(e) = store.remove(&key).await {
                debug!(key = %key, error = %e, "secondary store key survived clear");
                return Err(e);
            }
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ApiError, ProviderSession};
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Default)]
    struct StubBackend {
        sign_out_fails: bool,
        signed_out: AtomicBool,
    }

    #[async_trait]
    impl ConferenceBackend for StubBackend {
        async fn fetch_rows(
            &self,
            _collection: &str,
        ) -> Result<Vec<serde_json::Value>, ApiError> {
            Ok(vec![])
        }

        async fn sign_in(&self, _access_code: &str) -> Result<ProviderSession, ApiError> {
            unimplemented!("not used by logout tests")
        }

        async fn sign_out(&self) -> Result<(), ApiError> {
            self.signed_out.store(true, Ordering::SeqCst);
            if self.sign_out_fails {
                return Err(ApiError::ServerError("offline".into()));
            }
            Ok(())
        }
    }

    struct Rig {
        store: Arc<MemoryStore>,
        backend: Arc<StubBackend>,
        logout: LogoutManager,
        guard: Arc<SessionGuard>,
        session: Arc<Session>,
    }

    fn rig(backend: StubBackend) -> Rig {
        let guard = Arc::new(SessionGuard::new());
        let store = Arc::new(MemoryStore::new());
        let cache = Arc::new(CacheManager::new(
            Arc::clone(&store) as Arc<dyn KeyValueStore>,
            Arc::clone(&guard),
        ));
        let backend = Arc::new(backend);
        let backend_dyn: Arc<dyn ConferenceBackend> = Arc::clone(&backend) as _;
        let sync = Arc::new(SyncManager::new(
            Arc::clone(&backend_dyn),
            Arc::clone(&cache),
            Arc::clone(&guard),
        ));
        let session = Arc::new(Session::new(
            Arc::clone(&store) as Arc<dyn KeyValueStore>
        ));
        let logout = LogoutManager::new(
            Arc::clone(&guard),
            cache,
            sync,
            Arc::clone(&session),
            backend_dyn,
        );
        Rig {
            store,
            backend,
            logout,
            guard,
            session,
        }
    }

    async fn seed(store: &MemoryStore) {
        for (key, value) in [
            ("kn_cache_attendees", "[]"),
            ("kn_cached_sessions", "[]"),
            ("sb-fjkqhrzkkwawvzpxqdrv-auth-token", "tok"),
            ("conference_auth", "{}"),
            ("user_preferences", "{\"theme\":\"dark\"}"),
        ] {
            store.set(key, value).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_purge_removes_all_owned_keys_and_spares_the_rest() {
        let rig = rig(StubBackend::default());
        seed(&rig.store).await;

        let report = rig.logout.logout().await;

        assert!(report.success);
        assert_eq!(report.cleared_keys.len(), 4);

        let remaining = rig.store.keys().await.unwrap();
        assert_eq!(remaining, vec!["user_preferences".to_string()]);

        // The provider sign-out ran as part of the sequence.
        assert!(rig.backend.signed_out.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_provider_failure_does_not_fail_logout() {
        let rig = rig(StubBackend {
            sign_out_fails: true,
            ..Default::default()
        });
        seed(&rig.store).await;

        let report = rig.logout.logout().await;

        // Local purge succeeded, so the logout did too; the provider
        // error is recorded but non-fatal.
        assert!(report.success);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].contains("provider sign-out"));
        assert!(rig.store.keys().await.unwrap().contains(&"user_preferences".to_string()));
    }

    #[tokio::test]
    async fn test_auth_state_resets_after_purge() {
        let rig = rig(StubBackend::default());
        rig.session
            .establish(&ProviderSession {
                access_token: "tok".into(),
                attendee_id: "att-1".into(),
                display_name: "Ada".into(),
                expires_at: None,
            })
            .await;
        assert!(rig.session.is_authenticated());

        let report = rig.logout.logout().await;

        assert!(report.success);
        assert!(!rig.session.is_authenticated());
        // The session key itself was purged too.
        assert_eq!(
            rig.store.get("conference_auth").await.unwrap(),
            None
        );
        // The guard is lowered again so a fresh login can proceed.
        assert!(!rig.guard.is_logout_in_progress());
    }

    #[tokio::test]
    async fn test_aux_stores_are_cleared() {
        let guard = Arc::new(SessionGuard::new());
        let store = Arc::new(MemoryStore::new());
        let aux = Arc::new(MemoryStore::new());
        aux.set("offline_asset_logo", "bytes").await.unwrap();

        let cache = Arc::new(CacheManager::new(
            Arc::clone(&store) as Arc<dyn KeyValueStore>,
            Arc::clone(&guard),
        ));
        let backend: Arc<dyn ConferenceBackend> = Arc::new(StubBackend::default());
        let sync = Arc::new(SyncManager::new(
            Arc::clone(&backend),
            Arc::clone(&cache),
            Arc::clone(&guard),
        ));
        let session = Arc::new(Session::new(Arc::clone(&store) as Arc<dyn KeyValueStore>));

        let logout = LogoutManager::new(guard, cache, sync, session, backend)
            .with_aux_store(Arc::clone(&aux) as Arc<dyn KeyValueStore>);

        let report = logout.logout().await;
        assert!(report.success);
        assert!(aux.keys().await.unwrap().is_empty());
    }
}
