//! Top-level wiring of the client core.
//!
//! Everything is explicitly constructed and shared by `Arc` - no globals,
//! no ambient singletons - so two independent cores can run on independent
//! timelines in the same process, which is exactly what the guard-flag
//! tests do.

use std::sync::Arc;

use tokio::time::Duration;
use tracing::info;

use crate::api::{ApiError, ConferenceBackend};
use crate::auth::{AuthState, CredentialStore, LogoutManager, LogoutReport, Session, SessionGuard};
use crate::cache::{CacheHealth, CacheManager};
use crate::data::DataAccess;
use crate::store::KeyValueStore;
use crate::sync::{SyncManager, SyncResult};

pub struct App {
    guard: Arc<SessionGuard>,
    cache: Arc<CacheManager>,
    session: Arc<Session>,
    sync: Arc<SyncManager>,
    backend: Arc<dyn ConferenceBackend>,
    logout: LogoutManager,
    data: DataAccess,
}

impl App {
    pub fn new(store: Arc<dyn KeyValueStore>, backend: Arc<dyn ConferenceBackend>) -> Self {
        Self::build(store, backend, Vec::new(), None)
    }

    pub fn with_aux_stores(
        store: Arc<dyn KeyValueStore>,
        backend: Arc<dyn ConferenceBackend>,
        aux_stores: Vec<Arc<dyn KeyValueStore>>,
        credentials: Option<CredentialStore>,
    ) -> Self {
        Self::build(store, backend, aux_stores, credentials)
    }

    fn build(
        store: Arc<dyn KeyValueStore>,
        backend: Arc<dyn ConferenceBackend>,
        aux_stores: Vec<Arc<dyn KeyValueStore>>,
        credentials: Option<CredentialStore>,
    ) -> Self {
        let guard = Arc::new(SessionGuard::new());
        let cache = Arc::new(CacheManager::new(Arc::clone(&store), Arc::clone(&guard)));
        let session = Arc::new(Session::new(Arc::clone(&store)));
        let sync = Arc::new(SyncManager::new(
            Arc::clone(&backend),
            Arc::clone(&cache),
            Arc::clone(&guard),
        ));

        let mut logout = LogoutManager::new(
            Arc::clone(&guard),
            Arc::clone(&cache),
            Arc::clone(&sync),
            Arc::clone(&session),
            Arc::clone(&backend),
        );
        for aux in aux_stores {
            logout = logout.with_aux_store(aux);
        }
        if let Some(credentials) = credentials {
            logout = logout.with_credentials(credentials);
        }

        let data = DataAccess::new(
            Arc::clone(&cache),
            Arc::clone(&sync),
            Arc::clone(&backend),
            Arc::clone(&guard),
        );

        Self {
            guard,
            cache,
            session,
            sync,
            backend,
            logout,
            data,
        }
    }

    /// Restore a persisted session on startup. Returns true when the user
    /// is still signed in.
    pub async fn restore_session(&self) -> bool {
        if !self.session.restore().await {
            return false;
        }
        if let Some(token) = self.session.token() {
            self.backend.resume(&token);
        }
        true
    }

    /// Sign in with an attendee access code.
    ///
    /// The full sync runs *before* the session is marked authenticated:
    /// no consumer may observe an authenticated state over a cold or
    /// stale cache. Login always resyncs everything, regardless of
    /// staleness - login-time freshness is a correctness requirement, not
    /// a cache hint.
    pub async fn login(&self, access_code: &str) -> Result<SyncResult, ApiError> {
        let provider = self.backend.sign_in(access_code).await?;
        info!(attendee = %provider.attendee_id, "sign-in accepted; populating cache");

        let result = self.sync.sync_all().await;
        self.session.establish(&provider).await;
        Ok(result)
    }

    /// Run the guarded logout sequence to completion.
    pub async fn logout(&self) -> LogoutReport {
        self.logout.logout().await
    }

    pub fn start_periodic_sync(&self, every: Duration) {
        self.sync.start_periodic_sync(every);
    }

    pub fn stop_periodic_sync(&self) {
        self.sync.stop_periodic_sync();
    }

    pub async fn sync_all(&self) -> SyncResult {
        self.sync.sync_all().await
    }

    pub fn data(&self) -> &DataAccess {
        &self.data
    }

    pub fn cache(&self) -> &Arc<CacheManager> {
        &self.cache
    }

    pub fn auth_state(&self) -> AuthState {
        self.session.current()
    }

    pub fn health(&self) -> CacheHealth {
        self.cache.health_status()
    }

    pub fn guard(&self) -> &Arc<SessionGuard> {
        &self.guard
    }
}
