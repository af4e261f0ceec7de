//! Persisted session state.
//!
//! Lives at a dedicated key outside the data-cache prefix, written through
//! its own narrow accessor rather than the cache manager: session state is
//! not cached data, it is the record of who is signed in. Created once per
//! login, read on every app start, destroyed exactly once per logout.

use std::sync::RwLock;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::api::ProviderSession;
use crate::cache::keys;
use crate::store::KeyValueStore;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AuthState {
    pub is_authenticated: bool,
    pub attendee_id: Option<String>,
    pub display_name: Option<String>,
    pub access_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub signed_in_at: Option<DateTime<Utc>>,
}

impl AuthState {
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(expires_at) => Utc::now() > expires_at,
            None => false,
        }
    }
}

/// Derived info about the current attendee, persisted separately so the
/// shell can render a name before any sync completes.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct AttendeeInfo {
    attendee_id: String,
    display_name: String,
}

pub struct Session {
    store: Arc<dyn KeyValueStore>,
    state: RwLock<AuthState>,
}

impl Session {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            state: RwLock::new(AuthState::default()),
        }
    }

    /// Restore a persisted session on app start. Returns true when a
    /// valid, unexpired session was found.
    pub async fn restore(&self) -> bool {
        let raw = match self.store.get(keys::SESSION_KEY).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return false,
            Err(e) => {
                debug!(error = %e, "failed to read persisted session");
                return false;
            }
        };

        let restored: AuthState = match serde_json::from_str(&raw) {
            Ok(state) => state,
            Err(e) => {
                debug!(error = %e, "persisted session failed to parse");
                return false;
            }
        };

        if restored.is_expired() || !restored.is_authenticated {
            return false;
        }

        if let Ok(mut state) = self.state.write() {
            *state = restored;
            return true;
        }
        false
    }

    /// Record a fresh login and persist it. Called only after the full
    /// login sync, so consumers observing `is_authenticated` see a warm
    /// cache.
    pub async fn establish(&self, provider: &ProviderSession) {
        let state = AuthState {
            is_authenticated: true,
            attendee_id: Some(provider.attendee_id.clone()),
            display_name: Some(provider.display_name.clone()),
            access_token: Some(provider.access_token.clone()),
            expires_at: provider.expires_at,
            signed_in_at: Some(Utc::now()),
        };

        if let Ok(mut slot) = self.state.write() {
            *slot = state.clone();
        }

        match serde_json::to_string(&state) {
            Ok(raw) => {
                if let Err(e) = self.store.set(keys::SESSION_KEY, &raw).await {
                    warn!(error = %e, "failed to persist session");
                }
            }
            Err(e) => warn!(error = %e, "failed to serialize session"),
        }

        let info = AttendeeInfo {
            attendee_id: provider.attendee_id.clone(),
            display_name: provider.display_name.clone(),
        };
        match serde_json::to_string(&info) {
            Ok(raw) => {
                if let Err(e) = self.store.set(keys::ATTENDEE_INFO_KEY, &raw).await {
                    warn!(error = %e, "failed to persist attendee info");
                }
            }
            Err(e) => warn!(error = %e, "failed to serialize attendee info"),
        }
    }

    pub fn current(&self) -> AuthState {
        self.state
            .read()
            .map(|state| state.clone())
            .unwrap_or_default()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state
            .read()
            .map(|state| state.is_authenticated && !state.is_expired())
            .unwrap_or(false)
    }

    pub fn token(&self) -> Option<String> {
        self.state
            .read()
            .ok()
            .and_then(|state| state.access_token.clone())
    }

    /// Wipe the in-memory state. The persisted keys are the purge's job;
    /// this is deliberately the last step of logout so observers only see
    /// `is_authenticated == false` once the data is already gone.
    pub fn reset(&self) {
        if let Ok(mut state) = self.state.write() {
            *state = AuthState::default();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use chrono::Duration;

    fn provider_session() -> ProviderSession {
        ProviderSession {
            access_token: "tok-123".into(),
            attendee_id: "att-1".into(),
            display_name: "Ada Lovelace".into(),
            expires_at: Some(Utc::now() + Duration::hours(8)),
        }
    }

    #[tokio::test]
    async fn test_establish_persists_and_restore_round_trips() {
        let store = Arc::new(MemoryStore::new());

        let session = Session::new(Arc::clone(&store) as Arc<dyn KeyValueStore>);
        session.establish(&provider_session()).await;
        assert!(session.is_authenticated());

        // A fresh instance over the same store restores the session.
        let reborn = Session::new(Arc::clone(&store) as Arc<dyn KeyValueStore>);
        assert!(reborn.restore().await);
        assert_eq!(reborn.current().attendee_id.as_deref(), Some("att-1"));

        // Derived info landed under its own key.
        assert!(store
            .get(keys::ATTENDEE_INFO_KEY)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_expired_session_does_not_restore() {
        let store = Arc::new(MemoryStore::new());
        let session = Session::new(Arc::clone(&store) as Arc<dyn KeyValueStore>);

        let mut provider = provider_session();
        provider.expires_at = Some(Utc::now() - Duration::minutes(1));
        session.establish(&provider).await;

        let reborn = Session::new(Arc::clone(&store) as Arc<dyn KeyValueStore>);
        assert!(!reborn.restore().await);
        assert!(!reborn.is_authenticated());
    }

    #[tokio::test]
    async fn test_reset_clears_memory_only() {
        let store = Arc::new(MemoryStore::new());
        let session = Session::new(Arc::clone(&store) as Arc<dyn KeyValueStore>);
        session.establish(&provider_session()).await;

        session.reset();
        assert!(!session.is_authenticated());
        assert_eq!(session.token(), None);

        // Persisted state untouched; removing it belongs to the purge.
        assert!(store.get(keys::SESSION_KEY).await.unwrap().is_some());
    }
}
