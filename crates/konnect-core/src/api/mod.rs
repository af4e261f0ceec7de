//! Conference backend access.
//!
//! The backend is a BaaS-style record API: bulk reads per collection under
//! row-level security, plus an auth endpoint that exchanges an attendee
//! access code for a session. The cache and sync layers only ever see the
//! [`ConferenceBackend`] trait, so they are testable against mocks.

mod client;
mod error;

pub use client::ApiClient;
pub use error::ApiError;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Session material returned by a successful sign-in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSession {
    pub access_token: String,
    pub attendee_id: String,
    pub display_name: String,
    pub expires_at: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait ConferenceBackend: Send + Sync {
    /// Bulk-read all visible rows of a collection. Row-level security on
    /// the backend decides visibility; the client just asks for
    /// everything.
    async fn fetch_rows(&self, collection: &str) -> Result<Vec<serde_json::Value>, ApiError>;

    /// Exchange an attendee access code for a session.
    async fn sign_in(&self, access_code: &str) -> Result<ProviderSession, ApiError>;

    /// Invalidate the provider-side session. Local logout proceeds even
    /// when this fails - logout must work offline.
    async fn sign_out(&self) -> Result<(), ApiError>;

    /// Adopt a previously issued session token, e.g. after restoring a
    /// persisted session on app start. Backends without per-session state
    /// can ignore this.
    fn resume(&self, _access_token: &str) {}
}
