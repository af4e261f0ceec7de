//! HTTP client for the conference backend.
//!
//! Speaks the BaaS REST dialect: `/rest/v1/<collection>?select=*` for bulk
//! reads with an `apikey` header plus a bearer token, `/auth/v1/*` for
//! sign-in and sign-out.

use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use reqwest::{header, Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, warn};

use super::{ApiError, ConferenceBackend, ProviderSession};

// ============================================================================
// Constants
// ============================================================================

/// HTTP request timeout in seconds.
/// 30s allows for slow conference venue networks while failing fast enough
/// that a stuck request cannot pin the sync mutual-exclusion flag for long.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Maximum number of retries for rate-limited (429) requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 1000;

/// Random jitter added to each backoff so clients in the same conference
/// hall do not retry in lockstep.
const RETRY_JITTER_MS: u64 = 250;

#[derive(Debug, Deserialize)]
struct AuthResponse {
    access_token: String,
    expires_in: Option<i64>,
    attendee: AuthAttendee,
}

#[derive(Debug, Deserialize)]
struct AuthAttendee {
    id: String,
    display_name: String,
}

/// API client for the conference backend.
/// Clone is cheap - reqwest::Client uses Arc internally for connection
/// pooling - but the bearer token is per-instance state.
pub struct ApiClient {
    client: Client,
    base_url: String,
    anon_key: String,
    token: RwLock<Option<String>>,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, anon_key: impl Into<String>) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            anon_key: anon_key.into(),
            token: RwLock::new(None),
        })
    }

    fn bearer(&self) -> Option<String> {
        self.token.read().ok().and_then(|t| t.clone())
    }

    fn set_bearer(&self, token: Option<String>) {
        if let Ok(mut slot) = self.token.write() {
            *slot = token;
        }
    }

    fn request_headers(&self) -> Result<header::HeaderMap, ApiError> {
        let mut headers = header::HeaderMap::new();

        let apikey = header::HeaderValue::from_str(&self.anon_key)
            .map_err(|_| ApiError::InvalidResponse("API key is not a valid header".into()))?;
        headers.insert("apikey", apikey);

        // Anonymous requests authenticate with the publishable key; signed
        // in requests use the attendee's session token.
        let bearer = self.bearer().unwrap_or_else(|| self.anon_key.clone());
        let auth = header::HeaderValue::from_str(&format!("Bearer {bearer}"))
            .map_err(|_| ApiError::InvalidResponse("token is not a valid header".into()))?;
        headers.insert(header::AUTHORIZATION, auth);

        Ok(headers)
    }

    async fn check_response(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(ApiError::from_status(status, &body))
    }

    /// GET with bounded retry on 429.
    async fn get_with_retry(&self, url: &str) -> Result<reqwest::Response, ApiError> {
        let mut backoff_ms = INITIAL_BACKOFF_MS;
        let mut attempt = 0;

        loop {
            let response = self
                .client
                .get(url)
                .headers(self.request_headers()?)
                .send()
                .await?;

            if response.status() == StatusCode::TOO_MANY_REQUESTS
                && attempt < MAX_RATE_LIMIT_RETRIES
            {
                attempt += 1;
                let jitter = rand::thread_rng().gen_range(0..RETRY_JITTER_MS);
                let delay = Duration::from_millis(backoff_ms + jitter);
                warn!(url, attempt, ?delay, "rate limited; backing off");
                tokio::time::sleep(delay).await;
                backoff_ms *= 2;
                continue;
            }

            return Self::check_response(response).await;
        }
    }
}

#[async_trait]
impl ConferenceBackend for ApiClient {
    async fn fetch_rows(&self, collection: &str) -> Result<Vec<serde_json::Value>, ApiError> {
        let url = format!("{}/rest/v1/{}?select=*", self.base_url, collection);
        debug!(collection, "fetching collection");

        let response = self.get_with_retry(&url).await?;
        let rows: Vec<serde_json::Value> = response.json().await?;
        Ok(rows)
    }

    async fn sign_in(&self, access_code: &str) -> Result<ProviderSession, ApiError> {
        let url = format!("{}/auth/v1/token?grant_type=access_code", self.base_url);

        let response = self
            .client
            .post(&url)
            .header("apikey", &self.anon_key)
            .json(&serde_json::json!({ "access_code": access_code }))
            .send()
            .await?;

        let response = Self::check_response(response).await?;
        let auth: AuthResponse = response.json().await?;

        self.set_bearer(Some(auth.access_token.clone()));

        Ok(ProviderSession {
            access_token: auth.access_token,
            attendee_id: auth.attendee.id,
            display_name: auth.attendee.display_name,
            expires_at: auth
                .expires_in
                .map(|secs| Utc::now() + chrono::Duration::seconds(secs)),
        })
    }

    async fn sign_out(&self) -> Result<(), ApiError> {
        let url = format!("{}/auth/v1/logout", self.base_url);
        let result = async {
            let response = self
                .client
                .post(&url)
                .headers(self.request_headers()?)
                .send()
                .await?;
            Self::check_response(response).await?;
            Ok(())
        }
        .await;

        // The local token is gone either way; a failed provider call only
        // means the server-side session outlives us briefly.
        self.set_bearer(None);
        result
    }

    fn resume(&self, access_token: &str) {
        self.set_bearer(Some(access_token.to_string()));
    }
}
