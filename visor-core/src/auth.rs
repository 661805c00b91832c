//! Bearer-token acquisition for the hub connection.
//!
//! Tokens come from a token endpoint exchanging the host credentials
//! (`host_id` / `host_secret`) for `{access_token, expires_in}`. The
//! token is cached and refreshed 60 seconds before expiry, so a token
//! is never presented that could lapse mid-registration.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::VisorError;

/// Refresh this long before the reported expiry.
pub const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

#[derive(Serialize)]
struct TokenRequest<'a> {
    host_id: &'a str,
    host_secret: &'a str,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

struct CachedToken {
    value: String,
    expires_at: Instant,
}

enum TokenSource {
    /// Exchange credentials at a token endpoint.
    Endpoint {
        http: reqwest::Client,
        token_url: String,
        host_id: String,
        host_secret: String,
    },
    /// A pre-issued token (tests, pinned deployments).
    Static(String),
}

// ── TokenProvider ────────────────────────────────────────────────

/// Obtains and caches the hub bearer token.
pub struct TokenProvider {
    source: TokenSource,
    cache: Mutex<Option<CachedToken>>,
}

impl TokenProvider {
    /// Provider backed by a token endpoint.
    pub fn new(
        token_url: impl Into<String>,
        host_id: impl Into<String>,
        host_secret: impl Into<String>,
    ) -> Self {
        Self {
            source: TokenSource::Endpoint {
                http: reqwest::Client::new(),
                token_url: token_url.into(),
                host_id: host_id.into(),
                host_secret: host_secret.into(),
            },
            cache: Mutex::new(None),
        }
    }

    /// Provider that always hands out `token`.
    pub fn static_token(token: impl Into<String>) -> Self {
        Self {
            source: TokenSource::Static(token.into()),
            cache: Mutex::new(None),
        }
    }

    /// Current bearer token, fetching or refreshing as needed.
    ///
    /// Concurrent callers share the cache; at most one fetch is in
    /// flight at a time.
    pub async fn bearer(&self) -> Result<String, VisorError> {
        let (http, token_url, host_id, host_secret) = match &self.source {
            TokenSource::Static(token) => return Ok(token.clone()),
            TokenSource::Endpoint {
                http,
                token_url,
                host_id,
                host_secret,
            } => (http, token_url, host_id, host_secret),
        };

        let mut cache = self.cache.lock().await;
        if let Some(cached) = cache.as_ref() {
            if cached.expires_at.saturating_duration_since(Instant::now()) > TOKEN_REFRESH_MARGIN {
                return Ok(cached.value.clone());
            }
        }

        debug!("fetching bearer token");
        let resp = http
            .post(token_url)
            .json(&TokenRequest {
                host_id,
                host_secret,
            })
            .send()
            .await
            .map_err(|e| VisorError::Auth(format!("token endpoint unreachable: {e}")))?
            .error_for_status()
            .map_err(|e| VisorError::Auth(format!("token endpoint rejected credentials: {e}")))?;

        let body: TokenResponse = resp
            .json()
            .await
            .map_err(|e| VisorError::Auth(format!("malformed token response: {e}")))?;

        let token = body.access_token.clone();
        *cache = Some(CachedToken {
            value: body.access_token,
            expires_at: Instant::now() + Duration::from_secs(body.expires_in),
        });
        Ok(token)
    }
}

// ── Tests ────────────────────────────────────────────────────────
