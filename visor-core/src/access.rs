//! Client for the external PIN / permission validation service.
//!
//! Session validation makes two network calls against this collaborator:
//! an optional PIN check and, when a user id is present, a permission
//! check for `session.create`. Neither call is retried here — a transport
//! failure is treated as a validation failure by the caller.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::VisorError;

/// Permission string checked for every session creation.
pub const PERMISSION_SESSION_CREATE: &str = "session.create";

// ── AccessValidator ──────────────────────────────────────────────

/// Capability interface over the access service.
///
/// The engine depends only on this trait; tests substitute an in-memory
/// implementation.
#[async_trait]
pub trait AccessValidator: Send + Sync {
    /// Check a session PIN.
    async fn validate_pin(&self, pin: &str) -> Result<bool, VisorError>;

    /// Check that `user_id` holds `permission`.
    async fn check_permission(&self, user_id: &str, permission: &str)
    -> Result<bool, VisorError>;
}

// ── HttpAccessValidator ──────────────────────────────────────────

#[derive(Serialize)]
struct PinBody<'a> {
    pin: &'a str,
}

#[derive(Serialize)]
struct PermissionBody<'a> {
    user_id: &'a str,
    permission: &'a str,
}

#[derive(Deserialize)]
struct AllowedBody {
    allowed: bool,
}

/// HTTP implementation against the access service's JSON endpoints:
/// `POST {base}/validate-pin` and `POST {base}/check-permission`, both
/// answering `{"allowed": bool}`.
pub struct HttpAccessValidator {
    http: reqwest::Client,
    base_url: String,
}

impl HttpAccessValidator {
    /// Create a validator for the service rooted at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    async fn post_allowed<B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<bool, VisorError> {
        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), path);
        let resp = self.http.post(&url).json(body).send().await?;
        let resp = resp.error_for_status()?;
        let body: AllowedBody = resp.json().await?;
        Ok(body.allowed)
    }
}

#[async_trait]
impl AccessValidator for HttpAccessValidator {
    async fn validate_pin(&self, pin: &str) -> Result<bool, VisorError> {
        self.post_allowed("validate-pin", &PinBody { pin }).await
    }

    async fn check_permission(
        &self,
        user_id: &str,
        permission: &str,
    ) -> Result<bool, VisorError> {
        self.post_allowed(
            "check-permission",
            &PermissionBody {
                user_id,
                permission,
            },
        )
        .await
    }
}

// ── Tests ────────────────────────────────────────────────────────
