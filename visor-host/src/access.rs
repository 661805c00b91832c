//! Access-validator selection.

use async_trait::async_trait;
use tracing::warn;

use visor_core::access::{AccessValidator, HttpAccessValidator};
use visor_core::error::VisorError;

/// Validator that accepts everything. Selected only when no access
/// service is configured; meant for development setups.
pub struct PermissiveValidator;

#[async_trait]
impl AccessValidator for PermissiveValidator {
    async fn validate_pin(&self, _pin: &str) -> Result<bool, VisorError> {
        Ok(true)
    }

    async fn check_permission(
        &self,
        _user_id: &str,
        _permission: &str,
    ) -> Result<bool, VisorError> {
        Ok(true)
    }
}

/// Pick the validator for the configured access-service URL.
pub fn build_validator(access_url: &str) -> std::sync::Arc<dyn AccessValidator> {
    if access_url.is_empty() {
        warn!("no access service configured; PIN/permission checks are disabled");
        std::sync::Arc::new(PermissiveValidator)
    } else {
        std::sync::Arc::new(HttpAccessValidator::new(access_url))
    }
}

// ── Tests ────────────────────────────────────────────────────────
