//! Configuration for the visor host service.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use visor_core::clipboard::ConflictPolicy;
use visor_core::host::HostOptions;

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Hub and credential settings.
    pub server: ServerConfig,
    /// Session limits.
    pub session: SessionConfig,
    /// Per-feature toggles.
    pub features: FeatureConfig,
    /// Clipboard sync settings.
    pub clipboard: ClipboardConfig,
    /// OS backend selection.
    pub providers: ProviderConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Hub connection and credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Hub address (`host:port`).
    pub hub_addr: String,
    /// Token endpoint URL. Empty = use `host_secret` directly as the
    /// bearer token.
    pub token_url: String,
    /// PIN/permission access-service base URL. Empty = allow all
    /// (development only).
    pub access_url: String,
    /// This host's identifier at the hub.
    pub host_id: String,
    /// Credential presented to the token endpoint.
    pub host_secret: String,
    /// Display name; empty = machine hostname.
    pub host_name: String,
}

/// Session limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Maximum concurrent sessions.
    pub max_sessions: usize,
}

/// Feature toggles. `recording` and `audio` are accepted for forward
/// compatibility with the dashboard but have no engine support yet.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    pub recording: bool,
    pub file_transfer: bool,
    pub clipboard: bool,
    pub audio: bool,
    pub remote_commands: bool,
}

/// Clipboard sync settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClipboardConfig {
    /// Captured content larger than this is truncated (MiB).
    pub max_content_mib: usize,
    /// Winner when host and client clipboards diverge concurrently.
    pub conflict_policy: ConflictPolicy,
}

/// OS backend selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// `"native"` for the platform backends, `"mock"` for the
    /// in-memory fakes (development, CI).
    pub kind: String,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
    /// Optional log file path. If empty, logs to stderr.
    pub file: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            session: SessionConfig::default(),
            features: FeatureConfig::default(),
            clipboard: ClipboardConfig::default(),
            providers: ProviderConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            hub_addr: "127.0.0.1:7800".into(),
            token_url: String::new(),
            access_url: String::new(),
            host_id: "visor-host".into(),
            host_secret: String::new(),
            host_name: String::new(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { max_sessions: 4 }
    }
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            recording: false,
            file_transfer: true,
            clipboard: true,
            audio: false,
            remote_commands: true,
        }
    }
}

impl Default for ClipboardConfig {
    fn default() -> Self {
        Self {
            max_content_mib: 10,
            conflict_policy: ConflictPolicy::PreferNewest,
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: "native".into(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            file: String::new(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl HostConfig {
    /// Load configuration from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::info!("no config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Engine options derived from this configuration.
    pub fn to_host_options(&self) -> HostOptions {
        HostOptions {
            tick_interval: Duration::from_secs(5),
            conflict_policy: self.clipboard.conflict_policy,
            enable_clipboard: self.features.clipboard,
            enable_file_transfer: self.features.file_transfer,
            enable_remote_commands: self.features.remote_commands,
            shutdown_grace: Duration::from_secs(2),
        }
    }

    /// Clipboard truncation limit in bytes.
    pub fn max_clipboard_bytes(&self) -> usize {
        self.clipboard.max_content_mib.max(1) * 1024 * 1024
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let cfg = HostConfig::default();
        let text = toml::to_string_pretty(&cfg).unwrap();
        assert!(text.contains("hub_addr"));
        assert!(text.contains("max_sessions"));
        assert!(text.contains("conflict_policy"));
    }

    #[test]
    fn roundtrip_config() {
        let cfg = HostConfig::default();
        let text = toml::to_string_pretty(&cfg).unwrap();
        let parsed: HostConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.session.max_sessions, 4);
        assert!(parsed.features.clipboard);
        assert_eq!(parsed.clipboard.conflict_policy, ConflictPolicy::PreferNewest);
    }

    #[test]
    fn options_follow_feature_toggles() {
        let mut cfg = HostConfig::default();
        cfg.features.clipboard = false;
        cfg.features.file_transfer = false;
        let options = cfg.to_host_options();
        assert!(!options.enable_clipboard);
        assert!(!options.enable_file_transfer);
        assert!(options.enable_remote_commands);
    }

    #[test]
    fn clipboard_limit_never_zero() {
        let mut cfg = HostConfig::default();
        cfg.clipboard.max_content_mib = 0;
        assert_eq!(cfg.max_clipboard_bytes(), 1024 * 1024);
    }
}
