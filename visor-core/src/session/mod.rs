//! Session data model.
//!
//! A [`Session`] is one live remote-control engagement between this host
//! and a remote operator. Sessions are owned exclusively by the
//! [`SessionRegistry`](crate::session::registry::SessionRegistry); the
//! capture pipeline and input relay hold only the session id plus a
//! read handle on the session's [`QualitySettings`].

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

pub mod registry;

pub use registry::{SessionHandle, SessionRegistry};

/// Server-issued session identifier.
pub type SessionId = String;

// ── SessionStatus ────────────────────────────────────────────────

/// Lifecycle status of a session.
///
/// Transitions are one-directional: `Active → Ended` or
/// `Active → TimedOut`. A session is never resurrected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    /// Streaming and accepting input.
    Active,
    /// Ended by explicit request (operator or host shutdown).
    Ended,
    /// Ended by the 8-hour lifetime sweep.
    TimedOut,
}

impl SessionStatus {
    /// Whether this is a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ended | Self::TimedOut)
    }
}

// ── SessionKind ──────────────────────────────────────────────────

/// What the remote operator is allowed to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SessionKind {
    /// Full remote control: screen + input + clipboard.
    #[default]
    Control,
    /// Screen streaming only; input events are dropped.
    View,
}

// ── CompressionKind ──────────────────────────────────────────────

/// Frame payload compression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CompressionKind {
    /// zstd-compressed packed pixel rows.
    #[default]
    Zstd,
    /// Uncompressed packed pixel rows (debugging, LAN links).
    Raw,
}

// ── QualitySettings ──────────────────────────────────────────────

/// Tunable stream parameters for one session.
///
/// Replaced atomically at runtime via a `tokio::sync::watch` channel so a
/// capture loop always observes a fully-formed snapshot — never a
/// partially-updated struct.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualitySettings {
    /// Target frames per second (1..=60).
    pub target_fps: u8,
    /// Resolution scale factor in (0, 1].
    pub scale: f32,
    /// Quality slider (1..=100, 100 = best).
    pub quality: u8,
    /// Payload compression.
    pub compression: CompressionKind,
    /// Advisory bitrate budget in kbit/s (carried to the encoder).
    pub bitrate_kbps: u32,
}

impl Default for QualitySettings {
    fn default() -> Self {
        Self {
            target_fps: 30,
            scale: 1.0,
            quality: 75,
            compression: CompressionKind::Zstd,
            bitrate_kbps: 8_000,
        }
    }
}

impl QualitySettings {
    /// Clamp every field into its documented range.
    pub fn clamped(mut self) -> Self {
        self.target_fps = self.target_fps.clamp(1, 60);
        self.scale = self.scale.clamp(0.05, 1.0);
        self.quality = self.quality.clamp(1, 100);
        self
    }
}

// ── Session ──────────────────────────────────────────────────────

/// One live remote-control engagement.
#[derive(Debug, Clone)]
pub struct Session {
    /// Server-issued unique id.
    pub id: SessionId,
    /// Requesting user, when known.
    pub user_id: Option<String>,
    /// Operator device identifier.
    pub device_id: String,
    /// Control or view-only.
    pub kind: SessionKind,
    /// Current lifecycle status.
    pub status: SessionStatus,
    /// Monotonic start instant (drives the timeout sweep).
    pub started_at: Instant,
    /// Wall-clock start, unix milliseconds (for the wire).
    pub started_at_ms: u64,
    /// Wall-clock end, unix milliseconds, once terminal.
    pub ended_at_ms: Option<u64>,
    /// Monitor this session streams (0 = primary).
    pub monitor_index: u8,
}

impl Session {
    /// Whether the session is still streaming and accepting input.
    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }
}

/// Current unix time in milliseconds.
pub(crate) fn unix_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_clamped() {
        let q = QualitySettings {
            target_fps: 200,
            scale: 3.0,
            quality: 0,
            compression: CompressionKind::Zstd,
            bitrate_kbps: 1,
        }
        .clamped();
        assert_eq!(q.target_fps, 60);
        assert_eq!(q.scale, 1.0);
        assert_eq!(q.quality, 1);
    }

    #[test]
    fn status_terminal() {
        assert!(!SessionStatus::Active.is_terminal());
        assert!(SessionStatus::Ended.is_terminal());
        assert!(SessionStatus::TimedOut.is_terminal());
    }
}
