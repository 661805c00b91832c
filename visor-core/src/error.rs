//! Domain-specific error types for the visor host engine.
//!
//! All fallible operations return `Result<T, VisorError>`.
//! No panics on invalid input — every error is typed and recoverable,
//! except [`VisorError::Init`], which is the single class allowed to
//! terminate the host process.

use std::time::Duration;
use thiserror::Error;

/// The canonical error type for the visor host engine.
#[derive(Debug, Error)]
pub enum VisorError {
    // ── Transport Errors ─────────────────────────────────────────
    /// No bearer token could be obtained from the token endpoint.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The hub connection could not be established.
    #[error("connect failed: {0}")]
    Connect(String),

    /// An outbound call was attempted while the link is not `Connected`.
    ///
    /// Callers treat this as "drop and retry next cycle", not fatal.
    #[error("not connected")]
    NotConnected,

    /// An mpsc channel was closed unexpectedly.
    #[error("channel closed")]
    ChannelClosed,

    /// An operation exceeded its deadline.
    #[error("timeout after {0:?}")]
    Timeout(Duration),

    // ── Protocol Errors ──────────────────────────────────────────
    /// Encoding or decoding of a payload failed.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// A received frame exceeded the codec limit.
    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// An outbound payload exceeds the maximum frame size.
    #[error("payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// A numeric value did not map to any known enum variant.
    #[error("unknown {type_name} discriminant: {value:#x}")]
    UnknownVariant { type_name: &'static str, value: u64 },

    /// A message violated the hub protocol rules.
    #[error("protocol violation: {0}")]
    ProtocolViolation(&'static str),

    // ── Session Errors ───────────────────────────────────────────
    /// A session with this id already exists (creation is rejected,
    /// never merged).
    #[error("session already exists: {0}")]
    SessionExists(String),

    /// No session with this id is known to the registry.
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// The configured concurrent-session limit is reached.
    #[error("session limit reached ({0})")]
    SessionLimit(usize),

    /// A session request failed PIN or permission validation.
    #[error("validation failed: {0}")]
    Validation(&'static str),

    // ── Subsystem Operation Errors ───────────────────────────────
    /// The capture provider failed to produce a frame.
    #[error("capture error: {0}")]
    Capture(String),

    /// The input provider rejected an injected event.
    #[error("input error: {0}")]
    Input(String),

    /// A clipboard read or write failed.
    #[error("clipboard error: {0}")]
    Clipboard(String),

    // ── Fatal Startup ────────────────────────────────────────────
    /// A subsystem failed to initialize. This is the only error class
    /// that propagates out of the orchestrator and stops the host.
    #[error("initialization failed: {0}")]
    Init(String),

    // ── Conversions ──────────────────────────────────────────────
    /// The TCP/IO layer reported an error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The HTTP layer (token endpoint, access service) reported an error.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Catch-all for errors that do not fit another variant.
    #[error("{0}")]
    Other(String),
}

// ── Convenient From implementations ──────────────────────────────

impl From<String> for VisorError {
    fn from(s: String) -> Self {
        VisorError::Other(s)
    }
}

impl From<&str> for VisorError {
    fn from(s: &str) -> Self {
        VisorError::Other(s.to_string())
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for VisorError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        VisorError::ChannelClosed
    }
}

impl From<Box<bincode::ErrorKind>> for VisorError {
    fn from(e: Box<bincode::ErrorKind>) -> Self {
        VisorError::Encoding(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let e = VisorError::NotConnected;
        assert_eq!(e.to_string(), "not connected");

        let e = VisorError::FrameTooLarge {
            size: 5000,
            max: 4000,
        };
        assert!(e.to_string().contains("5000"));
        assert!(e.to_string().contains("4000"));
    }

    #[test]
    fn from_string() {
        let e: VisorError = "something broke".into();
        assert!(matches!(e, VisorError::Other(_)));
    }

    #[test]
    fn from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe broke");
        let e: VisorError = io_err.into();
        assert!(matches!(e, VisorError::Io(_)));
    }
}
