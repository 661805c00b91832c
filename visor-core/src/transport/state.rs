//! Hub link state machine.
//!
//! Models the lifecycle of the host's one persistent hub connection,
//! with validated transitions that return `Result` instead of panicking.

use std::time::Instant;

use crate::error::VisorError;

// ── LinkState ────────────────────────────────────────────────────

/// The current state of the hub link.
///
/// ```text
///  Disconnected ──► Connecting ──► Connected ◄──► Reconnecting
///       ▲               │             │                │
///       └───────────────┴─────────────┴────────────────┘
///                  (explicit disconnect only)
/// ```
///
/// `Reconnecting` is entered only from a broken `Connected` state,
/// never from `Disconnected`; `Disconnected` is the initial state and
/// the only one reachable by explicit user action.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LinkState {
    /// No link. Initial / terminal state.
    #[default]
    Disconnected,

    /// First connection attempt in progress.
    Connecting,

    /// Registered and exchanging traffic.
    Connected {
        /// When the link entered `Connected`.
        since: Instant,
    },

    /// Link broke; the backoff loop is re-establishing it.
    Reconnecting,
}

impl std::fmt::Display for LinkState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected { .. } => write!(f, "Connected"),
            Self::Reconnecting => write!(f, "Reconnecting"),
        }
    }
}

impl LinkState {
    /// Whether traffic can flow right now.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected { .. })
    }

    /// Whether the link is idle with no reconnection pending.
    pub fn is_disconnected(&self) -> bool {
        matches!(self, Self::Disconnected)
    }

    /// How long the link has been up, if it is.
    pub fn connected_duration(&self) -> Option<std::time::Duration> {
        match self {
            Self::Connected { since } => Some(since.elapsed()),
            _ => None,
        }
    }

    // ── Transitions ──────────────────────────────────────────────

    /// Transition to `Connecting`.
    ///
    /// Valid from: `Disconnected`.
    pub fn begin_connect(&mut self) -> Result<(), VisorError> {
        match self {
            Self::Disconnected => {
                *self = Self::Connecting;
                Ok(())
            }
            _ => Err(VisorError::ProtocolViolation(
                "cannot connect: not in Disconnected state",
            )),
        }
    }

    /// Transition to `Connected`.
    ///
    /// Valid from: `Connecting`, `Reconnecting`.
    pub fn mark_connected(&mut self) -> Result<(), VisorError> {
        match self {
            Self::Connecting | Self::Reconnecting => {
                *self = Self::Connected {
                    since: Instant::now(),
                };
                Ok(())
            }
            _ => Err(VisorError::ProtocolViolation(
                "cannot mark connected: not in Connecting or Reconnecting state",
            )),
        }
    }

    /// Transition to `Reconnecting` after an unexpected close.
    ///
    /// Valid from: `Connected` only.
    pub fn begin_reconnect(&mut self) -> Result<(), VisorError> {
        match self {
            Self::Connected { .. } => {
                *self = Self::Reconnecting;
                Ok(())
            }
            _ => Err(VisorError::ProtocolViolation(
                "cannot reconnect: link was never connected",
            )),
        }
    }

    /// Force-reset to `Disconnected` regardless of current state.
    ///
    /// This is the explicit-disconnect path (and the rollback after a
    /// failed first connect).
    pub fn force_disconnect(&mut self) {
        *self = Self::Disconnected;
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_lifecycle() {
        let mut state = LinkState::default();
        assert!(state.is_disconnected());

        state.begin_connect().unwrap();
        assert_eq!(state, LinkState::Connecting);

        state.mark_connected().unwrap();
        assert!(state.is_connected());
        assert!(state.connected_duration().is_some());

        state.begin_reconnect().unwrap();
        assert_eq!(state, LinkState::Reconnecting);

        state.mark_connected().unwrap();
        assert!(state.is_connected());

        state.force_disconnect();
        assert!(state.is_disconnected());
    }

    #[test]
    fn reconnecting_unreachable_from_disconnected() {
        let mut state = LinkState::Disconnected;
        assert!(state.begin_reconnect().is_err());

        let mut state = LinkState::Connecting;
        assert!(state.begin_reconnect().is_err());
    }

    #[test]
    fn connect_only_from_disconnected() {
        let mut state = LinkState::Connected {
            since: Instant::now(),
        };
        assert!(state.begin_connect().is_err());

        let mut state = LinkState::Reconnecting;
        assert!(state.begin_connect().is_err());
    }

    #[test]
    fn mark_connected_needs_an_attempt_in_flight() {
        let mut state = LinkState::Disconnected;
        assert!(state.mark_connected().is_err());
    }

    #[test]
    fn display_format() {
        assert_eq!(LinkState::Disconnected.to_string(), "Disconnected");
        assert_eq!(LinkState::Reconnecting.to_string(), "Reconnecting");
        assert_eq!(
            LinkState::Connected {
                since: Instant::now()
            }
            .to_string(),
            "Connected"
        );
    }
}
