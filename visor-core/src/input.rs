//! Input events and the host-side input relay.
//!
//! OS input injection is a single global resource: interleaved
//! key-down/up sequences from two concurrent sessions would corrupt key
//! state. [`InputRelay::apply`] therefore holds one global lock for the
//! full duration of each event — including both halves of a synthesized
//! click or key press — and events are applied strictly in arrival
//! order across all sessions.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::VisorError;
use crate::provider::InputProvider;
use crate::session::{SessionId, SessionKind, SessionRegistry};

// ── Event model ──────────────────────────────────────────────────

/// Mouse button identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

/// Press or release half of a button/key event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyAction {
    Press,
    Release,
}

/// Modifier key flags.
pub mod key_modifiers {
    pub const NONE: u8 = 0x00;
    pub const SHIFT: u8 = 0x01;
    pub const CTRL: u8 = 0x02;
    pub const ALT: u8 = 0x04;
    pub const META: u8 = 0x08;
}

/// The action carried by an [`InputEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum InputAction {
    MouseMove { x: i32, y: i32 },
    /// A full click: press immediately followed by release.
    MouseClick { button: MouseButton, x: i32, y: i32 },
    MouseWheel { delta: i16 },
    KeyDown { key: u16, modifiers: u8 },
    KeyUp { key: u16, modifiers: u8 },
    /// A full key stroke: down immediately followed by up.
    KeyPress { key: u16, modifiers: u8 },
}

/// An input event received from the remote operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputEvent {
    pub session_id: SessionId,
    pub timestamp_ms: u64,
    pub action: InputAction,
}

// ── InputRelay ───────────────────────────────────────────────────

/// Applies inbound input events to the local OS input subsystem.
pub struct InputRelay {
    registry: Arc<SessionRegistry>,
    provider: Arc<dyn InputProvider>,
    /// The single global input lock.
    lock: Mutex<()>,
}

impl InputRelay {
    pub fn new(registry: Arc<SessionRegistry>, provider: Arc<dyn InputProvider>) -> Self {
        Self {
            registry,
            provider,
            lock: Mutex::new(()),
        }
    }

    /// Apply one event.
    ///
    /// Events for inactive or view-only sessions are logged and dropped.
    /// Provider failures are logged and never abort the relay or affect
    /// other events.
    pub async fn apply(&self, event: &InputEvent) {
        if !self.registry.is_active(&event.session_id) {
            warn!(session = %event.session_id, "input dropped: session not active");
            return;
        }
        if self.registry.kind(&event.session_id) == Some(SessionKind::View) {
            warn!(session = %event.session_id, "input dropped: view-only session");
            return;
        }

        let _guard = self.lock.lock().await;
        if let Err(e) = self.dispatch(&event.action) {
            debug!(session = %event.session_id, "input injection failed: {e}");
        }
    }

    /// Dispatch by variant to the corresponding native calls.
    ///
    /// Runs with the global lock held, so multi-call variants
    /// (click, key press) are indivisible.
    fn dispatch(&self, action: &InputAction) -> Result<(), VisorError> {
        match *action {
            InputAction::MouseMove { x, y } => self.provider.mouse_move(x, y),
            InputAction::MouseClick { button, x, y } => {
                self.provider.mouse_button(button, KeyAction::Press, x, y)?;
                self.provider.mouse_button(button, KeyAction::Release, x, y)
            }
            InputAction::MouseWheel { delta } => self.provider.mouse_wheel(delta),
            InputAction::KeyDown { key, modifiers } => {
                self.provider.key(key, modifiers, KeyAction::Press)
            }
            InputAction::KeyUp { key, modifiers } => {
                self.provider.key(key, modifiers, KeyAction::Release)
            }
            InputAction::KeyPress { key, modifiers } => {
                self.provider.key(key, modifiers, KeyAction::Press)?;
                self.provider.key(key, modifiers, KeyAction::Release)
            }
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
