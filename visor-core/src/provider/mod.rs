//! Capability interfaces over the OS-facing subsystems.
//!
//! The engine never touches a platform API directly: screen capture,
//! input injection, and the clipboard are consumed through the traits in
//! this module, with one implementation per platform selected at
//! startup. This keeps every OS-level failure mode at a single seam and
//! lets the whole engine run against in-memory fakes in tests.

use async_trait::async_trait;

use crate::error::VisorError;
use crate::input::{KeyAction, MouseButton};

pub mod mock;

pub use mock::{MockCapture, MockClipboard, MockInput};

// ── RawFrame ─────────────────────────────────────────────────────

/// An uncompressed BGRA frame as delivered by the capture provider.
///
/// `stride` may exceed `width * 4` when the backend pads rows; the
/// encoder packs rows tight before compressing.
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub monitor_index: u8,
    pub width: u32,
    pub height: u32,
    /// Row pitch in bytes.
    pub stride: u32,
    /// BGRA pixel data, `stride * height` bytes.
    pub bytes: Vec<u8>,
}

// ── CaptureProvider ──────────────────────────────────────────────

/// Screen capture capability.
#[async_trait]
pub trait CaptureProvider: Send + Sync {
    /// Grab the current contents of `monitor` (0 = primary).
    async fn capture_frame(&self, monitor: u8) -> Result<RawFrame, VisorError>;

    /// Number of attached monitors.
    fn monitor_count(&self) -> u8;
}

// ── InputProvider ────────────────────────────────────────────────

/// Input injection capability.
///
/// Implementations inject into a single shared OS input stream; the
/// relay serializes calls behind a global lock, so implementations do
/// not need their own.
pub trait InputProvider: Send + Sync {
    fn mouse_move(&self, x: i32, y: i32) -> Result<(), VisorError>;

    fn mouse_button(
        &self,
        button: MouseButton,
        action: KeyAction,
        x: i32,
        y: i32,
    ) -> Result<(), VisorError>;

    fn mouse_wheel(&self, delta: i16) -> Result<(), VisorError>;

    fn key(&self, key: u16, modifiers: u8, action: KeyAction) -> Result<(), VisorError>;
}

// ── ClipboardProvider ────────────────────────────────────────────

/// Clipboard capability.
///
/// Readers return `Ok(None)` when the clipboard holds no content of the
/// requested kind. Change notifications arrive out-of-band on a channel
/// wired up by the platform layer (see [`mock::MockClipboard::channel`]
/// for the test wiring).
pub trait ClipboardProvider: Send + Sync {
    fn get_text(&self) -> Result<Option<String>, VisorError>;
    fn get_image(&self) -> Result<Option<Vec<u8>>, VisorError>;
    fn get_files(&self) -> Result<Option<Vec<String>>, VisorError>;

    fn set_text(&self, text: &str) -> Result<(), VisorError>;
    fn set_image(&self, bytes: &[u8]) -> Result<(), VisorError>;
    fn set_html(&self, html: &str) -> Result<(), VisorError>;

    fn clear(&self) -> Result<(), VisorError>;
}
