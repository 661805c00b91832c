//! In-memory provider implementations.
//!
//! Used by the test suites and selectable through the host config
//! (`providers.kind = "mock"`) for running the engine on machines
//! without a native backend. The capture fake synthesizes frames, the
//! input fake records every injected call in order, and the clipboard
//! fake keeps its state in memory and emits change pings on a channel
//! exactly like a platform watcher would.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::VisorError;
use crate::input::{KeyAction, MouseButton};
use crate::provider::{CaptureProvider, ClipboardProvider, InputProvider, RawFrame};

// ── MockCapture ──────────────────────────────────────────────────

/// Capture fake producing solid-color BGRA frames.
///
/// The fill byte advances per frame so consecutive frames differ, and an
/// optional per-frame delay simulates slow capture hardware.
pub struct MockCapture {
    width: u32,
    height: u32,
    delay: Option<Duration>,
    counter: AtomicU64,
    fail_next: AtomicU32,
}

impl MockCapture {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            delay: None,
            counter: AtomicU64::new(0),
            fail_next: AtomicU32::new(0),
        }
    }

    /// Make every capture take `delay` before returning.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Make the next `n` captures fail.
    pub fn fail_next(&self, n: u32) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    /// Frames produced so far.
    pub fn frames_captured(&self) -> u64 {
        self.counter.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CaptureProvider for MockCapture {
    async fn capture_frame(&self, monitor: u8) -> Result<RawFrame, VisorError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(VisorError::Capture("simulated capture failure".into()));
        }

        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        let stride = self.width * 4;
        Ok(RawFrame {
            monitor_index: monitor,
            width: self.width,
            height: self.height,
            stride,
            bytes: vec![(n % 251) as u8; (stride * self.height) as usize],
        })
    }

    fn monitor_count(&self) -> u8 {
        1
    }
}

// ── MockInput ────────────────────────────────────────────────────

/// One recorded injection call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputCall {
    MouseMove { x: i32, y: i32 },
    MouseButton { button: MouseButton, action: KeyAction },
    MouseWheel { delta: i16 },
    Key { key: u16, action: KeyAction },
}

/// Input fake recording every call in arrival order.
#[derive(Default)]
pub struct MockInput {
    calls: Mutex<Vec<InputCall>>,
    /// Key codes that fail on injection (error-path tests).
    failing_keys: Mutex<Vec<u16>>,
}

impl MockInput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make injections of `key` fail.
    pub fn fail_key(&self, key: u16) {
        self.failing_keys.lock().unwrap().push(key);
    }

    /// Snapshot of the recorded call sequence.
    pub fn calls(&self) -> Vec<InputCall> {
        self.calls.lock().unwrap().clone()
    }
}

impl InputProvider for MockInput {
    fn mouse_move(&self, x: i32, y: i32) -> Result<(), VisorError> {
        self.calls.lock().unwrap().push(InputCall::MouseMove { x, y });
        Ok(())
    }

    fn mouse_button(
        &self,
        button: MouseButton,
        action: KeyAction,
        _x: i32,
        _y: i32,
    ) -> Result<(), VisorError> {
        self.calls
            .lock()
            .unwrap()
            .push(InputCall::MouseButton { button, action });
        Ok(())
    }

    fn mouse_wheel(&self, delta: i16) -> Result<(), VisorError> {
        self.calls.lock().unwrap().push(InputCall::MouseWheel { delta });
        Ok(())
    }

    fn key(&self, key: u16, _modifiers: u8, action: KeyAction) -> Result<(), VisorError> {
        if self.failing_keys.lock().unwrap().contains(&key) {
            return Err(VisorError::Input(format!("injection rejected for key {key:#x}")));
        }
        self.calls.lock().unwrap().push(InputCall::Key { key, action });
        Ok(())
    }
}

// ── MockClipboard ────────────────────────────────────────────────

#[derive(Default)]
struct ClipboardState {
    text: Option<String>,
    image: Option<Vec<u8>>,
    html: Option<String>,
    files: Option<Vec<String>>,
}

/// Clipboard fake with a watcher channel.
///
/// `set_external_*` simulates another process writing the clipboard: it
/// updates the state *and* emits a change ping, exactly what a platform
/// watcher reports. The engine's own `set_*` calls also ping, mirroring
/// the echo a real watcher produces when the host writes the clipboard.
pub struct MockClipboard {
    state: Mutex<ClipboardState>,
    changes: mpsc::Sender<()>,
}

impl MockClipboard {
    /// Build the fake together with the change-notification receiver.
    pub fn channel() -> (Self, mpsc::Receiver<()>) {
        let (tx, rx) = mpsc::channel(64);
        (
            Self {
                state: Mutex::new(ClipboardState::default()),
                changes: tx,
            },
            rx,
        )
    }

    fn ping(&self) {
        let _ = self.changes.try_send(());
    }

    /// Simulate an external process putting text on the clipboard.
    pub fn set_external_text(&self, text: &str) {
        {
            let mut s = self.state.lock().unwrap();
            *s = ClipboardState::default();
            s.text = Some(text.to_string());
        }
        self.ping();
    }

    /// Simulate an external process putting an image on the clipboard.
    pub fn set_external_image(&self, bytes: &[u8]) {
        {
            let mut s = self.state.lock().unwrap();
            *s = ClipboardState::default();
            s.image = Some(bytes.to_vec());
        }
        self.ping();
    }

    /// Simulate an external process putting a file list on the clipboard.
    pub fn set_external_files(&self, files: &[&str]) {
        {
            let mut s = self.state.lock().unwrap();
            *s = ClipboardState::default();
            s.files = Some(files.iter().map(|f| f.to_string()).collect());
        }
        self.ping();
    }
}

impl ClipboardProvider for MockClipboard {
    fn get_text(&self) -> Result<Option<String>, VisorError> {
        Ok(self.state.lock().unwrap().text.clone())
    }

    fn get_image(&self) -> Result<Option<Vec<u8>>, VisorError> {
        Ok(self.state.lock().unwrap().image.clone())
    }

    fn get_files(&self) -> Result<Option<Vec<String>>, VisorError> {
        Ok(self.state.lock().unwrap().files.clone())
    }

    fn set_text(&self, text: &str) -> Result<(), VisorError> {
        {
            let mut s = self.state.lock().unwrap();
            *s = ClipboardState::default();
            s.text = Some(text.to_string());
        }
        self.ping();
        Ok(())
    }

    fn set_image(&self, bytes: &[u8]) -> Result<(), VisorError> {
        {
            let mut s = self.state.lock().unwrap();
            *s = ClipboardState::default();
            s.image = Some(bytes.to_vec());
        }
        self.ping();
        Ok(())
    }

    fn set_html(&self, html: &str) -> Result<(), VisorError> {
        {
            let mut s = self.state.lock().unwrap();
            *s = ClipboardState::default();
            s.html = Some(html.to_string());
        }
        self.ping();
        Ok(())
    }

    fn clear(&self) -> Result<(), VisorError> {
        *self.state.lock().unwrap() = ClipboardState::default();
        self.ping();
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn capture_produces_differing_frames() {
        let cap = MockCapture::new(4, 4);
        let a = cap.capture_frame(0).await.unwrap();
        let b = cap.capture_frame(0).await.unwrap();
        assert_eq!(a.bytes.len(), 4 * 4 * 4);
        assert_ne!(a.bytes[0], b.bytes[0]);
        assert_eq!(cap.frames_captured(), 2);
    }

    #[tokio::test]
    async fn capture_failure_injection() {
        let cap = MockCapture::new(2, 2);
        cap.fail_next(1);
        assert!(cap.capture_frame(0).await.is_err());
        assert!(cap.capture_frame(0).await.is_ok());
    }

    #[test]
    fn input_records_in_order() {
        let input = MockInput::new();
        input.key(1, 0, KeyAction::Press).unwrap();
        input.key(1, 0, KeyAction::Release).unwrap();
        assert_eq!(
            input.calls(),
            vec![
                InputCall::Key { key: 1, action: KeyAction::Press },
                InputCall::Key { key: 1, action: KeyAction::Release },
            ]
        );
    }

    #[tokio::test]
    async fn clipboard_pings_on_external_change() {
        let (clip, mut rx) = MockClipboard::channel();
        clip.set_external_text("hello");
        assert_eq!(clip.get_text().unwrap().as_deref(), Some("hello"));
        assert!(rx.recv().await.is_some());
    }
}
