//! Per-session adaptive capture pipeline.
//!
//! One [`CapturePipeline`] task runs per active session:
//!
//! 1. Read the session's current [`QualitySettings`] snapshot.
//! 2. Capture a frame through the [`CaptureProvider`]; on failure log,
//!    sleep one second, retry — a capture hiccup never ends the session.
//! 3. Encode (scale + compress) under the snapshot.
//! 4. Hand the frame to the [`FrameSink`]; a send failure drops the
//!    frame — the next one supersedes it, there is no backlog.
//! 5. Sleep `max(0, frame_interval - elapsed)`. An over-budget
//!    iteration proceeds immediately: the loop stays current instead of
//!    bursting to catch up.
//!
//! Quality changes land on the next iteration via the watch channel,
//! never mid-frame. The loop exits when the session's cancellation
//! token fires.

pub mod encoder;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::VisorError;
use crate::hub::message::Frame;
use crate::provider::CaptureProvider;
use crate::session::{SessionHandle, SessionId, SessionRegistry};
use crate::transport::TransportClient;

pub use encoder::FrameEncoder;

/// Pause after a failed capture before retrying.
const CAPTURE_RETRY_DELAY: Duration = Duration::from_secs(1);

// ── FrameSink ────────────────────────────────────────────────────

/// Where encoded frames go. The production sink is the transport
/// client; tests substitute a recorder.
#[async_trait]
pub trait FrameSink: Send + Sync {
    async fn send_frame(&self, session_id: &str, frame: Frame) -> Result<(), VisorError>;
}

#[async_trait]
impl FrameSink for TransportClient {
    async fn send_frame(&self, session_id: &str, frame: Frame) -> Result<(), VisorError> {
        self.send_screen_frame(session_id, frame).await
    }
}

// ── CapturePipeline ──────────────────────────────────────────────

/// The per-session capture/encode/send loop.
pub struct CapturePipeline {
    session_id: SessionId,
    monitor_index: u8,
    provider: Arc<dyn CaptureProvider>,
    sink: Arc<dyn FrameSink>,
    registry: Arc<SessionRegistry>,
    handle: SessionHandle,
}

impl CapturePipeline {
    /// Bind a pipeline to a freshly created session.
    pub fn new(
        handle: SessionHandle,
        provider: Arc<dyn CaptureProvider>,
        sink: Arc<dyn FrameSink>,
        registry: Arc<SessionRegistry>,
    ) -> Self {
        Self {
            session_id: handle.id.clone(),
            monitor_index: handle.monitor_index,
            provider,
            sink,
            registry,
            handle,
        }
    }

    /// Run until the session's cancellation token fires.
    pub async fn run(self) {
        let cancel = self.handle.cancel.clone();
        let mut encoder = FrameEncoder::new();
        let mut frames_sent: u64 = 0;

        loop {
            if cancel.is_cancelled() {
                break;
            }

            // Fully-formed snapshot for this entire iteration.
            let quality = self.handle.quality_rx.borrow().clone();
            let interval = Duration::from_secs_f64(1.0 / quality.target_fps as f64);
            let started = Instant::now();

            let raw = tokio::select! {
                _ = cancel.cancelled() => break,
                result = self.provider.capture_frame(self.monitor_index) => match result {
                    Ok(raw) => raw,
                    Err(e) => {
                        warn!(session = %self.session_id, "capture failed: {e}");
                        tokio::select! {
                            _ = cancel.cancelled() => break,
                            _ = tokio::time::sleep(CAPTURE_RETRY_DELAY) => {}
                        }
                        continue;
                    }
                },
            };

            match encoder.encode(&raw, &quality) {
                Ok(frame) => {
                    // The session may have ended while this frame was
                    // being captured; never transmit for a dead session.
                    if !self.registry.is_active(&self.session_id) {
                        break;
                    }
                    match self.sink.send_frame(&self.session_id, frame).await {
                        Ok(()) => frames_sent += 1,
                        // Not retried: the next frame supersedes this one.
                        Err(e) => debug!(session = %self.session_id, "frame dropped: {e}"),
                    }
                }
                Err(e) => warn!(session = %self.session_id, "encode failed: {e}"),
            }

            let elapsed = started.elapsed();
            if elapsed < interval {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(interval - elapsed) => {}
                }
            }
            // Over budget: proceed immediately, trading frame-rate
            // fidelity for staying current.
        }

        debug!(session = %self.session_id, frames_sent, "capture pipeline stopped");
    }
}

// ── Tests ────────────────────────────────────────────────────────
