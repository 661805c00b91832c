//! OS backend selection.
//!
//! The engine consumes capture, input, and clipboard strictly through
//! the `visor_core::provider` traits; this module picks the
//! implementation set at startup. Native backends plug in per platform;
//! a build without one refuses to start in native mode, which is the
//! fatal-startup class of error. The mock set runs anywhere and backs
//! development and CI.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::info;

use visor_core::error::VisorError;
use visor_core::provider::{CaptureProvider, ClipboardProvider, InputProvider};
use visor_core::provider::{MockCapture, MockClipboard, MockInput};

use crate::config::HostConfig;

/// The selected backend set plus the clipboard watcher channel.
pub struct ProviderSet {
    pub capture: Arc<dyn CaptureProvider>,
    pub input: Arc<dyn InputProvider>,
    pub clipboard: Arc<dyn ClipboardProvider>,
    pub clipboard_changes: mpsc::Receiver<()>,
}

/// Build the provider set for this platform and configuration.
pub fn build_providers(config: &HostConfig) -> Result<ProviderSet, VisorError> {
    match config.providers.kind.as_str() {
        "mock" => {
            info!("using mock providers");
            let (clipboard, clipboard_changes) = MockClipboard::channel();
            Ok(ProviderSet {
                capture: Arc::new(MockCapture::new(1280, 720)),
                input: Arc::new(MockInput::new()),
                clipboard: Arc::new(clipboard),
                clipboard_changes,
            })
        }
        "native" => native_providers(),
        other => Err(VisorError::Init(format!(
            "unknown provider kind '{other}' (expected \"native\" or \"mock\")"
        ))),
    }
}

/// Native backends are packaged separately per platform; a build
/// without them cannot stream real screens.
fn native_providers() -> Result<ProviderSet, VisorError> {
    Err(VisorError::Init(format!(
        "no native capture/input backend is bundled for {} in this build; \
         install a platform backend package or set providers.kind = \"mock\"",
        std::env::consts::OS,
    )))
}

// ── Tests ────────────────────────────────────────────────────────
