//! Clipboard change detection, dedup, history, and host↔client sync.
//!
//! The platform watcher only reports *that* the clipboard changed; the
//! handler re-reads the content through the provider (text → image →
//! file-list priority), truncates it to the configured maximum, and
//! hashes the payload with blake3. A change whose hash equals the last
//! known hash raises no event — this breaks the feedback loop where the
//! host setting the clipboard re-triggers its own watcher.
//!
//! ```text
//! OS clipboard ──changed──► watcher channel ──► ClipboardSync
//!                                                  │ read / truncate / hash
//!                                                  │ dedup + history
//!                                                  ▼
//!                                           event channel ──► orchestrator ──► hub
//! ```

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::VisorError;
use crate::provider::ClipboardProvider;
use crate::session::unix_ms;

/// Default cap on captured clipboard payloads.
pub const DEFAULT_MAX_CONTENT_BYTES: usize = 10 * 1024 * 1024;

/// Number of entries retained in the history ring.
pub const HISTORY_CAP: usize = 100;

/// Host and client contents whose timestamps differ by at most this are
/// treated as concurrent; the configured [`ConflictPolicy`] decides the
/// winner. Further apart, the newer content wins unconditionally.
pub const CONFLICT_WINDOW_MS: u64 = 2_000;

// ── ClipboardContent ─────────────────────────────────────────────

/// What kind of data a clipboard entry carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClipboardKind {
    Text,
    Image,
    Html,
    FileList,
}

/// One immutable, hashed clipboard entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipboardContent {
    pub kind: ClipboardKind,
    /// Type-specific payload bytes (UTF-8 for text/html, raw image
    /// bytes, newline-joined paths for file lists), possibly truncated.
    pub payload: Vec<u8>,
    /// Size before truncation.
    pub size_bytes: u64,
    pub truncated: bool,
    /// blake3 hex digest of `payload`.
    pub hash: String,
    pub timestamp_ms: u64,
}

impl ClipboardContent {
    /// Build an entry: truncate the payload at `max_bytes`, then hash.
    pub fn new(kind: ClipboardKind, mut payload: Vec<u8>, max_bytes: usize) -> Self {
        let size_bytes = payload.len() as u64;
        let truncated = payload.len() > max_bytes;
        if truncated {
            payload.truncate(max_bytes);
        }
        let hash = blake3::hash(&payload).to_hex().to_string();
        Self {
            kind,
            payload,
            size_bytes,
            truncated,
            hash,
            timestamp_ms: unix_ms(),
        }
    }

    /// Text entry helper.
    pub fn text(text: &str, max_bytes: usize) -> Self {
        Self::new(ClipboardKind::Text, text.as_bytes().to_vec(), max_bytes)
    }

    /// Serialize to bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, VisorError> {
        bincode::serialize(self).map_err(|e| VisorError::Encoding(e.to_string()))
    }

    /// Deserialize from bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, VisorError> {
        bincode::deserialize(bytes).map_err(|e| VisorError::Encoding(e.to_string()))
    }
}

// ── Conflict resolution ──────────────────────────────────────────

/// Which side wins when host and client clipboards diverge concurrently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    #[default]
    PreferNewest,
    PreferHost,
    PreferClient,
}

/// Outcome of [`resolve_conflict`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictWinner {
    Host,
    Client,
}

/// Pick a winner between concurrent host and client contents.
///
/// Timestamps further apart than [`CONFLICT_WINDOW_MS`] are sequential
/// writes, not a conflict: the newer side wins regardless of policy.
/// Inside the window the policy applies; `PreferNewest` breaks exact
/// ties toward the host.
pub fn resolve_conflict(
    host: &ClipboardContent,
    client: &ClipboardContent,
    policy: ConflictPolicy,
) -> ConflictWinner {
    let newest = if client.timestamp_ms > host.timestamp_ms {
        ConflictWinner::Client
    } else {
        ConflictWinner::Host
    };

    if host.timestamp_ms.abs_diff(client.timestamp_ms) > CONFLICT_WINDOW_MS {
        return newest;
    }
    match policy {
        ConflictPolicy::PreferNewest => newest,
        ConflictPolicy::PreferHost => ConflictWinner::Host,
        ConflictPolicy::PreferClient => ConflictWinner::Client,
    }
}

// ── ClipboardSync ────────────────────────────────────────────────

/// Host-side clipboard synchronizer.
pub struct ClipboardSync {
    provider: Arc<dyn ClipboardProvider>,
    max_bytes: usize,
    last_hash: Mutex<Option<String>>,
    history: Mutex<VecDeque<ClipboardContent>>,
    events: mpsc::Sender<ClipboardContent>,
}

impl ClipboardSync {
    /// Build the synchronizer together with the receiver on which it
    /// emits deduplicated change events.
    pub fn new(
        provider: Arc<dyn ClipboardProvider>,
        max_bytes: usize,
    ) -> (Self, mpsc::Receiver<ClipboardContent>) {
        let (tx, rx) = mpsc::channel(64);
        (
            Self {
                provider,
                max_bytes,
                last_hash: Mutex::new(None),
                history: Mutex::new(VecDeque::with_capacity(HISTORY_CAP)),
                events: tx,
            },
            rx,
        )
    }

    /// Consume watcher pings until cancelled.
    pub async fn run(self: Arc<Self>, mut changes: mpsc::Receiver<()>, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                ping = changes.recv() => match ping {
                    Some(()) => self.handle_change().await,
                    None => break,
                },
            }
        }
        debug!("clipboard sync loop stopped");
    }

    /// Re-read the clipboard after a change notification.
    pub async fn handle_change(&self) {
        let content = match self.read_current() {
            Ok(Some(content)) => content,
            Ok(None) => return,
            Err(e) => {
                warn!("clipboard read failed: {e}");
                return;
            }
        };
        if self.note(&content) {
            // Receiver lagging just drops the event; the next change
            // will carry fresher content anyway.
            if let Err(e) = self.events.try_send(content) {
                debug!("clipboard event dropped: {e}");
            }
        }
    }

    /// Read the current clipboard content through the provider.
    ///
    /// When several kinds are present at once, priority is
    /// text → image → file list.
    pub fn read_current(&self) -> Result<Option<ClipboardContent>, VisorError> {
        if let Some(text) = self.provider.get_text()? {
            if !text.is_empty() {
                return Ok(Some(ClipboardContent::new(
                    ClipboardKind::Text,
                    text.into_bytes(),
                    self.max_bytes,
                )));
            }
        }
        if let Some(image) = self.provider.get_image()? {
            if !image.is_empty() {
                return Ok(Some(ClipboardContent::new(
                    ClipboardKind::Image,
                    image,
                    self.max_bytes,
                )));
            }
        }
        if let Some(files) = self.provider.get_files()? {
            if !files.is_empty() {
                return Ok(Some(ClipboardContent::new(
                    ClipboardKind::FileList,
                    files.join("\n").into_bytes(),
                    self.max_bytes,
                )));
            }
        }
        Ok(None)
    }

    /// Write remote content to the local clipboard.
    ///
    /// The hash is recorded *before* the provider write, so the watcher
    /// echo for this very content dedupes instead of re-firing.
    pub fn set_content(&self, content: &ClipboardContent) -> Result<(), VisorError> {
        self.note(content);
        match content.kind {
            ClipboardKind::Text => {
                let text = String::from_utf8_lossy(&content.payload);
                self.provider.set_text(&text)
            }
            ClipboardKind::Html => {
                let html = String::from_utf8_lossy(&content.payload);
                self.provider.set_html(&html)
            }
            ClipboardKind::Image => self.provider.set_image(&content.payload),
            ClipboardKind::FileList => Err(VisorError::Clipboard(
                "file lists cannot be written to the local clipboard".into(),
            )),
        }
    }

    /// Clear the local clipboard.
    pub fn clear_content(&self) -> Result<(), VisorError> {
        *self.last_hash.lock().unwrap() = None;
        self.provider.clear()
    }

    /// History snapshot, most recent first.
    pub fn history(&self) -> Vec<ClipboardContent> {
        self.history.lock().unwrap().iter().cloned().collect()
    }

    /// Most recent entry, if any.
    pub fn latest(&self) -> Option<ClipboardContent> {
        self.history.lock().unwrap().front().cloned()
    }

    // ── Internal ─────────────────────────────────────────────────

    /// Record `content` as the last known clipboard state.
    ///
    /// Returns `false` when the hash matches the previous content, in
    /// which case neither history nor events are touched.
    fn note(&self, content: &ClipboardContent) -> bool {
        let mut last = self.last_hash.lock().unwrap();
        if last.as_deref() == Some(content.hash.as_str()) {
            return false;
        }
        *last = Some(content.hash.clone());

        let mut history = self.history.lock().unwrap();
        history.push_front(content.clone());
        history.truncate(HISTORY_CAP);
        true
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::mock::MockClipboard;

    fn sync() -> (Arc<ClipboardSync>, Arc<MockClipboard>, mpsc::Receiver<ClipboardContent>) {
        let (clip, _watch_rx) = MockClipboard::channel();
        let clip = Arc::new(clip);
        let provider: Arc<dyn ClipboardProvider> = clip.clone();
        let (sync, events) = ClipboardSync::new(provider, DEFAULT_MAX_CONTENT_BYTES);
        (Arc::new(sync), clip, events)
    }

    #[test]
    fn hash_is_stable_and_byte_sensitive() {
        let a = ClipboardContent::text("hello", 1024);
        let b = ClipboardContent::text("hello", 1024);
        let c = ClipboardContent::text("hellp", 1024);
        assert_eq!(a.hash, b.hash);
        assert_ne!(a.hash, c.hash);
    }

    #[test]
    fn oversized_payload_is_truncated_and_flagged() {
        let content = ClipboardContent::new(ClipboardKind::Image, vec![7u8; 100], 64);
        assert!(content.truncated);
        assert_eq!(content.payload.len(), 64);
        assert_eq!(content.size_bytes, 100);
        // Hash covers the truncated payload.
        assert_eq!(content.hash, blake3::hash(&vec![7u8; 64]).to_hex().to_string());
    }

    #[tokio::test]
    async fn change_emits_event_and_duplicate_does_not() {
        let (sync, clip, mut events) = sync();

        clip.set_external_text("alpha");
        sync.handle_change().await;
        assert_eq!(events.recv().await.unwrap().payload, b"alpha");

        // Watcher echo with identical content: no event, no history entry.
        sync.handle_change().await;
        assert!(events.try_recv().is_err());
        assert_eq!(sync.history().len(), 1);
    }

    #[tokio::test]
    async fn set_content_prearms_dedup_against_watcher_echo() {
        let (sync, _clip, mut events) = sync();

        let remote = ClipboardContent::text("from-client", 1024);
        sync.set_content(&remote).unwrap();

        // The provider write made the mock ping; the re-read sees the
        // same hash and stays silent.
        sync.handle_change().await;
        assert!(events.try_recv().is_err());
        assert_eq!(sync.history().len(), 1);
    }

    #[tokio::test]
    async fn text_wins_over_image_when_both_present() {
        /// Provider whose clipboard holds text and an image at once.
        struct BothKinds;
        impl ClipboardProvider for BothKinds {
            fn get_text(&self) -> Result<Option<String>, VisorError> {
                Ok(Some("text-part".to_string()))
            }
            fn get_image(&self) -> Result<Option<Vec<u8>>, VisorError> {
                Ok(Some(vec![1, 2, 3]))
            }
            fn get_files(&self) -> Result<Option<Vec<String>>, VisorError> {
                Ok(None)
            }
            fn set_text(&self, _: &str) -> Result<(), VisorError> {
                Ok(())
            }
            fn set_image(&self, _: &[u8]) -> Result<(), VisorError> {
                Ok(())
            }
            fn set_html(&self, _: &str) -> Result<(), VisorError> {
                Ok(())
            }
            fn clear(&self) -> Result<(), VisorError> {
                Ok(())
            }
        }

        let (sync, _events) = ClipboardSync::new(Arc::new(BothKinds), 1024);
        let content = sync.read_current().unwrap().unwrap();
        assert_eq!(content.kind, ClipboardKind::Text);
        assert_eq!(content.payload, b"text-part");
    }

    #[tokio::test]
    async fn file_list_round_trip_and_write_rejection() {
        let (sync, clip, mut events) = sync();
        clip.set_external_files(&["/tmp/a.txt", "/tmp/b.txt"]);
        sync.handle_change().await;

        let content = events.recv().await.unwrap();
        assert_eq!(content.kind, ClipboardKind::FileList);
        assert_eq!(content.payload, b"/tmp/a.txt\n/tmp/b.txt");

        assert!(sync.set_content(&content).is_err());
    }

    #[tokio::test]
    async fn history_is_capped_and_newest_first() {
        let (sync, clip, mut events) = sync();
        for i in 0..(HISTORY_CAP + 5) {
            clip.set_external_text(&format!("entry-{i}"));
            sync.handle_change().await;
            let _ = events.try_recv();
        }

        let history = sync.history();
        assert_eq!(history.len(), HISTORY_CAP);
        assert_eq!(history[0].payload, format!("entry-{}", HISTORY_CAP + 4).into_bytes());
    }

    #[test]
    fn conflict_policies() {
        let mut host = ClipboardContent::text("host", 64);
        let mut client = ClipboardContent::text("client", 64);

        // Concurrent (same millisecond): policy decides, ties go host.
        client.timestamp_ms = host.timestamp_ms;
        assert_eq!(
            resolve_conflict(&host, &client, ConflictPolicy::PreferNewest),
            ConflictWinner::Host
        );
        assert_eq!(
            resolve_conflict(&host, &client, ConflictPolicy::PreferClient),
            ConflictWinner::Client
        );

        // Concurrent, client slightly newer.
        client.timestamp_ms = host.timestamp_ms + 100;
        assert_eq!(
            resolve_conflict(&host, &client, ConflictPolicy::PreferNewest),
            ConflictWinner::Client
        );
        assert_eq!(
            resolve_conflict(&host, &client, ConflictPolicy::PreferHost),
            ConflictWinner::Host
        );

        // Sequential (outside the window): newest wins regardless.
        host.timestamp_ms = client.timestamp_ms + CONFLICT_WINDOW_MS + 1;
        assert_eq!(
            resolve_conflict(&host, &client, ConflictPolicy::PreferClient),
            ConflictWinner::Host
        );
    }
}
