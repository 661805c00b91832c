//! Hub method table and typed payloads.
//!
//! # Wire Protocol
//!
//! Every message is one [`HubFrame`]: a method id plus an opaque
//! bincode payload. Payload types in this module provide
//! `to_bytes`/`from_bytes` and an `into_frame` helper.
//!
//! ## Registration (on every (re)connect)
//! ```text
//! Host ──[RegisterHost]──────────────────────► Hub
//!   Payload: RegisterHostPayload (bincode)
//! ```
//!
//! ## Session lifecycle
//! ```text
//! Hub  ──[StartSession]──────────────────────► Host
//! Host ──[SessionStarted | SessionError]─────► Hub
//! Host ──[ScreenData]────────────────────────► Hub   (repeated)
//! Host ──[ScreenDataChunk]───────────────────► Hub   (frames > 1 MiB)
//! Hub  ──[EndSession]────────────────────────► Host
//! Host ──[SessionEnded]──────────────────────► Hub
//! ```
//!
//! ## Input, clipboard, commands
//! ```text
//! Hub  ──[SendInput]─────────────────────────► Host
//! Hub  ──[SyncClipboard]─────────────────────► Host
//! Host ──[ClipboardContent]──────────────────► Hub
//! Hub  ──[ExecuteCommand | FileTransfer]─────► Host
//! Host ──[CommandResult]─────────────────────► Hub
//! Host ──[ReportHealth]──────────────────────► Hub   (every 5 s)
//! ```

use serde::{Deserialize, Serialize};

use crate::clipboard::ClipboardContent;
use crate::error::VisorError;
use crate::health::HostHealthStatus;
use crate::input::InputEvent;
use crate::session::{CompressionKind, QualitySettings, SessionId, SessionKind};

// ── HubMethod ────────────────────────────────────────────────────

/// All methods understood on the hub connection.
///
/// Organized by category:
/// - `0x0001..0x00FF` — Protocol-level (registration, health)
/// - `0x0100..0x01FF` — Session control (hub → host)
/// - `0x0200..0x02FF` — Session events and frames (host → hub)
/// - `0x0300..0x03FF` — Input
/// - `0x0400..0x04FF` — Clipboard
/// - `0x0500..0x05FF` — Commands and file transfer
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HubMethod {
    // ── Protocol (0x00xx) ────────────────────────────────────────
    /// Host registration, re-sent on every (re)connect.
    RegisterHost = 0x0001,
    /// Periodic health snapshot (best-effort).
    ReportHealth = 0x0002,

    // ── Session control, hub → host (0x01xx) ─────────────────────
    StartSession = 0x0101,
    EndSession = 0x0102,
    ChangeQuality = 0x0103,

    // ── Session events and frames, host → hub (0x02xx) ───────────
    SessionStarted = 0x0201,
    SessionEnded = 0x0202,
    SessionError = 0x0203,
    /// A complete encoded frame.
    ScreenData = 0x0204,
    /// One chunk of a large frame (streaming send path).
    ScreenDataChunk = 0x0205,

    // ── Input (0x03xx) ───────────────────────────────────────────
    SendInput = 0x0301,

    // ── Clipboard (0x04xx) ───────────────────────────────────────
    SyncClipboard = 0x0401,
    ClipboardContent = 0x0402,

    // ── Commands (0x05xx) ────────────────────────────────────────
    ExecuteCommand = 0x0501,
    CommandResult = 0x0502,
    FileTransfer = 0x0503,
}

impl TryFrom<u16> for HubMethod {
    type Error = VisorError;

    fn try_from(value: u16) -> Result<Self, VisorError> {
        match value {
            0x0001 => Ok(HubMethod::RegisterHost),
            0x0002 => Ok(HubMethod::ReportHealth),

            0x0101 => Ok(HubMethod::StartSession),
            0x0102 => Ok(HubMethod::EndSession),
            0x0103 => Ok(HubMethod::ChangeQuality),

            0x0201 => Ok(HubMethod::SessionStarted),
            0x0202 => Ok(HubMethod::SessionEnded),
            0x0203 => Ok(HubMethod::SessionError),
            0x0204 => Ok(HubMethod::ScreenData),
            0x0205 => Ok(HubMethod::ScreenDataChunk),

            0x0301 => Ok(HubMethod::SendInput),

            0x0401 => Ok(HubMethod::SyncClipboard),
            0x0402 => Ok(HubMethod::ClipboardContent),

            0x0501 => Ok(HubMethod::ExecuteCommand),
            0x0502 => Ok(HubMethod::CommandResult),
            0x0503 => Ok(HubMethod::FileTransfer),

            _ => Err(VisorError::UnknownVariant {
                type_name: "HubMethod",
                value: value as u64,
            }),
        }
    }
}

impl std::fmt::Display for HubMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}

// ── HubFrame ─────────────────────────────────────────────────────

/// One framed message: raw method id plus payload bytes.
///
/// The method id stays raw so that an unknown id can be logged and
/// skipped at dispatch instead of killing the connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubFrame {
    method: u16,
    payload: Vec<u8>,
}

impl HubFrame {
    pub fn new(method: HubMethod, payload: Vec<u8>) -> Self {
        Self {
            method: method as u16,
            payload,
        }
    }

    /// Frame from a raw method id (decoder side).
    pub fn from_raw(method: u16, payload: Vec<u8>) -> Self {
        Self { method, payload }
    }

    /// The raw method id.
    pub fn method_raw(&self) -> u16 {
        self.method
    }

    /// The typed method, if known.
    pub fn method(&self) -> Result<HubMethod, VisorError> {
        HubMethod::try_from(self.method)
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }

    /// Total encoded size on the wire (without the length prefix).
    pub fn encoded_len(&self) -> usize {
        2 + self.payload.len()
    }
}

/// Shorthand for the `to_bytes`/`from_bytes`/`into_frame` trio every
/// payload type implements.
macro_rules! payload_impl {
    ($ty:ty, $method:expr) => {
        impl $ty {
            /// Serialize to bytes.
            pub fn to_bytes(&self) -> Result<Vec<u8>, VisorError> {
                bincode::serialize(self).map_err(|e| VisorError::Encoding(e.to_string()))
            }

            /// Deserialize from bytes.
            pub fn from_bytes(bytes: &[u8]) -> Result<Self, VisorError> {
                bincode::deserialize(bytes).map_err(|e| VisorError::Encoding(e.to_string()))
            }

            /// Build the hub frame for this payload.
            pub fn into_frame(self) -> Result<HubFrame, VisorError> {
                Ok(HubFrame::new($method, self.to_bytes()?))
            }
        }
    };
}

// ── Registration ─────────────────────────────────────────────────

/// Static facts about this host, sent with every registration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostInfo {
    pub host_id: String,
    pub host_name: String,
    pub os: String,
    pub version: String,
    pub monitor_count: u8,
}

/// `RegisterHost` payload. Registration is idempotent on the hub side,
/// so it is safe — and necessary — to repeat it on every reconnect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterHostPayload {
    /// Bearer token from the token endpoint.
    pub token: String,
    pub info: HostInfo,
}

payload_impl!(RegisterHostPayload, HubMethod::RegisterHost);
payload_impl!(HostHealthStatus, HubMethod::ReportHealth);

// ── Session control ──────────────────────────────────────────────

/// `StartSession` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRequest {
    pub session_id: SessionId,
    pub user_id: Option<String>,
    pub device_id: String,
    pub kind: SessionKind,
    pub pin: Option<String>,
    pub monitor_index: u8,
    pub quality: QualitySettings,
}

payload_impl!(SessionRequest, HubMethod::StartSession);

/// `EndSession` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndSessionRequest {
    pub session_id: SessionId,
}

payload_impl!(EndSessionRequest, HubMethod::EndSession);

/// `ChangeQuality` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeQualityRequest {
    pub session_id: SessionId,
    pub quality: QualitySettings,
}

payload_impl!(ChangeQualityRequest, HubMethod::ChangeQuality);

// ── Session events ───────────────────────────────────────────────

/// `SessionStarted` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionStarted {
    pub session_id: SessionId,
}

payload_impl!(SessionStarted, HubMethod::SessionStarted);

/// `SessionEnded` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionEnded {
    pub session_id: SessionId,
    /// Human-readable reason ("ended", "timeout", "shutdown").
    pub reason: String,
}

payload_impl!(SessionEnded, HubMethod::SessionEnded);

/// `SessionError` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionError {
    pub session_id: SessionId,
    pub message: String,
}

payload_impl!(SessionError, HubMethod::SessionError);

// ── Frames ───────────────────────────────────────────────────────

/// One encoded screen frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub monitor_index: u8,
    pub width: u32,
    pub height: u32,
    /// Encoded pixel data (see `compression`).
    pub bytes: Vec<u8>,
    pub timestamp_ms: u64,
    /// Every frame is self-contained in this protocol; the flag is
    /// carried for decoders that also accept delta streams.
    pub is_key_frame: bool,
    pub compression: CompressionKind,
    /// Quality the frame was encoded at.
    pub quality: u8,
}

/// `ScreenData` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreenData {
    pub session_id: SessionId,
    pub frame: Frame,
}

payload_impl!(ScreenData, HubMethod::ScreenData);

/// `ScreenDataChunk` payload — streaming variant for large frames.
///
/// Chunks of one frame share `frame_id` and arrive in order on the
/// single connection; `chunk_index == total_chunks - 1` completes the
/// frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreenDataChunk {
    pub session_id: SessionId,
    pub frame_id: u64,
    pub chunk_index: u32,
    pub total_chunks: u32,
    /// Bincode-encoded [`ScreenData`] slice.
    pub bytes: Vec<u8>,
}

payload_impl!(ScreenDataChunk, HubMethod::ScreenDataChunk);

// ── Clipboard ────────────────────────────────────────────────────

/// `SyncClipboard` payload (hub → host).
///
/// `content = None` is a pull: the host answers with its current
/// clipboard. `content = Some` is a push from the operator side and is
/// conflict-resolved against the host's latest entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncClipboardRequest {
    pub session_id: SessionId,
    pub content: Option<ClipboardContent>,
}

payload_impl!(SyncClipboardRequest, HubMethod::SyncClipboard);

/// `ClipboardContent` payload (host → hub).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipboardContentPayload {
    pub session_id: SessionId,
    pub content: Option<ClipboardContent>,
}

payload_impl!(ClipboardContentPayload, HubMethod::ClipboardContent);

payload_impl!(InputEvent, HubMethod::SendInput);

// ── Commands ─────────────────────────────────────────────────────

/// `ExecuteCommand` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecuteCommandRequest {
    pub command_id: u64,
    pub command_line: String,
}

payload_impl!(ExecuteCommandRequest, HubMethod::ExecuteCommand);

/// `CommandResult` payload — answers both `ExecuteCommand` and
/// `FileTransfer`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandResult {
    pub command_id: u64,
    pub success: bool,
    pub output: String,
    /// File bytes for download transfers.
    pub payload: Option<Vec<u8>>,
}

payload_impl!(CommandResult, HubMethod::CommandResult);

/// Transfer direction, from the host's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferDirection {
    /// Operator sends a file to the host (`bytes` is set).
    Upload,
    /// Operator fetches a file from the host.
    Download,
}

/// `FileTransfer` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileTransferRequest {
    pub transfer_id: u64,
    pub direction: TransferDirection,
    pub path: String,
    pub bytes: Option<Vec<u8>>,
}

payload_impl!(FileTransferRequest, HubMethod::FileTransfer);

// ── Tests ────────────────────────────────────────────────────────
