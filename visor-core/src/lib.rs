//! # visor-core
//!
//! Session engine for the visor remote-desktop control host.
//!
//! This crate contains:
//! - **Hub protocol**: `HubMethod`, `HubFrame`, typed payloads, and the
//!   `HubCodec` for framed TCP I/O via `tokio_util`
//! - **Transport**: `TransportClient` — the resilient, authenticated hub
//!   connection with reconnect backoff and re-registration
//! - **Auth**: `TokenProvider` (cached bearer tokens) and the
//!   `AccessValidator` PIN/permission client
//! - **Sessions**: `Session`, `QualitySettings`, and the concurrent
//!   `SessionRegistry` with the 8-hour timeout sweep
//! - **Capture**: one drift-compensated `CapturePipeline` per session,
//!   plus the `FrameEncoder` quality transform
//! - **Input**: `InputRelay` — globally serialized OS input injection
//! - **Clipboard**: `ClipboardSync` — change detection, dedup, history,
//!   and conflict resolution
//! - **Health**: `HealthMonitor` snapshots
//! - **Host**: `HostOrchestrator` — composition, periodic tick, and
//!   shutdown ordering
//! - **Providers**: capability traits over the OS backends, with
//!   in-memory fakes
//! - **Error**: `VisorError` — typed, `thiserror`-based error hierarchy

pub mod access;
pub mod auth;
pub mod capture;
pub mod clipboard;
pub mod error;
pub mod health;
pub mod host;
pub mod hub;
pub mod input;
pub mod provider;
pub mod session;
pub mod transport;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use access::{AccessValidator, HttpAccessValidator};
pub use auth::TokenProvider;
pub use capture::{CapturePipeline, FrameEncoder, FrameSink};
pub use clipboard::{
    ClipboardContent, ClipboardKind, ClipboardSync, ConflictPolicy, ConflictWinner,
    resolve_conflict,
};
pub use error::VisorError;
pub use health::{HealthMonitor, HostHealthStatus};
pub use host::{HostOptions, HostOrchestrator};
pub use hub::{HubCodec, HubFrame, HubMethod, MAX_FRAME_SIZE};
pub use input::{InputAction, InputEvent, InputRelay, KeyAction, MouseButton};
pub use provider::{CaptureProvider, ClipboardProvider, InputProvider, RawFrame};
pub use session::{
    CompressionKind, QualitySettings, Session, SessionId, SessionKind, SessionRegistry,
    SessionStatus,
};
pub use transport::{LinkState, ReconnectBackoff, ServerCommand, TransportClient};
