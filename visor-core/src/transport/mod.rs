//! Resilient, authenticated client for the hub connection.
//!
//! One [`TransportClient`] owns the host's single persistent connection
//! to the coordinating server:
//!
//! - A **writer task** drains a bounded channel onto the socket, so the
//!   shared outbound link is serialized no matter how many capture
//!   loops send through it.
//! - A **reader task** decodes inbound frames and pushes typed
//!   [`ServerCommand`] values onto a channel consumed by the
//!   orchestrator. Unknown methods and malformed payloads are logged
//!   and skipped — they never kill the loop.
//! - A **supervisor task** watches for link loss and re-establishes the
//!   connection with the `[0s, 2s, 10s, 30s]` backoff schedule,
//!   repeating 30 s forever until the link is back or
//!   [`disconnect`](TransportClient::disconnect) is called. Host
//!   registration is re-sent on every successful (re)connect, because
//!   the hub has no record of this host after a drop.

pub mod backoff;
pub mod state;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::auth::TokenProvider;
use crate::error::VisorError;
use crate::hub::codec::HubCodec;
use crate::hub::message::{
    ChangeQualityRequest, EndSessionRequest, ExecuteCommandRequest, FileTransferRequest, Frame,
    HostInfo, HubFrame, HubMethod, RegisterHostPayload, ScreenData, ScreenDataChunk,
    SessionRequest, SyncClipboardRequest,
};
use crate::health::HostHealthStatus;
use crate::input::InputEvent;
use crate::session::SessionId;

pub use backoff::ReconnectBackoff;
pub use state::LinkState;

/// Frames whose encoded payload exceeds this go down the chunked path.
pub const STREAM_THRESHOLD: usize = 1024 * 1024;

/// Chunk size for the streaming send path.
pub const CHUNK_SIZE: usize = 256 * 1024;

/// Outbound frames buffered between senders and the writer task.
const OUTBOUND_CAPACITY: usize = 256;

/// Inbound commands buffered between the reader task and the
/// orchestrator.
const INBOUND_CAPACITY: usize = 256;

// ── ServerCommand ────────────────────────────────────────────────

/// A typed inbound command from the hub, ready for the orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerCommand {
    StartSession(SessionRequest),
    EndSession(SessionId),
    Input(InputEvent),
    Execute(ExecuteCommandRequest),
    FileTransfer(FileTransferRequest),
    SyncClipboard(SyncClipboardRequest),
    ChangeQuality(ChangeQualityRequest),
}

// ── TransportClient ──────────────────────────────────────────────

struct TransportInner {
    tokens: TokenProvider,
    host_info: HostInfo,
    state: Mutex<LinkState>,
    /// Writer-task handle; `None` whenever the link is down, which is
    /// what makes `send` fail fast.
    outbound: Mutex<Option<mpsc::Sender<HubFrame>>>,
    inbound_tx: mpsc::Sender<ServerCommand>,
    shutdown: CancellationToken,
    frame_ids: AtomicU64,
}

/// The host's resilient hub connection.
pub struct TransportClient {
    inner: Arc<TransportInner>,
}

impl TransportClient {
    /// Build a client; the returned receiver yields inbound commands.
    pub fn new(
        tokens: TokenProvider,
        host_info: HostInfo,
    ) -> (Self, mpsc::Receiver<ServerCommand>) {
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_CAPACITY);
        let inner = Arc::new(TransportInner {
            tokens,
            host_info,
            state: Mutex::new(LinkState::default()),
            outbound: Mutex::new(None),
            inbound_tx,
            shutdown: CancellationToken::new(),
            frame_ids: AtomicU64::new(0),
        });
        (Self { inner }, inbound_rx)
    }

    /// Open the connection, register the host, and start listening.
    ///
    /// One attempt: fails with [`VisorError::Auth`] when no token can be
    /// obtained and [`VisorError::Connect`] on transport failure. On
    /// success a supervisor task owns reconnection until
    /// [`disconnect`](Self::disconnect).
    pub async fn connect(&self, addr: &str) -> Result<(), VisorError> {
        self.inner.state.lock().unwrap().begin_connect()?;

        match self.inner.establish(addr).await {
            Ok(link_down) => {
                let inner = Arc::clone(&self.inner);
                let addr = addr.to_string();
                tokio::spawn(async move {
                    supervise(inner, addr, link_down).await;
                });
                Ok(())
            }
            Err(e) => {
                self.inner.state.lock().unwrap().force_disconnect();
                Err(e)
            }
        }
    }

    /// Like [`connect`](Self::connect), but retries the initial attempt
    /// on the reconnect schedule until it succeeds or the client is
    /// disconnected.
    pub async fn connect_with_retry(&self, addr: &str) -> Result<(), VisorError> {
        let mut backoff = ReconnectBackoff::new();
        loop {
            let delay = backoff.next_delay();
            tokio::select! {
                _ = self.inner.shutdown.cancelled() => {
                    return Err(VisorError::Connect("disconnected while retrying".into()));
                }
                _ = tokio::time::sleep(delay) => {}
            }
            match self.connect(addr).await {
                Ok(()) => return Ok(()),
                // Credential rejection will not fix itself by retrying.
                Err(e @ VisorError::Auth(_)) => return Err(e),
                Err(e) => warn!("connect attempt failed: {e}"),
            }
        }
    }

    /// Cancel any in-flight reconnection and close cleanly. Idempotent.
    ///
    /// Disconnection is terminal for this client: build a new
    /// `TransportClient` to connect again.
    pub fn disconnect(&self) {
        self.inner.shutdown.cancel();
        self.inner.outbound.lock().unwrap().take();
        self.inner.state.lock().unwrap().force_disconnect();
    }

    /// Current link state snapshot.
    pub fn state(&self) -> LinkState {
        self.inner.state.lock().unwrap().clone()
    }

    /// Whether traffic can flow right now.
    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Serialize one outbound frame onto the link.
    ///
    /// Fails fast with [`VisorError::NotConnected`] when the link is
    /// down; callers treat that as "drop and retry next cycle".
    pub async fn send(&self, frame: HubFrame) -> Result<(), VisorError> {
        let tx = self.inner.outbound.lock().unwrap().clone();
        match tx {
            Some(tx) if self.is_connected() => {
                tx.send(frame).await.map_err(|_| VisorError::NotConnected)
            }
            _ => Err(VisorError::NotConnected),
        }
    }

    /// Send an encoded screen frame, chunking large payloads.
    ///
    /// Payloads above [`STREAM_THRESHOLD`] are split into
    /// [`ScreenDataChunk`]s so one frame never occupies more than
    /// [`CHUNK_SIZE`] of buffer at a time.
    pub async fn send_screen_frame(
        &self,
        session_id: &str,
        frame: Frame,
    ) -> Result<(), VisorError> {
        let data = ScreenData {
            session_id: session_id.to_string(),
            frame,
        };
        let bytes = data.to_bytes()?;

        if bytes.len() <= STREAM_THRESHOLD {
            return self.send(HubFrame::new(HubMethod::ScreenData, bytes)).await;
        }

        let frame_id = self.inner.frame_ids.fetch_add(1, Ordering::SeqCst);
        let total_chunks = bytes.len().div_ceil(CHUNK_SIZE) as u32;
        for (chunk_index, chunk) in bytes.chunks(CHUNK_SIZE).enumerate() {
            let part = ScreenDataChunk {
                session_id: session_id.to_string(),
                frame_id,
                chunk_index: chunk_index as u32,
                total_chunks,
                bytes: chunk.to_vec(),
            };
            self.send(part.into_frame()?).await?;
        }
        Ok(())
    }

    /// Report health, best-effort: a down link is not an error.
    pub async fn send_health(&self, status: HostHealthStatus) -> Result<(), VisorError> {
        match self.send(status.into_frame()?).await {
            Ok(()) => Ok(()),
            Err(VisorError::NotConnected) => {
                debug!("health report skipped: not connected");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

impl TransportInner {
    /// One connection attempt: token, TCP, registration, reader/writer
    /// tasks. Returns the token that fires when this link dies.
    async fn establish(&self, addr: &str) -> Result<CancellationToken, VisorError> {
        let token = self.tokens.bearer().await?;

        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| VisorError::Connect(format!("{addr}: {e}")))?;
        let framed = Framed::new(stream, HubCodec);
        let (mut sink, mut stream) = framed.split();

        // Registration is idempotent hub-side and must precede any
        // other traffic on a fresh link.
        let registration = RegisterHostPayload {
            token,
            info: self.host_info.clone(),
        }
        .into_frame()?;
        sink.send(registration)
            .await
            .map_err(|e| VisorError::Connect(format!("registration failed: {e}")))?;

        let link_down = CancellationToken::new();
        let (out_tx, mut out_rx) = mpsc::channel::<HubFrame>(OUTBOUND_CAPACITY);

        // Writer task: the only owner of the sink.
        let writer_down = link_down.clone();
        tokio::spawn(async move {
            while let Some(frame) = out_rx.recv().await {
                if let Err(e) = sink.send(frame).await {
                    warn!("hub write error: {e}");
                    break;
                }
            }
            writer_down.cancel();
        });

        // Reader task: decode and dispatch inbound commands.
        let reader_down = link_down.clone();
        let inbound_tx = self.inbound_tx.clone();
        tokio::spawn(async move {
            while let Some(item) = stream.next().await {
                match item {
                    Ok(frame) => dispatch(&inbound_tx, frame).await,
                    Err(e) => {
                        warn!("hub read error: {e}");
                        break;
                    }
                }
            }
            reader_down.cancel();
        });

        *self.outbound.lock().unwrap() = Some(out_tx);
        self.state.lock().unwrap().mark_connected()?;
        Ok(link_down)
    }
}

/// Convert one inbound frame into a [`ServerCommand`] and queue it.
///
/// Every failure mode here — unknown method, outbound-only method,
/// malformed payload — is logged and dropped, never propagated to the
/// transport loop.
async fn dispatch(inbound_tx: &mpsc::Sender<ServerCommand>, frame: HubFrame) {
    let method = match frame.method() {
        Ok(m) => m,
        Err(_) => {
            warn!("ignoring unknown hub method {:#06x}", frame.method_raw());
            return;
        }
    };

    let payload = frame.payload();
    let command = match method {
        HubMethod::StartSession => {
            SessionRequest::from_bytes(payload).map(ServerCommand::StartSession)
        }
        HubMethod::EndSession => {
            EndSessionRequest::from_bytes(payload).map(|r| ServerCommand::EndSession(r.session_id))
        }
        HubMethod::SendInput => InputEvent::from_bytes(payload).map(ServerCommand::Input),
        HubMethod::ExecuteCommand => {
            ExecuteCommandRequest::from_bytes(payload).map(ServerCommand::Execute)
        }
        HubMethod::FileTransfer => {
            FileTransferRequest::from_bytes(payload).map(ServerCommand::FileTransfer)
        }
        HubMethod::SyncClipboard => {
            SyncClipboardRequest::from_bytes(payload).map(ServerCommand::SyncClipboard)
        }
        HubMethod::ChangeQuality => {
            ChangeQualityRequest::from_bytes(payload).map(ServerCommand::ChangeQuality)
        }
        other => {
            warn!("ignoring unexpected inbound method {other}");
            return;
        }
    };

    match command {
        Ok(command) => {
            if inbound_tx.send(command).await.is_err() {
                debug!("inbound command dropped: orchestrator gone");
            }
        }
        Err(e) => warn!("malformed {method} payload: {e}"),
    }
}

/// Owns the link after the first successful connect: waits for link
/// loss, then re-establishes with backoff until success or shutdown.
async fn supervise(inner: Arc<TransportInner>, addr: String, mut link_down: CancellationToken) {
    loop {
        tokio::select! {
            _ = inner.shutdown.cancelled() => return,
            _ = link_down.cancelled() => {}
        }
        if inner.shutdown.is_cancelled() {
            return;
        }

        // The link broke underneath us.
        inner.outbound.lock().unwrap().take();
        if inner.state.lock().unwrap().begin_reconnect().is_err() {
            // Already explicitly disconnected.
            return;
        }
        warn!("hub link lost; reconnecting");

        let mut backoff = ReconnectBackoff::new();
        link_down = loop {
            let delay = backoff.next_delay();
            tokio::select! {
                _ = inner.shutdown.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
            match inner.establish(&addr).await {
                Ok(token) => {
                    info!("hub link re-established (attempt {})", backoff.attempts());
                    break token;
                }
                Err(e) => warn!("reconnect attempt {} failed: {e}", backoff.attempts()),
            }
        };
    }
}

// ── Tests ────────────────────────────────────────────────────────
