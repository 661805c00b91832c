//! Host orchestrator — composes the engine into one process.
//!
//! Wires transport commands to the registry, capture pipelines, input
//! relay, and clipboard sync, and runs the periodic tick: every five
//! seconds it reports health (best-effort), reaps finished pipeline
//! tasks, and sweeps timed-out sessions through the same teardown path
//! as an explicit end. Inbound commands are handled as they arrive on
//! the command channel, in the same select loop as the tick.
//!
//! Any failure inside one loop iteration is logged and the loop
//! continues; only subsystem initialization failures (handled by the
//! binary before the orchestrator exists) are allowed to stop the host.
//!
//! Shutdown ordering: cancel every session's token, give the capture
//! loops a bounded grace period to exit, disconnect the transport, then
//! drop subsystems in reverse of construction order.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::access::AccessValidator;
use crate::capture::{CapturePipeline, FrameSink};
use crate::clipboard::{ClipboardContent, ClipboardSync, ConflictPolicy, ConflictWinner, resolve_conflict};
use crate::error::VisorError;
use crate::health::HealthMonitor;
use crate::hub::message::{
    ClipboardContentPayload, CommandResult, ExecuteCommandRequest, FileTransferRequest,
    SessionEnded, SessionError, SessionRequest, SessionStarted, SyncClipboardRequest,
    TransferDirection,
};
use crate::input::InputRelay;
use crate::provider::{CaptureProvider, ClipboardProvider, InputProvider};
use crate::session::SessionRegistry;
use crate::transport::{ServerCommand, TransportClient};

/// Largest file the download path will inline into a `CommandResult`.
const MAX_TRANSFER_BYTES: usize = 3 * 1024 * 1024;

// ── HostOptions ──────────────────────────────────────────────────

/// Tunables and feature toggles consumed from configuration.
#[derive(Debug, Clone)]
pub struct HostOptions {
    /// Health/sweep cadence.
    pub tick_interval: Duration,
    /// Clipboard conflict policy.
    pub conflict_policy: ConflictPolicy,
    pub enable_clipboard: bool,
    pub enable_file_transfer: bool,
    pub enable_remote_commands: bool,
    /// How long shutdown waits for capture loops to exit.
    pub shutdown_grace: Duration,
}

impl Default for HostOptions {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(5),
            conflict_policy: ConflictPolicy::PreferNewest,
            enable_clipboard: true,
            enable_file_transfer: true,
            enable_remote_commands: true,
            shutdown_grace: Duration::from_secs(2),
        }
    }
}

// ── HostOrchestrator ─────────────────────────────────────────────

/// Top-level composition of the session engine.
pub struct HostOrchestrator {
    transport: Arc<TransportClient>,
    commands: mpsc::Receiver<ServerCommand>,
    registry: Arc<SessionRegistry>,
    validator: Arc<dyn AccessValidator>,
    capture: Arc<dyn CaptureProvider>,
    relay: Arc<InputRelay>,
    clipboard: Arc<ClipboardSync>,
    clipboard_events: mpsc::Receiver<ClipboardContent>,
    clipboard_changes: Option<mpsc::Receiver<()>>,
    health: HealthMonitor,
    options: HostOptions,
    shutdown: CancellationToken,
    pipelines: JoinSet<()>,
}

impl HostOrchestrator {
    /// Compose the engine. Providers must already be initialized — a
    /// backend that failed to come up never reaches this point.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        transport: Arc<TransportClient>,
        commands: mpsc::Receiver<ServerCommand>,
        registry: Arc<SessionRegistry>,
        validator: Arc<dyn AccessValidator>,
        capture: Arc<dyn CaptureProvider>,
        input: Arc<dyn InputProvider>,
        clipboard_provider: Arc<dyn ClipboardProvider>,
        clipboard_changes: mpsc::Receiver<()>,
        max_clipboard_bytes: usize,
        options: HostOptions,
    ) -> Self {
        let relay = Arc::new(InputRelay::new(Arc::clone(&registry), input));
        let (clipboard, clipboard_events) =
            ClipboardSync::new(clipboard_provider, max_clipboard_bytes);

        Self {
            transport,
            commands,
            registry,
            validator,
            capture,
            relay,
            clipboard: Arc::new(clipboard),
            clipboard_events,
            clipboard_changes: Some(clipboard_changes),
            health: HealthMonitor::new(),
            options,
            shutdown: CancellationToken::new(),
            pipelines: JoinSet::new(),
        }
    }

    /// Token that stops the orchestrator when cancelled (Ctrl-C etc.).
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Run until the shutdown token fires.
    pub async fn run(mut self) -> Result<(), VisorError> {
        info!("host orchestrator started");

        if self.options.enable_clipboard {
            let changes = self
                .clipboard_changes
                .take()
                .ok_or_else(|| VisorError::Init("clipboard watcher channel missing".into()))?;
            tokio::spawn(
                Arc::clone(&self.clipboard).run(changes, self.shutdown.child_token()),
            );
        }

        let mut tick = tokio::time::interval(self.options.tick_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                Some(command) = self.commands.recv() => self.handle_command(command).await,
                Some(content) = self.clipboard_events.recv() => self.broadcast_clipboard(content).await,
                _ = tick.tick() => self.on_tick().await,
            }
        }

        self.shutdown_sequence().await
    }

    // ── Tick ─────────────────────────────────────────────────────

    async fn on_tick(&mut self) {
        // Health report is best-effort; a down link is not an error.
        let status = self.health.snapshot(self.registry.active_count() as u32);
        if let Err(e) = self.transport.send_health(status).await {
            debug!("health report failed: {e}");
        }

        // Reap finished pipeline tasks.
        while let Some(result) = self.pipelines.try_join_next() {
            if let Err(e) = result {
                warn!("capture pipeline task failed: {e}");
            }
        }

        // Timed-out sessions tear down exactly like an explicit end.
        for session_id in self.registry.sweep_timeouts() {
            warn!(session = %session_id, "session exceeded max lifetime");
            self.announce_ended(&session_id, "timeout").await;
        }
    }

    // ── Command handling ─────────────────────────────────────────

    async fn handle_command(&mut self, command: ServerCommand) {
        match command {
            ServerCommand::StartSession(request) => self.start_session(request).await,
            ServerCommand::EndSession(session_id) => {
                if self.registry.end(&session_id) {
                    info!(session = %session_id, "session ended by hub");
                    self.announce_ended(&session_id, "ended").await;
                } else {
                    warn!(session = %session_id, "end for unknown session");
                }
            }
            ServerCommand::Input(event) => self.relay.apply(&event).await,
            ServerCommand::Execute(request) => self.execute_command(request),
            ServerCommand::FileTransfer(request) => self.file_transfer(request),
            ServerCommand::SyncClipboard(request) => self.sync_clipboard(request).await,
            ServerCommand::ChangeQuality(request) => {
                if let Err(e) = self
                    .registry
                    .set_quality(&request.session_id, request.quality)
                {
                    warn!(session = %request.session_id, "quality change rejected: {e}");
                }
            }
        }
    }

    async fn start_session(&mut self, request: SessionRequest) {
        let session_id = request.session_id.clone();

        if !self.registry.validate(&request, self.validator.as_ref()).await {
            self.announce_error(&session_id, "validation failed").await;
            return;
        }

        match self.registry.create(&request) {
            Ok(handle) => {
                let sink: Arc<dyn FrameSink> = self.transport.clone();
                let pipeline = CapturePipeline::new(
                    handle,
                    Arc::clone(&self.capture),
                    sink,
                    Arc::clone(&self.registry),
                );
                self.pipelines.spawn(pipeline.run());

                info!(session = %session_id, "session started");
                self.send_best_effort(
                    SessionStarted {
                        session_id: session_id.clone(),
                    }
                    .into_frame(),
                )
                .await;
            }
            Err(e) => {
                warn!(session = %session_id, "session rejected: {e}");
                self.announce_error(&session_id, &e.to_string()).await;
            }
        }
    }

    fn execute_command(&self, request: ExecuteCommandRequest) {
        let transport = Arc::clone(&self.transport);
        let enabled = self.options.enable_remote_commands;
        tokio::spawn(async move {
            let result = if enabled {
                run_shell(request.command_id, &request.command_line).await
            } else {
                CommandResult {
                    command_id: request.command_id,
                    success: false,
                    output: "remote commands are disabled on this host".into(),
                    payload: None,
                }
            };
            send_result(&transport, result).await;
        });
    }

    fn file_transfer(&self, request: FileTransferRequest) {
        let transport = Arc::clone(&self.transport);
        let enabled = self.options.enable_file_transfer;
        tokio::spawn(async move {
            let result = if enabled {
                run_transfer(request).await
            } else {
                CommandResult {
                    command_id: request.transfer_id,
                    success: false,
                    output: "file transfer is disabled on this host".into(),
                    payload: None,
                }
            };
            send_result(&transport, result).await;
        });
    }

    /// Answer a clipboard sync request, conflict-resolving a pushed
    /// client content against the host's latest entry.
    async fn sync_clipboard(&self, request: SyncClipboardRequest) {
        if !self.options.enable_clipboard {
            debug!(session = %request.session_id, "clipboard sync refused: disabled");
            self.send_best_effort(
                ClipboardContentPayload {
                    session_id: request.session_id,
                    content: None,
                }
                .into_frame(),
            )
            .await;
            return;
        }

        let host_latest = match self.clipboard.latest() {
            Some(content) => Some(content),
            None => self.clipboard.read_current().unwrap_or_else(|e| {
                warn!("clipboard read failed during sync: {e}");
                None
            }),
        };

        let winner = match (&request.content, &host_latest) {
            (Some(client), Some(host)) => {
                match resolve_conflict(host, client, self.options.conflict_policy) {
                    ConflictWinner::Client => Some(client.clone()),
                    ConflictWinner::Host => Some(host.clone()),
                }
            }
            (Some(client), None) => Some(client.clone()),
            (None, host) => host.clone(),
        };

        // When the client side won, mirror its content locally.
        if let (Some(content), Some(client)) = (&winner, &request.content) {
            if content.hash == client.hash {
                if let Err(e) = self.clipboard.set_content(content) {
                    warn!("failed to apply client clipboard: {e}");
                }
            }
        }

        self.send_best_effort(
            ClipboardContentPayload {
                session_id: request.session_id,
                content: winner,
            }
            .into_frame(),
        )
        .await;
    }

    /// Forward a local clipboard change to every active session.
    async fn broadcast_clipboard(&self, content: ClipboardContent) {
        for session_id in self.registry.active_ids() {
            self.send_best_effort(
                ClipboardContentPayload {
                    session_id,
                    content: Some(content.clone()),
                }
                .into_frame(),
            )
            .await;
        }
    }

    // ── Shutdown ─────────────────────────────────────────────────

    async fn shutdown_sequence(mut self) -> Result<(), VisorError> {
        info!("host orchestrator shutting down");

        for session_id in self.registry.end_all() {
            self.announce_ended(&session_id, "shutdown").await;
        }

        // Grace period for capture loops to notice their tokens.
        let drain = async {
            while self.pipelines.join_next().await.is_some() {}
        };
        if tokio::time::timeout(self.options.shutdown_grace, drain)
            .await
            .is_err()
        {
            warn!("capture pipelines did not stop in time; aborting them");
            self.pipelines.abort_all();
        }

        self.transport.disconnect();
        info!("host orchestrator stopped");
        Ok(())
    }

    // ── Helpers ──────────────────────────────────────────────────

    async fn announce_ended(&self, session_id: &str, reason: &str) {
        self.send_best_effort(
            SessionEnded {
                session_id: session_id.to_string(),
                reason: reason.to_string(),
            }
            .into_frame(),
        )
        .await;
    }

    async fn announce_error(&self, session_id: &str, message: &str) {
        self.send_best_effort(
            SessionError {
                session_id: session_id.to_string(),
                message: message.to_string(),
            }
            .into_frame(),
        )
        .await;
    }

    /// Send an event, treating a down link as a dropped event.
    async fn send_best_effort(&self, frame: Result<crate::hub::message::HubFrame, VisorError>) {
        match frame {
            Ok(frame) => {
                if let Err(e) = self.transport.send(frame).await {
                    debug!("event dropped: {e}");
                }
            }
            Err(e) => warn!("event encoding failed: {e}"),
        }
    }
}

// ── Command execution ────────────────────────────────────────────

/// Execute one shell command line and capture its output.
async fn run_shell(command_id: u64, command_line: &str) -> CommandResult {
    #[cfg(target_os = "windows")]
    let output = tokio::process::Command::new("cmd")
        .arg("/C")
        .arg(command_line)
        .output()
        .await;
    #[cfg(not(target_os = "windows"))]
    let output = tokio::process::Command::new("sh")
        .arg("-c")
        .arg(command_line)
        .output()
        .await;

    match output {
        Ok(output) => {
            let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
            text.push_str(&String::from_utf8_lossy(&output.stderr));
            CommandResult {
                command_id,
                success: output.status.success(),
                output: text,
                payload: None,
            }
        }
        Err(e) => CommandResult {
            command_id,
            success: false,
            output: format!("failed to spawn: {e}"),
            payload: None,
        },
    }
}

/// Perform one file transfer.
async fn run_transfer(request: FileTransferRequest) -> CommandResult {
    let command_id = request.transfer_id;
    match request.direction {
        TransferDirection::Upload => match request.bytes {
            Some(bytes) => match tokio::fs::write(&request.path, &bytes).await {
                Ok(()) => CommandResult {
                    command_id,
                    success: true,
                    output: format!("wrote {} bytes to {}", bytes.len(), request.path),
                    payload: None,
                },
                Err(e) => CommandResult {
                    command_id,
                    success: false,
                    output: format!("write failed: {e}"),
                    payload: None,
                },
            },
            None => CommandResult {
                command_id,
                success: false,
                output: "upload request carried no bytes".into(),
                payload: None,
            },
        },
        TransferDirection::Download => match tokio::fs::read(&request.path).await {
            Ok(bytes) if bytes.len() > MAX_TRANSFER_BYTES => CommandResult {
                command_id,
                success: false,
                output: format!(
                    "file too large: {} bytes (max {MAX_TRANSFER_BYTES})",
                    bytes.len()
                ),
                payload: None,
            },
            Ok(bytes) => CommandResult {
                command_id,
                success: true,
                output: format!("read {} bytes from {}", bytes.len(), request.path),
                payload: Some(bytes),
            },
            Err(e) => CommandResult {
                command_id,
                success: false,
                output: format!("read failed: {e}"),
                payload: None,
            },
        },
    }
}

async fn send_result(transport: &TransportClient, result: CommandResult) {
    match result.into_frame() {
        Ok(frame) => {
            if let Err(e) = transport.send(frame).await {
                debug!("command result dropped: {e}");
            }
        }
        Err(e) => warn!("command result encoding failed: {e}"),
    }
}

// ── Tests ────────────────────────────────────────────────────────
