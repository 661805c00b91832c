//! Integration tests — full host lifecycle against a loopback hub:
//! registration, session start/stream/end, reconnection, input relay,
//! and clipboard sync over a real TCP connection on localhost.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::Framed;

use visor_core::auth::TokenProvider;
use visor_core::host::{HostOptions, HostOrchestrator};
use visor_core::hub::codec::HubCodec;
use visor_core::hub::message::{
    ClipboardContentPayload, EndSessionRequest, HostInfo, HubFrame, HubMethod,
    RegisterHostPayload, ScreenData, SessionRequest, SyncClipboardRequest,
};
use visor_core::input::{InputAction, InputEvent, KeyAction};
use visor_core::provider::mock::{InputCall, MockCapture, MockClipboard, MockInput};
use visor_core::session::{CompressionKind, QualitySettings, SessionKind, SessionRegistry};
use visor_core::transport::TransportClient;

// ── Helpers ──────────────────────────────────────────────────────

type HubLink = Framed<TcpStream, HubCodec>;

async fn hub_listener() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    (listener, addr)
}

async fn accept_hub(listener: &TcpListener) -> HubLink {
    let (socket, _) = listener.accept().await.unwrap();
    Framed::new(socket, HubCodec)
}

fn host_info() -> HostInfo {
    HostInfo {
        host_id: "h-test".into(),
        host_name: "itest".into(),
        os: "linux".into(),
        version: "0.0.0".into(),
        monitor_count: 1,
    }
}

/// Receive the next frame with one of the wanted methods, skipping
/// everything else (health reports arrive on their own cadence).
async fn recv_method(hub: &mut HubLink, wanted: &[HubMethod]) -> HubFrame {
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let frame = hub.next().await.expect("hub link closed").expect("codec error");
            if let Ok(method) = frame.method() {
                if wanted.contains(&method) {
                    return frame;
                }
            }
        }
    })
    .await
    .expect("timed out waiting for hub frame")
}

fn session_request(id: &str, fps: u8) -> SessionRequest {
    SessionRequest {
        session_id: id.to_string(),
        user_id: None,
        device_id: "operator-1".to_string(),
        kind: SessionKind::Control,
        pin: None,
        monitor_index: 0,
        quality: QualitySettings {
            target_fps: fps,
            compression: CompressionKind::Raw,
            ..QualitySettings::default()
        },
    }
}

/// A fully wired host talking to `addr`, on mock providers.
struct TestHost {
    input: Arc<MockInput>,
    clipboard: Arc<MockClipboard>,
    shutdown: tokio_util::sync::CancellationToken,
    run_handle: tokio::task::JoinHandle<()>,
}

async fn spawn_host(addr: &str) -> TestHost {
    let (transport, commands) =
        TransportClient::new(TokenProvider::static_token("itest-token"), host_info());
    let transport = Arc::new(transport);
    let registry = Arc::new(SessionRegistry::new(4));

    let input = Arc::new(MockInput::new());
    let (clipboard, clipboard_changes) = MockClipboard::channel();
    let clipboard = Arc::new(clipboard);

    let validator: Arc<dyn visor_core::access::AccessValidator> = Arc::new(AllowAll);
    let input_provider: Arc<dyn visor_core::provider::InputProvider> = input.clone();
    let clipboard_provider: Arc<dyn visor_core::provider::ClipboardProvider> =
        clipboard.clone();
    let orchestrator = HostOrchestrator::new(
        Arc::clone(&transport),
        commands,
        registry,
        validator,
        Arc::new(MockCapture::new(16, 16)),
        input_provider,
        clipboard_provider,
        clipboard_changes,
        10 * 1024 * 1024,
        HostOptions::default(),
    );
    let shutdown = orchestrator.shutdown_token();

    transport.connect_with_retry(addr).await.unwrap();
    let run_handle = tokio::spawn(async move {
        orchestrator.run().await.unwrap();
    });

    TestHost {
        input,
        clipboard,
        shutdown,
        run_handle,
    }
}

struct AllowAll;

#[async_trait::async_trait]
impl visor_core::access::AccessValidator for AllowAll {
    async fn validate_pin(&self, _pin: &str) -> Result<bool, visor_core::error::VisorError> {
        Ok(true)
    }

    async fn check_permission(
        &self,
        _user_id: &str,
        _permission: &str,
    ) -> Result<bool, visor_core::error::VisorError> {
        Ok(true)
    }
}

// ── Session lifecycle end-to-end ─────────────────────────────────

#[tokio::test]
async fn session_streams_at_requested_rate_and_stops_on_end() {
    let (listener, addr) = hub_listener().await;
    let host = spawn_host(&addr).await;
    let mut hub = accept_hub(&listener).await;

    // Registration first.
    let reg = recv_method(&mut hub, &[HubMethod::RegisterHost]).await;
    let reg = RegisterHostPayload::from_bytes(reg.payload()).unwrap();
    assert_eq!(reg.token, "itest-token");

    // Start a 10 fps session.
    hub.send(session_request("s1", 10).into_frame().unwrap())
        .await
        .unwrap();
    recv_method(&mut hub, &[HubMethod::SessionStarted]).await;

    // Collect frames for two seconds past the first one.
    let mut arrivals: Vec<Instant> = Vec::new();
    let first = recv_method(&mut hub, &[HubMethod::ScreenData]).await;
    ScreenData::from_bytes(first.payload()).unwrap();
    let t0 = Instant::now();
    arrivals.push(t0);
    while t0.elapsed() < Duration::from_millis(2_050) {
        let frame = tokio::time::timeout(Duration::from_millis(300), hub.next())
            .await
            .expect("stream stalled")
            .unwrap()
            .unwrap();
        if frame.method().ok() == Some(HubMethod::ScreenData) {
            arrivals.push(Instant::now());
        }
    }
    let in_window = arrivals
        .iter()
        .filter(|t| t.duration_since(t0) < Duration::from_secs(2))
        .count() as i64;
    assert!(
        (in_window - 20).abs() <= 2,
        "expected ≈20 frames in 2 s at 10 fps, got {in_window}"
    );

    // End the session; after the hub sees SessionEnded no further
    // frame may arrive (sends are gated on the session being active).
    hub.send(
        EndSessionRequest {
            session_id: "s1".into(),
        }
        .into_frame()
        .unwrap(),
    )
    .await
    .unwrap();
    recv_method(&mut hub, &[HubMethod::SessionEnded]).await;

    let quiet = tokio::time::timeout(Duration::from_millis(600), async {
        loop {
            match hub.next().await {
                Some(Ok(frame)) => {
                    assert_ne!(
                        frame.method().ok(),
                        Some(HubMethod::ScreenData),
                        "frame transmitted after session end"
                    );
                }
                _ => return,
            }
        }
    })
    .await;
    // Either the line stayed quiet until the timeout, or only
    // non-frame traffic (health) arrived.
    let _ = quiet;

    host.shutdown.cancel();
    host.run_handle.await.unwrap();
}

#[tokio::test]
async fn duplicate_session_id_yields_session_error() {
    let (listener, addr) = hub_listener().await;
    let host = spawn_host(&addr).await;
    let mut hub = accept_hub(&listener).await;
    recv_method(&mut hub, &[HubMethod::RegisterHost]).await;

    hub.send(session_request("dup", 5).into_frame().unwrap())
        .await
        .unwrap();
    recv_method(&mut hub, &[HubMethod::SessionStarted]).await;

    hub.send(session_request("dup", 5).into_frame().unwrap())
        .await
        .unwrap();
    let err = recv_method(&mut hub, &[HubMethod::SessionError]).await;
    let err = visor_core::hub::message::SessionError::from_bytes(err.payload()).unwrap();
    assert_eq!(err.session_id, "dup");

    host.shutdown.cancel();
    host.run_handle.await.unwrap();
}

// ── Reconnection ─────────────────────────────────────────────────

#[tokio::test]
async fn dropped_link_reconnects_and_re_registers() {
    let (listener, addr) = hub_listener().await;
    let (transport, _commands) =
        TransportClient::new(TokenProvider::static_token("tok"), host_info());

    transport.connect(&addr).await.unwrap();

    // First connection: read the registration, then drop the socket.
    let mut hub = accept_hub(&listener).await;
    let first = recv_method(&mut hub, &[HubMethod::RegisterHost]).await;
    assert!(RegisterHostPayload::from_bytes(first.payload()).is_ok());
    drop(hub);

    // The supervisor's first retry is immediate; the host must show up
    // again and register anew, because the hub forgot it.
    let mut hub = tokio::time::timeout(Duration::from_secs(5), accept_hub(&listener))
        .await
        .expect("host did not reconnect");
    let second = recv_method(&mut hub, &[HubMethod::RegisterHost]).await;
    assert!(RegisterHostPayload::from_bytes(second.payload()).is_ok());

    assert!(transport.is_connected());
    transport.disconnect();
}

// ── Input relay end-to-end ───────────────────────────────────────

#[tokio::test]
async fn inbound_input_reaches_the_injector_for_active_sessions_only() {
    let (listener, addr) = hub_listener().await;
    let host = spawn_host(&addr).await;
    let mut hub = accept_hub(&listener).await;
    recv_method(&mut hub, &[HubMethod::RegisterHost]).await;

    hub.send(session_request("s1", 5).into_frame().unwrap())
        .await
        .unwrap();
    recv_method(&mut hub, &[HubMethod::SessionStarted]).await;

    // A key press for the active session injects a down/up pair.
    hub.send(
        InputEvent {
            session_id: "s1".into(),
            timestamp_ms: 1,
            action: InputAction::KeyPress {
                key: 0x41,
                modifiers: 0,
            },
        }
        .into_frame()
        .unwrap(),
    )
    .await
    .unwrap();

    // An event for an unknown session is dropped.
    hub.send(
        InputEvent {
            session_id: "ghost".into(),
            timestamp_ms: 2,
            action: InputAction::MouseMove { x: 5, y: 5 },
        }
        .into_frame()
        .unwrap(),
    )
    .await
    .unwrap();

    // Give the relay a moment to drain.
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if host.input.calls().len() >= 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("input never reached the injector");

    assert_eq!(
        host.input.calls(),
        vec![
            InputCall::Key {
                key: 0x41,
                action: KeyAction::Press
            },
            InputCall::Key {
                key: 0x41,
                action: KeyAction::Release
            },
        ]
    );

    host.shutdown.cancel();
    host.run_handle.await.unwrap();
}

// ── Clipboard sync end-to-end ────────────────────────────────────

#[tokio::test]
async fn local_clipboard_change_is_broadcast_to_active_sessions() {
    let (listener, addr) = hub_listener().await;
    let host = spawn_host(&addr).await;
    let mut hub = accept_hub(&listener).await;
    recv_method(&mut hub, &[HubMethod::RegisterHost]).await;

    hub.send(session_request("s1", 5).into_frame().unwrap())
        .await
        .unwrap();
    recv_method(&mut hub, &[HubMethod::SessionStarted]).await;

    host.clipboard.set_external_text("copied on the host");

    let event = recv_method(&mut hub, &[HubMethod::ClipboardContent]).await;
    let event = ClipboardContentPayload::from_bytes(event.payload()).unwrap();
    assert_eq!(event.session_id, "s1");
    assert_eq!(event.content.unwrap().payload, b"copied on the host");

    host.shutdown.cancel();
    host.run_handle.await.unwrap();
}

#[tokio::test]
async fn clipboard_pull_returns_current_host_content() {
    let (listener, addr) = hub_listener().await;
    let host = spawn_host(&addr).await;
    let mut hub = accept_hub(&listener).await;
    recv_method(&mut hub, &[HubMethod::RegisterHost]).await;

    hub.send(session_request("s1", 5).into_frame().unwrap())
        .await
        .unwrap();
    recv_method(&mut hub, &[HubMethod::SessionStarted]).await;

    host.clipboard.set_external_text("host text");
    // The change event confirms the sync loop has seen the content.
    recv_method(&mut hub, &[HubMethod::ClipboardContent]).await;

    hub.send(
        SyncClipboardRequest {
            session_id: "s1".into(),
            content: None,
        }
        .into_frame()
        .unwrap(),
    )
    .await
    .unwrap();

    let reply = recv_method(&mut hub, &[HubMethod::ClipboardContent]).await;
    let reply = ClipboardContentPayload::from_bytes(reply.payload()).unwrap();
    assert_eq!(reply.content.unwrap().payload, b"host text");

    host.shutdown.cancel();
    host.run_handle.await.unwrap();
}
