//! WebSocket transport against a loopback tungstenite server.

use std::net::TcpListener;
use std::thread;
use std::time::{Duration, Instant};

use fraudwatch_core::{
    config::{ConnectionConfig, WatchConfig},
    connection::{ConnectionEvent, ConnectionManager, ConnectionState, Connector},
    envelope::EnvelopeKind,
    error::WatchError,
    ws_transport::WsConnector,
};
use tungstenite::Message;

const WELCOME: &str = r#"{"type":"WELCOME","title":"Connected","message":"hello","priority":"LOW"}"#;

/// Handshake goes out, an envelope comes back, the server close is
/// seen as a drop.
#[test]
fn loopback_roundtrip() {
    let _ = env_logger::builder().is_test(true).try_init();
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    let server = thread::spawn(move || -> Option<String> {
        let (stream, _) = listener.accept().ok()?;
        let mut ws = tungstenite::accept(stream).ok()?;
        let handshake = match ws.read().ok()? {
            Message::Text(text) => text.as_str().to_string(),
            _ => return None,
        };
        ws.send(Message::text(WELCOME.to_string())).ok()?;
        ws.close(None).ok()?;
        // Drive the close handshake to completion.
        while ws.read().is_ok() {}
        Some(handshake)
    });

    let config = ConnectionConfig {
        endpoint: format!("ws://127.0.0.1:{port}/ws/notifications"),
        user_id: Some("analyst-1".into()),
        ..WatchConfig::default_test().connection
    };
    let connector = WsConnector::new(config.read_timeout(), config.handshake_timeout());
    let mut mgr = ConnectionManager::new(config, Box::new(connector));
    mgr.connect(Instant::now());
    assert_eq!(mgr.state(), ConnectionState::Connected);

    let deadline = Instant::now() + Duration::from_secs(5);
    let mut welcomed = false;
    while Instant::now() < deadline && mgr.state() == ConnectionState::Connected {
        mgr.poll(Instant::now());
        welcomed |= mgr.take_events().iter().any(|e| {
            matches!(e, ConnectionEvent::Message(env) if env.kind() == EnvelopeKind::Welcome)
        });
    }
    mgr.disconnect();

    assert!(welcomed, "Welcome envelope never arrived");
    assert_eq!(server.join().unwrap().as_deref(), Some("subscribe"));
}

/// Refused connections surface as transport errors.
#[test]
fn refused_connection_is_transport_error() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let mut connector = WsConnector::new(Duration::from_millis(5), Duration::from_millis(500));
    let result = connector.open(&format!("ws://127.0.0.1:{port}/ws"));
    assert!(matches!(result, Err(WatchError::Transport(_))));
}

/// A peer that accepts TCP but never answers the upgrade costs one
/// failed attempt instead of blocking connect().
#[test]
fn silent_peer_times_out_handshake() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
    let server = thread::spawn(move || {
        let held = listener.accept().ok();
        // Hold the socket open and silent until the client has given up.
        let _ = release_rx.recv_timeout(Duration::from_secs(30));
        drop(held);
    });

    let config = ConnectionConfig {
        endpoint: format!("ws://127.0.0.1:{port}/ws/notifications"),
        read_timeout_ms: 50,
        handshake_timeout_ms: 200,
        ..WatchConfig::default_test().connection
    };
    let connector = WsConnector::new(config.read_timeout(), config.handshake_timeout());
    let mut mgr = ConnectionManager::new(config, Box::new(connector));

    let started = Instant::now();
    mgr.connect(started);
    let elapsed = started.elapsed();
    let _ = release_tx.send(());
    server.join().unwrap();

    assert!(
        elapsed < Duration::from_secs(2),
        "connect() blocked for {elapsed:?} against a silent peer"
    );
    assert_eq!(mgr.state(), ConnectionState::Reconnecting);
    assert_eq!(mgr.attempts(), 1);
}

/// Only plain ws:// endpoints are supported.
#[test]
fn tls_scheme_is_rejected() {
    let mut connector = WsConnector::new(Duration::from_millis(5), Duration::from_millis(100));
    let result = connector.open("wss://127.0.0.1:1/ws");
    assert!(matches!(result, Err(WatchError::Transport(_))));
}
