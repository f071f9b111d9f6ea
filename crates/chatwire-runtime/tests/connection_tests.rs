//! Connection lifecycle tests against a loopback WebSocket server

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::protocol::Message;

use chatwire_core::config::{ChannelConfig, ReconnectConfig};
use chatwire_core::frame::ClientFrame;
use chatwire_core::retry::ExponentialBackoff;
use chatwire_core::types::ConversationId;
use chatwire_runtime::{ConnectionManager, LinkState, StaticCredential};

fn fast_reconnect() -> ReconnectConfig {
    ReconnectConfig {
        backoff: ExponentialBackoff {
            base: Duration::from_millis(10),
            max_delay: Duration::from_millis(50),
            max_attempts: 3,
        },
    }
}

async fn wait_for<F>(state: &mut watch::Receiver<LinkState>, predicate: F)
where
    F: Fn(&LinkState) -> bool,
{
    timeout(Duration::from_secs(5), async {
        loop {
            let done = predicate(&state.borrow());
            if done {
                return;
            }
            state
                .changed()
                .await
                .expect("link task dropped the state channel");
        }
    })
    .await
    .expect("timed out waiting for a link state");
}

#[tokio::test]
async fn frames_round_trip_and_token_reaches_the_server() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let conversation_id = ConversationId::generate();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        // Capture the request path during the handshake
        let mut request_uri = String::new();
        let ws = tokio_tungstenite::accept_hdr_async(
            stream,
            |request: &tokio_tungstenite::tungstenite::handshake::server::Request,
             response| {
                request_uri = request.uri().to_string();
                Ok(response)
            },
        )
        .await
        .unwrap();

        let (mut sink, mut stream) = ws.split();
        let inbound = stream.next().await.unwrap().unwrap();
        sink.send(Message::Text(
            r#"{"type":"typing","user_id":"8c5f0e0e-8b4e-4a83-9d6b-111111111111","is_typing":true}"#
                .into(),
        ))
        .await
        .unwrap();
        // Hold the socket open until the client closes it
        while let Some(message) = stream.next().await {
            if matches!(message, Ok(Message::Close(_)) | Err(_)) {
                break;
            }
        }
        (request_uri, inbound)
    });

    let (mut manager, mut link) = ConnectionManager::open(
        &format!("ws://127.0.0.1:{port}"),
        conversation_id,
        Arc::new(StaticCredential::new("jwt-token")),
        fast_reconnect(),
        &ChannelConfig::default(),
    )
    .unwrap();

    let mut state = manager.state();
    wait_for(&mut state, LinkState::is_open).await;

    link.frames_out
        .send(ClientFrame::Typing { is_typing: true })
        .await
        .unwrap();

    let inbound = timeout(Duration::from_secs(5), link.frames_in.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(inbound.contains(r#""is_typing":true"#));

    manager.close().await;
    let final_state = state.borrow().clone();
    assert!(matches!(final_state, LinkState::Closed));
    // close() is idempotent
    manager.close().await;

    let (request_uri, received) = timeout(Duration::from_secs(5), server)
        .await
        .unwrap()
        .unwrap();
    assert!(request_uri.contains(&format!("/ws/conversations/{conversation_id}")));
    assert!(request_uri.contains("token=jwt-token"));
    match received {
        Message::Text(text) => assert!(text.contains(r#""type":"typing""#)),
        other => panic!("unexpected message: {other:?}"),
    }
}

#[tokio::test]
async fn unexpected_close_triggers_reconnect() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let server = tokio::spawn(async move {
        // First connection: accept, then drop it to simulate a crash
        let (stream, _) = listener.accept().await.unwrap();
        let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        drop(ws);

        // Second connection stays up
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        // Hold the socket until the client closes
        while let Some(message) = ws.next().await {
            if matches!(message, Ok(Message::Close(_)) | Err(_)) {
                break;
            }
        }
    });

    let (mut manager, _link) = ConnectionManager::open(
        &format!("ws://127.0.0.1:{port}"),
        ConversationId::generate(),
        Arc::new(StaticCredential::new("jwt")),
        fast_reconnect(),
        &ChannelConfig::default(),
    )
    .unwrap();

    let mut state = manager.state();
    wait_for(&mut state, LinkState::is_open).await;
    // Server drops the first socket; the manager reconnects on its own
    wait_for(&mut state, |s| {
        matches!(s, LinkState::Reconnecting { .. } | LinkState::Open)
    })
    .await;
    wait_for(&mut state, LinkState::is_open).await;

    manager.close().await;
    timeout(Duration::from_secs(5), server).await.unwrap().unwrap();
}

#[tokio::test]
async fn reconnect_cap_surfaces_failed_state() {
    // Grab a free port and release it so every connect is refused
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let (mut manager, _link) = ConnectionManager::open(
        &format!("ws://127.0.0.1:{port}"),
        ConversationId::generate(),
        Arc::new(StaticCredential::new("jwt")),
        fast_reconnect(),
        &ChannelConfig::default(),
    )
    .unwrap();

    let mut state = manager.state();
    wait_for(&mut state, |s| matches!(s, LinkState::Failed { .. })).await;
    manager.close().await;
}
