//! Push channel transport against an in-process WebSocket server.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

use robodeck_console::{ConnectionState, TransportError, TransportEvent, TransportManager};

const WAIT: Duration = Duration::from_secs(5);

async fn listener() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let url = format!("ws://{}/ws", listener.local_addr().expect("addr"));
    (listener, url)
}

async fn next_event(rx: &mut mpsc::UnboundedReceiver<TransportEvent>) -> TransportEvent {
    tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("transport event in time")
        .expect("sink open")
}

/// Collect events until `done` returns true for one of them.
async fn collect_until(
    rx: &mut mpsc::UnboundedReceiver<TransportEvent>,
    done: impl Fn(&TransportEvent) -> bool,
) -> Vec<TransportEvent> {
    let mut events = Vec::new();
    loop {
        let event = next_event(rx).await;
        let finished = done(&event);
        events.push(event);
        if finished {
            return events;
        }
    }
}

fn connected_count(events: &[TransportEvent]) -> usize {
    events
        .iter()
        .filter(|e| **e == TransportEvent::StateChanged(ConnectionState::Connected))
        .count()
}

#[tokio::test]
async fn forwards_envelopes_and_drops_malformed_frames() {
    let (listener, url) = listener().await;
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("accept");
        let mut ws = tokio_tungstenite::accept_async(stream).await.expect("handshake");
        for frame in [
            r#"{"type":"robot_connected","data":{"id":"minibot-1","name":"Minibot 1"}}"#,
            "definitely not json",
            r#"{"type":"emergency_stop","data":{"active":true}}"#,
        ] {
            ws.send(Message::Text(frame.to_string())).await.expect("send");
        }
        // Keep the socket open until the client goes away
        while let Some(Ok(_)) = ws.next().await {}
    });

    let (tx, mut rx) = mpsc::unbounded_channel();
    let transport = TransportManager::new(url, Duration::from_millis(50), tx);
    transport.start().expect("start");

    let events = collect_until(&mut rx, |e| {
        matches!(e, TransportEvent::Envelope(event) if event.event_type == "emergency_stop")
    })
    .await;

    assert_eq!(
        events[0],
        TransportEvent::StateChanged(ConnectionState::Connecting)
    );
    assert_eq!(
        events[1],
        TransportEvent::StateChanged(ConnectionState::Connected)
    );
    assert!(
        matches!(&events[2], TransportEvent::Envelope(event) if event.event_type == "robot_connected")
    );
    assert!(matches!(events[3], TransportEvent::ProtocolError(_)));
    assert_eq!(transport.state(), ConnectionState::Connected);

    transport.stop().await;
}

#[tokio::test]
async fn each_closure_schedules_exactly_one_reconnect() {
    let (listener, url) = listener().await;
    tokio::spawn(async move {
        // Three sessions closed by the server, then one that stays up
        for _ in 0..3 {
            let (stream, _) = listener.accept().await.expect("accept");
            let mut ws = tokio_tungstenite::accept_async(stream).await.expect("handshake");
            ws.close(None).await.expect("close");
        }
        let (stream, _) = listener.accept().await.expect("accept");
        let mut ws = tokio_tungstenite::accept_async(stream).await.expect("handshake");
        while let Some(Ok(_)) = ws.next().await {}
    });

    let (tx, mut rx) = mpsc::unbounded_channel();
    let transport = TransportManager::new(url, Duration::from_millis(50), tx);
    transport.start().expect("start");

    let mut events = Vec::new();
    while connected_count(&events) < 4 {
        events.push(next_event(&mut rx).await);
    }

    let losses = events
        .iter()
        .filter(|e| matches!(e, TransportEvent::TransportError(_)))
        .count();
    assert_eq!(losses, 3);
    assert_eq!(transport.reconnect_attempts(), 3);
    assert_eq!(transport.state(), ConnectionState::Connected);

    transport.stop().await;
}

#[tokio::test]
async fn connection_failures_retry_without_limit() {
    // Reserve a port, then free it so nothing is listening there
    let (listener, url) = listener().await;
    drop(listener);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let transport = TransportManager::new(url, Duration::from_millis(20), tx);
    transport.start().expect("start");

    let mut failures = 0;
    while failures < 5 {
        if let TransportEvent::TransportError(error) = next_event(&mut rx).await {
            assert!(matches!(error, TransportError::Connect { .. }));
            failures += 1;
        }
    }
    assert!(transport.reconnect_attempts() >= 4);

    transport.stop().await;
}

#[tokio::test]
async fn stop_is_idempotent_and_suppresses_reconnects() {
    let (listener, url) = listener().await;
    let (closed_tx, closed_rx) = tokio::sync::oneshot::channel();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("accept");
        let mut ws = tokio_tungstenite::accept_async(stream).await.expect("handshake");
        while let Some(Ok(message)) = ws.next().await {
            if message.is_close() {
                break;
            }
        }
        let _ = closed_tx.send(());
        // Stay reachable so a wrongful reconnect would succeed and be seen
        let _ = listener.accept().await;
    });

    let (tx, mut rx) = mpsc::unbounded_channel();
    let transport = TransportManager::new(url, Duration::from_millis(20), tx);
    transport.start().expect("start");
    assert_eq!(transport.start(), Err(TransportError::AlreadyStarted));

    collect_until(&mut rx, |e| {
        *e == TransportEvent::StateChanged(ConnectionState::Connected)
    })
    .await;

    transport.stop().await;
    transport.stop().await;

    tokio::time::timeout(WAIT, closed_rx)
        .await
        .expect("server saw the close")
        .expect("server task alive");
    assert_eq!(transport.state(), ConnectionState::Disconnected);
    assert!(transport.is_stopped());

    // Only the final Disconnected transition follows the stop
    assert_eq!(
        next_event(&mut rx).await,
        TransportEvent::StateChanged(ConnectionState::Disconnected)
    );
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(rx.try_recv().is_err());
}
