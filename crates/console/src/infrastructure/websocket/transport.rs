//! Push channel transport using tokio-tungstenite

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::StreamExt;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use robodeck_shared::{parse_server_event, ProtocolError, ServerEvent};

use crate::infrastructure::lock;
use crate::infrastructure::messaging::{ConnectionState, ConnectionStateObserver};

use super::ReconnectPolicy;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("failed to connect to {url}: {reason}")]
    Connect { url: String, reason: String },

    #[error("push channel failed: {0}")]
    Stream(String),

    #[error("push channel closed by the backend")]
    ClosedByPeer,

    #[error("transport already started")]
    AlreadyStarted,
}

/// Everything the transport reports to its owner.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Envelope(ServerEvent),
    StateChanged(ConnectionState),
    /// A frame was dropped because it was not a valid envelope
    ProtocolError(ProtocolError),
    /// The channel failed or could not be opened; a reconnect follows
    TransportError(TransportError),
}

/// Owns the single push-channel connection.
///
/// `start` spawns one connection task that keeps the channel open until
/// `stop`: every unexpected closure or failed attempt schedules exactly one
/// reconnect after the fixed delay, forever. Decoded envelopes, state changes
/// and failures are forwarded to the sink; nothing here is fatal.
pub struct TransportManager {
    url: String,
    reconnect_delay: Duration,
    sink: mpsc::UnboundedSender<TransportEvent>,
    state: Arc<AtomicU8>,
    reconnect_attempts: Arc<AtomicU64>,
    cancel: CancellationToken,
    started: AtomicBool,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl TransportManager {
    pub fn new(
        url: impl Into<String>,
        reconnect_delay: Duration,
        sink: mpsc::UnboundedSender<TransportEvent>,
    ) -> Self {
        Self {
            url: url.into(),
            reconnect_delay,
            sink,
            state: Arc::new(AtomicU8::new(ConnectionState::Disconnected.to_u8())),
            reconnect_attempts: Arc::new(AtomicU64::new(0)),
            cancel: CancellationToken::new(),
            started: AtomicBool::new(false),
            task: Mutex::new(None),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Spawn the connection task. Must be called from within a tokio runtime.
    pub fn start(&self) -> Result<(), TransportError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(TransportError::AlreadyStarted);
        }

        let connection = Connection {
            url: self.url.clone(),
            reconnect_delay: self.reconnect_delay,
            sink: self.sink.clone(),
            state: Arc::clone(&self.state),
            reconnect_attempts: Arc::clone(&self.reconnect_attempts),
            cancel: self.cancel.clone(),
        };
        tracing::info!(url = %self.url, "Starting push channel transport");
        *lock(&self.task) = Some(tokio::spawn(connection.run()));
        Ok(())
    }

    /// Close the channel and suppress further reconnects. Idempotent.
    pub async fn stop(&self) {
        self.cancel.cancel();

        let task = lock(&self.task).take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "Push channel task ended abnormally");
            }
            tracing::info!(url = %self.url, "Push channel transport stopped");
        }

        let previous = self
            .state
            .swap(ConnectionState::Disconnected.to_u8(), Ordering::SeqCst);
        if previous != ConnectionState::Disconnected.to_u8() {
            let _ = self
                .sink
                .send(TransportEvent::StateChanged(ConnectionState::Disconnected));
        }
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn observer(&self) -> ConnectionStateObserver {
        ConnectionStateObserver::new(Arc::clone(&self.state))
    }

    /// Reconnects scheduled since `start`.
    pub fn reconnect_attempts(&self) -> u64 {
        self.reconnect_attempts.load(Ordering::SeqCst)
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for TransportManager {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

enum SessionEnd {
    Stopped,
    Lost(TransportError),
}

/// State moved into the spawned connection task.
struct Connection {
    url: String,
    reconnect_delay: Duration,
    sink: mpsc::UnboundedSender<TransportEvent>,
    state: Arc<AtomicU8>,
    reconnect_attempts: Arc<AtomicU64>,
    cancel: CancellationToken,
}

impl Connection {
    async fn run(self) {
        let mut policy = ReconnectPolicy::new(self.reconnect_delay);
        self.set_state(ConnectionState::Connecting);

        loop {
            let connected = tokio::select! {
                _ = self.cancel.cancelled() => return,
                result = connect_async(self.url.as_str()) => result,
            };

            match connected {
                Ok((socket, _response)) => {
                    tracing::info!(url = %self.url, "Push channel connected");
                    self.set_state(ConnectionState::Connected);
                    match self.pump(socket).await {
                        SessionEnd::Stopped => return,
                        SessionEnd::Lost(error) => {
                            tracing::warn!(error = %error, "Push channel lost");
                            self.emit(TransportEvent::TransportError(error));
                        }
                    }
                }
                Err(e) => {
                    let error = TransportError::Connect {
                        url: self.url.clone(),
                        reason: e.to_string(),
                    };
                    tracing::warn!(error = %error, "Push channel connection attempt failed");
                    self.emit(TransportEvent::TransportError(error));
                }
            }

            if self.sink.is_closed() {
                tracing::debug!("Transport sink dropped, giving up the push channel");
                return;
            }
            if self.cancel.is_cancelled() {
                return;
            }

            self.set_state(ConnectionState::Reconnecting);
            if let Some(delay) = policy.schedule() {
                let attempt = policy.attempts_scheduled();
                self.reconnect_attempts.store(attempt, Ordering::SeqCst);
                tracing::info!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Scheduling push channel reconnect"
                );

                tokio::select! {
                    _ = self.cancel.cancelled() => {
                        policy.cancel();
                        tracing::debug!("Reconnect cancelled - transport stopped");
                        return;
                    }
                    _ = tokio::time::sleep(delay) => policy.fire(),
                }
            }
        }
    }

    /// Read frames until the channel ends or the transport is stopped.
    async fn pump(&self, mut socket: Socket) -> SessionEnd {
        loop {
            let message = tokio::select! {
                _ = self.cancel.cancelled() => {
                    if let Err(e) = socket.close(None).await {
                        tracing::debug!(error = %e, "Close handshake failed");
                    }
                    return SessionEnd::Stopped;
                }
                message = socket.next() => message,
            };

            match message {
                Some(Ok(Message::Text(text))) => self.forward(&text),
                Some(Ok(Message::Binary(bytes))) => {
                    let error = ProtocolError::BinaryFrame(bytes.len());
                    tracing::warn!(error = %error, "Dropping push channel frame");
                    self.emit(TransportEvent::ProtocolError(error));
                }
                Some(Ok(Message::Close(frame))) => {
                    tracing::info!(?frame, "Backend closed the push channel");
                    return SessionEnd::Lost(TransportError::ClosedByPeer);
                }
                // Ping/pong are answered by tungstenite itself
                Some(Ok(_)) => {}
                Some(Err(e)) => return SessionEnd::Lost(TransportError::Stream(e.to_string())),
                None => return SessionEnd::Lost(TransportError::ClosedByPeer),
            }
        }
    }

    fn forward(&self, text: &str) {
        match parse_server_event(text) {
            Ok(event) => {
                tracing::trace!(event_type = %event.event_type, "Push channel event");
                self.emit(TransportEvent::Envelope(event));
            }
            Err(error) => {
                tracing::warn!(error = %error, "Dropping malformed push channel frame");
                self.emit(TransportEvent::ProtocolError(error));
            }
        }
    }

    fn set_state(&self, new_state: ConnectionState) {
        let previous = self.state.swap(new_state.to_u8(), Ordering::SeqCst);
        if previous != new_state.to_u8() {
            tracing::debug!(
                from = %ConnectionState::from_u8(previous),
                to = %new_state,
                "Push channel state changed"
            );
            self.emit(TransportEvent::StateChanged(new_state));
        }
    }

    fn emit(&self, event: TransportEvent) {
        // A closed sink means the owner is gone; the loop notices and exits.
        let _ = self.sink.send(event);
    }
}
