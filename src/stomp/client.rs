//! STOMP broker connection.

use crate::error::{BindError, Result};
use crate::transport::{FrameHandler, Transport};
use crate::types::{ClientId, Command, ConnectionState, Frame, SubscriptionId, CLIENT_ID_HEADER};
use futures::{SinkExt, StreamExt};
use parking_lot::RwLock;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::codec::Framed;

use super::codec::StompCodec;

/// Broker address and credentials.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct StompConfig {
    pub host: String,
    pub port: u16,
    pub login: String,
    pub passcode: String,
    /// Virtual host sent in the CONNECT `host` header (defaults to `host`).
    pub vhost: Option<String>,
}

impl Default for StompConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 61613,
            login: "backbonestomp".to_string(),
            passcode: "backbonestomp".to_string(),
            vhost: None,
        }
    }
}

/// State shared between the client handle and its reader task.
struct Shared {
    state: RwLock<ConnectionState>,
    /// Open subscriptions. `None` marks a raw subscription whose frames go
    /// to the inbound channel.
    subscriptions: RwLock<HashMap<SubscriptionId, Option<FrameHandler>>>,
    next_id: AtomicU64,
}

impl Shared {
    /// Deliver one inbound frame to its handler or the inbound channel.
    fn route(&self, frame: Frame, inbound: &mpsc::UnboundedSender<Frame>) {
        match frame.command {
            Command::Connected => {
                *self.state.write() = ConnectionState::Connected;
                tracing::debug!(version = ?frame.header("version"), "broker CONNECTED");
            }
            Command::Message => {
                let handler = frame
                    .header("subscription")
                    .and_then(|s| s.parse::<SubscriptionId>().ok())
                    .and_then(|id| self.subscriptions.read().get(&id).cloned().flatten());
                if let Some(handler) = handler {
                    if let Err(e) = handler(&frame) {
                        tracing::error!(
                            destination = ?frame.destination(),
                            error = %e,
                            "subscription handler failed"
                        );
                    }
                    return;
                }
            }
            _ => {}
        }

        if inbound.send(frame).is_err() {
            tracing::trace!("inbound receiver dropped");
        }
    }
}

/// A single STOMP connection.
///
/// Outbound frames are queued to a writer task, so every method returns
/// without waiting on the network. Inbound CONNECTED, ERROR and RECEIPT
/// frames, plus messages for raw subscriptions, arrive on the receiver
/// returned by [`StompClient::connect`].
#[derive(Clone)]
pub struct StompClient {
    outbound: mpsc::UnboundedSender<Frame>,
    shared: Arc<Shared>,
    client_id: ClientId,
}

impl StompClient {
    /// Open a TCP connection to the broker and send CONNECT.
    pub async fn connect(config: &StompConfig) -> Result<(Self, mpsc::UnboundedReceiver<Frame>)> {
        let stream = TcpStream::connect((config.host.as_str(), config.port)).await?;
        tracing::info!(host = %config.host, port = config.port, "connected to broker socket");
        Self::attach(stream, config)
    }

    /// Run the STOMP session over an already-open stream.
    ///
    /// Must be called from within a tokio runtime.
    pub fn attach<S>(io: S, config: &StompConfig) -> Result<(Self, mpsc::UnboundedReceiver<Frame>)>
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let (mut sink, mut stream) = Framed::new(io, StompCodec::new()).split();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Frame>();
        let (in_tx, in_rx) = mpsc::unbounded_channel();

        let shared = Arc::new(Shared {
            state: RwLock::new(ConnectionState::Connecting),
            subscriptions: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        });

        tokio::spawn(async move {
            while let Some(frame) = out_rx.recv().await {
                let last = frame.command == Command::Disconnect;
                tracing::debug!(command = %frame.command, destination = ?frame.destination(), "send frame");
                if let Err(e) = sink.send(frame).await {
                    tracing::error!(error = %e, "broker write failed");
                    break;
                }
                if last {
                    break;
                }
            }
            let _ = sink.close().await;
        });

        let reader_shared = Arc::clone(&shared);
        tokio::spawn(async move {
            while let Some(result) = stream.next().await {
                match result {
                    Ok(frame) => reader_shared.route(frame, &in_tx),
                    Err(e) => {
                        tracing::error!(error = %e, "broker read failed");
                        break;
                    }
                }
            }
            *reader_shared.state.write() = ConnectionState::Disconnected;
            tracing::info!("broker connection closed");
        });

        let client = Self {
            outbound: out_tx,
            shared,
            client_id: ClientId::generate(),
        };

        let host = config.vhost.clone().unwrap_or_else(|| config.host.clone());
        client.send_frame(
            Frame::new(Command::Connect)
                .with_header("accept-version", "1.0,1.1,1.2")
                .with_header("host", host)
                .with_header("login", config.login.as_str())
                .with_header("passcode", config.passcode.as_str())
                .with_header("heart-beat", "0,0"),
        )?;

        Ok((client, in_rx))
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state.read()
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Subscribe without a handler; matching frames go to the inbound channel.
    pub fn subscribe_raw(&self, destination: &str) -> Result<SubscriptionId> {
        self.open_subscription(destination, None)
    }

    /// Send DISCONNECT without waiting for a receipt.
    pub fn disconnect(&self) {
        let _ = self.outbound.send(Frame::new(Command::Disconnect));
        *self.shared.state.write() = ConnectionState::Disconnected;
        tracing::info!("disconnect sent");
    }

    fn send_frame(&self, frame: Frame) -> Result<()> {
        self.outbound
            .send(frame)
            .map_err(|_| BindError::TransportClosed)
    }

    fn open_subscription(
        &self,
        destination: &str,
        handler: Option<FrameHandler>,
    ) -> Result<SubscriptionId> {
        let id = SubscriptionId(self.shared.next_id.fetch_add(1, Ordering::SeqCst));
        self.shared.subscriptions.write().insert(id, handler);

        let frame = Frame::new(Command::Subscribe)
            .with_header("id", id.to_string())
            .with_header("destination", destination)
            .with_header("ack", "auto");
        if let Err(e) = self.send_frame(frame) {
            self.shared.subscriptions.write().remove(&id);
            return Err(e);
        }
        tracing::debug!(%id, destination, "subscribing");
        Ok(id)
    }
}

impl Transport for StompClient {
    fn client_id(&self) -> &ClientId {
        &self.client_id
    }

    fn subscribe(&self, destination: &str, handler: FrameHandler) -> Result<SubscriptionId> {
        self.open_subscription(destination, Some(handler))
    }

    fn unsubscribe(&self, id: SubscriptionId) -> Result<()> {
        if self.shared.subscriptions.write().remove(&id).is_none() {
            return Err(BindError::SubscriptionNotFound(id));
        }
        self.send_frame(Frame::new(Command::Unsubscribe).with_header("id", id.to_string()))
    }

    fn publish(&self, destination: &str, body: &[u8], headers: &[(&str, &str)]) -> Result<()> {
        self.send_frame(
            Frame::new(Command::Send)
                .with_header("destination", destination)
                .with_header(CLIENT_ID_HEADER, self.client_id.as_str())
                .with_headers(headers.iter().copied())
                .with_body(body.to_vec()),
        )
    }
}
