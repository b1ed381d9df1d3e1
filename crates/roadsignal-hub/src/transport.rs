//! Send-capable channels that a subscriber can sit behind.
//!
//! - [`WsTransport`] – the write half of an accepted WebSocket.
//! - [`ChannelTransport`] – an in-process observer backed by a Tokio channel.

use std::net::SocketAddr;

use async_trait::async_trait;
use futures_util::SinkExt;
use futures_util::stream::SplitSink;
use roadsignal_types::{BroadcastPayload, RelayError};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;

/// Outbound half of one subscriber's connection.
///
/// A transport is owned by exactly one delivery worker, which calls
/// [`send`](SubscriberTransport::send) for each payload in order. The first
/// error ends the subscription.
#[async_trait]
pub trait SubscriberTransport: Send {
    /// Deliver one payload as a single self-contained message.
    async fn send(&mut self, payload: &BroadcastPayload) -> Result<(), RelayError>;

    /// Close the channel after a normal disconnect. Errors are ignored.
    async fn close(&mut self) {}

    /// Human-readable peer description used in logs and errors.
    fn describe(&self) -> String;
}

// ---------------------------------------------------------------------------
// WebSocket
// ---------------------------------------------------------------------------

/// Sends each payload as one WebSocket text frame.
pub struct WsTransport {
    peer: SocketAddr,
    sink: SplitSink<WebSocketStream<TcpStream>, Message>,
    _released: oneshot::Sender<()>,
}

impl WsTransport {
    /// Wrap the write half of an accepted socket.
    ///
    /// The returned receiver resolves once the transport is dropped, which
    /// is how the read half learns that the hub has let go of the peer.
    pub fn new(
        peer: SocketAddr,
        sink: SplitSink<WebSocketStream<TcpStream>, Message>,
    ) -> (Self, oneshot::Receiver<()>) {
        let (released, on_release) = oneshot::channel();
        (
            Self {
                peer,
                sink,
                _released: released,
            },
            on_release,
        )
    }
}

#[async_trait]
impl SubscriberTransport for WsTransport {
    async fn send(&mut self, payload: &BroadcastPayload) -> Result<(), RelayError> {
        self.sink
            .send(Message::Text(payload.as_str().to_owned().into()))
            .await
            .map_err(|e| RelayError::SubscriberSend {
                subscriber: self.peer.to_string(),
                details: e.to_string(),
            })
    }

    async fn close(&mut self) {
        let _ = self.sink.close().await;
    }

    fn describe(&self) -> String {
        format!("ws://{}", self.peer)
    }
}

// ---------------------------------------------------------------------------
// In-process
// ---------------------------------------------------------------------------

/// Forwards payloads into an unbounded Tokio channel.
///
/// Dropping the receiver makes the next send fail, which removes the
/// subscriber like a closed socket would.
pub struct ChannelTransport {
    label: String,
    tx: mpsc::UnboundedSender<BroadcastPayload>,
}

impl ChannelTransport {
    pub fn new(label: impl Into<String>) -> (Self, mpsc::UnboundedReceiver<BroadcastPayload>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                label: label.into(),
                tx,
            },
            rx,
        )
    }
}

#[async_trait]
impl SubscriberTransport for ChannelTransport {
    async fn send(&mut self, payload: &BroadcastPayload) -> Result<(), RelayError> {
        self.tx
            .send(payload.clone())
            .map_err(|_| RelayError::SubscriberSend {
                subscriber: self.label.clone(),
                details: "receiver dropped".to_string(),
            })
    }

    fn describe(&self) -> String {
        format!("channel:{}", self.label)
    }
}
