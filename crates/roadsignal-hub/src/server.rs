//! WebSocket endpoint for browser dashboards.
//!
//! Every accepted connection becomes a subscriber for as long as the socket
//! stays open. Inbound frames are read only to notice the peer leaving; their
//! content is ignored. When the hub drops a subscriber its socket is dropped
//! too, so the peer sees the connection end and can reconnect.

use std::net::SocketAddr;

use futures_util::StreamExt;
use roadsignal_types::RelayError;
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::sync::watch;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use crate::service::HubHandle;
use crate::transport::WsTransport;

pub struct WsServer {
    listener: TcpListener,
    handle: HubHandle,
}

impl WsServer {
    /// Bind the listening socket.
    ///
    /// # Errors
    ///
    /// [`RelayError::Server`] if the address cannot be bound.
    pub async fn bind(handle: HubHandle, addr: impl ToSocketAddrs) -> Result<Self, RelayError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| RelayError::Server(format!("bind error: {e}")))?;
        Ok(Self { listener, handle })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, RelayError> {
        self.listener
            .local_addr()
            .map_err(|e| RelayError::Server(e.to_string()))
    }

    /// Accept connections until `shutdown` flips to `true`.
    ///
    /// Connections already accepted keep running; the hub closes them when it
    /// shuts down.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<(), RelayError> {
        let addr = self.local_addr()?;
        info!(%addr, "WebSocket server listening on ws://{addr}");

        loop {
            let stop = *shutdown.borrow();
            if stop {
                break;
            }

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let handle = self.handle.clone();
                        tokio::spawn(async move {
                            if let Err(e) = serve_connection(stream, peer, handle).await {
                                warn!(peer = %peer, error = %e, "ws client error");
                            }
                        });
                    }
                    Err(e) => error!(error = %e, "ws accept error"),
                },
            }
        }

        info!(%addr, "WebSocket server stopped accepting");
        Ok(())
    }
}

async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    handle: HubHandle,
) -> Result<(), RelayError> {
    let ws = accept_async(stream)
        .await
        .map_err(|e| RelayError::Server(format!("handshake with {peer}: {e}")))?;
    let (sink, mut frames) = ws.split();
    let (transport, mut released) = WsTransport::new(peer, sink);
    let id = handle.connect(transport).await?;

    loop {
        tokio::select! {
            _ = &mut released => {
                debug!(peer = %peer, "subscriber dropped by hub; closing socket");
                break;
            }
            frame = frames.next() => match frame {
                None | Some(Ok(Message::Close(_))) => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(peer = %peer, error = %e, "ws read error");
                    break;
                }
            },
        }
    }

    handle.disconnect(id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures_util::SinkExt;
    use roadsignal_hal::translate;
    use roadsignal_types::{BroadcastPayload, StateEvent};
    use serde_json::Value;
    use tokio::time::timeout;
    use tokio_tungstenite::connect_async;

    use super::*;
    use crate::hub::{BroadcastHub, HubConfig, PayloadEncoder};
    use crate::service::{HubHandle, relay};

    async fn wait_for_count(handle: &HubHandle, expected: usize) {
        for _ in 0..200 {
            if handle.subscriber_count().await.unwrap() == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("subscriber count never reached {expected}");
    }

    #[tokio::test]
    async fn websocket_client_receives_broadcasts() {
        let (service, bridge, handle) = relay(BroadcastHub::new(HubConfig::default()));
        let (stop_tx, stop_rx) = watch::channel(false);
        let hub_task = tokio::spawn(service.run(stop_rx.clone()));

        let server = WsServer::bind(handle.clone(), "127.0.0.1:0").await.unwrap();
        let addr = server.local_addr().unwrap();
        let server_task = tokio::spawn(server.run(stop_rx));

        let (mut client, _) = connect_async(format!("ws://{addr}")).await.unwrap();
        wait_for_count(&handle, 1).await;

        bridge.submit(translate("road Y").unwrap());
        let frame = timeout(Duration::from_secs(2), client.next())
            .await
            .expect("frame within deadline")
            .expect("stream open")
            .unwrap();
        let text = frame.into_text().unwrap();
        let v: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(v["light1State"], "red");
        assert_eq!(v["light2State"], "green");

        client.send(Message::Text("ignored".to_string().into())).await.unwrap();
        client.close(None).await.unwrap();
        wait_for_count(&handle, 0).await;

        stop_tx.send(true).unwrap();
        server_task.await.unwrap().unwrap();
        hub_task.await.unwrap();
    }

    /// Pads every payload so a client that stops reading fills the socket
    /// buffers quickly.
    struct PaddedEncoder;

    impl PayloadEncoder for PaddedEncoder {
        fn encode(&self, event: &StateEvent) -> Result<BroadcastPayload, RelayError> {
            Ok(BroadcastPayload::new(format!("{}{}", event.raw, " ".repeat(4096))))
        }
    }

    #[tokio::test]
    async fn stalled_client_is_disconnected_when_dropped() {
        let hub = BroadcastHub::new(HubConfig {
            send_timeout: Duration::from_millis(50),
            outbox_capacity: 32,
        })
        .with_encoder(PaddedEncoder);
        let (service, bridge, handle) = relay(hub);
        let (stop_tx, stop_rx) = watch::channel(false);
        let hub_task = tokio::spawn(service.run(stop_rx.clone()));

        let server = WsServer::bind(handle.clone(), "127.0.0.1:0").await.unwrap();
        let addr = server.local_addr().unwrap();
        let server_task = tokio::spawn(server.run(stop_rx));

        let (mut client, _) = connect_async(format!("ws://{addr}")).await.unwrap();
        wait_for_count(&handle, 1).await;

        // The client reads nothing until the hub gives up on it.
        timeout(Duration::from_secs(20), async {
            while handle.subscriber_count().await.unwrap() > 0 {
                for _ in 0..16 {
                    bridge.submit(translate("road X").unwrap());
                }
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .expect("stalled client dropped by the hub");

        // Whatever was buffered drains, then the stream must end.
        timeout(Duration::from_secs(5), async {
            while let Some(frame) = client.next().await {
                match frame {
                    Ok(Message::Close(_)) | Err(_) => break,
                    Ok(_) => {}
                }
            }
        })
        .await
        .expect("connection ends after the subscriber is dropped");

        stop_tx.send(true).unwrap();
        server_task.await.unwrap().unwrap();
        hub_task.await.unwrap();
    }

    #[tokio::test]
    async fn bind_conflict_is_a_server_error() {
        let (_service, _bridge, handle) = relay(BroadcastHub::new(HubConfig::default()));
        let first = WsServer::bind(handle.clone(), "127.0.0.1:0").await.unwrap();
        let addr = first.local_addr().unwrap();

        let err = WsServer::bind(handle, addr).await.err().unwrap();
        assert!(matches!(err, RelayError::Server(_)));
    }
}
