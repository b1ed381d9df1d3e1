//! The broadcast context: one Tokio task that owns the [`BroadcastHub`].
//!
//! Everything that touches the subscriber set arrives here as a message:
//! events from the [`RelayBridge`], connect/disconnect requests from a
//! [`HubHandle`], and exit reports from delivery workers. Processing them on
//! a single task serializes every mutation without a lock.
//!
//! ```text
//!  ingest thread ──RelayBridge──► ┐
//!  ws connections ──HubHandle───► ├─► HubService::run ─► BroadcastHub
//!  delivery workers ──JoinSet───► ┘
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use roadsignal_types::{RelayError, StateEvent};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use crate::bridge::RelayBridge;
use crate::hub::{BroadcastHub, SubscriberId};
use crate::transport::SubscriberTransport;

enum HubCommand {
    Connect {
        transport: Box<dyn SubscriberTransport>,
        reply: oneshot::Sender<Result<SubscriberId, RelayError>>,
    },
    Disconnect(SubscriberId),
    SubscriberCount(oneshot::Sender<usize>),
}

/// Split `hub` into the broadcast task, the ingestion bridge and a cloneable
/// handle for connection tasks.
///
/// The bridge drops events until [`HubService::run`] has started.
pub fn relay(hub: BroadcastHub) -> (HubService, RelayBridge, HubHandle) {
    let running = Arc::new(AtomicBool::new(false));
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (command_tx, command_rx) = mpsc::unbounded_channel();

    let service = HubService {
        hub,
        events: event_rx,
        commands: command_rx,
        running: running.clone(),
    };
    (
        service,
        RelayBridge::new(event_tx, running),
        HubHandle {
            commands: command_tx,
        },
    )
}

// ---------------------------------------------------------------------------
// HubHandle
// ---------------------------------------------------------------------------

/// Cloneable request channel into a running [`HubService`].
#[derive(Clone)]
pub struct HubHandle {
    commands: mpsc::UnboundedSender<HubCommand>,
}

impl HubHandle {
    /// Register a subscriber. It receives only events broadcast after the
    /// hub processes this request.
    pub async fn connect(
        &self,
        transport: impl SubscriberTransport + 'static,
    ) -> Result<SubscriberId, RelayError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(HubCommand::Connect {
                transport: Box::new(transport),
                reply,
            })
            .map_err(|_| RelayError::HubStopped)?;
        rx.await.map_err(|_| RelayError::HubStopped)?
    }

    /// Ask the hub to drop a subscriber. Unknown ids are ignored.
    pub fn disconnect(&self, id: SubscriberId) {
        let _ = self.commands.send(HubCommand::Disconnect(id));
    }

    pub async fn subscriber_count(&self) -> Result<usize, RelayError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(HubCommand::SubscriberCount(reply))
            .map_err(|_| RelayError::HubStopped)?;
        rx.await.map_err(|_| RelayError::HubStopped)
    }
}

// ---------------------------------------------------------------------------
// HubService
// ---------------------------------------------------------------------------

pub struct HubService {
    hub: BroadcastHub,
    events: mpsc::UnboundedReceiver<StateEvent>,
    commands: mpsc::UnboundedReceiver<HubCommand>,
    running: Arc<AtomicBool>,
}

impl HubService {
    /// Serve until `shutdown` flips to `true` (or its sender is dropped),
    /// then drain the hub.
    ///
    /// Losing the bridge does not stop the service; existing subscribers stay
    /// connected until shutdown.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        self.running.store(true, Ordering::Release);
        info!("broadcast context started");

        let mut ingest_open = true;
        loop {
            let stop = *shutdown.borrow();
            if stop {
                break;
            }

            tokio::select! {
                biased;

                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }

                exit = self.hub.next_delivery_exit() => self.hub.on_delivery_exit(exit),

                Some(command) = self.commands.recv() => self.handle_command(command),

                event = self.events.recv(), if ingest_open => match event {
                    Some(event) => self.hub.on_event(&event),
                    None => {
                        ingest_open = false;
                        warn!("ingestion bridge dropped; serving subscribers until shutdown");
                    }
                },
            }
        }

        self.running.store(false, Ordering::Release);
        self.hub.shutdown().await;
        info!("broadcast context stopped");
    }

    fn handle_command(&mut self, command: HubCommand) {
        match command {
            HubCommand::Connect { transport, reply } => {
                let _ = reply.send(self.hub.on_connect(transport));
            }
            HubCommand::Disconnect(id) => {
                if !self.hub.on_disconnect(id) {
                    debug!(subscriber = %id, "disconnect for unknown subscriber ignored");
                }
            }
            HubCommand::SubscriberCount(reply) => {
                let _ = reply.send(self.hub.subscriber_count());
            }
        }
    }
}
