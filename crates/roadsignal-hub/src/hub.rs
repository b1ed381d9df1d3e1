//! [`BroadcastHub`] – the subscriber registry and fan-out.
//!
//! The hub is owned by the broadcast context (see [`HubService`][crate::HubService])
//! and is never shared, so the subscriber set needs no lock.
//!
//! # Delivery model
//!
//! | Step | Where |
//! |------|-------|
//! | Project event to every [`UiProjector`] | `on_event`, always |
//! | Encode the event once | `on_event`, only with ≥ 1 subscriber |
//! | Queue payload in each subscriber's outbox | `on_event`, non-blocking |
//! | Send payload on the transport | per-subscriber delivery worker |
//!
//! Each subscriber has a bounded outbox drained by its own worker task, so
//! one slow peer neither delays the others nor reorders its own stream. A
//! worker stops at the first failed or timed-out send, makes one bounded
//! attempt to close the transport and drops it; the hub then removes that
//! subscriber. A full outbox evicts the subscriber immediately.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use roadsignal_types::{BroadcastPayload, RelayError, StateEvent, StatePayload};
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinSet};
use tokio::time;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::projector::UiProjector;
use crate::transport::SubscriberTransport;

/// Identity of one registered subscriber.
pub type SubscriberId = Uuid;

/// Upper bound on a single send to one subscriber.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Payloads a subscriber may fall behind by before it is evicted.
pub const DEFAULT_OUTBOX_CAPACITY: usize = 32;

pub(crate) type DeliveryExit = (SubscriberId, Result<(), RelayError>);

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Turns an event into the wire text sent to subscribers.
pub trait PayloadEncoder: Send {
    fn encode(&self, event: &StateEvent) -> Result<BroadcastPayload, RelayError>;
}

/// Encodes events as a JSON object (see [`StatePayload`]).
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonEncoder;

impl PayloadEncoder for JsonEncoder {
    fn encode(&self, event: &StateEvent) -> Result<BroadcastPayload, RelayError> {
        serde_json::to_string(&StatePayload::from(event))
            .map(BroadcastPayload::new)
            .map_err(|e| RelayError::Serialization(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Hub
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct HubConfig {
    pub send_timeout: Duration,
    pub outbox_capacity: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            send_timeout: DEFAULT_SEND_TIMEOUT,
            outbox_capacity: DEFAULT_OUTBOX_CAPACITY,
        }
    }
}

/// One registered receiver of broadcasts.
#[derive(Debug)]
pub struct Subscriber {
    pub id: SubscriberId,
    pub label: String,
    pub connected_at: DateTime<Utc>,
    outbox: mpsc::Sender<BroadcastPayload>,
}

pub struct BroadcastHub {
    config: HubConfig,
    encoder: Box<dyn PayloadEncoder>,
    projectors: Vec<Arc<dyn UiProjector>>,
    subscribers: HashMap<SubscriberId, Subscriber>,
    deliveries: JoinSet<DeliveryExit>,
    accepting: bool,
}

impl BroadcastHub {
    pub fn new(config: HubConfig) -> Self {
        Self {
            config,
            encoder: Box::new(JsonEncoder),
            projectors: Vec::new(),
            subscribers: HashMap::new(),
            deliveries: JoinSet::new(),
            accepting: true,
        }
    }

    /// Replace the default [`JsonEncoder`].
    pub fn with_encoder(mut self, encoder: impl PayloadEncoder + 'static) -> Self {
        self.encoder = Box::new(encoder);
        self
    }

    /// Register a UI that receives every event, subscribers or not.
    pub fn with_projector(mut self, projector: Arc<dyn UiProjector>) -> Self {
        self.projectors.push(projector);
        self
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    pub fn subscribers(&self) -> impl Iterator<Item = &Subscriber> {
        self.subscribers.values()
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting
    }

    /// Register a new subscriber behind `transport`.
    ///
    /// The subscriber receives every event broadcast after this call and
    /// nothing broadcast before it.
    ///
    /// # Errors
    ///
    /// [`RelayError::HubStopped`] once shutdown has begun.
    pub fn on_connect(
        &mut self,
        transport: Box<dyn SubscriberTransport>,
    ) -> Result<SubscriberId, RelayError> {
        if !self.accepting {
            return Err(RelayError::HubStopped);
        }

        let id = Uuid::new_v4();
        let label = transport.describe();
        let (outbox, rx) = mpsc::channel(self.config.outbox_capacity.max(1));
        self.deliveries
            .spawn(deliver(id, transport, rx, self.config.send_timeout));
        self.subscribers.insert(
            id,
            Subscriber {
                id,
                label: label.clone(),
                connected_at: Utc::now(),
                outbox,
            },
        );

        info!(
            subscriber = %id,
            peer = %label,
            total = self.subscribers.len(),
            "subscriber connected"
        );
        Ok(id)
    }

    /// Remove a subscriber. Returns `false` if it was already gone.
    pub fn on_disconnect(&mut self, id: SubscriberId) -> bool {
        let Some(sub) = self.subscribers.remove(&id) else {
            return false;
        };
        info!(
            subscriber = %id,
            peer = %sub.label,
            connected_s = (Utc::now() - sub.connected_at).num_seconds(),
            total = self.subscribers.len(),
            "subscriber disconnected"
        );
        true
    }

    /// Fan `event` out to projectors and every current subscriber.
    pub fn on_event(&mut self, event: &StateEvent) {
        for projector in &self.projectors {
            projector.schedule_update(event.clone());
        }

        if self.subscribers.is_empty() {
            return;
        }

        let payload = match self.encoder.encode(event) {
            Ok(payload) => payload,
            Err(e) => {
                error!(raw = %event.raw, error = %e, "event encoding failed; not broadcast");
                return;
            }
        };

        let mut evicted = Vec::new();
        for (id, sub) in &self.subscribers {
            match sub.outbox.try_send(payload.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(
                        subscriber = %id,
                        capacity = self.config.outbox_capacity,
                        "subscriber outbox full; dropping subscriber"
                    );
                    evicted.push(*id);
                }
                Err(mpsc::error::TrySendError::Closed(_)) => evicted.push(*id),
            }
        }
        for id in evicted {
            self.on_disconnect(id);
        }

        debug!(
            kind = ?event.kind,
            subscribers = self.subscribers.len(),
            bytes = payload.len(),
            "event broadcast"
        );
    }

    /// Wait for the next delivery worker to finish.
    ///
    /// Pending forever while no worker is running, so it can sit in a
    /// `select!` without spinning.
    pub(crate) async fn next_delivery_exit(&mut self) -> Result<DeliveryExit, JoinError> {
        match self.deliveries.join_next().await {
            Some(exit) => exit,
            None => std::future::pending().await,
        }
    }

    pub(crate) fn on_delivery_exit(&mut self, exit: Result<DeliveryExit, JoinError>) {
        match exit {
            Ok((id, Ok(()))) => debug!(subscriber = %id, "delivery worker finished"),
            Ok((id, Err(e))) => {
                warn!(subscriber = %id, error = %e, "send failed; dropping subscriber");
                self.on_disconnect(id);
            }
            Err(e) => error!(error = %e, "delivery worker aborted"),
        }
    }

    /// Stop accepting subscribers, drop all current ones and wait for their
    /// workers to close the transports.
    pub async fn shutdown(&mut self) {
        self.accepting = false;
        let remaining = self.subscribers.len();
        self.subscribers.clear();
        while let Some(exit) = self.deliveries.join_next().await {
            self.on_delivery_exit(exit);
        }
        info!(remaining, "broadcast hub drained");
    }
}

/// Drain one subscriber's outbox into its transport, in order.
async fn deliver(
    id: SubscriberId,
    mut transport: Box<dyn SubscriberTransport>,
    mut outbox: mpsc::Receiver<BroadcastPayload>,
    send_timeout: Duration,
) -> DeliveryExit {
    while let Some(payload) = outbox.recv().await {
        let sent = match time::timeout(send_timeout, transport.send(&payload)).await {
            Ok(sent) => sent,
            Err(_) => Err(RelayError::SendTimeout {
                subscriber: transport.describe(),
                timeout_ms: u64::try_from(send_timeout.as_millis()).unwrap_or(u64::MAX),
            }),
        };
        if let Err(e) = sent {
            let _ = time::timeout(send_timeout, transport.close()).await;
            return (id, Err(e));
        }
    }
    let _ = time::timeout(send_timeout, transport.close()).await;
    (id, Ok(()))
}
