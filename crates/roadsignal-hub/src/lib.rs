//! `roadsignal-hub` – moves signal events from the device thread to every
//! connected client.
//!
//! # Modules
//!
//! - [`bridge`] – [`RelayBridge`], the single-producer handoff from the
//!   ingestion thread into the broadcast context.
//! - [`hub`] – [`BroadcastHub`], the subscriber registry and per-subscriber
//!   ordered delivery.
//! - [`service`] – [`HubService`], the Tokio task that owns the hub, and
//!   [`HubHandle`] for talking to it.
//! - [`transport`] – [`SubscriberTransport`] and its WebSocket and
//!   in-process implementations.
//! - [`server`] – [`WsServer`], the WebSocket accept loop.
//! - [`ingest`] – [`IngestLoop`], the blocking device read loop.
//! - [`projector`] – [`UiProjector`], the seam to a local display.

pub mod bridge;
pub mod hub;
pub mod ingest;
pub mod projector;
pub mod server;
pub mod service;
pub mod transport;

pub use bridge::{RelayBridge, SubmitOutcome};
pub use hub::{
    BroadcastHub, HubConfig, JsonEncoder, PayloadEncoder, Subscriber, SubscriberId,
    DEFAULT_OUTBOX_CAPACITY, DEFAULT_SEND_TIMEOUT,
};
pub use ingest::{IngestLoop, IngestSummary, INGEST_THREAD_NAME};
pub use projector::UiProjector;
pub use server::WsServer;
pub use service::{HubHandle, HubService, relay};
pub use transport::{ChannelTransport, SubscriberTransport, WsTransport};
