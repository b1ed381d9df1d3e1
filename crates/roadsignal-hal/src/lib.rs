//! `roadsignal-hal` – device-facing side of the relay.
//!
//! # Modules
//!
//! - [`source`] – the [`EventSource`] trait plus the device reader and an
//!   in-process channel source.
//! - [`serial`] – opening controller ports with a fixed baud rate and timeout.
//! - [`sim`] – [`MockDevice`], a stand-in controller for bench runs and CI.
//! - [`sink`] – [`LineSink`] for forwarding received lines to a second device.
//! - [`translator`] – raw line → [`StateEvent`][roadsignal_types::StateEvent].

pub mod serial;
pub mod sim;
pub mod sink;
pub mod source;
pub mod translator;

pub use serial::{DEFAULT_BAUD_RATE, open_port};
pub use sim::MockDevice;
pub use sink::{DeviceSink, LineSink};
pub use source::{ChannelSource, DeviceSource, EventSource, LineRead, ReadWindow};
pub use translator::{translate, translate_at};
