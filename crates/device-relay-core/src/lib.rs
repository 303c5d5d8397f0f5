//! # device-relay-core
//!
//! Shared library for the device relay containing the device registry, the
//! identification handshake parser, and the relay event model.
//!
//! This crate is used by the `device-relay` service.  It has zero dependencies
//! on async runtimes or network sockets: a device's socket only enters through
//! the [`DeviceLink`] trait, which the service implements for `TcpStream`.
//!
//! # Architecture overview (for beginners)
//!
//! The relay sits between two populations:
//!
//! - **Devices** open a raw TCP connection and push free-form text.  The first
//!   payload that carries `Wifi :` and `SN:` fields is the *handshake*: from
//!   then on the device is shown under its serial number instead of its
//!   address.
//! - **Browsers** open a WebSocket and receive every device line plus system
//!   notices; they can also ask the relay to write text back to a device.
//!
//! This crate defines the pieces both sides agree on:
//!
//! - **`domain`** – [`DeviceConnection`], the [`DeviceRegistry`] that tracks who
//!   is connected, and the pure [`parse_handshake`] extractor.
//!
//! - **`protocol`** – [`RelayEvent`], the unit of work that crosses from device
//!   threads into the broadcast path.

pub mod domain;
pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `device_relay_core::DeviceRegistry` instead of the full module path.
pub use domain::device::{connection_key, DeviceConnection, DeviceError, DeviceLink};
pub use domain::handshake::{parse_handshake, Handshake};
pub use domain::registry::{DeviceInfo, DeviceRegistry};
pub use protocol::event::{RelayEvent, Timestamp};
