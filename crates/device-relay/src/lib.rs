//! device-relay library crate.
//!
//! Relays text between a fleet of raw-TCP field devices and any number of
//! browser dashboards speaking JSON over WebSocket.
//!
//! # Architecture (clean architecture)
//!
//! ```text
//! Devices (raw TCP, one OS thread each)
//!         │  RelayEvent
//!         ▼
//! [device-relay]
//!   ├── domain/           Pure types: dashboard JSON messages, RelayConfig
//!   ├── application/      Payload classification, event → frame rendering
//!   └── infrastructure/
//!         ├── device_acceptor/  Device listener and receive loops
//!         ├── relay/            Thread → runtime hand-off (single consumer)
//!         ├── hub/              Dashboard sessions, broadcast, routing
//!         ├── ws_server/        WebSocket accept loop (tokio-tungstenite)
//!         └── server/           Wiring and shutdown
//!         ▲
//!         │  JSON over WebSocket
//! Browser dashboards
//! ```
//!
//! The device registry, handshake parser and event model live in
//! `device-relay-core`, which has no networking dependencies.
//!
//! # Layer rules
//!
//! - `domain` does no I/O.
//! - `application` depends on `domain` and `device-relay-core` only.
//! - `infrastructure` depends on all other layers plus `tokio` and `tungstenite`.

/// Domain layer: pure types (no I/O).
pub mod domain;

/// Application layer: payload classification and frame rendering.
pub mod application;

/// Infrastructure layer: listeners, device threads, relay and hub.
pub mod infrastructure;
