//! Infrastructure layer for device-relay.
//!
//! The infrastructure layer handles all I/O: the device TCP listener and its
//! per-device threads, the dashboard WebSocket listener, and the channel that
//! carries events between the two.
//!
//! # Responsibilities
//!
//! - Binding both listeners and polling the shutdown flag between accepts
//! - Reading device sockets on dedicated OS threads
//! - Handing device events to the broadcast runtime through the relay
//! - Owning the dashboard session set and writing frames to it
//! - Routing dashboard commands back to device sockets
//!
//! # What does NOT belong here?
//!
//! - Handshake parsing and event rendering (that is the application layer)
//! - Message and configuration types (that is the domain layer)

pub mod device_acceptor;
pub mod hub;
pub mod relay;
pub mod server;
pub mod ws_server;

pub use device_acceptor::{AcceptorError, DeviceAcceptor, DeviceContext, TcpDeviceLink};
pub use hub::{Hub, HubError, SessionId};
pub use relay::{relay_channel, run_relay_consumer, RelayReceiver, RelaySender};
pub use server::RelayServer;
pub use ws_server::{WsServer, WsSink};
