//! Domain layer for device-relay.
//!
//! The domain layer contains pure types that have no dependencies on I/O,
//! networking, or the async runtime.
//!
//! # What belongs in the domain layer?
//!
//! - The browser-facing JSON message types
//! - Runtime configuration and its validation
//!
//! # What does NOT belong here?
//!
//! - Any `tokio`, `TcpStream`, or `WebSocket` types
//! - Reading files or environment variables (done in `main.rs`)

pub mod config;
pub mod messages;

pub use config::{ConfigError, ConfigFile, RelayConfig};
pub use messages::{BrowserCommand, DashboardMsg};
