//! Application layer for device-relay.
//!
//! The application layer knows *what* to do with data, but delegates *how* to
//! move it to the infrastructure layer.
//!
//! # Responsibilities
//!
//! - Deciding whether a device payload is a handshake or an ordinary line
//! - Rendering relay events into dashboard JSON frames
//!
//! # What does NOT belong here?
//!
//! - Opening sockets or listening for connections
//! - Spawning threads or Tokio tasks
//! - WebSocket framing (handled by tokio-tungstenite)

pub mod payload;
pub mod render;

pub use payload::{classify_payload, decode_payload, PayloadAction};
pub use render::{encode_frame, render_event};
