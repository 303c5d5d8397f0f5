//! JSON message types for the browser-facing WebSocket protocol.
//!
//! Every frame is a JSON object with a `"type"` field identifying the
//! variant; all other fields sit next to it in the same object.  Serde's
//! `#[serde(tag = "type")]` attribute handles this automatically.
//!
//! # Message flow
//!
//! ```text
//! Browser → Relay:  JSON text frame  →  BrowserCommand
//! Relay   → Browser: RelayEvent  →  DashboardMsg  →  JSON text frame
//! ```
//!
//! Two distinct enums make it a compile-time error to send a command-only
//! shape to the dashboard, and vice versa.

use serde::{Deserialize, Serialize};

// ── Browser → Relay ───────────────────────────────────────────────────────────

/// Commands a dashboard can send over its WebSocket.
///
/// ```json
/// {"type":"init"}
/// {"type":"send","addr":"ABC123","message":"ping"}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BrowserCommand {
    /// Ask for a fresh device list.
    Init,

    /// Write `message` to the device whose display name is `addr`.
    Send {
        /// Display name of the target device (serial or address key).
        addr: String,
        /// Raw text written to the device socket as-is.
        message: String,
    },
}

impl BrowserCommand {
    /// Returns a short type-name string for log lines.
    ///
    /// Used instead of `Debug` so message bodies stay out of `info` logs.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Send { .. } => "send",
        }
    }
}

// ── Relay → Browser ───────────────────────────────────────────────────────────

/// Frames the relay pushes to every dashboard.
///
/// ```json
/// {"type":"message","addr":"ABC123","data":"[2024-03-09 07:05:01] [ABC123]: temp=21"}
/// {"type":"client_update","clients":["ABC123","192.168.1.7,50311"]}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DashboardMsg {
    /// A chat line: either a device's text or a system notice.
    Message {
        /// Display name of the sender, or the system label for notices.
        addr: String,
        /// Pre-rendered, timestamped text.
        data: String,
    },

    /// The full ordered device list.
    ClientUpdate { clients: Vec<String> },
}

// ── Tests ─────────────────────────────────────────────────────────────────────
