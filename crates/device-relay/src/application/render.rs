//! Relay event → dashboard frame translation.
//!
//! These functions have no I/O side effects, which keeps the exact text the
//! dashboard sees testable without a socket.
//!
//! ```text
//! SystemMessage  →  {"type":"message","addr":<label>,"data":"[ts] text"}
//! DeviceMessage  →  {"type":"message","addr":<name>, "data":"[ts] [name]: text"}
//! RegistryUpdate →  {"type":"client_update","clients":[...]}
//! ```

use device_relay_core::RelayEvent;

use crate::domain::messages::DashboardMsg;

/// Translates a relay event into the frame dashboards receive.
///
/// `system_label` becomes the `addr` of system notices.
pub fn render_event(event: &RelayEvent, system_label: &str) -> DashboardMsg {
    match event {
        RelayEvent::SystemMessage { text, timestamp } => DashboardMsg::Message {
            addr: system_label.to_string(),
            data: format!("[{timestamp}] {text}"),
        },
        RelayEvent::DeviceMessage {
            display_name,
            text,
            timestamp,
        } => DashboardMsg::Message {
            addr: display_name.clone(),
            data: format!("[{timestamp}] [{display_name}]: {text}"),
        },
        RelayEvent::RegistryUpdate { display_names } => DashboardMsg::ClientUpdate {
            clients: display_names.clone(),
        },
    }
}

/// Serializes a frame to the JSON text sent over the WebSocket.
///
/// # Errors
///
/// Propagates `serde_json` errors; with the current message shapes this
/// cannot fail in practice.
pub fn encode_frame(msg: &DashboardMsg) -> Result<String, serde_json::Error> {
    serde_json::to_string(msg)
}
