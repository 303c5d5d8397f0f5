//! Device payload classification.
//!
//! Each successful socket read is one payload.  A payload is either the
//! device's identification handshake (consumed by the relay, never shown as a
//! chat line) or an ordinary line relayed to dashboards.

use std::borrow::Cow;

use device_relay_core::{parse_handshake, Handshake};

/// What the receive loop should do with one payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadAction {
    /// Bind this identity to the connection and suppress the line.
    Identify(Handshake),
    /// Relay the text to dashboards as a device message.
    Relay,
}

/// Decodes raw bytes as UTF-8, replacing invalid sequences instead of failing.
///
/// Firmware occasionally emits stray bytes; a decode problem must never tear
/// the connection down.
pub fn decode_payload(bytes: &[u8]) -> Cow<'_, str> {
    String::from_utf8_lossy(bytes)
}

/// Classifies a decoded payload.
///
/// Once a connection is identified its payloads are never re-parsed, even if
/// they happen to contain the handshake markers again.
pub fn classify_payload(text: &str, already_identified: bool) -> PayloadAction {
    if already_identified {
        return PayloadAction::Relay;
    }
    match parse_handshake(text) {
        Some(handshake) => PayloadAction::Identify(handshake),
        None => PayloadAction::Relay,
    }
}
