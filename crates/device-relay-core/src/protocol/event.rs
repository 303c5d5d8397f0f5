//! Relay events: what device threads hand to the broadcast path.
//!
//! A [`RelayEvent`] is produced whenever something browsers should hear about
//! happens on the device side (a connect, an identification, a line of text, a
//! disconnect) and is consumed exactly once by the hub, which renders it into
//! the dashboard's JSON frame.
//!
//! Timestamps are captured when the event is *produced*, not when it is
//! broadcast, so a slow relay never skews the time shown to the user.

use std::fmt;

use chrono::{DateTime, Local};

/// Wall-clock time at which an event was produced.
///
/// Displays as `YYYY-MM-DD HH:MM:SS` in local time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Timestamp(DateTime<Local>);

impl Timestamp {
    /// The current local time.
    pub fn now() -> Self {
        Self(Local::now())
    }

    /// Wraps an explicit time (useful for deterministic tests).
    pub fn from_datetime(at: DateTime<Local>) -> Self {
        Self(at)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d %H:%M:%S"))
    }
}

/// One unit of work crossing from the device domain into the broadcast domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayEvent {
    /// A notice produced by the relay itself.
    SystemMessage { text: String, timestamp: Timestamp },

    /// A line of text received from a device.
    DeviceMessage {
        display_name: String,
        text: String,
        timestamp: Timestamp,
    },

    /// The full ordered list of display names currently registered.
    RegistryUpdate { display_names: Vec<String> },
}

impl RelayEvent {
    /// A system notice stamped with the current time.
    pub fn system(text: impl Into<String>) -> Self {
        Self::SystemMessage {
            text: text.into(),
            timestamp: Timestamp::now(),
        }
    }

    /// A device line stamped with the current time.
    pub fn device(display_name: impl Into<String>, text: impl Into<String>) -> Self {
        Self::DeviceMessage {
            display_name: display_name.into(),
            text: text.into(),
            timestamp: Timestamp::now(),
        }
    }

    pub fn registry(display_names: Vec<String>) -> Self {
        Self::RegistryUpdate { display_names }
    }

    // ── Standard notices ─────────────────────────────────────────────────────

    pub fn device_connected(key: &str) -> Self {
        Self::system(format!("new connection: {key}"))
    }

    pub fn device_identified(wifi_name: &str, serial: &str) -> Self {
        Self::system(format!("device identified - Wifi: {wifi_name}, SN: {serial}"))
    }

    pub fn device_disconnected(key: &str) -> Self {
        Self::system(format!("disconnected: {key}"))
    }

    pub fn delivered(target: &str, message: &str) -> Self {
        Self::system(format!("sent to [{target}]: {message}"))
    }

    pub fn delivery_failed(target: &str, message: &str) -> Self {
        Self::system(format!(
            "send failed: device [{target}] may have disconnected, message: {message}"
        ))
    }

    pub fn unknown_target(target: &str) -> Self {
        Self::system(format!(
            "send failed: device not found or disconnected, target: [{target}]"
        ))
    }

    /// Short variant name for log lines that must not echo payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SystemMessage { .. } => "SystemMessage",
            Self::DeviceMessage { .. } => "DeviceMessage",
            Self::RegistryUpdate { .. } => "RegistryUpdate",
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_timestamp_display_format() {
        let at = Local.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        assert_eq!(Timestamp::from_datetime(at).to_string(), "2024-03-09 07:05:01");
    }

    #[test]
    fn test_device_connected_notice_names_key() {
        let event = RelayEvent::device_connected("10.0.0.1,5000");
        assert!(matches!(
            event,
            RelayEvent::SystemMessage { ref text, .. } if text == "new connection: 10.0.0.1,5000"
        ));
    }

    #[test]
    fn test_device_disconnected_notice_names_key() {
        let event = RelayEvent::device_disconnected("10.0.0.1,5000");
        assert!(matches!(
            event,
            RelayEvent::SystemMessage { ref text, .. } if text == "disconnected: 10.0.0.1,5000"
        ));
    }

    #[test]
    fn test_device_message_keeps_name_and_text() {
        let event = RelayEvent::device("ABC123", "temp=21");
        match event {
            RelayEvent::DeviceMessage {
                display_name, text, ..
            } => {
                assert_eq!(display_name, "ABC123");
                assert_eq!(text, "temp=21");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_kind_names_each_variant() {
        assert_eq!(RelayEvent::system("x").kind(), "SystemMessage");
        assert_eq!(RelayEvent::device("a", "x").kind(), "DeviceMessage");
        assert_eq!(RelayEvent::registry(vec![]).kind(), "RegistryUpdate");
    }
}
