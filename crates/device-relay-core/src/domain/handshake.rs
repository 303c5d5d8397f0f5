//! Device identification handshake parser.
//!
//! A freshly connected device announces itself with a payload such as:
//!
//! ```text
//! Wifi : HomeNet, SN: ABC123, FW: 1.4
//! ```
//!
//! Two fields matter: the WiFi network name following `"Wifi :"` and the serial
//! number following `"SN:"`.  Each field runs from just after its marker up to
//! the next comma (or the end of the payload), with surrounding whitespace
//! trimmed.
//!
//! The parser never fails loudly.  Anything that does not yield two non-empty
//! fields is simply "not a handshake" and the caller relays the payload as an
//! ordinary device line.

/// Marker that precedes the WiFi network name.
pub const WIFI_MARKER: &str = "Wifi :";

/// Marker that precedes the device serial number.
pub const SERIAL_MARKER: &str = "SN:";

/// Identity fields extracted from a handshake payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    /// Name of the WiFi network the device joined.
    pub wifi_name: String,
    /// Self-reported serial number; becomes the device's display name.
    pub serial: String,
}

/// Extracts the WiFi name and serial number from a raw device payload.
///
/// Returns `None` unless both markers are present and both fields are
/// non-empty after trimming.
///
/// # Examples
///
/// ```rust
/// use device_relay_core::parse_handshake;
///
/// let hs = parse_handshake("Wifi : HomeNet, SN: ABC123,").unwrap();
/// assert_eq!(hs.wifi_name, "HomeNet");
/// assert_eq!(hs.serial, "ABC123");
///
/// assert!(parse_handshake("temperature=21.5").is_none());
/// ```
pub fn parse_handshake(payload: &str) -> Option<Handshake> {
    let wifi_name = field_after(payload, WIFI_MARKER)?;
    let serial = field_after(payload, SERIAL_MARKER)?;
    Some(Handshake {
        wifi_name: wifi_name.to_string(),
        serial: serial.to_string(),
    })
}

/// Returns the trimmed, non-empty text between `marker` and the next comma.
fn field_after<'a>(payload: &'a str, marker: &str) -> Option<&'a str> {
    let start = payload.find(marker)? + marker.len();
    let rest = &payload[start..];
    let end = rest.find(',').unwrap_or(rest.len());
    let field = rest[..end].trim();
    (!field.is_empty()).then_some(field)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_handshake_extracts_both_fields() {
        // Arrange
        let payload = "Wifi : HomeNet, SN: ABC123,";

        // Act
        let hs = parse_handshake(payload);

        // Assert
        assert_eq!(
            hs,
            Some(Handshake {
                wifi_name: "HomeNet".to_string(),
                serial: "ABC123".to_string(),
            })
        );
    }

    #[test]
    fn test_parse_handshake_accepts_fields_in_any_order() {
        let hs = parse_handshake("SN: XYZ-9, Wifi : Lab 2,").unwrap();
        assert_eq!(hs.wifi_name, "Lab 2");
        assert_eq!(hs.serial, "XYZ-9");
    }

    #[test]
    fn test_parse_handshake_field_without_trailing_comma_runs_to_end() {
        let hs = parse_handshake("Wifi : Office, SN:  Q77  ").unwrap();
        assert_eq!(hs.serial, "Q77");
    }

    #[test]
    fn test_parse_handshake_ignores_surrounding_text() {
        let hs = parse_handshake("boot ok\r\nWifi : Home, SN: 42, rssi=-60\r\n").unwrap();
        assert_eq!(hs.wifi_name, "Home");
        assert_eq!(hs.serial, "42");
    }

    #[test]
    fn test_parse_handshake_missing_serial_marker_returns_none() {
        assert!(parse_handshake("Wifi : HomeNet, rssi=-40,").is_none());
    }

    #[test]
    fn test_parse_handshake_missing_wifi_marker_returns_none() {
        assert!(parse_handshake("SN: ABC123,").is_none());
    }

    #[test]
    fn test_parse_handshake_empty_serial_returns_none() {
        assert!(parse_handshake("Wifi : HomeNet, SN: ,").is_none());
    }

    #[test]
    fn test_parse_handshake_whitespace_only_wifi_returns_none() {
        assert!(parse_handshake("Wifi :   , SN: ABC123,").is_none());
    }

    #[test]
    fn test_parse_handshake_marker_is_case_sensitive() {
        // "WIFI :" is not the marker the firmware sends.
        assert!(parse_handshake("WIFI : HomeNet, SN: ABC123,").is_none());
    }

    #[test]
    fn test_parse_handshake_empty_payload_returns_none() {
        assert!(parse_handshake("").is_none());
    }

    #[test]
    fn test_parse_handshake_handles_multibyte_text() {
        let hs = parse_handshake("Wifi : 家里的网络, SN: 设备-01,").unwrap();
        assert_eq!(hs.wifi_name, "家里的网络");
        assert_eq!(hs.serial, "设备-01");
    }
}
