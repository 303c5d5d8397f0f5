//! Relay configuration types.
//!
//! [`RelayConfig`] is the single source of truth for all runtime settings.
//! It is assembled in `main.rs` from three layers, highest precedence first:
//!
//! 1. CLI flags (and their environment-variable fallbacks, via `clap`)
//! 2. An optional TOML file ([`ConfigFile`])
//! 3. [`RelayConfig::default`]
//!
//! Keeping configuration as a plain struct (no global state, no environment
//! reads in here) makes the relay easy to embed in integration tests with
//! ephemeral ports.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// Default TCP port devices connect to.
pub const DEFAULT_DEVICE_PORT: u16 = 45860;
/// Default WebSocket port dashboards connect to.
pub const DEFAULT_WS_PORT: u16 = 8765;
/// Sender label the shipped dashboard recognises for system notices.
pub const DEFAULT_SYSTEM_LABEL: &str = "系统";

/// Errors produced while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The TOML file could not be parsed.
    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// A setting is present but unusable.
    #[error("invalid value for {field}: {reason}")]
    Invalid {
        field: &'static str,
        reason: &'static str,
    },
}

/// All runtime configuration for the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    /// Address the device TCP listener binds to.
    pub device_bind_addr: SocketAddr,

    /// Address the dashboard WebSocket listener binds to.
    pub ws_bind_addr: SocketAddr,

    /// Read (and write) timeout applied to every device socket.
    ///
    /// A read timeout is not an error: the handler simply re-checks the
    /// connection's liveness flag and reads again.
    pub read_timeout: Duration,

    /// Upper bound on how long an accept loop waits before re-checking the
    /// shutdown flag.
    pub accept_poll: Duration,

    /// Size of the per-connection read buffer.  One read is one payload; the
    /// relay never reassembles across reads.
    pub read_buffer_size: usize,

    /// Value of `addr` on system notices sent to dashboards.
    pub system_label: String,
}

impl Default for RelayConfig {
    /// | Field            | Default          |
    /// |------------------|------------------|
    /// | device_bind_addr | `0.0.0.0:45860`  |
    /// | ws_bind_addr     | `0.0.0.0:8765`   |
    /// | read_timeout     | 5 seconds        |
    /// | accept_poll      | 1 second         |
    /// | read_buffer_size | 1024 bytes       |
    /// | system_label     | `系统`           |
    fn default() -> Self {
        let any = IpAddr::V4(Ipv4Addr::UNSPECIFIED);
        Self {
            device_bind_addr: SocketAddr::new(any, DEFAULT_DEVICE_PORT),
            ws_bind_addr: SocketAddr::new(any, DEFAULT_WS_PORT),
            read_timeout: Duration::from_secs(5),
            accept_poll: Duration::from_secs(1),
            read_buffer_size: 1024,
            system_label: DEFAULT_SYSTEM_LABEL.to_string(),
        }
    }
}

impl RelayConfig {
    /// Rejects settings that would make a loop spin or a socket unusable.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for zero durations or a zero-sized
    /// read buffer.  (`std` rejects a zero socket timeout outright.)
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.read_timeout.is_zero() {
            return Err(ConfigError::Invalid {
                field: "read_timeout",
                reason: "must be greater than zero",
            });
        }
        if self.accept_poll.is_zero() {
            return Err(ConfigError::Invalid {
                field: "accept_poll",
                reason: "must be greater than zero",
            });
        }
        if self.read_buffer_size == 0 {
            return Err(ConfigError::Invalid {
                field: "read_buffer_size",
                reason: "must be greater than zero",
            });
        }
        Ok(())
    }
}

/// Settings read from an optional TOML file.  Every field is optional; unset
/// fields fall through to the built-in defaults.
///
/// ```toml
/// device_bind = "0.0.0.0"
/// device_port = 45860
/// ws_port = 8765
/// read_timeout_secs = 5
/// read_buffer_size = 1024
/// system_label = "system"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    pub device_bind: Option<String>,
    pub device_port: Option<u16>,
    pub ws_bind: Option<String>,
    pub ws_port: Option<u16>,
    pub read_timeout_secs: Option<u64>,
    pub accept_poll_ms: Option<u64>,
    pub read_buffer_size: Option<usize>,
    pub system_label: Option<String>,
}

impl ConfigFile {
    /// Parses TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] on malformed TOML, wrong value types, or
    /// unknown keys.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
