//! Device Relay entry point.
//!
//! Accepts raw TCP connections from field devices and relays their output to
//! browser dashboards over JSON WebSocket frames.  Dashboards can write text
//! back to any connected device by its serial number.
//!
//! # Usage
//!
//! ```text
//! device-relay [OPTIONS]
//!
//! Options:
//!   --config <PATH>          Optional TOML config file
//!   --device-bind <IP>       Device listener address   [default: 0.0.0.0]
//!   --device-port <PORT>     Device listener port      [default: 45860]
//!   --ws-bind <IP>           WebSocket listener address [default: 0.0.0.0]
//!   --ws-port <PORT>         WebSocket listener port   [default: 8765]
//!   --read-timeout <SECS>    Device socket timeout     [default: 5]
//!   --accept-poll-ms <MS>    Shutdown poll interval    [default: 1000]
//!   --system-label <TEXT>    Sender label for notices  [default: 系统]
//! ```
//!
//! # Configuration precedence
//!
//! CLI flag, then its environment variable, then the config file, then the
//! built-in default.
//!
//! | Variable                      | Flag               |
//! |-------------------------------|--------------------|
//! | `DEVICE_RELAY_CONFIG`         | `--config`         |
//! | `DEVICE_RELAY_DEVICE_BIND`    | `--device-bind`    |
//! | `DEVICE_RELAY_DEVICE_PORT`    | `--device-port`    |
//! | `DEVICE_RELAY_WS_BIND`        | `--ws-bind`        |
//! | `DEVICE_RELAY_WS_PORT`        | `--ws-port`        |
//! | `DEVICE_RELAY_READ_TIMEOUT`   | `--read-timeout`   |
//! | `DEVICE_RELAY_ACCEPT_POLL_MS` | `--accept-poll-ms` |
//! | `DEVICE_RELAY_SYSTEM_LABEL`   | `--system-label`   |

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use device_relay::domain::{ConfigFile, RelayConfig};
use device_relay::infrastructure::RelayServer;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// TCP device fleet to WebSocket dashboard relay.
///
/// Every flag is optional; unset flags fall back to the config file and then
/// to the built-in defaults.
#[derive(Debug, Default, Parser)]
#[command(
    name = "device-relay",
    about = "Relays text between TCP field devices and browser dashboards",
    version
)]
struct Cli {
    /// Path to a TOML config file.
    #[arg(long, env = "DEVICE_RELAY_CONFIG")]
    config: Option<PathBuf>,

    /// IP address the device listener binds to.
    #[arg(long, env = "DEVICE_RELAY_DEVICE_BIND")]
    device_bind: Option<String>,

    /// TCP port devices connect to.
    #[arg(long, env = "DEVICE_RELAY_DEVICE_PORT")]
    device_port: Option<u16>,

    /// IP address the WebSocket listener binds to.
    #[arg(long, env = "DEVICE_RELAY_WS_BIND")]
    ws_bind: Option<String>,

    /// TCP port dashboards connect to (ws://host:PORT).
    #[arg(long, env = "DEVICE_RELAY_WS_PORT")]
    ws_port: Option<u16>,

    /// Read and write timeout on device sockets, in seconds.
    #[arg(long, env = "DEVICE_RELAY_READ_TIMEOUT")]
    read_timeout: Option<u64>,

    /// How often the accept loops re-check for shutdown, in milliseconds.
    #[arg(long, env = "DEVICE_RELAY_ACCEPT_POLL_MS")]
    accept_poll_ms: Option<u64>,

    /// Sender label on system notices sent to dashboards.
    #[arg(long, env = "DEVICE_RELAY_SYSTEM_LABEL")]
    system_label: Option<String>,
}

impl Cli {
    /// Merges CLI values over `file` over the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if a bind address is not a valid IP address or the
    /// merged configuration fails validation.
    fn into_relay_config(self, file: Option<ConfigFile>) -> anyhow::Result<RelayConfig> {
        let file = file.unwrap_or_default();
        let defaults = RelayConfig::default();

        let device_bind_addr = resolve_addr(
            "device",
            self.device_bind.or(file.device_bind),
            self.device_port.or(file.device_port),
            defaults.device_bind_addr,
        )?;
        let ws_bind_addr = resolve_addr(
            "WebSocket",
            self.ws_bind.or(file.ws_bind),
            self.ws_port.or(file.ws_port),
            defaults.ws_bind_addr,
        )?;

        let config = RelayConfig {
            device_bind_addr,
            ws_bind_addr,
            read_timeout: self
                .read_timeout
                .or(file.read_timeout_secs)
                .map_or(defaults.read_timeout, Duration::from_secs),
            accept_poll: self
                .accept_poll_ms
                .or(file.accept_poll_ms)
                .map_or(defaults.accept_poll, Duration::from_millis),
            read_buffer_size: file.read_buffer_size.unwrap_or(defaults.read_buffer_size),
            system_label: self
                .system_label
                .or(file.system_label)
                .unwrap_or(defaults.system_label),
        };
        config.validate()?;
        Ok(config)
    }
}

/// Builds a listener address, keeping the default's IP or port for whichever
/// half is unset.
fn resolve_addr(
    what: &str,
    ip: Option<String>,
    port: Option<u16>,
    default: SocketAddr,
) -> anyhow::Result<SocketAddr> {
    let ip = match ip {
        Some(text) => text
            .parse::<IpAddr>()
            .with_context(|| format!("invalid {what} bind address: '{text}'"))?,
        None => default.ip(),
    };
    Ok(SocketAddr::new(ip, port.unwrap_or(default.port())))
}

fn load_config_file(path: &Path) -> anyhow::Result<ConfigFile> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    ConfigFile::parse(&text).with_context(|| format!("failed to load config file {}", path.display()))
}

// ── Entry point ───────────────────────────────────────────────────────────────

/// Program entry point.
///
/// Broadcasting, dashboard sessions and both accept loops share one
/// current-thread runtime; device reads run on their own OS threads.
#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let file = cli.config.as_deref().map(load_config_file).transpose()?;
    let config = cli.into_relay_config(file)?;

    let server = RelayServer::bind(config).await?;
    info!(
        "device relay starting - devices={}, dashboards={}",
        server.device_addr()?,
        server.ws_addr()?
    );

    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C, shutting down");
                running_clone.store(false, Ordering::Relaxed);
            }
            Err(e) => {
                tracing::error!("failed to listen for Ctrl+C signal: {e}");
            }
        }
    });

    server.run(running).await?;

    info!("device relay stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
