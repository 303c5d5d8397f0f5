//! Device TCP acceptor and per-connection receive loops.
//!
//! This module is responsible for:
//!
//! 1. Binding the device listener (a bind failure is fatal at startup).
//! 2. Accepting device connections with a bounded wait, so the loop can
//!    notice the shutdown flag without a connection arriving.
//! 3. Registering each connection and announcing it to dashboards.
//! 4. Running one blocking receive loop per device on its own OS thread.
//! 5. Tearing each connection down exactly once, whatever ended it.
//!
//! # Why OS threads for devices?
//!
//! The device protocol is a plain byte stream read with a timeout.  A
//! dedicated thread per device keeps that loop simple and keeps blocking
//! reads off the single-threaded broadcast runtime.  Fleets are tens of
//! devices, not thousands, so a thread each is affordable.
//!
//! Device threads never touch the hub.  Everything they want dashboards to
//! see goes through the [`RelaySender`].
//!
//! # Read timeout
//!
//! Each device socket has a read timeout.  A timed-out read is not an error:
//! the loop re-checks the connection's liveness flag (the hub may have
//! cleared it after a failed write) and reads again.

use std::io::{self, Read};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use thiserror::Error;
use tokio::net::TcpListener;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use device_relay_core::{connection_key, DeviceConnection, DeviceLink, DeviceRegistry, RelayEvent};

use crate::application::{classify_payload, decode_payload, PayloadAction};
use crate::infrastructure::relay::RelaySender;

/// Error type for the device acceptor.
#[derive(Debug, Error)]
pub enum AcceptorError {
    /// The listener could not be bound.
    #[error("failed to bind device listener on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
}

/// Everything a device handler needs, shared by all handlers.
#[derive(Clone)]
pub struct DeviceContext {
    pub registry: Arc<DeviceRegistry>,
    pub relay: RelaySender,
    pub read_timeout: Duration,
    pub read_buffer_size: usize,
}

impl DeviceContext {
    /// Announces a registry change: a notice followed by the new device list.
    fn announce(&self, notice: RelayEvent) {
        self.relay.enqueue(notice);
        self.relay.enqueue(RelayEvent::registry(self.registry.snapshot()));
    }
}

// ── Socket link ───────────────────────────────────────────────────────────────

/// [`DeviceLink`] over a cloned handle of the device's socket.
///
/// The handler thread reads from the original handle; writes routed from
/// dashboards go through this clone.  Shutting the clone down also wakes the
/// reader, since both handles refer to the same socket.
pub struct TcpDeviceLink {
    stream: TcpStream,
}

impl TcpDeviceLink {
    pub fn new(stream: TcpStream) -> Self {
        Self { stream }
    }
}

impl DeviceLink for TcpDeviceLink {
    fn send(&self, bytes: &[u8]) -> io::Result<()> {
        use std::io::Write;
        // `Write` is implemented for `&TcpStream`, so no lock is needed.
        (&self.stream).write_all(bytes)?;
        (&self.stream).flush()
    }

    fn close(&self) {
        // Already-closed sockets report NotConnected; that is fine.
        if let Err(e) = self.stream.shutdown(Shutdown::Both) {
            debug!("device socket shutdown: {e}");
        }
    }
}

// ── Acceptor ──────────────────────────────────────────────────────────────────

/// The bound device listener.
pub struct DeviceAcceptor {
    listener: TcpListener,
    accept_poll: Duration,
}

impl DeviceAcceptor {
    /// Binds the device listener.
    ///
    /// # Errors
    ///
    /// Returns [`AcceptorError::Bind`] if the port is unavailable.  There is
    /// no retry; the caller treats this as fatal.
    pub async fn bind(addr: SocketAddr, accept_poll: Duration) -> Result<Self, AcceptorError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| AcceptorError::Bind { addr, source })?;
        Ok(Self {
            listener,
            accept_poll,
        })
    }

    /// The address actually bound (useful when binding port 0).
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts device connections until `running` is cleared.
    pub async fn run(self, ctx: DeviceContext, running: Arc<AtomicBool>) -> anyhow::Result<()> {
        info!("device listener on {}", self.local_addr()?);

        while running.load(Ordering::Relaxed) {
            match timeout(self.accept_poll, self.listener.accept()).await {
                Ok(Ok((stream, peer))) => {
                    let std_stream = match stream.into_std() {
                        Ok(s) => s,
                        Err(e) => {
                            warn!("device {peer}: could not take socket: {e}");
                            continue;
                        }
                    };
                    accept_device(std_stream, peer, &ctx);
                }
                Ok(Err(e)) => {
                    // Transient accept error (e.g., too many open files).
                    error!("device accept error: {e}");
                }
                Err(_) => {
                    // No connection within the poll interval; re-check `running`.
                }
            }
        }

        info!("device acceptor stopped");
        Ok(())
    }
}

/// Prepares a blocking socket for its handler thread.
///
/// Returns the reader handle and the write/close link.
fn prepare_socket(stream: TcpStream, read_timeout: Duration) -> io::Result<(TcpStream, TcpDeviceLink)> {
    // Tokio hands sockets over in non-blocking mode.
    stream.set_nonblocking(false)?;
    stream.set_read_timeout(Some(read_timeout))?;
    stream.set_write_timeout(Some(read_timeout))?;
    let writer = stream.try_clone()?;
    Ok((stream, TcpDeviceLink::new(writer)))
}

/// Registers one accepted connection and starts its receive thread.
///
/// Failures here are contained: the socket is dropped and, if it had been
/// registered, torn down like any other disconnect.
pub fn accept_device(stream: TcpStream, peer: SocketAddr, ctx: &DeviceContext) {
    let key = connection_key(peer);

    let (reader, link) = match prepare_socket(stream, ctx.read_timeout) {
        Ok(pair) => pair,
        Err(e) => {
            warn!("device {key}: socket setup failed: {e}");
            return;
        }
    };

    let conn = Arc::new(DeviceConnection::new(key.clone(), Box::new(link)));
    let teardown = register_connection(conn, ctx);
    let spawned = std::thread::Builder::new()
        .name(format!("device-{key}"))
        .spawn(move || receive_loop(reader, teardown));

    // On spawn failure the closure (and its Teardown) is dropped, which
    // performs the teardown.
    if let Err(e) = spawned {
        error!("device {key}: failed to spawn handler thread: {e}");
    }
}

/// Inserts `conn` into the registry, announces it, and returns the guard that
/// will tear it down.
///
/// A connection already registered under the same key (same address and
/// port as a socket that never closed cleanly) is marked dead and closed.
/// Its handler then exits without touching the new entry.
pub fn register_connection(conn: Arc<DeviceConnection>, ctx: &DeviceContext) -> Teardown {
    let key = conn.key().to_string();
    if let Some(stale) = ctx.registry.insert(Arc::clone(&conn)) {
        warn!("device {key}: replacing half-open connection");
        stale.mark_dead();
        stale.close();
    }
    info!("new device connection: {key}");
    ctx.announce(RelayEvent::device_connected(&key));
    Teardown::new(conn, ctx.clone())
}

// ── Receive loop ──────────────────────────────────────────────────────────────

/// Per-connection teardown.  Runs exactly once, when dropped, regardless of
/// how the receive loop ended (clean close, I/O error, or a panic).
///
/// Removal is scoped to this connection: if a newer connection has taken
/// over the key, the registry entry and the dashboards are left alone.
pub struct Teardown {
    conn: Arc<DeviceConnection>,
    ctx: DeviceContext,
}

impl Teardown {
    pub fn new(conn: Arc<DeviceConnection>, ctx: DeviceContext) -> Self {
        Self { conn, ctx }
    }
}

impl Drop for Teardown {
    fn drop(&mut self) {
        let key = self.conn.key().to_string();
        self.conn.mark_dead();
        self.conn.close();
        if self.ctx.registry.remove_connection(&self.conn) {
            info!("device disconnected: {key}");
            self.ctx.announce(RelayEvent::device_disconnected(&key));
        }
    }
}

/// Returns `true` for the errors a timed-out blocking read produces.
///
/// Unix reports `WouldBlock`, Windows reports `TimedOut`.
fn is_timeout_error(e: &io::Error) -> bool {
    matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
}

/// Reads payloads until the peer closes, the socket fails, or the connection
/// is marked dead or displaced elsewhere.  Dropping `teardown` on return
/// cleans up.
pub fn receive_loop<R: Read>(mut reader: R, teardown: Teardown) {
    let Teardown { conn, ctx } = &teardown;
    let key = conn.key();
    let mut buf = vec![0u8; ctx.read_buffer_size];

    while conn.is_alive() {
        let n = match reader.read(&mut buf) {
            Ok(0) => {
                debug!("device {key}: peer closed");
                break;
            }
            Ok(n) => n,
            Err(e) if is_timeout_error(&e) => continue,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                warn!("device {key}: read failed: {e}");
                break;
            }
        };

        // Registry reads are scoped to this connection so a displaced
        // handler never reads or renames the entry that replaced it.
        let Some(device) = ctx.registry.info_for(conn) else {
            debug!("device {key}: no longer registered");
            break;
        };

        let text = decode_payload(&buf[..n]);
        match classify_payload(&text, device.serial.is_some()) {
            PayloadAction::Identify(handshake) if ctx.registry.identify_connection(conn, &handshake) => {
                info!(
                    "device {} identified - Wifi: {}, SN: {}",
                    device.key, handshake.wifi_name, handshake.serial
                );
                ctx.announce(RelayEvent::device_identified(
                    &handshake.wifi_name,
                    &handshake.serial,
                ));
            }
            _ => {
                debug!("device {}: {text}", device.display_name);
                ctx.relay.enqueue(RelayEvent::device(device.display_name, text));
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
