//! A single device connection.
//!
//! # Ownership model
//!
//! The device's socket is read exclusively by its handler thread.  Writes
//! (routed from browsers) and the final close go through a [`DeviceLink`],
//! which the service implements over a cloned socket handle.  The
//! [`DeviceConnection`] wraps that link together with the immutable
//! connection key and the liveness flag, and is shared via `Arc` between the
//! handler thread and the [`DeviceRegistry`](super::registry::DeviceRegistry).
//!
//! # Liveness
//!
//! The liveness flag starts `true` and flips to `false` exactly once.  Either
//! side may flip it: the handler thread when the socket fails or closes, or the
//! hub when a routed write fails.  [`DeviceConnection::mark_dead`] reports which
//! caller performed the transition so that follow-up work happens once.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;

/// Error type for writes routed to a device.
#[derive(Debug, Error)]
pub enum DeviceError {
    /// The connection has already been marked dead.
    #[error("device {0} is no longer connected")]
    NotAlive(String),
    /// The underlying socket write failed.
    #[error("write to device {key} failed: {source}")]
    Write {
        key: String,
        #[source]
        source: io::Error,
    },
}

/// The write/close side of a device socket.
///
/// Implementations must be callable from any thread: the hub writes from the
/// broadcast domain while the handler thread may close concurrently.
pub trait DeviceLink: Send + Sync {
    /// Writes all of `bytes` to the device.
    fn send(&self, bytes: &[u8]) -> io::Result<()>;

    /// Shuts the link down.  Must be idempotent and must not fail loudly when
    /// the peer is already gone.
    fn close(&self);
}

/// Derives the registry key for a remote address: `"<ip>,<port>"`.
///
/// ```rust
/// use device_relay_core::connection_key;
///
/// let addr = "192.168.1.20:50123".parse().unwrap();
/// assert_eq!(connection_key(addr), "192.168.1.20,50123");
/// ```
pub fn connection_key(addr: SocketAddr) -> String {
    format!("{},{}", addr.ip(), addr.port())
}

/// Shared state for one accepted device connection.
pub struct DeviceConnection {
    key: String,
    link: Box<dyn DeviceLink>,
    alive: AtomicBool,
}

impl DeviceConnection {
    /// Creates a live connection identified by `key`.
    pub fn new(key: impl Into<String>, link: Box<dyn DeviceLink>) -> Self {
        Self {
            key: key.into(),
            link,
            alive: AtomicBool::new(true),
        }
    }

    /// The address-derived key assigned at accept time.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Returns `true` until the connection has been marked dead.
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Flips the liveness flag to `false`.
    ///
    /// Returns `true` only for the caller that performed the transition.
    pub fn mark_dead(&self) -> bool {
        self.alive.swap(false, Ordering::AcqRel)
    }

    /// Writes `bytes` to the device if it is still alive.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::NotAlive`] when the connection is already dead
    /// and [`DeviceError::Write`] when the socket write fails.  A failed write
    /// does not flip the liveness flag; that decision belongs to the caller.
    pub fn send(&self, bytes: &[u8]) -> Result<(), DeviceError> {
        if !self.is_alive() {
            return Err(DeviceError::NotAlive(self.key.clone()));
        }
        self.link.send(bytes).map_err(|source| DeviceError::Write {
            key: self.key.clone(),
            source,
        })
    }

    /// Closes the underlying link.  Safe to call more than once.
    pub fn close(&self) {
        self.link.close();
    }
}

impl std::fmt::Debug for DeviceConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceConnection")
            .field("key", &self.key)
            .field("alive", &self.is_alive())
            .finish_non_exhaustive()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
