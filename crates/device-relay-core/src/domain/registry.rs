//! DeviceRegistry: the authoritative live mapping from connection key to
//! device state.
//!
//! Every device handler thread and the hub's routing path consult the same
//! registry, so every operation takes one coarse `Mutex` for its whole
//! duration.  At the fleet sizes the relay serves (tens of devices) a single
//! lock is simpler and fast enough; no sharding is needed.
//!
//! # Ordering
//!
//! Entries are kept in insertion order so that [`DeviceRegistry::snapshot`]
//! lists devices in the order they connected.  A `Vec` with linear lookups
//! gives that for free and is cheaper than hashing at this size.
//!
//! # Display-name ambiguity
//!
//! Display names are unique while devices are unidentified (they equal the
//! address key).  Two identified devices may report the same serial, and a
//! reconnecting device can briefly coexist with its stale entry.
//! [`DeviceRegistry::find_by_display_name`] returns the first *live* match in
//! insertion order; this ambiguity is accepted rather than resolved.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};

use super::device::DeviceConnection;
use super::handshake::Handshake;

/// One registry entry: the shared connection plus its mutable identity.
#[derive(Debug)]
struct DeviceRecord {
    connection: Arc<DeviceConnection>,
    wifi_name: Option<String>,
    serial: Option<String>,
    display_name: String,
}

impl DeviceRecord {
    fn new(connection: Arc<DeviceConnection>) -> Self {
        let display_name = connection.key().to_string();
        Self {
            connection,
            wifi_name: None,
            serial: None,
            display_name,
        }
    }

    /// `true` if this entry holds exactly `connection` (not merely its key).
    fn holds(&self, connection: &DeviceConnection) -> bool {
        std::ptr::eq(Arc::as_ptr(&self.connection), connection)
    }

    /// First handshake wins; returns `false` if already identified.
    fn commit_identity(&mut self, handshake: &Handshake) -> bool {
        if self.serial.is_some() {
            return false;
        }
        self.wifi_name = Some(handshake.wifi_name.clone());
        self.serial = Some(handshake.serial.clone());
        self.display_name = handshake.serial.clone();
        true
    }

    fn info(&self) -> DeviceInfo {
        DeviceInfo {
            key: self.connection.key().to_string(),
            wifi_name: self.wifi_name.clone(),
            serial: self.serial.clone(),
            display_name: self.display_name.clone(),
            alive: self.connection.is_alive(),
        }
    }
}

/// A point-in-time copy of one registry entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub key: String,
    pub wifi_name: Option<String>,
    pub serial: Option<String>,
    pub display_name: String,
    pub alive: bool,
}

/// Thread-safe registry of connected devices.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    entries: Mutex<Vec<DeviceRecord>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the registry lock.
    ///
    /// A panic while holding the lock cannot leave the `Vec` structurally
    /// invalid, so a poisoned lock is recovered instead of propagated.
    fn lock(&self) -> MutexGuard<'_, Vec<DeviceRecord>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a new connection under its own key.
    ///
    /// If the key is already present the old entry is replaced in place (its
    /// position in the snapshot order is kept) and returned.  Fresh keys are
    /// the norm; a collision is logged but never fatal.  The caller owns the
    /// displaced connection and is expected to shut it down.
    pub fn insert(&self, connection: Arc<DeviceConnection>) -> Option<Arc<DeviceConnection>> {
        let mut entries = self.lock();
        let record = DeviceRecord::new(connection);
        match entries
            .iter_mut()
            .find(|r| r.connection.key() == record.connection.key())
        {
            Some(existing) => {
                warn!(
                    "registry: key {} already present; overwriting stale entry",
                    record.connection.key()
                );
                let old = std::mem::replace(existing, record);
                Some(old.connection)
            }
            None => {
                debug!("registry: inserted {}", record.connection.key());
                entries.push(record);
                None
            }
        }
    }

    /// Removes the entry for `key`.  No-op if absent.
    pub fn remove(&self, key: &str) -> Option<Arc<DeviceConnection>> {
        let mut entries = self.lock();
        let index = entries.iter().position(|r| r.connection.key() == key)?;
        let record = entries.remove(index);
        debug!("registry: removed {key}");
        Some(record.connection)
    }

    /// Removes the entry only if it still holds `connection`.
    ///
    /// A handler whose entry was displaced by a newer connection under the
    /// same key must not evict the newcomer; in that case this returns
    /// `false` and leaves the registry untouched.
    pub fn remove_connection(&self, connection: &DeviceConnection) -> bool {
        let mut entries = self.lock();
        let Some(index) = entries.iter().position(|r| r.holds(connection)) else {
            return false;
        };
        entries.remove(index);
        debug!("registry: removed {}", connection.key());
        true
    }

    /// Sets the display name for `key`.
    ///
    /// Returns `false` if the key is not registered.
    pub fn update_display_name(&self, key: &str, name: impl Into<String>) -> bool {
        let mut entries = self.lock();
        match entries.iter_mut().find(|r| r.connection.key() == key) {
            Some(record) => {
                record.display_name = name.into();
                true
            }
            None => false,
        }
    }

    /// Commits a handshake for `key`: WiFi name, serial and display name are
    /// set together under one lock acquisition.
    ///
    /// First handshake wins.  Returns `false` if the key is absent or the
    /// device has already been identified; the entry is left untouched.
    pub fn identify(&self, key: &str, handshake: &Handshake) -> bool {
        let mut entries = self.lock();
        entries
            .iter_mut()
            .find(|r| r.connection.key() == key)
            .is_some_and(|record| record.commit_identity(handshake))
    }

    /// Like [`identify`](Self::identify), but only if the entry still holds
    /// `connection`.
    pub fn identify_connection(&self, connection: &DeviceConnection, handshake: &Handshake) -> bool {
        let mut entries = self.lock();
        entries
            .iter_mut()
            .find(|r| r.holds(connection))
            .is_some_and(|record| record.commit_identity(handshake))
    }

    /// Returns `true` if `key` is registered and already carries a serial.
    pub fn is_identified(&self, key: &str) -> bool {
        self.lock()
            .iter()
            .any(|r| r.connection.key() == key && r.serial.is_some())
    }

    /// Display name for `key`, if registered.
    pub fn display_name(&self, key: &str) -> Option<String> {
        self.lock()
            .iter()
            .find(|r| r.connection.key() == key)
            .map(|r| r.display_name.clone())
    }

    /// Display names of all entries in insertion order.
    pub fn snapshot(&self) -> Vec<String> {
        self.lock().iter().map(|r| r.display_name.clone()).collect()
    }

    /// First live connection whose display name equals `name`.
    pub fn find_by_display_name(&self, name: &str) -> Option<Arc<DeviceConnection>> {
        self.lock()
            .iter()
            .find(|r| r.display_name == name && r.connection.is_alive())
            .map(|r| Arc::clone(&r.connection))
    }

    /// A copy of the entry holding `connection`.
    ///
    /// `None` once the connection has been removed or displaced by a newer
    /// connection under the same key.
    pub fn info_for(&self, connection: &DeviceConnection) -> Option<DeviceInfo> {
        self.lock()
            .iter()
            .find(|r| r.holds(connection))
            .map(DeviceRecord::info)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
