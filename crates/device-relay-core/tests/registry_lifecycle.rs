//! Integration tests for the device registry lifecycle.
//!
//! These tests drive the registry through its public API the same way a
//! device handler does: insert on accept, identify on the first handshake
//! payload, remove on teardown.  They verify the registry's externally visible
//! contract: snapshot contents, first-wins identification, and routing
//! lookups after a disconnect.

use std::io;
use std::sync::{Arc, Mutex};
use std::thread;

use device_relay_core::{parse_handshake, DeviceConnection, DeviceLink, DeviceRegistry};

/// Records everything written to it.
#[derive(Default)]
struct RecordingLink {
    written: Arc<Mutex<Vec<u8>>>,
}

impl DeviceLink for RecordingLink {
    fn send(&self, bytes: &[u8]) -> io::Result<()> {
        self.written.lock().unwrap().extend_from_slice(bytes);
        Ok(())
    }
    fn close(&self) {}
}

fn connect(registry: &DeviceRegistry, key: &str) -> (Arc<DeviceConnection>, Arc<Mutex<Vec<u8>>>) {
    let link = RecordingLink::default();
    let written = Arc::clone(&link.written);
    let conn = Arc::new(DeviceConnection::new(key, Box::new(link)));
    registry.insert(Arc::clone(&conn));
    (conn, written)
}

#[test]
fn test_handshake_payload_identifies_device_exactly_once() {
    // Arrange
    let registry = DeviceRegistry::new();
    connect(&registry, "192.168.1.50,40001");
    let payload = "Wifi : HomeNet, SN: ABC123,";

    // Act: first payload identifies, replay is rejected
    let hs = parse_handshake(payload).expect("payload is a handshake");
    let first = registry.identify("192.168.1.50,40001", &hs);
    let replay = registry.identify("192.168.1.50,40001", &hs);

    // Assert
    assert!(first);
    assert!(!replay);
    assert_eq!(registry.snapshot(), vec!["ABC123"]);
}

#[test]
fn test_routed_write_reaches_identified_device() {
    let registry = DeviceRegistry::new();
    let (_conn, written) = connect(&registry, "192.168.1.50,40001");
    registry.identify(
        "192.168.1.50,40001",
        &parse_handshake("Wifi : HomeNet, SN: ABC123,").unwrap(),
    );

    let target = registry.find_by_display_name("ABC123").expect("live target");
    target.send(b"ping").expect("write succeeds");

    assert_eq!(written.lock().unwrap().as_slice(), b"ping");
}

#[test]
fn test_removed_device_is_not_routable() {
    let registry = DeviceRegistry::new();
    let (conn, _written) = connect(&registry, "k1");
    registry.identify("k1", &parse_handshake("Wifi : W, SN: S1,").unwrap());

    conn.mark_dead();
    registry.remove("k1");

    assert!(registry.find_by_display_name("S1").is_none());
    assert!(registry.is_empty());
}

#[test]
fn test_reconnecting_device_coexists_with_stale_entry() {
    // A device reconnects before its old entry is torn down: both entries
    // carry the same serial and the stale one is not evicted.
    let registry = DeviceRegistry::new();
    let (old, _) = connect(&registry, "10.0.0.9,50000");
    registry.identify("10.0.0.9,50000", &parse_handshake("Wifi : W, SN: S1,").unwrap());
    let (new, _) = connect(&registry, "10.0.0.9,50001");
    registry.identify("10.0.0.9,50001", &parse_handshake("Wifi : W, SN: S1,").unwrap());

    assert_eq!(registry.snapshot(), vec!["S1", "S1"]);

    // Once the old connection is dead, routing picks the new one.
    old.mark_dead();
    let found = registry.find_by_display_name("S1").unwrap();
    assert!(Arc::ptr_eq(&found, &new));
}

#[test]
fn test_snapshot_size_tracks_live_connections_under_concurrency() {
    let registry = Arc::new(DeviceRegistry::new());

    let handles: Vec<_> = (0..24)
        .map(|i| {
            let registry = Arc::clone(&registry);
            thread::spawn(move || {
                let key = format!("172.16.0.{i},6000");
                let (conn, _) = connect(&registry, &key);
                if i % 3 == 0 {
                    conn.mark_dead();
                    registry.remove(&key);
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(registry.snapshot().len(), 16);
}
