//! Domain entities for the device relay.
//!
//! This module contains pure business logic with no infrastructure
//! dependencies.  The registry uses a `std::sync::Mutex` because it is shared
//! between blocking device threads and the async broadcast domain; nothing in
//! here performs I/O except through the [`device::DeviceLink`] trait.

/// A single device connection and the socket seam it writes through.
pub mod device;

/// Pure extractor for the WiFi/serial identification payload.
pub mod handshake;

/// The authoritative live mapping from connection key to device state.
pub mod registry;
