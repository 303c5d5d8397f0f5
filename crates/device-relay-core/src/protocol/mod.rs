//! Protocol module containing the relay event model.

pub mod event;

pub use event::{RelayEvent, Timestamp};
