//! The message relay: the only hand-off from device threads into the
//! broadcast domain.
//!
//! Device handler threads are plain OS threads doing blocking reads; the hub
//! lives on the single-threaded Tokio runtime.  Device threads never call hub
//! methods directly.  Instead they [`enqueue`](RelaySender::enqueue) a
//! [`RelayEvent`] and exactly one consumer task drains the channel in arrival
//! order, broadcasting each event before taking the next.
//!
//! # Why unbounded?
//!
//! A slow dashboard must never stall device I/O.  With tens of devices
//! producing short text lines, queue growth under a slow consumer is a
//! latency concern, not a memory one, so `enqueue` never waits.
//!
//! # Shutdown
//!
//! [`RelaySender::shutdown`] enqueues a sentinel.  When the consumer reads it
//! it stops draining and exits, even if events are still queued behind it.
//! The consumer also exits once every sender has been dropped.

use std::sync::Arc;

use futures_util::Sink;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, info};

use device_relay_core::RelayEvent;

use crate::infrastructure::hub::Hub;

/// What travels through the channel: an event, or the shutdown sentinel.
#[derive(Debug)]
enum RelayItem {
    Event(RelayEvent),
    Shutdown,
}

/// Producer handle.  Cheap to clone; one per device thread.
#[derive(Debug, Clone)]
pub struct RelaySender {
    tx: mpsc::UnboundedSender<RelayItem>,
}

/// Consumer handle.  There is exactly one.
#[derive(Debug)]
pub struct RelayReceiver {
    rx: mpsc::UnboundedReceiver<RelayItem>,
}

/// Creates a connected sender/receiver pair.
pub fn relay_channel() -> (RelaySender, RelayReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (RelaySender { tx }, RelayReceiver { rx })
}

impl RelaySender {
    /// Queues `event` for broadcast.  Never blocks.
    ///
    /// If the consumer is already gone (process teardown) the event is
    /// dropped with a debug log.
    pub fn enqueue(&self, event: RelayEvent) {
        if let Err(mpsc::error::SendError(item)) = self.tx.send(RelayItem::Event(event)) {
            debug!("relay consumer gone; dropping {item:?}");
        }
    }

    /// Queues the shutdown sentinel.
    pub fn shutdown(&self) {
        let _ = self.tx.send(RelayItem::Shutdown);
    }
}

impl RelayReceiver {
    /// Waits for the next event.
    ///
    /// Returns `None` on the shutdown sentinel or when every sender is gone.
    pub async fn recv(&mut self) -> Option<RelayEvent> {
        match self.rx.recv().await? {
            RelayItem::Event(event) => Some(event),
            RelayItem::Shutdown => None,
        }
    }
}

/// Drains the relay into `hub`, one broadcast at a time, until shutdown.
pub async fn run_relay_consumer<S>(mut relay: RelayReceiver, hub: Arc<Hub<S>>)
where
    S: Sink<WsMessage> + Unpin + Send,
    S::Error: std::fmt::Display,
{
    info!("relay consumer started");
    while let Some(event) = relay.recv().await {
        debug!("relay: broadcasting {}", event.kind());
        hub.broadcast(&event).await;
    }
    info!("relay consumer stopped");
}

// ── Tests ─────────────────────────────────────────────────────────────────────
