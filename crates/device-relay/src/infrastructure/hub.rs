//! WebSocket hub: the live set of dashboard sessions.
//!
//! The hub owns the write half of every connected dashboard and is the only
//! place frames are sent to browsers.  It has two jobs:
//!
//! 1. **Broadcast** – render each relay event once and write it to every
//!    session in turn.  A session whose write fails is logged and dropped
//!    after the pass; it never stops delivery to the others.
//! 2. **Route** – turn a dashboard's `send` command into a write on the
//!    target device's socket, found through the [`DeviceRegistry`].
//!
//! # Concurrency
//!
//! All hub methods run on the single-threaded broadcast runtime.  The session
//! set sits behind a `tokio::sync::Mutex` that is held for the whole of a
//! broadcast, so the set is never mutated mid-iteration and broadcasts never
//! interleave.  Each write is awaited before moving to the next session: a
//! slow dashboard delays the others but cannot corrupt their stream.
//!
//! Device writes are blocking socket calls, so they run on Tokio's blocking
//! pool; the device socket's write timeout bounds how long that takes.
//!
//! # Asymmetry
//!
//! Device connects and disconnects are announced to every dashboard.  A
//! dashboard leaving is not announced; the session is removed silently.

use std::fmt::Display;
use std::sync::Arc;

use futures_util::{Sink, SinkExt};
use thiserror::Error;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use device_relay_core::{DeviceConnection, DeviceRegistry, RelayEvent};

use crate::application::{encode_frame, render_event};
use crate::domain::messages::BrowserCommand;

/// Identifier for a dashboard session (log correlation only).
pub type SessionId = Uuid;

/// Errors surfaced to the per-session task.
#[derive(Debug, Error)]
pub enum HubError {
    /// Writing a frame to the session failed; the session has been dropped.
    #[error("session {session}: send failed: {reason}")]
    Send { session: SessionId, reason: String },

    /// A frame could not be serialized.
    #[error("frame encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

struct Session<S> {
    id: SessionId,
    sink: S,
}

/// The set of live dashboard sessions plus the routing path back to devices.
pub struct Hub<S> {
    registry: Arc<DeviceRegistry>,
    system_label: String,
    sessions: Mutex<Vec<Session<S>>>,
}

impl<S> Hub<S>
where
    S: Sink<WsMessage> + Unpin + Send,
    S::Error: Display,
{
    pub fn new(registry: Arc<DeviceRegistry>, system_label: impl Into<String>) -> Self {
        Self {
            registry,
            system_label: system_label.into(),
            sessions: Mutex::new(Vec::new()),
        }
    }

    /// Adds a session and pushes the current device list to it.
    ///
    /// The snapshot is taken while the session lock is held, so the newcomer
    /// never sees a device list older than an update it then misses.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Send`] if the initial push fails; the session is
    /// not added in that case.
    pub async fn join(&self, id: SessionId, mut sink: S) -> Result<(), HubError> {
        let mut sessions = self.sessions.lock().await;
        let frame = self.registry_frame()?;
        sink.send(WsMessage::Text(frame))
            .await
            .map_err(|e| HubError::Send {
                session: id,
                reason: e.to_string(),
            })?;
        sessions.push(Session { id, sink });
        info!("dashboard {id} joined ({} active)", sessions.len());
        Ok(())
    }

    /// Removes a session silently.  No-op if it was already dropped.
    pub async fn leave(&self, id: SessionId) {
        let mut sessions = self.sessions.lock().await;
        sessions.retain(|s| s.id != id);
        info!("dashboard {id} left ({} active)", sessions.len());
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// Sends `event` to every session.
    pub async fn broadcast(&self, event: &RelayEvent) {
        let frame = match encode_frame(&render_event(event, &self.system_label)) {
            Ok(frame) => frame,
            Err(e) => {
                error!("dropping {}: {e}", event.kind());
                return;
            }
        };

        let mut sessions = self.sessions.lock().await;
        let mut failed = Vec::new();
        for session in sessions.iter_mut() {
            if let Err(e) = session.sink.send(WsMessage::Text(frame.clone())).await {
                warn!("dashboard {}: broadcast failed: {e}", session.id);
                failed.push(session.id);
            }
        }
        if !failed.is_empty() {
            sessions.retain(|s| !failed.contains(&s.id));
            debug!("dropped {} failed dashboard(s)", failed.len());
        }
    }

    /// Executes one command from dashboard `id`.
    ///
    /// # Errors
    ///
    /// Only an `init` reply that cannot be written to the requesting session
    /// is an error; routing outcomes are reported to dashboards instead.
    pub async fn handle_command(&self, id: SessionId, command: BrowserCommand) -> Result<(), HubError> {
        debug!("dashboard {id}: {}", command.type_name());
        match command {
            BrowserCommand::Init => self.send_snapshot(id).await,
            BrowserCommand::Send { addr, message } => {
                self.route(&addr, message).await;
                Ok(())
            }
        }
    }

    /// Replies to one session with the current device list.
    async fn send_snapshot(&self, id: SessionId) -> Result<(), HubError> {
        let frame = self.registry_frame()?;
        let mut sessions = self.sessions.lock().await;
        let Some(index) = sessions.iter().position(|s| s.id == id) else {
            return Ok(());
        };
        if let Err(e) = sessions[index].sink.send(WsMessage::Text(frame)).await {
            sessions.remove(index);
            return Err(HubError::Send {
                session: id,
                reason: e.to_string(),
            });
        }
        Ok(())
    }

    /// Writes `message` to the device displayed as `target`.
    async fn route(&self, target: &str, message: String) {
        let Some(device) = self.registry.find_by_display_name(target) else {
            warn!("send to [{target}]: no live device with that name");
            self.broadcast(&RelayEvent::unknown_target(target)).await;
            return;
        };

        let bytes = message.clone().into_bytes();
        let writer = Arc::clone(&device);
        let outcome = tokio::task::spawn_blocking(move || writer.send(&bytes)).await;

        match outcome {
            Ok(Ok(())) => {
                info!("sent {} byte(s) to [{target}]", message.len());
                debug!("payload to [{target}]: {message}");
                self.broadcast(&RelayEvent::delivered(target, &message)).await;
            }
            Ok(Err(e)) => {
                warn!("send to [{target}] failed: {e}");
                self.fail_device(&device, target, &message).await;
            }
            Err(e) => {
                error!("send to [{target}] aborted: {e}");
                self.fail_device(&device, target, &message).await;
            }
        }
    }

    /// Marks a device dead after a failed write and tells every dashboard.
    ///
    /// The device's own receive loop notices the dead flag (or the broken
    /// socket) and performs the registry teardown.
    async fn fail_device(&self, device: &DeviceConnection, target: &str, message: &str) {
        device.mark_dead();
        self.broadcast(&RelayEvent::delivery_failed(target, message)).await;
        self.broadcast(&RelayEvent::registry(self.registry.snapshot())).await;
    }

    fn registry_frame(&self) -> Result<String, HubError> {
        let event = RelayEvent::registry(self.registry.snapshot());
        Ok(encode_frame(&render_event(&event, &self.system_label))?)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex as StdMutex;
    use std::task::{Context, Poll};

    use device_relay_core::{DeviceLink, Handshake};
    use mockall::mock;
    use serde_json::{json, Value};

    mock! {
        Link {}
        impl DeviceLink for Link {
            fn send(&self, bytes: &[u8]) -> io::Result<()>;
            fn close(&self);
        }
    }

    /// Sink that records text frames and can be told to fail.
    #[derive(Clone, Default)]
    struct RecordingSink {
        frames: Arc<StdMutex<Vec<String>>>,
        fail: Arc<AtomicBool>,
    }

    impl RecordingSink {
        fn frames(&self) -> Vec<Value> {
            self.frames
                .lock()
                .unwrap()
                .iter()
                .map(|f| serde_json::from_str(f).unwrap())
                .collect()
        }
    }

    impl Sink<WsMessage> for RecordingSink {
        type Error = io::Error;

        fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn start_send(self: Pin<&mut Self>, item: WsMessage) -> Result<(), Self::Error> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(io::Error::from(io::ErrorKind::BrokenPipe));
            }
            if let WsMessage::Text(text) = item {
                self.frames.lock().unwrap().push(text);
            }
            Ok(())
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }
    }

    fn make_hub() -> (Arc<DeviceRegistry>, Hub<RecordingSink>) {
        let registry = Arc::new(DeviceRegistry::new());
        let hub = Hub::new(Arc::clone(&registry), "system");
        (registry, hub)
    }

    fn add_device(registry: &DeviceRegistry, key: &str, serial: &str, link: MockLink) -> Arc<DeviceConnection> {
        let conn = Arc::new(DeviceConnection::new(key, Box::new(link)));
        registry.insert(Arc::clone(&conn));
        registry.identify(
            key,
            &Handshake {
                wifi_name: "HomeNet".to_string(),
                serial: serial.to_string(),
            },
        );
        conn
    }

    fn data_of(frame: &Value) -> &str {
        frame["data"].as_str().unwrap_or_default()
    }

    #[tokio::test]
    async fn test_join_pushes_registry_snapshot_first() {
        // Arrange
        let (registry, hub) = make_hub();
        add_device(&registry, "k1", "ABC123", MockLink::new());
        let sink = RecordingSink::default();

        // Act
        hub.join(Uuid::new_v4(), sink.clone()).await.unwrap();

        // Assert
        assert_eq!(
            sink.frames(),
            vec![json!({"type": "client_update", "clients": ["ABC123"]})]
        );
        assert_eq!(hub.session_count().await, 1);
    }

    #[tokio::test]
    async fn test_join_failure_does_not_add_session() {
        let (_registry, hub) = make_hub();
        let sink = RecordingSink::default();
        sink.fail.store(true, Ordering::SeqCst);

        let result = hub.join(Uuid::new_v4(), sink).await;

        assert!(matches!(result, Err(HubError::Send { .. })));
        assert_eq!(hub.session_count().await, 0);
    }

    #[tokio::test]
    async fn test_broadcast_reaches_every_session() {
        let (_registry, hub) = make_hub();
        let a = RecordingSink::default();
        let b = RecordingSink::default();
        hub.join(Uuid::new_v4(), a.clone()).await.unwrap();
        hub.join(Uuid::new_v4(), b.clone()).await.unwrap();

        hub.broadcast(&RelayEvent::device("ABC123", "temp=21")).await;

        for sink in [a, b] {
            let frames = sink.frames();
            assert_eq!(frames.len(), 2);
            assert_eq!(frames[1]["type"], "message");
            assert_eq!(frames[1]["addr"], "ABC123");
            assert!(data_of(&frames[1]).ends_with("[ABC123]: temp=21"));
        }
    }

    #[tokio::test]
    async fn test_failing_session_is_dropped_without_blocking_others() {
        // Arrange: the first of three sessions starts failing after joining
        let (_registry, hub) = make_hub();
        let sinks: Vec<RecordingSink> = (0..3).map(|_| RecordingSink::default()).collect();
        for sink in &sinks {
            hub.join(Uuid::new_v4(), sink.clone()).await.unwrap();
        }
        sinks[0].fail.store(true, Ordering::SeqCst);

        // Act
        hub.broadcast(&RelayEvent::system("hello")).await;

        // Assert
        assert_eq!(hub.session_count().await, 2);
        assert_eq!(sinks[1].frames().len(), 2);
        assert_eq!(sinks[2].frames().len(), 2);
    }

    #[tokio::test]
    async fn test_system_messages_use_configured_label() {
        let (_registry, hub) = make_hub();
        let sink = RecordingSink::default();
        hub.join(Uuid::new_v4(), sink.clone()).await.unwrap();

        hub.broadcast(&RelayEvent::device_connected("10.0.0.1,5000")).await;

        let frames = sink.frames();
        assert_eq!(frames[1]["addr"], "system");
        assert!(data_of(&frames[1]).ends_with("new connection: 10.0.0.1,5000"));
    }

    #[tokio::test]
    async fn test_leave_removes_session_silently() {
        let (_registry, hub) = make_hub();
        let leaving = RecordingSink::default();
        let staying = RecordingSink::default();
        let id = Uuid::new_v4();
        hub.join(id, leaving.clone()).await.unwrap();
        hub.join(Uuid::new_v4(), staying.clone()).await.unwrap();

        hub.leave(id).await;

        assert_eq!(hub.session_count().await, 1);
        // No departure notice is broadcast.
        assert_eq!(staying.frames().len(), 1);
    }

    #[tokio::test]
    async fn test_init_replies_only_to_requester() {
        let (registry, hub) = make_hub();
        let asker = RecordingSink::default();
        let other = RecordingSink::default();
        let asker_id = Uuid::new_v4();
        hub.join(asker_id, asker.clone()).await.unwrap();
        hub.join(Uuid::new_v4(), other.clone()).await.unwrap();
        add_device(&registry, "k1", "NEW1", MockLink::new());

        hub.handle_command(asker_id, BrowserCommand::Init).await.unwrap();

        assert_eq!(
            asker.frames().last().unwrap(),
            &json!({"type": "client_update", "clients": ["NEW1"]})
        );
        assert_eq!(other.frames().len(), 1);
    }

    #[tokio::test]
    async fn test_send_to_live_device_writes_bytes_and_confirms() {
        // Arrange
        let (registry, hub) = make_hub();
        let mut link = MockLink::new();
        link.expect_send()
            .withf(|bytes| bytes == b"ping")
            .times(1)
            .returning(|_| Ok(()));
        add_device(&registry, "k1", "ABC123", link);
        let sink = RecordingSink::default();
        let id = Uuid::new_v4();
        hub.join(id, sink.clone()).await.unwrap();

        // Act
        hub.handle_command(
            id,
            BrowserCommand::Send {
                addr: "ABC123".to_string(),
                message: "ping".to_string(),
            },
        )
        .await
        .unwrap();

        // Assert
        let frames = sink.frames();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1]["addr"], "system");
        assert!(data_of(&frames[1]).ends_with("sent to [ABC123]: ping"));
    }

    #[tokio::test]
    async fn test_send_to_absent_device_reports_failure_without_write() {
        let (registry, hub) = make_hub();
        let mut link = MockLink::new();
        link.expect_send().times(0);
        add_device(&registry, "k1", "OTHER", link);
        let sink = RecordingSink::default();
        let id = Uuid::new_v4();
        hub.join(id, sink.clone()).await.unwrap();

        hub.handle_command(
            id,
            BrowserCommand::Send {
                addr: "ABC123".to_string(),
                message: "ping".to_string(),
            },
        )
        .await
        .unwrap();

        let frames = sink.frames();
        assert_eq!(frames.len(), 2);
        assert!(data_of(&frames[1]).contains("target: [ABC123]"));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_device_write_marks_dead_and_broadcasts_update() {
        // Arrange
        let (registry, hub) = make_hub();
        let mut link = MockLink::new();
        link.expect_send()
            .returning(|_| Err(io::Error::from(io::ErrorKind::BrokenPipe)));
        let device = add_device(&registry, "k1", "ABC123", link);
        let sink = RecordingSink::default();
        let id = Uuid::new_v4();
        hub.join(id, sink.clone()).await.unwrap();

        // Act
        hub.handle_command(
            id,
            BrowserCommand::Send {
                addr: "ABC123".to_string(),
                message: "ping".to_string(),
            },
        )
        .await
        .unwrap();

        // Assert: failure notice, then a device list, and the device is dead
        let frames = sink.frames();
        assert_eq!(frames.len(), 3);
        assert!(data_of(&frames[1]).contains("send failed"));
        assert_eq!(frames[2]["type"], "client_update");
        assert!(!device.is_alive());
        assert!(registry.find_by_display_name("ABC123").is_none());
    }
}
