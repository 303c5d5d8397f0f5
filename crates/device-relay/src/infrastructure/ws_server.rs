//! Dashboard WebSocket server: accept loop and per-session tasks.
//!
//! This module is responsible for:
//!
//! 1. Binding the dashboard listener.
//! 2. Upgrading each accepted connection to a WebSocket session.
//! 3. Handing the session's write half to the [`Hub`] (which pushes the
//!    current device list before anything else).
//! 4. Reading JSON commands from the browser and dispatching them to the hub.
//! 5. Removing the session from the hub when the browser goes away.
//!
//! Each session runs in its own Tokio task, so a slow handshake never blocks
//! the accept loop.  Shutdown is signalled through the shared `running` flag,
//! polled between accepts.

use std::io;
use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use futures_util::stream::SplitSink;
use futures_util::StreamExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::{
    accept_async,
    tungstenite::{Error as WsError, Message as WsMessage},
    WebSocketStream,
};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::domain::messages::BrowserCommand;
use crate::infrastructure::hub::Hub;

/// Write half of a dashboard WebSocket, as owned by the hub.
pub type WsSink = SplitSink<WebSocketStream<TcpStream>, WsMessage>;

/// The bound dashboard listener.
pub struct WsServer {
    listener: TcpListener,
    accept_poll: Duration,
}

impl WsServer {
    /// Binds the dashboard listener.
    ///
    /// # Errors
    ///
    /// Returns an error if the port is unavailable.
    pub async fn bind(addr: SocketAddr, accept_poll: Duration) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind WebSocket listener on {addr}"))?;
        Ok(Self {
            listener,
            accept_poll,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts dashboard connections until `running` is cleared.
    pub async fn run(self, hub: Arc<Hub<WsSink>>, running: Arc<AtomicBool>) -> anyhow::Result<()> {
        info!("WebSocket listener on {}", self.local_addr()?);

        loop {
            if !running.load(Ordering::Relaxed) {
                info!("shutdown flag set; stopping WebSocket accept loop");
                break;
            }

            match timeout(self.accept_poll, self.listener.accept()).await {
                Ok(Ok((stream, peer_addr))) => {
                    debug!("new dashboard connection from {peer_addr}");
                    let hub = Arc::clone(&hub);
                    tokio::spawn(async move {
                        handle_dashboard_session(stream, peer_addr, hub).await;
                    });
                }
                Ok(Err(e)) => {
                    error!("WebSocket accept error: {e}");
                }
                Err(_) => {}
            }
        }

        Ok(())
    }
}

// ── Per-session handler ───────────────────────────────────────────────────────

async fn handle_dashboard_session(stream: TcpStream, peer_addr: SocketAddr, hub: Arc<Hub<WsSink>>) {
    match run_session(stream, peer_addr, hub).await {
        Ok(()) => debug!("dashboard {peer_addr} closed"),
        Err(e) => warn!("dashboard {peer_addr} closed with error: {e:#}"),
    }
}

/// Runs one dashboard session from handshake to removal.
///
/// # Errors
///
/// Returns an error if the WebSocket handshake or the initial device-list
/// push fails.  Errors while reading end the session without being reported.
async fn run_session(stream: TcpStream, peer_addr: SocketAddr, hub: Arc<Hub<WsSink>>) -> anyhow::Result<()> {
    let ws_stream = accept_async(stream)
        .await
        .with_context(|| format!("WebSocket handshake failed with {peer_addr}"))?;

    let (ws_tx, mut ws_rx) = ws_stream.split();
    let id = Uuid::new_v4();
    info!("dashboard {id} connected from {peer_addr}");

    hub.join(id, ws_tx)
        .await
        .with_context(|| format!("dashboard {id}: initial device list not delivered"))?;

    loop {
        let ws_msg = match ws_rx.next().await {
            Some(Ok(msg)) => msg,
            Some(Err(WsError::ConnectionClosed | WsError::Protocol(_))) => {
                debug!("dashboard {id}: WebSocket closed");
                break;
            }
            Some(Err(e)) => {
                warn!("dashboard {id}: WebSocket error: {e}");
                break;
            }
            None => break,
        };

        match ws_msg {
            WsMessage::Text(json_str) => {
                let command: BrowserCommand = match serde_json::from_str(&json_str) {
                    Ok(c) => c,
                    Err(e) => {
                        // One bad frame does not end the session.
                        warn!("dashboard {id}: invalid command: {e}");
                        continue;
                    }
                };
                if let Err(e) = hub.handle_command(id, command).await {
                    warn!("dashboard {id}: {e}");
                    break;
                }
            }
            WsMessage::Close(_) => {
                debug!("dashboard {id}: Close frame received");
                break;
            }
            WsMessage::Binary(_) => {
                debug!("dashboard {id}: binary frame (ignored)");
            }
            WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_) => {}
        }
    }

    hub.leave(id).await;
    Ok(())
}
