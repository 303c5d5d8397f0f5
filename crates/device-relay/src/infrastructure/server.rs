//! Process-level wiring: both listeners, the relay consumer and shutdown.
//!
//! [`RelayServer::bind`] binds both listeners up front so that a port
//! conflict is reported before anything runs.  [`RelayServer::run`] then
//! drives three components concurrently on the current runtime:
//!
//! ```text
//! DeviceAcceptor ──(device threads)──► RelaySender ─► relay consumer ─► Hub
//! WsServer ──(session tasks)──────────────────────────────────────────► Hub
//! ```
//!
//! Clearing `running` stops both accept loops within one poll interval; the
//! relay sentinel then stops the consumer.  Any component ending while
//! `running` is still set is a fatal error.

use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::{bail, Context};
use tokio::task::JoinHandle;
use tracing::info;

use device_relay_core::DeviceRegistry;

use crate::domain::config::RelayConfig;
use crate::infrastructure::device_acceptor::{DeviceAcceptor, DeviceContext};
use crate::infrastructure::hub::Hub;
use crate::infrastructure::relay::{relay_channel, run_relay_consumer, RelayReceiver, RelaySender};
use crate::infrastructure::ws_server::{WsServer, WsSink};

/// A relay with both listeners bound, ready to run.
pub struct RelayServer {
    config: RelayConfig,
    acceptor: DeviceAcceptor,
    ws_server: WsServer,
    registry: Arc<DeviceRegistry>,
    relay_tx: RelaySender,
    relay_rx: RelayReceiver,
}

impl RelayServer {
    /// Validates `config` and binds both listeners.
    ///
    /// # Errors
    ///
    /// Returns an error for an invalid configuration or if either port cannot
    /// be bound.
    pub async fn bind(config: RelayConfig) -> anyhow::Result<Self> {
        config.validate().context("invalid relay configuration")?;

        let acceptor = DeviceAcceptor::bind(config.device_bind_addr, config.accept_poll).await?;
        let ws_server = WsServer::bind(config.ws_bind_addr, config.accept_poll).await?;
        let (relay_tx, relay_rx) = relay_channel();

        Ok(Self {
            config,
            acceptor,
            ws_server,
            registry: Arc::new(DeviceRegistry::new()),
            relay_tx,
            relay_rx,
        })
    }

    /// The bound device listener address.
    pub fn device_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.acceptor.local_addr()?)
    }

    /// The bound WebSocket listener address.
    pub fn ws_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.ws_server.local_addr()?)
    }

    /// Runs until `running` is cleared (Ok) or a component stops on its own
    /// (Err).
    pub async fn run(self, running: Arc<AtomicBool>) -> anyhow::Result<()> {
        let Self {
            config,
            acceptor,
            ws_server,
            registry,
            relay_tx,
            relay_rx,
        } = self;

        let hub: Arc<Hub<WsSink>> = Arc::new(Hub::new(Arc::clone(&registry), config.system_label.clone()));
        let ctx = DeviceContext {
            registry,
            relay: relay_tx.clone(),
            read_timeout: config.read_timeout,
            read_buffer_size: config.read_buffer_size,
        };

        let mut acceptor_task = tokio::spawn(acceptor.run(ctx, Arc::clone(&running)));
        let mut consumer_task: JoinHandle<()> = tokio::spawn(run_relay_consumer(relay_rx, Arc::clone(&hub)));
        let mut ws_task = tokio::spawn(ws_server.run(hub, Arc::clone(&running)));

        let stopped = tokio::select! {
            res = &mut acceptor_task => component_result("device acceptor", res),
            res = &mut ws_task => component_result("WebSocket server", res),
            res = &mut consumer_task => component_result("relay consumer", res.map(Ok::<(), anyhow::Error>)),
        };

        let graceful = !running.load(Ordering::Relaxed);
        running.store(false, Ordering::Relaxed);
        relay_tx.shutdown();

        if !graceful {
            acceptor_task.abort();
            ws_task.abort();
            consumer_task.abort();
            stopped?;
            bail!("a relay component stopped before shutdown was requested");
        }

        // Both accept loops notice the cleared flag within one poll interval.
        for (name, task) in [("device acceptor", acceptor_task), ("WebSocket server", ws_task)] {
            if !task.is_finished() {
                component_result(name, task.await)?;
            }
        }
        if !consumer_task.is_finished() {
            let _ = consumer_task.await;
        }

        info!("relay stopped");
        stopped
    }
}

fn component_result(
    name: &str,
    joined: Result<anyhow::Result<()>, tokio::task::JoinError>,
) -> anyhow::Result<()> {
    match joined {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(e.context(format!("{name} failed"))),
        Err(e) => Err(anyhow::Error::new(e).context(format!("{name} panicked"))),
    }
}
