//! Relay assembly: binds the socket, builds shared state, and spawns the
//! receive, broadcast, and stats tasks.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use statecast_core::config::RelayConfig;
use statecast_services::{PeerTable, RelayStats, SharedPeerTable, SharedWorld, WorldModel};

use crate::broadcast::BroadcastLoop;
use crate::dispatch::ProtocolDispatcher;
use crate::receive::ReceiveLoop;
use crate::transport;

/// A running relay.
pub struct RelayHandle {
    local_addr: SocketAddr,
    peers: SharedPeerTable,
    world: SharedWorld,
    stats: RelayStats,
    shutdown_tx: broadcast::Sender<()>,
    receive_task: JoinHandle<Result<()>>,
    broadcast_task: JoinHandle<Result<()>>,
    stats_task: Option<JoinHandle<()>>,
}

/// Bind the relay socket and start both loops.
///
/// Fails only if the socket cannot be opened or bound.
pub async fn start_relay(config: RelayConfig) -> Result<RelayHandle> {
    let bind_addr = config.socket_addr();
    let socket = Arc::new(
        transport::bind(bind_addr)
            .with_context(|| format!("failed to bind relay socket on {bind_addr}"))?,
    );
    let local_addr = socket.local_addr().context("local_addr")?;
    tracing::info!(addr = %local_addr, "relay socket bound");

    let peers = PeerTable::shared();
    let world = WorldModel::shared();
    let stats = RelayStats::new();

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let dispatcher = ProtocolDispatcher::new(peers.clone(), world.clone(), stats.clone());
    let receive_task = tokio::spawn(
        ReceiveLoop::new(socket.clone(), dispatcher, shutdown_tx.subscribe()).run(),
    );

    let broadcast_task = tokio::spawn(
        BroadcastLoop::new(
            socket,
            peers.clone(),
            world.clone(),
            stats.clone(),
            config.tick_interval(),
            config.relay.timeout_ticks,
            config.relay.echo_suppression,
            shutdown_tx.subscribe(),
        )
        .run(),
    );

    let stats_task = config.stats_interval().map(|every| {
        let peers = peers.clone();
        let world = world.clone();
        let stats = stats.clone();
        let mut shutdown = shutdown_tx.subscribe();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.recv() => return,
                    _ = interval.tick() => {
                        let peer_count = peers.lock().await.len();
                        let object_count = world.lock().await.len();
                        stats.log(peer_count, object_count);
                    }
                }
            }
        })
    });

    Ok(RelayHandle {
        local_addr,
        peers,
        world,
        stats,
        shutdown_tx,
        receive_task,
        broadcast_task,
        stats_task,
    })
}

impl RelayHandle {
    /// Address the relay socket is bound to (resolves port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn peers(&self) -> &SharedPeerTable {
        &self.peers
    }

    pub fn world(&self) -> &SharedWorld {
        &self.world
    }

    pub fn stats(&self) -> &RelayStats {
        &self.stats
    }

    /// Resolve when either loop exits. Under normal operation neither does.
    pub async fn wait(&mut self) {
        tokio::select! {
            r = &mut self.receive_task => tracing::error!("receive loop exited: {:?}", r),
            r = &mut self.broadcast_task => tracing::error!("broadcast loop exited: {:?}", r),
        }
    }

    /// Signal every task to stop and wait for them.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
        if let Err(e) = self.receive_task.await {
            tracing::warn!(error = %e, "receive task join failed");
        }
        if let Err(e) = self.broadcast_task.await {
            tracing::warn!(error = %e, "broadcast task join failed");
        }
        if let Some(task) = self.stats_task {
            let _ = task.await;
        }
    }
}
