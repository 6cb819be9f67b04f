//! Broadcast loop: fans dirty object state out to every live peer.
//!
//! Each tick, in order:
//!   1. take the world's dirty snapshot (clears the dirty set)
//!   2. sweep the peer table (evicts timed-out peers, ages the rest)
//!   3. send `d` to every evicted peer
//!   4. send each dirty object, retagged `n`, to every live peer that did
//!      not produce it
//!
//! Planning takes each lock once and releases it; sending happens after.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use bytes::Bytes;
use tokio::net::UdpSocket;
use tokio::sync::broadcast;
use tokio::time::{self, MissedTickBehavior};
use zerocopy::AsBytes;

use statecast_core::config::EchoSuppression;
use statecast_core::wire::{Command, ObjectId};
use statecast_services::{RelayStats, SharedPeerTable, SharedWorld, Sweep, TrackedObject};

use crate::transport::{self, Outbound};

/// Datagrams produced by one tick.
#[derive(Debug, Default)]
pub struct TickPlan {
    /// `d` notices, one per evicted peer.
    pub disconnects: Vec<Outbound>,
    /// `n` object updates.
    pub updates: Vec<Outbound>,
}

impl TickPlan {
    pub fn is_empty(&self) -> bool {
        self.disconnects.is_empty() && self.updates.is_empty()
    }
}

/// Build a tick's datagrams from a dirty snapshot and a peer sweep.
///
/// Evicted peers only ever receive their disconnect notice.
pub fn fan_out(
    snapshot: &BTreeMap<ObjectId, TrackedObject>,
    sweep: &Sweep,
    echo: EchoSuppression,
) -> TickPlan {
    let disconnect = Bytes::copy_from_slice(&Command::ServerDisconnect.signal());
    let disconnects = sweep
        .evicted
        .iter()
        .map(|&peer| Outbound::new(peer, disconnect.clone()))
        .collect();

    let encoded: Vec<(&TrackedObject, Bytes)> = snapshot
        .values()
        .map(|obj| (obj, Bytes::copy_from_slice(obj.frame.to_broadcast().as_bytes())))
        .collect();

    let mut updates = Vec::with_capacity(sweep.live.len() * encoded.len());
    for &peer in &sweep.live {
        for (obj, bytes) in &encoded {
            if echo.suppresses(obj.origin, peer) {
                continue;
            }
            updates.push(Outbound::new(peer, bytes.clone()));
        }
    }

    TickPlan {
        disconnects,
        updates,
    }
}

/// Periodic fan-out task.
pub struct BroadcastLoop {
    socket: Arc<UdpSocket>,
    peers: SharedPeerTable,
    world: SharedWorld,
    stats: RelayStats,
    tick_interval: Duration,
    timeout_ticks: u32,
    echo: EchoSuppression,
    shutdown: broadcast::Receiver<()>,
}

impl BroadcastLoop {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        socket: Arc<UdpSocket>,
        peers: SharedPeerTable,
        world: SharedWorld,
        stats: RelayStats,
        tick_interval: Duration,
        timeout_ticks: u32,
        echo: EchoSuppression,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            socket,
            peers,
            world,
            stats,
            tick_interval,
            timeout_ticks,
            echo,
            shutdown,
        }
    }

    /// Run until shutdown.
    pub async fn run(mut self) -> Result<()> {
        let mut interval = time::interval(self.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            tick_micros = self.tick_interval.as_micros() as u64,
            timeout_ticks = self.timeout_ticks,
            echo = ?self.echo,
            "broadcast loop starting"
        );

        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!("broadcast loop shutting down");
                    return Ok(());
                }
                _ = interval.tick() => {
                    let plan = self.plan_tick().await;
                    self.send(plan).await;
                }
            }
        }
    }

    /// Steps 1–4 without any I/O.
    pub async fn plan_tick(&self) -> TickPlan {
        let snapshot = self.world.lock().await.take_dirty_snapshot();
        let sweep = self.peers.lock().await.sweep_and_advance(self.timeout_ticks);

        for peer in &sweep.evicted {
            tracing::info!(peer = %peer, "evicting peer");
        }

        fan_out(&snapshot, &sweep, self.echo)
    }

    async fn send(&self, plan: TickPlan) {
        if plan.is_empty() {
            return;
        }
        transport::send_all(&self.socket, &plan.disconnects).await;
        self.stats.record_evictions(plan.disconnects.len() as u64);

        let sent = transport::send_all(&self.socket, &plan.updates).await;
        self.stats.record_broadcasts(sent as u64);
    }
}
