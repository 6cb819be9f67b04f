//! Routes inbound datagrams to the peer table and world model by command tag.

use std::net::SocketAddr;

use zerocopy::AsBytes;

use statecast_core::wire::{Command, IdMappingReply, ObjectFrame, WireError};
use statecast_services::{RelayStats, SharedPeerTable, SharedWorld, UpdateOutcome};

use crate::transport::Outbound;

/// A decoded inbound datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// `a`
    Handshake,
    /// `c`
    Ping,
    /// `e`
    Disconnect,
    /// `i`
    InitGlobal(ObjectFrame),
    /// `j`
    InitLocal(ObjectFrame),
    /// `m`
    Update(ObjectFrame),
    /// `b`, `d`, `k`, `n`: tags that only travel relay → client.
    Misdirected(Command),
}

impl Request {
    pub fn decode(datagram: &[u8]) -> Result<Self, WireError> {
        let tag = *datagram.first().ok_or(WireError::Empty)?;
        let command = Command::try_from(tag)?;
        if !command.carries_frame() {
            return Ok(match command {
                Command::HandshakeRequest => Request::Handshake,
                Command::Ping => Request::Ping,
                Command::ClientDisconnect => Request::Disconnect,
                other => Request::Misdirected(other),
            });
        }

        let frame = ObjectFrame::decode(datagram)?;
        Ok(match command {
            Command::InitGlobal => Request::InitGlobal(frame),
            Command::InitLocal => Request::InitLocal(frame),
            _ => Request::Update(frame),
        })
    }
}

/// Applies inbound requests to shared state and produces immediate replies.
///
/// Every lock is taken for one operation and released before returning, so
/// the caller sends the reply without holding anything.
#[derive(Clone)]
pub struct ProtocolDispatcher {
    peers: SharedPeerTable,
    world: SharedWorld,
    stats: RelayStats,
}

impl ProtocolDispatcher {
    pub fn new(peers: SharedPeerTable, world: SharedWorld, stats: RelayStats) -> Self {
        Self { peers, world, stats }
    }

    /// Handle one datagram from `from`. Returns the reply to send, if any.
    ///
    /// The received counter moves only after shared state reflects the
    /// datagram.
    pub async fn dispatch(&self, from: SocketAddr, datagram: &[u8]) -> Option<Outbound> {
        if datagram.is_empty() {
            self.stats.record_dropped();
            tracing::debug!(%from, "dropping empty datagram");
            return None;
        }
        let reply = self.handle(from, datagram).await;
        self.stats.record_received();
        reply
    }

    async fn handle(&self, from: SocketAddr, datagram: &[u8]) -> Option<Outbound> {
        // Any traffic counts as liveness, whatever the tag.
        self.peers.lock().await.touch(from);

        let request = match Request::decode(datagram) {
            Ok(r) => r,
            Err(e) => {
                self.stats.record_dropped();
                tracing::debug!(%from, len = datagram.len(), error = %e, "dropping datagram");
                return None;
            }
        };

        match request {
            Request::Handshake => self.on_handshake(from).await,
            Request::Ping => None,
            Request::Disconnect => {
                self.on_disconnect(from).await;
                None
            }
            Request::InitGlobal(frame) => {
                self.on_init_global(from, frame).await;
                None
            }
            Request::InitLocal(frame) => self.on_init_local(from, frame).await,
            Request::Update(frame) => {
                self.on_update(from, frame).await;
                None
            }
            Request::Misdirected(command) => {
                tracing::trace!(%from, ?command, "ignoring relay-bound tag from client");
                None
            }
        }
    }

    async fn on_handshake(&self, from: SocketAddr) -> Option<Outbound> {
        let (is_new, peer_count) = {
            let mut peers = self.peers.lock().await;
            (peers.add_if_absent(from), peers.len())
        };
        if !is_new {
            return None;
        }
        tracing::info!(peer = %from, peers = peer_count, "discovered peer");
        Some(Outbound::new(from, Command::HandshakeAck.signal().to_vec()))
    }

    async fn on_disconnect(&self, from: SocketAddr) {
        if self.peers.lock().await.mark_for_immediate_eviction(from) {
            tracing::info!(peer = %from, "peer disconnecting");
        }
    }

    async fn on_init_global(&self, from: SocketAddr, frame: ObjectFrame) {
        let id = frame.object_id();
        if self.world.lock().await.initialize_global(id, from, frame) {
            tracing::info!(object = %id, origin = %from, "initialized global object");
        } else {
            tracing::debug!(object = %id, origin = %from, "global object already exists");
        }
    }

    async fn on_init_local(&self, from: SocketAddr, frame: ObjectFrame) -> Option<Outbound> {
        let local_id = frame.local_id;
        let result = self.world.lock().await.initialize_local(from, frame);
        match result {
            Ok(id) => {
                tracing::info!(object = %id, local_id, origin = %from, "initialized local object");
                let reply = IdMappingReply::new(id, local_id);
                Some(Outbound::new(from, reply.as_bytes().to_vec()))
            }
            Err(e) => {
                tracing::warn!(origin = %from, local_id, error = %e, "cannot create local object");
                None
            }
        }
    }

    async fn on_update(&self, from: SocketAddr, frame: ObjectFrame) {
        let id = frame.object_id();
        let timestamp = frame.timestamp;
        let outcome = self.world.lock().await.apply_update(id, timestamp, from, frame);
        self.stats.record_update(outcome.is_accepted());
        match outcome {
            UpdateOutcome::Accepted => {
                tracing::trace!(object = %id, timestamp, origin = %from, "update accepted");
            }
            UpdateOutcome::Stale { stored, incoming } => {
                tracing::debug!(object = %id, stored, incoming, origin = %from, "stale update");
            }
            UpdateOutcome::UnknownObject => {
                tracing::debug!(object = %id, origin = %from, "update for unknown object");
            }
        }
    }
}
