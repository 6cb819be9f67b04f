//! Peer table: the endpoints currently considered connected.
//!
//! The receive loop is the only writer of new peers and the only actor that
//! resets liveness counters. The broadcast loop is the only remover: each
//! tick it sweeps the table, ages every survivor by one tick, and hands back
//! whoever went quiet for too long.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::Mutex;

/// Timeout value that marks a peer for eviction on the next sweep.
///
/// Sweeps clamp their threshold below this, so the sentinel always exceeds it.
pub const EVICT_NOW: u32 = u32::MAX;

/// Liveness bookkeeping for one connected endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerEntry {
    /// Consecutive broadcast ticks without inbound traffic from this peer.
    pub timeout_ticks: u32,
}

/// Result of one eviction sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sweep {
    /// Peers that stay connected and should receive this tick's broadcast.
    pub live: Vec<SocketAddr>,
    /// Peers removed by this sweep. Each appears in exactly one sweep.
    pub evicted: Vec<SocketAddr>,
}

/// Connected peers keyed by (address, port).
#[derive(Debug, Default)]
pub struct PeerTable {
    peers: BTreeMap<SocketAddr, PeerEntry>,
}

/// Shared peer table: one lock, held for a single operation at a time.
pub type SharedPeerTable = Arc<Mutex<PeerTable>>;

impl PeerTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedPeerTable {
        Arc::new(Mutex::new(Self::new()))
    }

    /// Reset the timeout of a known peer. Unknown endpoints are ignored.
    /// Returns whether the endpoint is known.
    pub fn touch(&mut self, endpoint: SocketAddr) -> bool {
        match self.peers.get_mut(&endpoint) {
            Some(entry) => {
                entry.timeout_ticks = 0;
                true
            }
            None => false,
        }
    }

    /// Insert a peer with a fresh timeout. Returns true if it was not
    /// already present; an existing peer keeps its entry untouched.
    pub fn add_if_absent(&mut self, endpoint: SocketAddr) -> bool {
        if self.peers.contains_key(&endpoint) {
            return false;
        }
        self.peers.insert(
            endpoint,
            PeerEntry { timeout_ticks: 0 },
        );
        true
    }

    /// Force a known peer out on the next sweep. Returns whether it was known.
    pub fn mark_for_immediate_eviction(&mut self, endpoint: SocketAddr) -> bool {
        match self.peers.get_mut(&endpoint) {
            Some(entry) => {
                entry.timeout_ticks = EVICT_NOW;
                true
            }
            None => false,
        }
    }

    /// Remove every peer whose timeout exceeds `threshold_ticks` and age the
    /// rest by one tick. This is the only place peers leave the table.
    pub fn sweep_and_advance(&mut self, threshold_ticks: u32) -> Sweep {
        let threshold = threshold_ticks.min(EVICT_NOW - 1);
        let mut sweep = Sweep::default();

        self.peers.retain(|endpoint, entry| {
            if entry.timeout_ticks > threshold {
                sweep.evicted.push(*endpoint);
                false
            } else {
                entry.timeout_ticks = entry.timeout_ticks.saturating_add(1);
                sweep.live.push(*endpoint);
                true
            }
        });

        sweep
    }

    pub fn get(&self, endpoint: &SocketAddr) -> Option<&PeerEntry> {
        self.peers.get(endpoint)
    }

    pub fn contains(&self, endpoint: &SocketAddr) -> bool {
        self.peers.contains_key(endpoint)
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}
