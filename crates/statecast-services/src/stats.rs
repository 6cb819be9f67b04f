//! Relay counters for traffic in and out of the socket.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
struct Counters {
    datagrams_received: AtomicU64,
    datagrams_dropped: AtomicU64,
    updates_accepted: AtomicU64,
    updates_rejected: AtomicU64,
    broadcasts_sent: AtomicU64,
    peers_evicted: AtomicU64,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub datagrams_received: u64,
    /// Empty, truncated, or unknown-tag datagrams.
    pub datagrams_dropped: u64,
    pub updates_accepted: u64,
    /// Stale or addressed to an unknown object.
    pub updates_rejected: u64,
    pub broadcasts_sent: u64,
    pub peers_evicted: u64,
}

/// Shared relay counters. Cloning shares the same counters.
#[derive(Debug, Clone, Default)]
pub struct RelayStats {
    inner: Arc<Counters>,
}

impl RelayStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Call once a datagram has been fully handled. Pairs with the acquire
    /// load in [`snapshot`](Self::snapshot).
    pub fn record_received(&self) {
        self.inner.datagrams_received.fetch_add(1, Ordering::Release);
    }

    pub fn record_dropped(&self) {
        self.inner.datagrams_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_update(&self, accepted: bool) {
        let counter = if accepted {
            &self.inner.updates_accepted
        } else {
            &self.inner.updates_rejected
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_broadcasts(&self, n: u64) {
        self.inner.broadcasts_sent.fetch_add(n, Ordering::Relaxed);
    }

    pub fn record_evictions(&self, n: u64) {
        self.inner.peers_evicted.fetch_add(n, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let c = &self.inner;
        StatsSnapshot {
            datagrams_received: c.datagrams_received.load(Ordering::Acquire),
            datagrams_dropped: c.datagrams_dropped.load(Ordering::Relaxed),
            updates_accepted: c.updates_accepted.load(Ordering::Relaxed),
            updates_rejected: c.updates_rejected.load(Ordering::Relaxed),
            broadcasts_sent: c.broadcasts_sent.load(Ordering::Relaxed),
            peers_evicted: c.peers_evicted.load(Ordering::Relaxed),
        }
    }

    /// Log the counters alongside current table sizes.
    pub fn log(&self, peers: usize, objects: usize) {
        let s = self.snapshot();
        tracing::info!(
            peers,
            objects,
            received = s.datagrams_received,
            dropped = s.datagrams_dropped,
            accepted = s.updates_accepted,
            rejected = s.updates_rejected,
            broadcasts = s.broadcasts_sent,
            evicted = s.peers_evicted,
            "relay stats"
        );
    }
}
