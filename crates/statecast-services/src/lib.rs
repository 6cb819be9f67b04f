//! statecast-services: relay state shared by the receive and broadcast loops.
//!
//! Plain data structures; the daemon wraps each registry in a single lock.

pub mod peer;
pub mod stats;
pub mod world;

pub use peer::{PeerEntry, PeerTable, SharedPeerTable, Sweep, EVICT_NOW};
pub use stats::{RelayStats, StatsSnapshot};
pub use world::{accepts, SharedWorld, TrackedObject, UpdateOutcome, WorldError, WorldModel};
