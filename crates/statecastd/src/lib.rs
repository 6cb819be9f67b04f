//! statecastd: Statecast relay daemon.
//!
//! Two loops share the peer table and world model:
//! - `receive`:   one datagram at a time through the `dispatch` table
//! - `broadcast`: fixed-rate fan-out of dirty objects, peer eviction
//!
//! `relay::start_relay` wires them to one UDP socket.

pub mod broadcast;
pub mod dispatch;
pub mod receive;
pub mod relay;
pub mod transport;

pub use relay::{start_relay, RelayHandle};
