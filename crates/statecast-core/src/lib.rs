//! statecast-core: wire format and configuration.
//! All other Statecast crates depend on this one.

pub mod config;
pub mod wire;

pub use config::{ConfigError, EchoSuppression, RelayConfig};
pub use wire::{Command, IdMappingReply, ObjectFrame, ObjectId, WireError};
