//! Configuration system for Statecast.
//!
//! Resolution order: defaults → config file → environment variables →
//! the positional port argument (applied by the daemon).
//!
//! Config file location:
//!   1. $STATECAST_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/statecast/config.toml
//!   3. ~/.config/statecast/config.toml

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::wire::DEFAULT_PORT;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub network: NetworkConfig,
    pub relay: RelaySettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address the UDP socket binds to.
    pub bind_addr: IpAddr,
    /// UDP port. 0 = OS-assigned.
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelaySettings {
    /// Broadcast tick interval in microseconds.
    pub tick_interval_micros: u64,
    /// A peer silent for more than this many ticks is evicted.
    pub timeout_ticks: u32,
    /// Which peers count as the origin of an update.
    pub echo_suppression: EchoSuppression,
    /// Seconds between stats log lines. 0 = never.
    pub stats_interval_secs: u64,
}

/// How broadcast decides that a peer produced the state it is about to send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EchoSuppression {
    /// Skip every peer whose IP matches the origin's.
    #[default]
    Address,
    /// Skip only the exact origin endpoint (IP and port).
    Endpoint,
}

impl EchoSuppression {
    /// True when `peer` must not receive state produced by `origin`.
    pub fn suppresses(self, origin: SocketAddr, peer: SocketAddr) -> bool {
        match self {
            EchoSuppression::Address => origin.ip() == peer.ip(),
            EchoSuppression::Endpoint => origin == peer,
        }
    }
}

impl FromStr for EchoSuppression {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "address" => Ok(EchoSuppression::Address),
            "endpoint" => Ok(EchoSuppression::Endpoint),
            other => Err(ConfigError::InvalidValue("echo_suppression", other.to_string())),
        }
    }
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
        }
    }
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            tick_interval_micros: 16_666, // ~60 Hz
            // Not calibrated against real traffic; in practice only explicit
            // disconnects evict at this value.
            timeout_ticks: 10_000_000,
            echo_suppression: EchoSuppression::Address,
            stats_interval_secs: 10,
        }
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("statecast")
}

fn dirs_or_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("invalid value for {0}: {1:?}")]
    InvalidValue(&'static str, String),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl RelayConfig {
    /// Load config: file → env vars, on top of defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::from_file(&Self::file_path())?;
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("STATECAST_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Read a config file. A missing file yields the defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFailed(path.to_path_buf(), e))?;
        toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.to_path_buf(), e))
    }

    /// Apply STATECAST_* overrides. `lookup` is `std::env::var` in
    /// production; unparseable values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("STATECAST_NETWORK__BIND_ADDR").and_then(|v| v.parse().ok()) {
            self.network.bind_addr = v;
        }
        if let Some(v) = lookup("STATECAST_NETWORK__PORT").and_then(|v| v.parse().ok()) {
            self.network.port = v;
        }
        if let Some(v) = lookup("STATECAST_RELAY__TICK_INTERVAL_MICROS").and_then(|v| v.parse().ok()) {
            self.relay.tick_interval_micros = v;
        }
        if let Some(v) = lookup("STATECAST_RELAY__TIMEOUT_TICKS").and_then(|v| v.parse().ok()) {
            self.relay.timeout_ticks = v;
        }
        if let Some(v) = lookup("STATECAST_RELAY__ECHO_SUPPRESSION").and_then(|v| v.parse().ok()) {
            self.relay.echo_suppression = v;
        }
        if let Some(v) = lookup("STATECAST_RELAY__STATS_INTERVAL_SECS").and_then(|v| v.parse().ok()) {
            self.relay.stats_interval_secs = v;
        }
    }

    /// Apply the positional port argument. Returns false, leaving the
    /// configured port in place, when the argument is not a valid port.
    pub fn apply_port_arg(&mut self, arg: &str) -> bool {
        match arg.trim().parse::<u16>() {
            Ok(port) => {
                self.network.port = port;
                true
            }
            Err(_) => false,
        }
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.network.bind_addr, self.network.port)
    }

    pub fn tick_interval(&self) -> Duration {
        // A zero interval would make tokio's interval panic.
        Duration::from_micros(self.relay.tick_interval_micros.max(1))
    }

    pub fn stats_interval(&self) -> Option<Duration> {
        match self.relay.stats_interval_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}
