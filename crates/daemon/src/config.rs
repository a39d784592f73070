// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon configuration, read from environment variables with built-in
//! defaults (spec.md §6: "No command-line flags in v0").
//!
//! This mirrors the teacher's `env.rs` centralized-env-access convention
//! without a flag-parsing dependency, since the spec explicitly excludes a
//! CLI surface for this process.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Default node listener address (spec §6: TCP, `INADDR_ANY`, port 1999).
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:1999";
const DEFAULT_CALL_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_TIMEOUT_SWEEP_MS: u64 = 250;

/// Daemon configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Where the node connection manager (C3) listens for peer sockets.
    pub listen_addr: SocketAddr,
    /// Unix socket the orchestrator facade (C5) publishes the public bus on.
    pub bus_socket: PathBuf,
    /// Per-node RPC deadline (spec §4.4 `IsolateAll.start`: "30-second timeout").
    pub call_timeout: Duration,
    /// How often the engine sweeps `pending_calls` for expired deadlines.
    /// Analogous to the teacher's `OJ_TIMER_CHECK_MS` override.
    pub timeout_sweep_interval: Duration,
}

impl Config {
    /// Load configuration from the environment, falling back to defaults.
    /// `DEFAULT_LISTEN_ADDR` is a compile-time constant known to parse; the
    /// `expect` below can only fire on a typo in that constant, not on
    /// anything observed at runtime.
    #[allow(clippy::expect_used)]
    pub fn from_env() -> Result<Self, ConfigError> {
        let listen_addr = match std::env::var("ORCHD_LISTEN_ADDR") {
            Ok(s) => s.parse().map_err(|_| ConfigError::InvalidListenAddr(s))?,
            Err(_) => DEFAULT_LISTEN_ADDR.parse().expect("default listen addr is valid"),
        };

        let bus_socket = match std::env::var("ORCHD_BUS_SOCKET") {
            Ok(s) => PathBuf::from(s),
            Err(_) => std::env::temp_dir().join("orchd.bus"),
        };

        let call_timeout = env_millis("ORCHD_CALL_TIMEOUT_MS", DEFAULT_CALL_TIMEOUT_MS)?;
        let timeout_sweep_interval = env_millis("ORCHD_TIMEOUT_SWEEP_MS", DEFAULT_TIMEOUT_SWEEP_MS)?;

        Ok(Self { listen_addr, bus_socket, call_timeout, timeout_sweep_interval })
    }
}

fn env_millis(var: &str, default: u64) -> Result<Duration, ConfigError> {
    match std::env::var(var) {
        Ok(s) => s
            .parse::<u64>()
            .map(Duration::from_millis)
            .map_err(|_| ConfigError::InvalidDuration(var.to_string(), s)),
        Err(_) => Ok(Duration::from_millis(default)),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("ORCHD_LISTEN_ADDR={0:?} is not a valid socket address")]
    InvalidListenAddr(String),

    #[error("{0}={1:?} is not a valid number of milliseconds")]
    InvalidDuration(String, String),
}
