// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! orch-daemon: the reactor binding, node registry, job engine, and
//! orchestrator facade (C1, C3, C4, C5 of spec.md §2) built on the data
//! model in `orch-core` and the message substrate in `orch-wire`.
//!
//! `main.rs` (binary `orchd`) wires the pieces in this library together;
//! everything here is plain library code so integration tests can start a
//! daemon in-process against loopback sockets without spawning a process.

pub mod config;
pub mod engine;
pub mod facade;
pub mod job_engine;
pub mod node_conn;
pub mod registry;

use std::path::Path;
use tokio::net::{TcpListener, UnixListener};
use tokio_util::sync::CancellationToken;

pub use config::{Config, ConfigError};
pub use engine::{EngineHandle, EngineMsg};

/// A running daemon: the engine task plus its two accept loops. Dropping
/// this does not stop anything; call [`Daemon::shutdown`] for a clean exit.
pub struct Daemon {
    pub engine: EngineHandle,
    cancel: CancellationToken,
    /// Accept-loop tasks; awaited on shutdown. The engine task is not
    /// tracked here — it exits on its own once every `EngineHandle` (held by
    /// these loops and by any still-open connection tasks) is dropped.
    accept_tasks: Vec<tokio::task::JoinHandle<()>>,
}

impl Daemon {
    /// Bind the node listener and the public-bus socket and start serving.
    /// `node_listener` is passed in already bound so callers (including
    /// tests) can choose port 0 for an ephemeral address.
    pub async fn start(node_listener: TcpListener, bus_socket: &Path, config: &Config) -> std::io::Result<Self> {
        if bus_socket.exists() {
            std::fs::remove_file(bus_socket)?;
        }
        if let Some(parent) = bus_socket.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let bus_listener = UnixListener::bind(bus_socket)?;

        let (engine, _engine_task) = engine::spawn(config.call_timeout, config.timeout_sweep_interval);
        let cancel = CancellationToken::new();

        let node_task = tokio::spawn(node_conn::run_listener(node_listener, engine.clone(), cancel.clone()));
        let bus_task = tokio::spawn(facade::run_listener(bus_listener, engine.clone(), cancel.clone()));

        Ok(Self { engine, cancel, accept_tasks: vec![node_task, bus_task] })
    }

    /// Signal every accept loop to stop and wait for them to exit.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        for task in self.accept_tasks {
            let _ = task.await;
        }
    }
}
