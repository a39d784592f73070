// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `orchd`: process entry point. Everything else lives in the library half
//! of this crate so it can be exercised without a real process (spec §1
//! lists "the process-entry wrapper" itself as out of scope for the core).

use orch_daemon::{Config, Daemon};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Err(e) = run().await {
        tracing::error!(error = %e, "orchd failed to start");
        std::process::exit(1);
    }
}

async fn run() -> std::io::Result<()> {
    let config = Config::from_env().map_err(std::io::Error::other)?;

    let node_listener = TcpListener::bind(config.listen_addr).await?;
    tracing::info!(addr = %config.listen_addr, "node listener bound");

    let daemon = Daemon::start(node_listener, &config.bus_socket, &config).await?;
    tracing::info!(bus_socket = %config.bus_socket.display(), "public bus listening");

    tokio::signal::ctrl_c().await?;
    tracing::info!("received shutdown signal");
    daemon.shutdown().await;
    Ok(())
}
