//! Corral Coordinator
//!
//! Control plane for agent cataloging, node membership, and job routing.
//!
//! Usage:
//!     corral-coordinator --transport 127.0.0.1:7400 --admin-port 8080

use anyhow::{Context, Result};
use clap::Parser;
use corral_coordinator::{Coordinator, CoordinatorConfig};
use corral_logging::{init_logging, LogConfig};
use corral_protocol::defaults::{
    DEFAULT_ADMIN_PORT, DEFAULT_SNAPSHOT_DIR, DEFAULT_TRANSPORT_ADDR,
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "corral-coordinator", about = "Corral control plane")]
struct Args {
    /// TCP bind address for node connections
    #[arg(long, default_value = DEFAULT_TRANSPORT_ADDR)]
    transport: String,

    /// Admin API bind host
    #[arg(long, default_value = "127.0.0.1")]
    admin_host: String,

    /// Admin API port
    #[arg(long, default_value_t = DEFAULT_ADMIN_PORT)]
    admin_port: u16,

    /// Snapshot store directory
    #[arg(long, default_value = DEFAULT_SNAPSHOT_DIR)]
    snapshot_dir: PathBuf,

    /// Verbose console logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let _log_guard = init_logging(LogConfig {
        app_name: "corral-coordinator",
        verbose: args.verbose,
    })?;

    tracing::info!("Starting Corral coordinator");
    tracing::info!("  Transport: {}", args.transport);
    tracing::info!("  Admin API: {}:{}", args.admin_host, args.admin_port);

    let config = CoordinatorConfig {
        snapshot_dir: args.snapshot_dir,
        ..CoordinatorConfig::default()
    };
    let coordinator = Arc::new(Coordinator::new(config)?);
    coordinator.start();

    let transport_listener = tokio::net::TcpListener::bind(&args.transport)
        .await
        .with_context(|| format!("Failed to bind transport to {}", args.transport))?;
    let transport = tokio::spawn(corral_coordinator::transport::serve(
        coordinator.clone(),
        transport_listener,
    ));

    let admin_addr: SocketAddr = format!("{}:{}", args.admin_host, args.admin_port)
        .parse()
        .context("Invalid admin bind address")?;
    let admin = tokio::spawn(corral_coordinator::admin::serve(
        coordinator.clone(),
        admin_addr,
    ));

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    tracing::info!("Shutdown signal received");

    transport.abort();
    admin.abort();
    coordinator.stop();

    Ok(())
}
