// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Greenhouse Gateway
//!
//! # Usage
//!
//! ```bash
//! # Defaults: clients on 50002, status on 50001, discovery on 224.1.1.1:50010
//! greenhouse-gateway
//!
//! # Configuration file plus a registration store
//! greenhouse-gateway --config gateway.toml --registry-db devices.db
//!
//! # Write the default configuration
//! greenhouse-gateway gen-config --output gateway.toml
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand};
use greenhouse_gateway::{Gateway, GatewayConfig};
use std::net::IpAddr;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Greenhouse Gateway - device discovery, status cache and command routing
#[derive(Parser, Debug)]
#[command(name = "greenhouse-gateway")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Bind address for the TCP endpoints
    #[arg(short, long)]
    bind: Option<IpAddr>,

    /// Client command port
    #[arg(long)]
    client_port: Option<u16>,

    /// Status ingest port
    #[arg(long)]
    status_port: Option<u16>,

    /// Discovery UDP port
    #[arg(long)]
    discovery_port: Option<u16>,

    /// Host used to reach devices (default: registration source address)
    #[arg(long)]
    device_host: Option<IpAddr>,

    /// Device lease in seconds (0 = never expire)
    #[arg(long)]
    lease_duration: Option<u64>,

    /// SQLite file recording registrations
    #[arg(long)]
    registry_db: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write the default configuration file
    GenConfig {
        /// Output file path
        #[arg(short, long, default_value = "gateway.toml")]
        output: PathBuf,
    },
}

fn build_config(args: &Args) -> anyhow::Result<GatewayConfig> {
    let mut config = match &args.config {
        Some(path) => {
            info!("Loading config from {:?}", path);
            GatewayConfig::from_file(path)
                .with_context(|| format!("loading {}", path.display()))?
        }
        None => GatewayConfig::default(),
    };

    if let Some(bind) = args.bind {
        config.bind_address = bind;
    }
    if let Some(port) = args.client_port {
        config.client_port = port;
    }
    if let Some(port) = args.status_port {
        config.status_port = port;
    }
    if let Some(port) = args.discovery_port {
        config.discovery_port = port;
    }
    if let Some(host) = args.device_host {
        config.device_host = Some(host);
    }
    if let Some(lease) = args.lease_duration {
        config.lease_duration_secs = lease;
    }
    if let Some(db) = &args.registry_db {
        config.registry_db = Some(db.clone());
    }

    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    if let Some(Commands::GenConfig { output }) = &args.command {
        let toml = GatewayConfig::default().to_toml()?;
        std::fs::write(output, toml).with_context(|| format!("writing {}", output.display()))?;
        info!("Wrote default configuration to {}", output.display());
        return Ok(());
    }

    let config = build_config(&args)?;
    let gateway = Gateway::new(config)?;
    let handle = gateway.start().await?;

    info!("Greenhouse Gateway v{}", env!("CARGO_PKG_VERSION"));
    info!("  Clients:   {}", handle.client_addr());
    info!("  Status:    {}", handle.status_addr());
    info!(
        "  Discovery: {} (group {})",
        handle.discovery_addr(),
        gateway.config().multicast_group
    );
    match gateway.config().lease_duration() {
        Some(lease) => info!("  Lease:     {}s", lease.as_secs()),
        None => info!("  Lease:     never expires"),
    }

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, stopping gateway...");
    handle.shutdown().await;

    Ok(())
}
