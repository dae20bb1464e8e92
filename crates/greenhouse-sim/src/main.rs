// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Greenhouse Simulator
//!
//! # Usage
//!
//! ```bash
//! # The eight-device greenhouse, reporting to a local gateway
//! greenhouse-sim
//!
//! # Remote gateway, unicast registration
//! greenhouse-sim --gateway 10.0.0.5 --discovery-address 10.0.0.5:50010
//!
//! # Write the default configuration
//! greenhouse-sim gen-config --output greenhouse.toml
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand};
use greenhouse_sim::{SimConfig, Simulator};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Greenhouse Simulator - simulated sensors and actuators
#[derive(Parser, Debug)]
#[command(name = "greenhouse-sim")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Gateway host receiving status pushes
    #[arg(short, long)]
    gateway: Option<IpAddr>,

    /// Gateway status ingest port
    #[arg(long)]
    status_port: Option<u16>,

    /// Send registrations to this address instead of the multicast group
    #[arg(long)]
    discovery_address: Option<SocketAddr>,

    /// Physics noise seed
    #[arg(long)]
    seed: Option<u64>,

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
        #[arg(short, long, default_value = "greenhouse.toml")]
        output: PathBuf,
    },
}

fn build_config(args: &Args) -> anyhow::Result<SimConfig> {
    let mut config = match &args.config {
        Some(path) => {
            info!("Loading config from {:?}", path);
            SimConfig::from_file(path).with_context(|| format!("loading {}", path.display()))?
        }
        None => SimConfig::default(),
    };

    if let Some(host) = args.gateway {
        config.gateway_host = host;
    }
    if let Some(port) = args.status_port {
        config.status_port = port;
    }
    if let Some(addr) = args.discovery_address {
        config.discovery_address = Some(addr);
    }
    if let Some(seed) = args.seed {
        config.seed = Some(seed);
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
        let toml = SimConfig::default().to_toml()?;
        std::fs::write(output, toml).with_context(|| format!("writing {}", output.display()))?;
        info!("Wrote default configuration to {}", output.display());
        return Ok(());
    }

    let config = build_config(&args)?;
    let sim = Simulator::new(config)?;
    let handle = sim.start().await?;

    info!("Greenhouse Simulator v{}", env!("CARGO_PKG_VERSION"));
    for device in handle.endpoints() {
        info!("  {:12} {}", device.name, device.addr);
    }
    info!("  Discovery: {}", sim.config().discovery_target());

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, stopping simulator...");
    handle.shutdown().await;

    Ok(())
}
