// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Greenhouse CLI
//!
//! Sends one command to the gateway and prints the reply.
//!
//! # Usage
//!
//! ```bash
//! # Read a sensor
//! greenhouse-ctl get sensor humidity
//!
//! # Read one actuator, or all of them
//! greenhouse-ctl get actuator temperature heater
//! greenhouse-ctl get actuator all
//!
//! # Drive an actuator (0 switches it off)
//! greenhouse-ctl set temperature heater 30
//!
//! # Everything the gateway knows
//! greenhouse-ctl status
//! ```

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use greenhouse_proto::{
    client, Command, DeviceKind, DeviceStatus, Feature, StatusSnapshot, Verb,
    DEFAULT_CLIENT_PORT, DEVICE_NOT_FOUND, DEVICE_UNAVAILABLE,
};
use std::net::SocketAddr;
use std::time::Duration;
use tabled::{Table, Tabled};

/// Greenhouse CLI
#[derive(Parser, Debug)]
#[command(name = "greenhouse-ctl")]
#[command(about = "Query and drive greenhouse devices through the gateway")]
#[command(version)]
struct Args {
    /// Gateway client address
    #[arg(short, long, default_value_t = default_gateway())]
    gateway: SocketAddr,

    /// Request timeout in seconds
    #[arg(short, long, default_value = "5")]
    timeout: u64,

    /// Print the raw JSON reply
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

fn default_gateway() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], DEFAULT_CLIENT_PORT))
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Category {
    Sensor,
    Actuator,
}

impl From<Category> for DeviceKind {
    fn from(c: Category) -> Self {
        match c {
            Category::Sensor => DeviceKind::Sensor,
            Category::Actuator => DeviceKind::Actuator,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Read cached status
    Get {
        category: Category,
        /// humidity, temperature, light or all
        #[arg(default_value = "all")]
        feature: String,
        /// Actuator name (actuators only)
        actuator: Option<String>,
    },

    /// Set an actuator's intensity
    Set {
        feature: Feature,
        actuator: String,
        value: f32,
    },

    /// Show every cached sensor and actuator
    Status,
}

#[derive(Tabled)]
struct StatusRow {
    #[tabled(rename = "Device")]
    name: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Feature")]
    feature: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "Value")]
    value: String,
}

impl From<&DeviceStatus> for StatusRow {
    fn from(s: &DeviceStatus) -> Self {
        Self {
            name: s.name.clone(),
            kind: s.kind.to_string(),
            feature: s.feature.to_string(),
            state: s.human_state.clone(),
            value: format!("{:.1} {}", s.value, s.unit),
        }
    }
}

fn build_get(category: Category, feature: &str, actuator: Option<&str>) -> Command {
    Command {
        verb: Verb::Get,
        device_category: category.into(),
        feature: feature.to_ascii_lowercase(),
        actuator: actuator.unwrap_or("all").to_string(),
        value: 0.0,
    }
}

fn print_reply(reply: &StatusSnapshot, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    if json {
        println!("{}", serde_json::to_string_pretty(reply)?);
        return Ok(());
    }

    let text = reply.response_text.as_str();
    if text == DEVICE_NOT_FOUND || text == DEVICE_UNAVAILABLE {
        println!("{}", text.yellow());
    } else if !text.is_empty() {
        println!("{}", text.green().bold());
    }

    if !reply.statuses.is_empty() {
        let rows: Vec<StatusRow> = reply.statuses.iter().map(StatusRow::from).collect();
        println!("{}", Table::new(rows));
    }
    Ok(())
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let deadline = Duration::from_secs(args.timeout);

    let commands = match &args.command {
        Commands::Get {
            category,
            feature,
            actuator,
        } => vec![build_get(*category, feature, actuator.as_deref())],
        Commands::Set {
            feature,
            actuator,
            value,
        } => vec![Command::set_actuator(*feature, actuator, *value)],
        Commands::Status => vec![
            Command::get_all(DeviceKind::Sensor),
            Command::get_all(DeviceKind::Actuator),
        ],
    };

    if matches!(args.command, Commands::Status) && !args.json {
        println!("{}", "Greenhouse Status".cyan().bold());
    }

    for command in &commands {
        let reply = client::send_command(args.gateway, command, deadline).await?;
        print_reply(&reply, args.json)?;
    }
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let args = Args::parse();

    if let Err(e) = run(args).await {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}
