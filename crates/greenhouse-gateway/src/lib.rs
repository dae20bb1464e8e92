// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Greenhouse gateway.
//!
//! The gateway owns two pieces of shared state and three endpoints:
//!
//! | Endpoint | Transport | Writes | Reads |
//! |----------|-----------|--------|-------|
//! | discovery | UDP multicast | routing table | |
//! | status ingest | TCP | status cache | |
//! | client commands | TCP | | status cache, routing table |
//!
//! # Example
//!
//! ```no_run
//! use greenhouse_gateway::{Gateway, GatewayConfig};
//!
//! # async fn run() -> Result<(), greenhouse_gateway::GatewayError> {
//! let gateway = Gateway::new(GatewayConfig::default())?;
//! let handle = gateway.start().await?;
//! println!("clients: {}", handle.client_addr());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod server;

pub use config::{ConfigError, GatewayConfig};
pub use server::{
    CommandRouter, DeviceRecord, DeviceRegistry, Gateway, GatewayError, GatewayHandle, Reply,
    StatusCache,
};
