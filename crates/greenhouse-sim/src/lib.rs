// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Greenhouse device simulator.
//!
//! Hosts a set of simulated sensors and actuators. Each device has its own
//! command listener and registration loop; one physics task evolves the
//! sensors and one reporter pushes the full status to the gateway.
//!
//! # Example
//!
//! ```no_run
//! use greenhouse_sim::{SimConfig, Simulator};
//!
//! # async fn run() -> Result<(), greenhouse_sim::SimError> {
//! let sim = Simulator::new(SimConfig::default())?;
//! let handle = sim.start().await?;
//! for device in handle.endpoints() {
//!     println!("{} on {}", device.name, device.addr);
//! }
//! # Ok(())
//! # }
//! ```

pub mod backoff;
pub mod config;
pub mod device;
pub mod discovery;
pub mod greenhouse;
mod listener;
pub mod physics;
mod reporter;
pub mod simulator;

pub use config::{ConfigError, DeviceSpec, SimConfig};
pub use device::{ActuatorRole, Device, DeviceError};
pub use discovery::{RegistrationError, RegistrationState};
pub use greenhouse::Greenhouse;
pub use physics::{PhysicsEngine, PhysicsParams};
pub use simulator::{DeviceEndpoint, SimError, SimHandle, Simulator};
