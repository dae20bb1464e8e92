// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Greenhouse wire protocol
//!
//! Messages exchanged between greenhouse devices, the gateway and clients,
//! plus the framing used on every TCP connection.
//!
//! # Transports
//!
//! | Path | Transport | Messages |
//! |------|-----------|----------|
//! | device -> gateway | UDP multicast | [`DeviceRegistration`] |
//! | gateway -> device | UDP unicast | [`RegistrationConfirmation`] |
//! | device -> gateway | TCP push | [`StatusSnapshot`] |
//! | client -> gateway -> device | TCP request/reply | [`Command`] / [`StatusSnapshot`] |
//!
//! # Quick Start
//!
//! ```no_run
//! use greenhouse_proto::{client, Command, Feature};
//! use std::time::Duration;
//!
//! # async fn demo() -> Result<(), greenhouse_proto::FrameError> {
//! let addr = "127.0.0.1:50002".parse().unwrap();
//! let reply = client::send_command(addr, &Command::get_sensor(Feature::Humidity), Duration::from_secs(5)).await?;
//! println!("{}", reply.response_text);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod framing;
pub mod protocol;

pub use framing::{FrameError, FramedStream};
pub use protocol::{
    Command, DeviceKind, DeviceRegistration, DeviceStatus, Feature, ProtocolError,
    RegistrationConfirmation, Selector, StatusSnapshot, Target, Verb, WireMessage,
};

use std::net::Ipv4Addr;

/// Multicast group devices announce themselves on.
pub const DEFAULT_MULTICAST_GROUP: Ipv4Addr = Ipv4Addr::new(224, 1, 1, 1);

/// UDP port of the discovery multicast group.
pub const DEFAULT_DISCOVERY_PORT: u16 = 50010;

/// Gateway TCP port receiving status snapshots.
pub const DEFAULT_STATUS_PORT: u16 = 50001;

/// Gateway TCP port serving client commands.
pub const DEFAULT_CLIENT_PORT: u16 = 50002;

/// Receive buffer for a single discovery datagram.
pub const MAX_DATAGRAM_SIZE: usize = 1024;

/// Upper bound for a framed TCP message.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 64 * 1024;

/// Reply text sent by a device after a successful SET.
pub const STATUS_UPDATED: &str = "Status updated successfully";

/// Reply text for a target missing from the cache or routing table.
pub const DEVICE_NOT_FOUND: &str = "Device not found.";

/// Reply text when the proxied device cannot be reached.
pub const DEVICE_UNAVAILABLE: &str = "Device not available or error in communication.";
