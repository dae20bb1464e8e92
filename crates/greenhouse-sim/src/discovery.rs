// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Device self-registration.
//!
//! A device announces itself until the gateway confirms it, then keeps
//! re-announcing on a fixed heartbeat so the gateway can refresh (or
//! re-learn) its address.
//!
//! ```text
//! Unregistered --(matching confirmation)--> Registered
//!      ^   |
//!      +---+ timeout / transport error (backoff)
//! ```

use crate::backoff::Backoff;
use greenhouse_proto::{
    DeviceRegistration, ProtocolError, RegistrationConfirmation, WireMessage, MAX_DATAGRAM_SIZE,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use socket2::{Domain, Protocol, Socket, Type};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Registration errors.
#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("No confirmation within {0:?}")]
    Timeout(Duration),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationState {
    Unregistered,
    Registered,
}

/// Result of one registration attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationOutcome {
    pub state: RegistrationState,
    /// Address the confirmation came from.
    pub gateway: SocketAddr,
}

/// Registration timing.
#[derive(Debug, Clone, Copy)]
pub struct RegistrationSchedule {
    pub response_timeout: Duration,
    pub heartbeat: Duration,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
}

/// Open a socket for sending registrations and receiving confirmations.
pub fn bind_registration_socket(interface: Ipv4Addr) -> Result<UdpSocket, RegistrationError> {
    let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0);
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    socket.bind(&addr.into())?;
    socket.set_multicast_ttl_v4(1)?;
    socket.set_multicast_loop_v4(true)?;
    if !interface.is_unspecified() {
        socket.set_multicast_if_v4(&interface)?;
    }
    socket.set_nonblocking(true)?;

    let std_socket: std::net::UdpSocket = socket.into();
    Ok(UdpSocket::from_std(std_socket)?)
}

/// Send one registration and wait for our own confirmation.
///
/// Confirmations for other devices (or with another status) are ignored and
/// do not extend the deadline.
pub async fn register(
    socket: &UdpSocket,
    target: SocketAddr,
    registration: &DeviceRegistration,
    timeout: Duration,
) -> Result<RegistrationOutcome, RegistrationError> {
    let payload = registration.encode()?;
    socket.send_to(&payload, target).await?;
    debug!("{} sent registration to {}", registration.name, target);

    let deadline = Instant::now() + timeout;
    let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];

    loop {
        let received = tokio::time::timeout_at(deadline, socket.recv_from(&mut buf)).await;
        let (len, from) = match received {
            Ok(r) => r?,
            Err(_) => return Err(RegistrationError::Timeout(timeout)),
        };

        match RegistrationConfirmation::decode(&buf[..len]) {
            Ok(conf) if conf.confirms(&registration.name) => {
                return Ok(RegistrationOutcome {
                    state: RegistrationState::Registered,
                    gateway: from,
                });
            }
            Ok(conf) => debug!(
                "{} ignoring confirmation for {} ({})",
                registration.name, conf.device, conf.status
            ),
            Err(e) => debug!("{} ignoring datagram from {}: {}", registration.name, from, e),
        }
    }
}

/// Register, then heartbeat forever (until shutdown).
pub async fn run_registration(
    registration: DeviceRegistration,
    target: SocketAddr,
    interface: Ipv4Addr,
    schedule: RegistrationSchedule,
    mut shutdown: watch::Receiver<bool>,
    state: watch::Sender<RegistrationState>,
) {
    let name = registration.name.clone();
    let mut rng = StdRng::from_entropy();
    let mut backoff = Backoff::new(schedule.backoff_base, schedule.backoff_max);

    let socket = loop {
        match bind_registration_socket(interface) {
            Ok(s) => break s,
            Err(e) => {
                let delay = backoff.next_delay(&mut rng);
                warn!("{}: cannot open registration socket: {} (retry in {:?})", name, e, delay);
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = shutdown.changed() => return,
                }
            }
        }
    };
    backoff.reset();

    // Unregistered: announce until confirmed.
    loop {
        info!("{} trying to register with gateway", name);
        let attempt = tokio::select! {
            r = register(&socket, target, &registration, schedule.response_timeout) => r,
            _ = shutdown.changed() => return,
        };

        let delay = match attempt {
            Ok(outcome) => {
                info!("{} registered on gateway {}", name, outcome.gateway);
                let _ = state.send(outcome.state);
                break;
            }
            Err(RegistrationError::Timeout(t)) => {
                let delay = backoff.next_delay(&mut rng);
                info!("{} not registered after {:?} (retry in {:?})", name, t, delay);
                delay
            }
            Err(e) => {
                let delay = backoff.next_delay(&mut rng);
                warn!("{} registration error: {} (retry in {:?})", name, e, delay);
                delay
            }
        };

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown.changed() => return,
        }
    }

    // Registered: re-announce on the heartbeat.
    let payload = match registration.encode() {
        Ok(p) => p,
        Err(e) => {
            warn!("{}: cannot encode heartbeat: {}", name, e);
            return;
        }
    };
    let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
    let mut heartbeat =
        tokio::time::interval_at(Instant::now() + schedule.heartbeat, schedule.heartbeat);

    loop {
        tokio::select! {
            _ = heartbeat.tick() => {
                match socket.send_to(&payload, target).await {
                    Ok(_) => debug!("{} heartbeat sent to {}", name, target),
                    Err(e) => warn!("{} heartbeat failed: {}", name, e),
                }
            }
            // Drain confirmations to heartbeats.
            r = socket.recv_from(&mut buf) => {
                if let Err(e) = r {
                    debug!("{} receive error: {}", name, e);
                }
            }
            _ = shutdown.changed() => return,
        }
    }
}
