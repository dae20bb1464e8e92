// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Multicast discovery server.
//!
//! Devices announce themselves to the discovery group; each datagram is
//! upserted into the routing table and answered with a unicast
//! confirmation sent back to the datagram's source address.

use super::registry::{DeviceRecord, DeviceRegistry, Upsert};
use super::sink::{DeviceDocument, RegistrationSink};
use super::GatewayError;
use greenhouse_proto::{
    DeviceRegistration, RegistrationConfirmation, WireMessage, MAX_DATAGRAM_SIZE,
};
use socket2::{Domain, Protocol, Socket, Type};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::{watch, RwLock};
use tracing::{debug, info, warn};

/// Bind the discovery socket and join the multicast group.
///
/// A failed group join is logged and tolerated: the socket still receives
/// unicast registrations on the same port.
pub fn bind_discovery_socket(
    bind_ip: IpAddr,
    port: u16,
    group: Ipv4Addr,
    interface: Ipv4Addr,
) -> Result<UdpSocket, GatewayError> {
    let addr = SocketAddr::new(bind_ip, port);
    let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    socket.bind(&addr.into())?;

    match socket.join_multicast_v4(&group, &interface) {
        Ok(()) => debug!("Joined multicast group {} on {}", group, interface),
        Err(e) => warn!(
            "join_multicast_v4({}) on {} failed (non-fatal): {}",
            group, interface, e
        ),
    }

    socket.set_nonblocking(true)?;
    let std_socket: std::net::UdpSocket = socket.into();
    Ok(UdpSocket::from_std(std_socket)?)
}

/// Shared state the discovery loop writes to.
#[derive(Clone)]
pub(crate) struct DiscoveryContext {
    pub registry: Arc<RwLock<DeviceRegistry>>,
    pub sink: Arc<dyn RegistrationSink>,
    /// Overrides the datagram source IP when set.
    pub device_host: Option<IpAddr>,
}

impl DiscoveryContext {
    /// Record one registration and build its confirmation.
    pub async fn process_registration(
        &self,
        registration: DeviceRegistration,
        source: SocketAddr,
    ) -> Result<RegistrationConfirmation, GatewayError> {
        let name = registration.name.trim();
        if name.is_empty() {
            return Err(GatewayError::Protocol("registration without a name".into()));
        }
        if registration.port == 0 {
            return Err(GatewayError::Protocol(format!(
                "registration of {} with port 0",
                name
            )));
        }

        let host = self.device_host.unwrap_or_else(|| source.ip());
        let address = SocketAddr::new(host, registration.port);

        let mut record = DeviceRecord::new(name, registration.kind, address);
        record.feature = registration.feature;

        let outcome = self.registry.write().await.upsert(record);
        match outcome {
            Upsert::Inserted => info!("Registered {} {} at {}", registration.kind, name, address),
            Upsert::Moved { previous } => {
                info!("{} moved from {} to {}", name, previous, address)
            }
            Upsert::Refreshed => debug!("Heartbeat from {}", name),
        }

        self.record(DeviceDocument {
            name: name.to_string(),
            kind: registration.kind,
            port: registration.port,
        });

        Ok(RegistrationConfirmation::registered(name))
    }

    /// Hand the document to the sink without waiting for it.
    fn record(&self, doc: DeviceDocument) {
        let sink = self.sink.clone();
        tokio::spawn(async move {
            let name = doc.name.clone();
            match tokio::task::spawn_blocking(move || sink.upsert(&doc)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("Failed to record {}: {}", name, e),
                Err(e) => warn!("Registration sink task failed: {}", e),
            }
        });
    }
}

/// Receive registrations until shutdown.
pub(crate) async fn run_discovery(
    socket: UdpSocket,
    ctx: DiscoveryContext,
    mut shutdown: watch::Receiver<bool>,
) {
    if let Ok(addr) = socket.local_addr() {
        info!("Discovery listening on {}", addr);
    }

    let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];

    loop {
        tokio::select! {
            result = socket.recv_from(&mut buf) => {
                let (len, source) = match result {
                    Ok(r) => r,
                    Err(e) => {
                        warn!("Discovery receive error: {}", e);
                        continue;
                    }
                };

                let registration = match DeviceRegistration::decode(&buf[..len]) {
                    Ok(r) => r,
                    Err(e) => {
                        warn!("Malformed registration from {}: {}", source, e);
                        continue;
                    }
                };

                let confirmation = match ctx.process_registration(registration, source).await {
                    Ok(c) => c,
                    Err(e) => {
                        warn!("Rejected registration from {}: {}", source, e);
                        continue;
                    }
                };

                let reply = match confirmation.encode() {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        warn!("Failed to encode confirmation: {}", e);
                        continue;
                    }
                };
                if let Err(e) = socket.send_to(&reply, source).await {
                    warn!("Failed to confirm {} to {}: {}", confirmation.device, source, e);
                }
            }
            _ = shutdown.changed() => {
                debug!("Discovery shutting down");
                break;
            }
        }
    }
}
