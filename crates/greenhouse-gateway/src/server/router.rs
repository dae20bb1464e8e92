// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Command router.
//!
//! GET is answered from the status cache and never touches a device. SET
//! is forwarded to the addressed device unmodified, and the
//! device's reply frame is relayed back untouched.

use super::registry::DeviceRegistry;
use super::status::StatusCache;
use greenhouse_proto::framing::with_deadline;
use greenhouse_proto::{
    client, Command, FrameError, FramedStream, StatusSnapshot, Verb, WireMessage,
    DEVICE_NOT_FOUND, DEVICE_UNAVAILABLE,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{watch, RwLock, Semaphore};
use tracing::{debug, info, warn};

/// Reply to one client command.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// Built by the gateway.
    Snapshot(StatusSnapshot),
    /// Device reply frame, relayed as received.
    Relayed(Vec<u8>),
}

impl Reply {
    fn text(text: &str) -> Self {
        Self::Snapshot(StatusSnapshot::text(text))
    }

    /// Bytes to put on the wire.
    pub fn into_frame(self) -> Result<Vec<u8>, FrameError> {
        match self {
            Self::Snapshot(snapshot) => Ok(snapshot.encode()?),
            Self::Relayed(frame) => Ok(frame),
        }
    }
}

/// Stateless command dispatcher over the shared gateway state.
#[derive(Clone)]
pub struct CommandRouter {
    registry: Arc<RwLock<DeviceRegistry>>,
    cache: Arc<StatusCache>,
    device_timeout: Duration,
}

impl CommandRouter {
    pub fn new(
        registry: Arc<RwLock<DeviceRegistry>>,
        cache: Arc<StatusCache>,
        device_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            cache,
            device_timeout,
        }
    }

    /// Handle one raw command frame.
    pub async fn handle(&self, frame: &[u8]) -> Reply {
        let command = match Command::decode(frame) {
            Ok(c) => c,
            Err(e) => {
                warn!("Invalid command: {}", e);
                return Reply::Snapshot(StatusSnapshot::text(format!("Invalid command: {}", e)));
            }
        };

        match command.verb {
            Verb::Get => self.get(&command).await,
            Verb::Set => self.set(&command, frame).await,
        }
    }

    async fn get(&self, command: &Command) -> Reply {
        let target = match command.target() {
            Ok(t) => t,
            Err(e) => {
                debug!("GET with bad target: {}", e);
                return Reply::text(DEVICE_NOT_FOUND);
            }
        };

        let snapshot = self.cache.current().await;
        let statuses = snapshot.select(&target);
        if statuses.is_empty() {
            debug!("GET {:?}: no cached entry", target);
            return Reply::text(DEVICE_NOT_FOUND);
        }

        Reply::Snapshot(StatusSnapshot::with_statuses(String::new(), statuses))
    }

    async fn set(&self, command: &Command, frame: &[u8]) -> Reply {
        let name = match command.device_name() {
            Ok(n) => n,
            Err(e) => {
                debug!("SET with bad target: {}", e);
                return Reply::text(DEVICE_NOT_FOUND);
            }
        };

        // Copy the address out so the table lock is not held across I/O.
        let address = self.registry.read().await.address_of(name);
        let Some(address) = address else {
            info!("SET {}: device not registered", name);
            return Reply::text(DEVICE_NOT_FOUND);
        };

        match client::request_raw(address, frame, self.device_timeout).await {
            Ok(reply) => {
                debug!("SET {} -> {} relayed {} bytes", name, address, reply.len());
                Reply::Relayed(reply)
            }
            Err(e) => {
                warn!("Error reaching {} at {}: {}", name, address, e);
                Reply::text(DEVICE_UNAVAILABLE)
            }
        }
    }
}

/// Client listener settings.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ClientLimits {
    pub max_message_size: usize,
    /// Bounds both the wait for the next command and each reply write.
    pub idle_timeout: Duration,
}

/// Accept client connections until shutdown.
///
/// Each connection holds a permit from `permits`; when none are left new
/// connections wait in the accept backlog.
pub(crate) async fn run_client_listener(
    listener: TcpListener,
    router: CommandRouter,
    permits: Arc<Semaphore>,
    limits: ClientLimits,
    mut shutdown: watch::Receiver<bool>,
) {
    if let Ok(addr) = listener.local_addr() {
        info!("Client commands listening on {}", addr);
    }

    loop {
        let permit = tokio::select! {
            permit = permits.clone().acquire_owned() => match permit {
                Ok(p) => p,
                Err(_) => break,
            },
            _ = shutdown.changed() => break,
        };

        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, peer_addr)) => {
                        debug!("Client connected: {}", peer_addr);
                        let router = router.clone();
                        let shutdown = shutdown.clone();
                        tokio::spawn(async move {
                            if let Err(e) = serve_client(stream, peer_addr, router, limits, shutdown).await {
                                warn!("Client {} error: {}", peer_addr, e);
                            }
                            drop(permit);
                        });
                    }
                    Err(e) => warn!("Client accept error: {}", e),
                }
            }
            _ = shutdown.changed() => break,
        }
    }

    debug!("Client listener shutting down");
}

/// Serve one client: read a command, write a reply, repeat until EOF.
async fn serve_client(
    stream: TcpStream,
    peer_addr: SocketAddr,
    router: CommandRouter,
    limits: ClientLimits,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), FrameError> {
    let mut conn = FramedStream::new(stream, peer_addr, limits.max_message_size);

    loop {
        let frame = tokio::select! {
            result = tokio::time::timeout(limits.idle_timeout, conn.read_frame()) => {
                match result {
                    Ok(frame) => frame?,
                    Err(_) => {
                        debug!("Client {} idle, closing", peer_addr);
                        break;
                    }
                }
            }
            _ = shutdown.changed() => break,
        };

        let Some(frame) = frame else {
            debug!("Client disconnected: {}", peer_addr);
            break;
        };

        let reply = router.handle(&frame).await.into_frame()?;
        with_deadline(limits.idle_timeout, conn.write_frame(&reply)).await?;
    }

    Ok(())
}
