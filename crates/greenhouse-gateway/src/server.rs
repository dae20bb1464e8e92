// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Gateway core.

use crate::config::GatewayConfig;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::{watch, RwLock, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, info};

pub mod discovery;
pub mod registry;
pub mod router;
pub mod sink;
pub mod status;

use discovery::DiscoveryContext;
pub use registry::{DeviceRecord, DeviceRegistry};
pub use router::{CommandRouter, Reply};
pub use sink::{NullSink, RegistrationSink, SinkError, SqliteSink};
pub use status::StatusCache;

/// Gateway error types.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Registration sink error: {0}")]
    Sink(#[from] SinkError),

    #[error("Gateway already running")]
    AlreadyRunning,
}

/// Greenhouse gateway: routing table, status cache and the three
/// endpoints that read and write them.
#[derive(Clone)]
pub struct Gateway {
    config: Arc<GatewayConfig>,
    registry: Arc<RwLock<DeviceRegistry>>,
    cache: Arc<StatusCache>,
    sink: Arc<dyn RegistrationSink>,
    running: Arc<std::sync::atomic::AtomicBool>,
}

impl Gateway {
    /// Create a gateway; opens the registration store if one is configured.
    pub fn new(config: GatewayConfig) -> Result<Self, GatewayError> {
        config.validate()?;

        let sink: Arc<dyn RegistrationSink> = match &config.registry_db {
            Some(path) => {
                info!("Recording registrations in {:?}", path);
                Arc::new(SqliteSink::open(path)?)
            }
            None => Arc::new(NullSink),
        };

        Ok(Self::with_sink(config, sink))
    }

    /// Create a gateway writing registrations to `sink`.
    pub fn with_sink(config: GatewayConfig, sink: Arc<dyn RegistrationSink>) -> Self {
        Self {
            config: Arc::new(config),
            registry: Arc::new(RwLock::new(DeviceRegistry::new())),
            cache: Arc::new(StatusCache::new()),
            sink,
            running: Arc::new(std::sync::atomic::AtomicBool::new(false)),
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<RwLock<DeviceRegistry>> {
        &self.registry
    }

    pub fn cache(&self) -> &Arc<StatusCache> {
        &self.cache
    }

    /// Command router over this gateway's state.
    pub fn router(&self) -> CommandRouter {
        CommandRouter::new(
            self.registry.clone(),
            self.cache.clone(),
            self.config.device_timeout(),
        )
    }

    /// Bind every endpoint and spawn the background tasks.
    ///
    /// Returns once all sockets are bound; the returned handle reports the
    /// actual addresses (useful with port 0).
    pub async fn start(&self) -> Result<GatewayHandle, GatewayError> {
        use std::sync::atomic::Ordering;

        if self.running.swap(true, Ordering::SeqCst) {
            return Err(GatewayError::AlreadyRunning);
        }

        match self.spawn_tasks().await {
            Ok(handle) => Ok(handle),
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                Err(e)
            }
        }
    }

    async fn spawn_tasks(&self) -> Result<GatewayHandle, GatewayError> {
        let config = &self.config;

        let discovery_socket = discovery::bind_discovery_socket(
            config.bind_address,
            config.discovery_port,
            config.multicast_group,
            config.multicast_interface,
        )?;
        let status_listener = TcpListener::bind(config.status_addr()).await?;
        let client_listener = TcpListener::bind(config.client_addr()).await?;

        let discovery_addr = discovery_socket.local_addr()?;
        let status_addr = status_listener.local_addr()?;
        let client_addr = client_listener.local_addr()?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut tasks = Vec::with_capacity(4);

        let ctx = DiscoveryContext {
            registry: self.registry.clone(),
            sink: self.sink.clone(),
            device_host: config.device_host,
        };
        tasks.push(tokio::spawn(discovery::run_discovery(
            discovery_socket,
            ctx,
            shutdown_rx.clone(),
        )));

        tasks.push(tokio::spawn(status::run_status_listener(
            status_listener,
            self.cache.clone(),
            Arc::new(Semaphore::new(config.max_connections)),
            status::IngestLimits {
                max_message_size: config.max_message_size,
                read_timeout: config.status_read_timeout(),
            },
            shutdown_rx.clone(),
        )));

        tasks.push(tokio::spawn(router::run_client_listener(
            client_listener,
            self.router(),
            Arc::new(Semaphore::new(config.max_connections)),
            router::ClientLimits {
                max_message_size: config.max_message_size,
                idle_timeout: config.client_idle_timeout(),
            },
            shutdown_rx.clone(),
        )));

        if let Some(lease) = config.lease_duration() {
            tasks.push(tokio::spawn(run_lease_reaper(
                self.registry.clone(),
                lease,
                config.lease_check_interval(),
                shutdown_rx,
            )));
        } else {
            debug!("Device leases disabled");
        }

        Ok(GatewayHandle {
            discovery_addr,
            status_addr,
            client_addr,
            shutdown: shutdown_tx,
            tasks,
            running: self.running.clone(),
        })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(std::sync::atomic::Ordering::SeqCst)
    }

    /// Number of registered devices.
    pub async fn device_count(&self) -> usize {
        self.registry.read().await.len()
    }
}

/// Evict devices whose lease expired.
async fn run_lease_reaper(
    registry: Arc<RwLock<DeviceRegistry>>,
    lease_duration: Duration,
    check_interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(check_interval) => {
                let expired = registry.write().await.remove_expired(lease_duration);
                if !expired.is_empty() {
                    info!("Removed {} expired devices", expired.len());
                    for name in &expired {
                        debug!("  - {}", name);
                    }
                }
            }
            _ = shutdown.changed() => {
                debug!("Lease reaper shutting down");
                break;
            }
        }
    }
}

/// Handle to a started gateway.
pub struct GatewayHandle {
    discovery_addr: SocketAddr,
    status_addr: SocketAddr,
    client_addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
    running: Arc<std::sync::atomic::AtomicBool>,
}

impl GatewayHandle {
    /// Bound discovery (UDP) address.
    pub fn discovery_addr(&self) -> SocketAddr {
        self.discovery_addr
    }

    /// Bound status ingest (TCP) address.
    pub fn status_addr(&self) -> SocketAddr {
        self.status_addr
    }

    /// Bound client command (TCP) address.
    pub fn client_addr(&self) -> SocketAddr {
        self.client_addr
    }

    /// Signal every task to stop and wait for them.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for task in self.tasks {
            let _ = task.await;
        }
        self.running
            .store(false, std::sync::atomic::Ordering::SeqCst);
        info!("Gateway stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_new_rejects_invalid_config() {
        let config = GatewayConfig {
            max_connections: 0,
            ..GatewayConfig::ephemeral()
        };
        assert!(matches!(
            Gateway::new(config),
            Err(GatewayError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_start_binds_ephemeral_ports() {
        let gateway = Gateway::new(GatewayConfig::ephemeral()).unwrap();
        let handle = gateway.start().await.unwrap();

        assert!(gateway.is_running());
        assert_ne!(handle.client_addr().port(), 0);
        assert_ne!(handle.status_addr().port(), 0);
        assert_ne!(handle.discovery_addr().port(), 0);

        handle.shutdown().await;
        assert!(!gateway.is_running());
    }

    #[tokio::test]
    async fn test_double_start_rejected() {
        let gateway = Gateway::new(GatewayConfig::ephemeral()).unwrap();
        let handle = gateway.start().await.unwrap();

        assert!(matches!(
            gateway.start().await,
            Err(GatewayError::AlreadyRunning)
        ));
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_lease_reaper_evicts() {
        let registry = Arc::new(RwLock::new(DeviceRegistry::new()));
        let mut stale = DeviceRecord::new(
            "Irrigator",
            greenhouse_proto::DeviceKind::Actuator,
            "127.0.0.1:6005".parse().unwrap(),
        );
        stale.last_seen = std::time::Instant::now() - Duration::from_secs(10);
        registry.write().await.upsert(stale);

        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn(run_lease_reaper(
            registry.clone(),
            Duration::from_secs(1),
            Duration::from_millis(10),
            rx,
        ));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(registry.read().await.is_empty());

        tx.send(true).unwrap();
        task.await.unwrap();
    }
}
