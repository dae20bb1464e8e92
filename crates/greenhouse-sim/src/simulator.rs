// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Simulator runtime: listeners, registration loops, physics tick and
//! status reporter for every configured device.

use crate::config::{ConfigError, SimConfig};
use crate::discovery::{self, RegistrationSchedule, RegistrationState};
use crate::greenhouse::Greenhouse;
use crate::listener;
use crate::physics::PhysicsEngine;
use crate::reporter::{self, ReportSchedule};
use greenhouse_proto::DeviceRegistration;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum SimError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Cannot bind {name} on {addr}: {source}")]
    Bind {
        name: String,
        addr: SocketAddr,
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A running device as seen from outside.
#[derive(Debug, Clone)]
pub struct DeviceEndpoint {
    pub name: String,
    pub addr: SocketAddr,
    pub state: watch::Receiver<RegistrationState>,
}

impl DeviceEndpoint {
    pub fn is_registered(&self) -> bool {
        *self.state.borrow() == RegistrationState::Registered
    }
}

pub struct Simulator {
    config: SimConfig,
    greenhouse: Arc<Greenhouse>,
}

impl Simulator {
    pub fn new(config: SimConfig) -> Result<Self, SimError> {
        config.validate()?;
        let greenhouse = Arc::new(Greenhouse::from_specs(&config.devices));
        Ok(Self { config, greenhouse })
    }

    pub fn greenhouse(&self) -> &Arc<Greenhouse> {
        &self.greenhouse
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Bind every device listener and start all tasks.
    pub async fn start(&self) -> Result<SimHandle, SimError> {
        let config = &self.config;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut tasks = Vec::new();
        let mut endpoints = Vec::with_capacity(config.devices.len());

        let schedule = RegistrationSchedule {
            response_timeout: config.registration_timeout(),
            heartbeat: config.heartbeat_interval(),
            backoff_base: config.registration_backoff_base(),
            backoff_max: config.registration_backoff_max(),
        };
        let target = config.discovery_target();

        for (index, spec) in config.devices.iter().enumerate() {
            let bind = SocketAddr::new(config.bind_address, spec.port);
            let listener = TcpListener::bind(bind).await.map_err(|source| SimError::Bind {
                name: spec.name.clone(),
                addr: bind,
                source,
            })?;
            let addr = listener.local_addr()?;

            tasks.push(tokio::spawn(listener::run_device_listener(
                listener,
                self.greenhouse.clone(),
                index,
                config.max_message_size,
                config.io_timeout(),
                shutdown_rx.clone(),
            )));

            // Announce the bound port so port 0 works.
            let registration =
                DeviceRegistration::new(&spec.name, spec.kind, addr.port()).with_feature(spec.feature);
            let (state_tx, state_rx) = watch::channel(RegistrationState::Unregistered);
            tasks.push(tokio::spawn(discovery::run_registration(
                registration,
                target,
                config.multicast_interface,
                schedule,
                shutdown_rx.clone(),
                state_tx,
            )));

            endpoints.push(DeviceEndpoint {
                name: spec.name.clone(),
                addr,
                state: state_rx,
            });
        }

        tasks.push(tokio::spawn(run_physics(
            self.greenhouse.clone(),
            PhysicsEngine::new(config.physics.clone(), self.rng()),
            config.tick_interval(),
            shutdown_rx.clone(),
        )));

        tasks.push(tokio::spawn(reporter::run_reporter(
            self.greenhouse.clone(),
            config.status_addr(),
            ReportSchedule {
                interval: config.report_interval(),
                retry: config.report_retry(),
                io_timeout: config.io_timeout(),
            },
            shutdown_rx,
        )));

        info!(
            "Simulating {} devices, reporting to {}",
            endpoints.len(),
            config.status_addr()
        );

        Ok(SimHandle {
            endpoints,
            shutdown: shutdown_tx,
            tasks,
        })
    }

    fn rng(&self) -> StdRng {
        match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }
    }
}

async fn run_physics(
    greenhouse: Arc<Greenhouse>,
    mut engine: PhysicsEngine<StdRng>,
    tick: std::time::Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval(tick);
    interval.tick().await;

    loop {
        tokio::select! {
            _ = interval.tick() => greenhouse.tick(&mut engine),
            _ = shutdown.changed() => {
                debug!("Physics shutting down");
                break;
            }
        }
    }
}

/// Handle to a running simulator.
pub struct SimHandle {
    endpoints: Vec<DeviceEndpoint>,
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl SimHandle {
    pub fn endpoints(&self) -> &[DeviceEndpoint] {
        &self.endpoints
    }

    /// Endpoint of a device by (case-insensitive) name.
    pub fn endpoint(&self, name: &str) -> Option<&DeviceEndpoint> {
        self.endpoints
            .iter()
            .find(|e| e.name.eq_ignore_ascii_case(name))
    }

    /// Stop every task and wait for them.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for task in self.tasks {
            let _ = task.await;
        }
        info!("Simulator stopped");
    }
}
