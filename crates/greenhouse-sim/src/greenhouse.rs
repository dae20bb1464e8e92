// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Device set shared by the tick task, the reporter and command workers.

use crate::config::DeviceSpec;
use crate::device::Device;
use crate::physics::PhysicsEngine;
use greenhouse_proto::{Command, DeviceStatus, StatusSnapshot};
use parking_lot::Mutex;
use rand::Rng;

/// All simulated devices behind one lock.
///
/// Every method holds the lock only for the read-modify-write it performs;
/// nothing here does I/O.
#[derive(Debug)]
pub struct Greenhouse {
    devices: Mutex<Vec<Device>>,
}

impl Greenhouse {
    pub fn new(devices: Vec<Device>) -> Self {
        Self {
            devices: Mutex::new(devices),
        }
    }

    pub fn from_specs(specs: &[DeviceSpec]) -> Self {
        Self::new(specs.iter().map(DeviceSpec::build).collect())
    }

    pub fn len(&self) -> usize {
        self.devices.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.lock().is_empty()
    }

    /// Index of a device by (case-insensitive) name.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.devices
            .lock()
            .iter()
            .position(|d| d.name().eq_ignore_ascii_case(name))
    }

    pub fn status(&self, index: usize) -> Option<DeviceStatus> {
        self.devices.lock().get(index).map(Device::current_status)
    }

    /// Run a command against one device.
    pub fn apply_command(&self, index: usize, command: &Command) -> Option<StatusSnapshot> {
        self.devices
            .lock()
            .get_mut(index)
            .map(|d| d.apply_command(command))
    }

    /// Full snapshot of every device, in configuration order.
    pub fn snapshot(&self) -> StatusSnapshot {
        let statuses = self
            .devices
            .lock()
            .iter()
            .map(Device::current_status)
            .collect();
        StatusSnapshot::with_statuses(String::new(), statuses)
    }

    /// Advance the physics by one tick.
    pub fn tick<R: Rng>(&self, engine: &mut PhysicsEngine<R>) {
        engine.tick(&mut self.devices.lock());
    }
}
