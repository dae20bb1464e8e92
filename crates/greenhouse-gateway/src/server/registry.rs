// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Routing table: device name -> network address.

use greenhouse_proto::{DeviceKind, Feature};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// A registered device.
#[derive(Debug, Clone)]
pub struct DeviceRecord {
    /// Name as announced by the device.
    pub name: String,

    pub kind: DeviceKind,

    /// Feature category, if the device reported one.
    pub feature: Option<Feature>,

    /// Where the device accepts commands.
    pub address: SocketAddr,

    /// Last registration or heartbeat.
    pub last_seen: Instant,

    /// First registration.
    pub registered_at: Instant,
}

impl DeviceRecord {
    pub fn new(name: impl Into<String>, kind: DeviceKind, address: SocketAddr) -> Self {
        let now = Instant::now();
        Self {
            name: name.into(),
            kind,
            feature: None,
            address,
            last_seen: now,
            registered_at: now,
        }
    }

    /// Check if the lease has expired.
    pub fn is_expired(&self, lease_duration: Duration) -> bool {
        self.last_seen.elapsed() > lease_duration
    }
}

/// Outcome of [`DeviceRegistry::upsert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Inserted,
    /// Known device, address unchanged.
    Refreshed,
    /// Known device announcing a new address.
    Moved { previous: SocketAddr },
}

/// Device routing table.
///
/// Keys are case-insensitive: `"Heater"` and `"heater"` name the same
/// device. Conflicting registrations are last-writer-wins.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: HashMap<String, DeviceRecord>,
}

fn key(name: &str) -> String {
    name.trim().to_ascii_lowercase()
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or overwrite a device.
    ///
    /// The first registration time survives re-registration; everything
    /// else is replaced.
    pub fn upsert(&mut self, mut record: DeviceRecord) -> Upsert {
        match self.devices.get_mut(&key(&record.name)) {
            Some(existing) => {
                let previous = existing.address;
                record.registered_at = existing.registered_at;
                *existing = record;
                if previous == existing.address {
                    Upsert::Refreshed
                } else {
                    Upsert::Moved { previous }
                }
            }
            None => {
                self.devices.insert(key(&record.name), record);
                Upsert::Inserted
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&DeviceRecord> {
        self.devices.get(&key(name))
    }

    /// Current address of a device.
    pub fn address_of(&self, name: &str) -> Option<SocketAddr> {
        self.get(name).map(|r| r.address)
    }

    pub fn remove(&mut self, name: &str) -> Option<DeviceRecord> {
        self.devices.remove(&key(name))
    }

    /// Remove devices whose lease expired and return their names.
    pub fn remove_expired(&mut self, lease_duration: Duration) -> Vec<String> {
        let expired: Vec<String> = self
            .devices
            .iter()
            .filter(|(_, record)| record.is_expired(lease_duration))
            .map(|(k, _)| k.clone())
            .collect();

        expired
            .iter()
            .filter_map(|k| self.devices.remove(k))
            .map(|record| record.name)
            .collect()
    }

    pub fn devices(&self) -> impl Iterator<Item = &DeviceRecord> {
        self.devices.values()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}
