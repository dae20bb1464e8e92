// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Simulator configuration.

use crate::device::Device;
use crate::physics::PhysicsParams;
use greenhouse_proto::{
    DeviceKind, Feature, DEFAULT_DISCOVERY_PORT, DEFAULT_MAX_FRAME_SIZE, DEFAULT_MULTICAST_GROUP,
    DEFAULT_STATUS_PORT,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// One simulated device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceSpec {
    pub name: String,
    pub kind: DeviceKind,
    pub feature: Feature,
    /// TCP command port (0 = OS-assigned).
    pub port: u16,
    #[serde(default)]
    pub unit: String,
    /// Starting reading (sensors only).
    #[serde(default)]
    pub initial: f32,
}

impl DeviceSpec {
    pub fn sensor(name: &str, feature: Feature, port: u16, initial: f32, unit: &str) -> Self {
        Self {
            name: name.into(),
            kind: DeviceKind::Sensor,
            feature,
            port,
            unit: unit.into(),
            initial,
        }
    }

    pub fn actuator(name: &str, feature: Feature, port: u16, unit: &str) -> Self {
        Self {
            name: name.into(),
            kind: DeviceKind::Actuator,
            feature,
            port,
            unit: unit.into(),
            initial: 0.0,
        }
    }

    /// Build the device in its initial state.
    pub fn build(&self) -> Device {
        match self.kind {
            DeviceKind::Sensor => {
                Device::sensor(&self.name, self.feature, self.initial, &self.unit)
            }
            DeviceKind::Actuator => Device::actuator(&self.name, self.feature, &self.unit),
        }
    }
}

/// Simulator configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimConfig {
    /// Address device listeners bind to.
    #[serde(default = "default_bind_address")]
    pub bind_address: IpAddr,

    /// Gateway host receiving status pushes.
    #[serde(default = "default_gateway_host")]
    pub gateway_host: IpAddr,

    #[serde(default = "default_status_port")]
    pub status_port: u16,

    #[serde(default = "default_multicast_group")]
    pub multicast_group: Ipv4Addr,

    #[serde(default = "default_discovery_port")]
    pub discovery_port: u16,

    /// Interface for outgoing multicast (0.0.0.0 = OS default).
    #[serde(default = "default_multicast_interface")]
    pub multicast_interface: Ipv4Addr,

    /// Send registrations here instead of the multicast group.
    #[serde(default)]
    pub discovery_address: Option<SocketAddr>,

    /// Wait this long for a registration confirmation.
    #[serde(default = "default_registration_timeout")]
    pub registration_timeout_ms: u64,

    /// Re-announce interval once registered.
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,

    /// First registration retry delay; doubles per failed attempt.
    #[serde(default = "default_registration_backoff_base")]
    pub registration_backoff_base_ms: u64,

    /// Cap for the registration retry backoff.
    #[serde(default = "default_registration_backoff_max")]
    pub registration_backoff_max_ms: u64,

    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,

    #[serde(default = "default_report_interval")]
    pub report_interval_ms: u64,

    /// First retry delay after a failed status push.
    #[serde(default = "default_report_retry")]
    pub report_retry_ms: u64,

    /// Deadline for connecting and sending one status push.
    #[serde(default = "default_io_timeout")]
    pub io_timeout_ms: u64,

    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,

    /// Seed for the noise generator (unset = entropy).
    #[serde(default)]
    pub seed: Option<u64>,

    #[serde(default)]
    pub physics: PhysicsParams,

    #[serde(default = "default_devices")]
    pub devices: Vec<DeviceSpec>,
}

fn default_bind_address() -> IpAddr {
    IpAddr::V4(Ipv4Addr::LOCALHOST)
}

fn default_gateway_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::LOCALHOST)
}

fn default_status_port() -> u16 {
    DEFAULT_STATUS_PORT
}

fn default_multicast_group() -> Ipv4Addr {
    DEFAULT_MULTICAST_GROUP
}

fn default_discovery_port() -> u16 {
    DEFAULT_DISCOVERY_PORT
}

fn default_multicast_interface() -> Ipv4Addr {
    Ipv4Addr::UNSPECIFIED
}

fn default_registration_timeout() -> u64 {
    5000
}

fn default_heartbeat_interval() -> u64 {
    60
}

fn default_registration_backoff_base() -> u64 {
    1000
}

fn default_registration_backoff_max() -> u64 {
    30_000
}

fn default_tick_interval() -> u64 {
    1000
}

fn default_report_interval() -> u64 {
    2000
}

fn default_report_retry() -> u64 {
    1000
}

fn default_io_timeout() -> u64 {
    5000
}

fn default_max_message_size() -> usize {
    DEFAULT_MAX_FRAME_SIZE
}

/// The eight-device greenhouse.
pub fn default_devices() -> Vec<DeviceSpec> {
    vec![
        DeviceSpec::sensor("Temperature", Feature::Temperature, 6001, 22.0, "°C"),
        DeviceSpec::sensor("Humidity", Feature::Humidity, 6003, 60.0, "%"),
        DeviceSpec::sensor("Light", Feature::Light, 6004, 75.0, "lux"),
        DeviceSpec::actuator("Irrigator", Feature::Humidity, 6005, "L/h"),
        DeviceSpec::actuator("Heater", Feature::Temperature, 6006, "°C"),
        DeviceSpec::actuator("Cooler", Feature::Temperature, 6007, "°C"),
        DeviceSpec::actuator("Lamps", Feature::Light, 6008, "lux"),
        DeviceSpec::actuator("Curtains", Feature::Light, 6009, "%"),
    ]
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            gateway_host: default_gateway_host(),
            status_port: default_status_port(),
            multicast_group: default_multicast_group(),
            discovery_port: default_discovery_port(),
            multicast_interface: default_multicast_interface(),
            discovery_address: None,
            registration_timeout_ms: default_registration_timeout(),
            heartbeat_interval_secs: default_heartbeat_interval(),
            registration_backoff_base_ms: default_registration_backoff_base(),
            registration_backoff_max_ms: default_registration_backoff_max(),
            tick_interval_ms: default_tick_interval(),
            report_interval_ms: default_report_interval(),
            report_retry_ms: default_report_retry(),
            io_timeout_ms: default_io_timeout(),
            max_message_size: default_max_message_size(),
            seed: None,
            physics: PhysicsParams::default(),
            devices: default_devices(),
        }
    }
}

impl SimConfig {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Render as TOML.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.devices.is_empty() {
            return Err(ConfigError::Invalid("no devices configured".into()));
        }

        let mut names = HashSet::new();
        let mut ports = HashSet::new();
        for device in &self.devices {
            if device.name.trim().is_empty() {
                return Err(ConfigError::Invalid("device with an empty name".into()));
            }
            if device.name.trim() != device.name {
                return Err(ConfigError::Invalid(format!(
                    "device name {:?} has surrounding whitespace",
                    device.name
                )));
            }
            if !names.insert(device.name.to_ascii_lowercase()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate device name: {}",
                    device.name
                )));
            }
            if device.port != 0 && !ports.insert(device.port) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate device port: {}",
                    device.port
                )));
            }
        }

        if self.discovery_address.is_none() && !self.multicast_group.is_multicast() {
            return Err(ConfigError::Invalid(format!(
                "{} is not a multicast address",
                self.multicast_group
            )));
        }

        for (name, value) in [
            ("registration_timeout_ms", self.registration_timeout_ms),
            ("heartbeat_interval_secs", self.heartbeat_interval_secs),
            ("registration_backoff_base_ms", self.registration_backoff_base_ms),
            ("tick_interval_ms", self.tick_interval_ms),
            ("report_interval_ms", self.report_interval_ms),
            ("report_retry_ms", self.report_retry_ms),
            ("io_timeout_ms", self.io_timeout_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{} cannot be 0", name)));
            }
        }

        Ok(())
    }

    /// Where registrations are sent.
    pub fn discovery_target(&self) -> SocketAddr {
        self.discovery_address.unwrap_or_else(|| {
            SocketAddr::new(IpAddr::V4(self.multicast_group), self.discovery_port)
        })
    }

    pub fn status_addr(&self) -> SocketAddr {
        SocketAddr::new(self.gateway_host, self.status_port)
    }

    pub fn registration_timeout(&self) -> Duration {
        Duration::from_millis(self.registration_timeout_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn registration_backoff_base(&self) -> Duration {
        Duration::from_millis(self.registration_backoff_base_ms)
    }

    pub fn registration_backoff_max(&self) -> Duration {
        Duration::from_millis(self.registration_backoff_max_ms)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_millis(self.report_interval_ms)
    }

    pub fn report_retry(&self) -> Duration {
        Duration::from_millis(self.report_retry_ms)
    }

    pub fn io_timeout(&self) -> Duration {
        Duration::from_millis(self.io_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_deployment() {
        let config = SimConfig::default();
        assert_eq!(config.devices.len(), 8);
        assert_eq!(config.status_addr(), "127.0.0.1:50001".parse().unwrap());
        assert_eq!(config.discovery_target(), "224.1.1.1:50010".parse().unwrap());
        assert!(config.validate().is_ok());

        let heater = config.devices.iter().find(|d| d.name == "Heater").unwrap();
        assert_eq!(heater.port, 6006);
        assert_eq!(heater.kind, DeviceKind::Actuator);
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let config: SimConfig = toml::from_str("").unwrap();
        assert_eq!(config, SimConfig::default());
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = SimConfig {
            seed: Some(11),
            discovery_address: Some("127.0.0.1:50010".parse().unwrap()),
            ..Default::default()
        };
        let parsed: SimConfig = toml::from_str(&config.to_toml().unwrap()).unwrap();
        assert_eq!(config, parsed);
    }

    #[test]
    fn test_from_file_custom_devices() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
seed = 5

[[devices]]
name = "Humidity"
kind = "Sensor"
feature = "Humidity"
port = 7003
unit = "%"
initial = 55.0

[[devices]]
name = "Irrigator"
kind = "Actuator"
feature = "Humidity"
port = 7005
unit = "L/h"
"#
        )
        .unwrap();

        let config = SimConfig::from_file(file.path()).unwrap();
        assert_eq!(config.devices.len(), 2);
        assert_eq!(config.devices[0].initial, 55.0);
        assert_eq!(config.seed, Some(5));
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let mut config = SimConfig::default();
        config.devices.push(DeviceSpec::actuator("heater", Feature::Temperature, 7000, "°C"));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_padded_name_rejected() {
        let mut config = SimConfig::default();
        config.devices[0].name = " Temperature ".into();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_duplicate_ports_rejected() {
        let mut config = SimConfig::default();
        config.devices.push(DeviceSpec::actuator("Fan", Feature::Temperature, 6006, "rpm"));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_spec_builds_initial_state() {
        let spec = DeviceSpec::sensor("Light", Feature::Light, 6004, 75.0, "lux");
        let status = spec.build().current_status();
        assert_eq!(status.value, 75.0);
        assert_eq!(status.unit, "lux");
    }
}
