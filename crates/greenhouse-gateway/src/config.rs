// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Gateway configuration.
//!
//! Loaded from TOML; every field has a default so an empty file is valid.

use greenhouse_proto::{
    DEFAULT_CLIENT_PORT, DEFAULT_DISCOVERY_PORT, DEFAULT_MAX_FRAME_SIZE, DEFAULT_MULTICAST_GROUP,
    DEFAULT_STATUS_PORT,
};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
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

/// Gateway configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Address the TCP listeners bind to.
    #[serde(default = "default_bind_address")]
    pub bind_address: IpAddr,

    /// TCP port serving client commands.
    #[serde(default = "default_client_port")]
    pub client_port: u16,

    /// TCP port receiving status snapshots.
    #[serde(default = "default_status_port")]
    pub status_port: u16,

    /// Discovery multicast group.
    #[serde(default = "default_multicast_group")]
    pub multicast_group: Ipv4Addr,

    /// Discovery UDP port.
    #[serde(default = "default_discovery_port")]
    pub discovery_port: u16,

    /// Interface used to join the multicast group (0.0.0.0 = any).
    #[serde(default = "default_multicast_interface")]
    pub multicast_interface: Ipv4Addr,

    /// Host to reach devices on. When unset, the source IP of the
    /// registration datagram is used.
    #[serde(default)]
    pub device_host: Option<IpAddr>,

    /// Evict devices not heard from for this long (0 = never).
    #[serde(default = "default_lease_duration")]
    pub lease_duration_secs: u64,

    /// How often expired devices are evicted.
    #[serde(default = "default_lease_check_interval")]
    pub lease_check_interval_secs: u64,

    /// Maximum concurrently served TCP connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// Deadline for a proxied device exchange (connect + send + reply).
    #[serde(default = "default_device_timeout_ms")]
    pub device_timeout_ms: u64,

    /// Close client connections idle for this long.
    #[serde(default = "default_client_idle_timeout")]
    pub client_idle_timeout_secs: u64,

    /// Deadline for each status snapshot read from a reporter.
    #[serde(default = "default_status_read_timeout_ms")]
    pub status_read_timeout_ms: u64,

    /// Maximum framed message size (bytes).
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,

    /// SQLite file recording every registration (unset = disabled).
    #[serde(default)]
    pub registry_db: Option<PathBuf>,
}

fn default_bind_address() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_client_port() -> u16 {
    DEFAULT_CLIENT_PORT
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

fn default_lease_duration() -> u64 {
    180
}

fn default_lease_check_interval() -> u64 {
    30
}

fn default_max_connections() -> usize {
    256
}

fn default_device_timeout_ms() -> u64 {
    5000
}

fn default_client_idle_timeout() -> u64 {
    300
}

fn default_status_read_timeout_ms() -> u64 {
    10_000
}

fn default_max_message_size() -> usize {
    DEFAULT_MAX_FRAME_SIZE
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            client_port: default_client_port(),
            status_port: default_status_port(),
            multicast_group: default_multicast_group(),
            discovery_port: default_discovery_port(),
            multicast_interface: default_multicast_interface(),
            device_host: None,
            lease_duration_secs: default_lease_duration(),
            lease_check_interval_secs: default_lease_check_interval(),
            max_connections: default_max_connections(),
            device_timeout_ms: default_device_timeout_ms(),
            client_idle_timeout_secs: default_client_idle_timeout(),
            status_read_timeout_ms: default_status_read_timeout_ms(),
            max_message_size: default_max_message_size(),
            registry_db: None,
        }
    }
}

impl GatewayConfig {
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

    /// Configuration bound to loopback with OS-assigned ports.
    pub fn ephemeral() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            client_port: 0,
            status_port: 0,
            discovery_port: 0,
            ..Default::default()
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.multicast_group.is_multicast() {
            return Err(ConfigError::Invalid(format!(
                "{} is not a multicast address",
                self.multicast_group
            )));
        }
        if self.max_connections == 0 {
            return Err(ConfigError::Invalid("max_connections cannot be 0".into()));
        }
        if self.device_timeout_ms == 0 {
            return Err(ConfigError::Invalid("device_timeout_ms cannot be 0".into()));
        }
        if self.client_idle_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "client_idle_timeout_secs cannot be 0".into(),
            ));
        }
        if self.status_read_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "status_read_timeout_ms cannot be 0".into(),
            ));
        }
        if self.lease_duration_secs > 0 && self.lease_check_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "lease_check_interval_secs cannot be 0 when leases are enabled".into(),
            ));
        }
        if self.max_message_size < 64 {
            return Err(ConfigError::Invalid(format!(
                "max_message_size too small: {}",
                self.max_message_size
            )));
        }
        Ok(())
    }

    pub fn client_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.client_port)
    }

    pub fn status_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.status_port)
    }

    /// `None` when leases are disabled.
    pub fn lease_duration(&self) -> Option<Duration> {
        (self.lease_duration_secs > 0).then(|| Duration::from_secs(self.lease_duration_secs))
    }

    pub fn lease_check_interval(&self) -> Duration {
        Duration::from_secs(self.lease_check_interval_secs)
    }

    pub fn device_timeout(&self) -> Duration {
        Duration::from_millis(self.device_timeout_ms)
    }

    pub fn client_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.client_idle_timeout_secs)
    }

    pub fn status_read_timeout(&self) -> Duration {
        Duration::from_millis(self.status_read_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = GatewayConfig::default();
        assert_eq!(config.client_port, 50002);
        assert_eq!(config.status_port, 50001);
        assert_eq!(config.discovery_port, 50010);
        assert_eq!(config.multicast_group, Ipv4Addr::new(224, 1, 1, 1));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let config: GatewayConfig = toml::from_str("").unwrap();
        assert_eq!(config, GatewayConfig::default());
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = GatewayConfig {
            registry_db: Some(PathBuf::from("/tmp/devices.db")),
            device_host: Some("127.0.0.1".parse().unwrap()),
            ..Default::default()
        };
        let text = config.to_toml().unwrap();
        let parsed: GatewayConfig = toml::from_str(&text).unwrap();
        assert_eq!(config, parsed);
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "client_port = 6000\nlease_duration_secs = 0").unwrap();

        let config = GatewayConfig::from_file(file.path()).unwrap();
        assert_eq!(config.client_port, 6000);
        assert_eq!(config.lease_duration(), None);
    }

    #[test]
    fn test_validation_rejects_unicast_group() {
        let config = GatewayConfig {
            multicast_group: Ipv4Addr::new(10, 0, 0, 1),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_zero_connections() {
        let config = GatewayConfig {
            max_connections: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_zero_timeouts() {
        let idle = GatewayConfig {
            client_idle_timeout_secs: 0,
            ..Default::default()
        };
        assert!(matches!(idle.validate(), Err(ConfigError::Invalid(_))));

        let status = GatewayConfig {
            status_read_timeout_ms: 0,
            ..Default::default()
        };
        assert!(matches!(status.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_durations() {
        let config = GatewayConfig::default();
        assert_eq!(config.lease_duration(), Some(Duration::from_secs(180)));
        assert_eq!(config.device_timeout(), Duration::from_secs(5));
        assert_eq!(config.status_read_timeout(), Duration::from_secs(10));
    }
}
