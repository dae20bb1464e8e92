// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Greenhouse message definitions.
//!
//! Every message is a self-describing JSON document. Fields are keyed by
//! name and optional fields default when absent, so peers built against an
//! older schema keep decoding newer messages.
//!
//! ```text
//! DeviceRegistration       {"name":"Heater","kind":"Actuator","port":6006}
//! RegistrationConfirmation {"status":"registered","device":"Heater"}
//! Command                  {"verb":"SET","device_category":"Actuator","feature":"temperature","actuator":"heater","value":30.0}
//! StatusSnapshot           {"response_text":"...","statuses":[DeviceStatus, ...]}
//! ```

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Protocol error types.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("Serialize error: {0}")]
    Serialize(String),

    #[error("Unknown feature: {0}")]
    UnknownFeature(String),

    #[error("Unknown device kind: {0}")]
    UnknownKind(String),

    #[error("Missing target: {0}")]
    MissingTarget(&'static str),
}

/// JSON encoding shared by all greenhouse messages.
pub trait WireMessage: Serialize + DeserializeOwned {
    /// Serialize to bytes.
    fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(self).map_err(|e| ProtocolError::Serialize(e.to_string()))
    }

    /// Deserialize from bytes.
    fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        serde_json::from_slice(bytes).map_err(|e| ProtocolError::InvalidMessage(e.to_string()))
    }
}

/// Sensor or actuator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceKind {
    #[serde(alias = "sensor")]
    Sensor,
    #[serde(alias = "actuator")]
    Actuator,
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sensor => write!(f, "Sensor"),
            Self::Actuator => write!(f, "Actuator"),
        }
    }
}

impl FromStr for DeviceKind {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sensor" => Ok(Self::Sensor),
            "actuator" => Ok(Self::Actuator),
            _ => Err(ProtocolError::UnknownKind(s.to_string())),
        }
    }
}

/// Physical category grouping one sensor and its actuators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Feature {
    #[serde(alias = "humidity")]
    Humidity,
    #[serde(alias = "temperature")]
    Temperature,
    #[serde(alias = "light")]
    Light,
}

impl Feature {
    pub const ALL: [Feature; 3] = [Feature::Humidity, Feature::Temperature, Feature::Light];
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Humidity => write!(f, "Humidity"),
            Self::Temperature => write!(f, "Temperature"),
            Self::Light => write!(f, "Light"),
        }
    }
}

impl FromStr for Feature {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "humidity" => Ok(Self::Humidity),
            "temperature" => Ok(Self::Temperature),
            "light" => Ok(Self::Light),
            _ => Err(ProtocolError::UnknownFeature(s.to_string())),
        }
    }
}

/// Multicast announcement of a device and its command port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRegistration {
    pub name: String,
    pub kind: DeviceKind,
    pub port: u16,
    /// Feature category; absent from older devices.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature: Option<Feature>,
}

impl WireMessage for DeviceRegistration {}

impl DeviceRegistration {
    pub fn new(name: impl Into<String>, kind: DeviceKind, port: u16) -> Self {
        Self {
            name: name.into(),
            kind,
            port,
            feature: None,
        }
    }

    pub fn with_feature(mut self, feature: Feature) -> Self {
        self.feature = Some(feature);
        self
    }
}

/// Gateway reply to a registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationConfirmation {
    pub status: String,
    pub device: String,
}

impl RegistrationConfirmation {
    pub const REGISTERED: &'static str = "registered";

    pub fn registered(device: impl Into<String>) -> Self {
        Self {
            status: Self::REGISTERED.to_string(),
            device: device.into(),
        }
    }

    /// True if this confirms the registration of `name`.
    pub fn confirms(&self, name: &str) -> bool {
        self.status == Self::REGISTERED && self.device == name
    }
}

impl WireMessage for RegistrationConfirmation {}

/// Command verb.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verb {
    Get,
    Set,
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Get => write!(f, "GET"),
            Self::Set => write!(f, "SET"),
        }
    }
}

/// Client request.
///
/// `feature` and `actuator` are free-form so that `"all"` can select a
/// whole category; [`Command::target`] resolves them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub verb: Verb,
    pub device_category: DeviceKind,
    #[serde(default)]
    pub feature: String,
    #[serde(default)]
    pub actuator: String,
    #[serde(default)]
    pub value: f32,
}

impl WireMessage for Command {}

/// Either every item of a category or exactly one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector<T> {
    All,
    One(T),
}

impl<T: PartialEq> Selector<T> {
    pub fn matches(&self, item: &T) -> bool {
        match self {
            Self::All => true,
            Self::One(wanted) => wanted == item,
        }
    }
}

/// What a GET command selects from a status snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Sensors(Selector<Feature>),
    Actuators {
        feature: Selector<Feature>,
        /// Lowercased actuator name.
        actuator: Selector<String>,
    },
}

impl Target {
    /// Check whether a status entry is selected.
    pub fn matches(&self, status: &DeviceStatus) -> bool {
        match self {
            Self::Sensors(feature) => {
                status.kind == DeviceKind::Sensor && feature.matches(&status.feature)
            }
            Self::Actuators { feature, actuator } => {
                status.kind == DeviceKind::Actuator
                    && feature.matches(&status.feature)
                    && actuator.matches(&status.name.to_ascii_lowercase())
            }
        }
    }
}

fn is_wildcard(s: &str) -> bool {
    let s = s.trim();
    s.is_empty() || s.eq_ignore_ascii_case("all")
}

impl Command {
    /// Query a sensor (`GET sensor <feature>`).
    pub fn get_sensor(feature: Feature) -> Self {
        Self {
            verb: Verb::Get,
            device_category: DeviceKind::Sensor,
            feature: feature.to_string().to_ascii_lowercase(),
            actuator: String::new(),
            value: 0.0,
        }
    }

    /// Query an actuator (`GET actuator <feature> <actuator>`).
    pub fn get_actuator(feature: Feature, actuator: &str) -> Self {
        Self {
            verb: Verb::Get,
            device_category: DeviceKind::Actuator,
            feature: feature.to_string().to_ascii_lowercase(),
            actuator: actuator.to_string(),
            value: 0.0,
        }
    }

    /// Query every entry of a category.
    pub fn get_all(category: DeviceKind) -> Self {
        Self {
            verb: Verb::Get,
            device_category: category,
            feature: "all".into(),
            actuator: "all".into(),
            value: 0.0,
        }
    }

    /// Drive an actuator (`SET actuator <feature> <actuator> <value>`).
    pub fn set_actuator(feature: Feature, actuator: &str, value: f32) -> Self {
        Self {
            verb: Verb::Set,
            device_category: DeviceKind::Actuator,
            feature: feature.to_string().to_ascii_lowercase(),
            actuator: actuator.to_string(),
            value,
        }
    }

    /// Resolve the selection of a GET command.
    pub fn target(&self) -> Result<Target, ProtocolError> {
        let feature = if is_wildcard(&self.feature) {
            Selector::All
        } else {
            Selector::One(self.feature.parse()?)
        };

        Ok(match self.device_category {
            DeviceKind::Sensor => Target::Sensors(feature),
            DeviceKind::Actuator => Target::Actuators {
                feature,
                actuator: if is_wildcard(&self.actuator) {
                    Selector::All
                } else {
                    Selector::One(self.actuator.trim().to_ascii_lowercase())
                },
            },
        })
    }

    /// Name of the device a SET is addressed to.
    ///
    /// The actuator name when present, else the feature (sensor devices are
    /// named after their feature).
    pub fn device_name(&self) -> Result<&str, ProtocolError> {
        let actuator = self.actuator.trim();
        if !actuator.is_empty() {
            return Ok(actuator);
        }
        let feature = self.feature.trim();
        if !feature.is_empty() {
            return Ok(feature);
        }
        Err(ProtocolError::MissingTarget("command names no device"))
    }
}

/// Status of one device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceStatus {
    pub name: String,
    pub kind: DeviceKind,
    pub feature: Feature,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actuator: Option<String>,
    #[serde(default)]
    pub on: bool,
    #[serde(default)]
    pub human_state: String,
    #[serde(default)]
    pub value: f32,
    #[serde(default)]
    pub unit: String,
}

/// Response text plus a sequence of device statuses.
///
/// Used both as the periodic status push and as every reply to a client.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    #[serde(default)]
    pub response_text: String,
    #[serde(default)]
    pub statuses: Vec<DeviceStatus>,
}

impl WireMessage for StatusSnapshot {}

impl StatusSnapshot {
    /// A reply carrying only text.
    pub fn text(response_text: impl Into<String>) -> Self {
        Self {
            response_text: response_text.into(),
            statuses: Vec::new(),
        }
    }

    pub fn with_statuses(response_text: impl Into<String>, statuses: Vec<DeviceStatus>) -> Self {
        Self {
            response_text: response_text.into(),
            statuses,
        }
    }

    /// Entries selected by `target`, in snapshot order.
    pub fn select(&self, target: &Target) -> Vec<DeviceStatus> {
        self.statuses
            .iter()
            .filter(|s| target.matches(s))
            .cloned()
            .collect()
    }
}
