// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Simulated devices.
//!
//! A [`Device`] is either a sensor, whose value only the physics engine
//! changes, or an actuator, whose intensity only a SET command changes.

use greenhouse_proto::{
    Command, DeviceKind, DeviceStatus, Feature, StatusSnapshot, Verb, STATUS_UPDATED,
};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Device command errors.
#[derive(Debug, Error, PartialEq)]
pub enum DeviceError {
    #[error("{0} is a sensor and cannot be set")]
    NotSettable(String),

    #[error("Invalid intensity {0}: must be a finite value >= 0")]
    InvalidValue(f32),
}

/// Which physical law an actuator takes part in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActuatorRole {
    Irrigator,
    Heater,
    Cooler,
    Lamps,
    Curtains,
}

impl ActuatorRole {
    /// Feature the role acts on.
    pub fn feature(self) -> Feature {
        match self {
            Self::Irrigator => Feature::Humidity,
            Self::Heater | Self::Cooler => Feature::Temperature,
            Self::Lamps | Self::Curtains => Feature::Light,
        }
    }
}

impl fmt::Display for ActuatorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Irrigator => "Irrigator",
            Self::Heater => "Heater",
            Self::Cooler => "Cooler",
            Self::Lamps => "Lamps",
            Self::Curtains => "Curtains",
        };
        f.write_str(name)
    }
}

impl FromStr for ActuatorRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "irrigator" => Ok(Self::Irrigator),
            "heater" => Ok(Self::Heater),
            "cooler" => Ok(Self::Cooler),
            "lamps" => Ok(Self::Lamps),
            "curtains" => Ok(Self::Curtains),
            other => Err(format!("unknown actuator role: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SensorState {
    pub value: f32,
    pub unit: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActuatorState {
    pub intensity: f32,
    pub on: bool,
    pub unit: String,
}

impl ActuatorState {
    pub fn off(unit: impl Into<String>) -> Self {
        Self {
            intensity: 0.0,
            on: false,
            unit: unit.into(),
        }
    }

    /// Set the intensity; `on` follows `intensity > 0`.
    pub fn set(&mut self, value: f32) -> Result<(), DeviceError> {
        if !value.is_finite() || value < 0.0 {
            return Err(DeviceError::InvalidValue(value));
        }
        self.intensity = value;
        self.on = value > 0.0;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sensor {
    pub name: String,
    pub feature: Feature,
    pub state: SensorState,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Actuator {
    pub name: String,
    pub feature: Feature,
    /// `None` for actuators outside the physics model.
    pub role: Option<ActuatorRole>,
    pub state: ActuatorState,
}

impl Actuator {
    /// Intensity if switched on.
    pub fn active_intensity(&self) -> Option<f32> {
        self.state.on.then_some(self.state.intensity)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Device {
    Sensor(Sensor),
    Actuator(Actuator),
}

impl Device {
    pub fn sensor(
        name: impl Into<String>,
        feature: Feature,
        value: f32,
        unit: impl Into<String>,
    ) -> Self {
        Self::Sensor(Sensor {
            name: name.into(),
            feature,
            state: SensorState {
                value,
                unit: unit.into(),
            },
        })
    }

    /// Actuator whose role is derived from its name.
    pub fn actuator(name: impl Into<String>, feature: Feature, unit: impl Into<String>) -> Self {
        let name = name.into();
        let role = name.parse().ok();
        Self::Actuator(Actuator {
            name,
            feature,
            role,
            state: ActuatorState::off(unit),
        })
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Sensor(s) => &s.name,
            Self::Actuator(a) => &a.name,
        }
    }

    pub fn kind(&self) -> DeviceKind {
        match self {
            Self::Sensor(_) => DeviceKind::Sensor,
            Self::Actuator(_) => DeviceKind::Actuator,
        }
    }

    pub fn feature(&self) -> Feature {
        match self {
            Self::Sensor(s) => s.feature,
            Self::Actuator(a) => a.feature,
        }
    }

    /// Status entry as reported to the gateway.
    pub fn current_status(&self) -> DeviceStatus {
        match self {
            Self::Sensor(s) => DeviceStatus {
                name: s.name.clone(),
                kind: DeviceKind::Sensor,
                feature: s.feature,
                actuator: None,
                on: false,
                human_state: format!("{:.1} {}", s.state.value, s.state.unit),
                value: s.state.value,
                unit: s.state.unit.clone(),
            },
            Self::Actuator(a) => DeviceStatus {
                name: a.name.clone(),
                kind: DeviceKind::Actuator,
                feature: a.feature,
                actuator: Some(a.name.clone()),
                on: a.state.on,
                human_state: if a.state.on { "On" } else { "Off" }.to_string(),
                value: a.state.intensity,
                unit: a.state.unit.clone(),
            },
        }
    }

    /// Set an actuator's intensity.
    pub fn set(&mut self, value: f32) -> Result<(), DeviceError> {
        match self {
            Self::Sensor(s) => Err(DeviceError::NotSettable(s.name.clone())),
            Self::Actuator(a) => a.state.set(value),
        }
    }

    /// Execute a command and build the reply.
    ///
    /// GET replies with the current status. SET replies with
    /// [`STATUS_UPDATED`] and the new status, or with the error text and
    /// unchanged state.
    pub fn apply_command(&mut self, command: &Command) -> StatusSnapshot {
        match command.verb {
            Verb::Get => StatusSnapshot::with_statuses(String::new(), vec![self.current_status()]),
            Verb::Set => match self.set(command.value) {
                Ok(()) => StatusSnapshot::with_statuses(STATUS_UPDATED, vec![self.current_status()]),
                Err(e) => StatusSnapshot::with_statuses(e.to_string(), vec![self.current_status()]),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn heater() -> Device {
        Device::actuator("Heater", Feature::Temperature, "°C")
    }

    #[test]
    fn test_role_from_name() {
        let Device::Actuator(a) = heater() else {
            panic!("expected actuator");
        };
        assert_eq!(a.role, Some(ActuatorRole::Heater));

        let Device::Actuator(a) = Device::actuator("Fan", Feature::Temperature, "rpm") else {
            panic!("expected actuator");
        };
        assert_eq!(a.role, None);
    }

    #[test]
    fn test_set_positive_turns_on() {
        let mut dev = heater();
        dev.set(30.0).unwrap();

        let status = dev.current_status();
        assert!(status.on);
        assert_eq!(status.value, 30.0);
        assert_eq!(status.human_state, "On");
    }

    #[test]
    fn test_set_zero_turns_off() {
        let mut dev = heater();
        dev.set(30.0).unwrap();
        dev.set(0.0).unwrap();

        let status = dev.current_status();
        assert!(!status.on);
        assert_eq!(status.human_state, "Off");
    }

    #[test]
    fn test_invalid_values_leave_state() {
        let mut dev = heater();
        dev.set(12.0).unwrap();

        assert_eq!(dev.set(-1.0), Err(DeviceError::InvalidValue(-1.0)));
        assert!(dev.set(f32::NAN).is_err());
        assert!(dev.set(f32::INFINITY).is_err());
        assert_eq!(dev.current_status().value, 12.0);
    }

    #[test]
    fn test_sensor_rejects_set() {
        let mut dev = Device::sensor("Humidity", Feature::Humidity, 60.0, "%");
        let cmd = Command::set_actuator(Feature::Humidity, "Humidity", 10.0);

        let reply = dev.apply_command(&cmd);

        assert!(reply.response_text.contains("cannot be set"));
        assert_eq!(reply.statuses[0].value, 60.0);
    }

    #[test]
    fn test_sensor_human_state() {
        let dev = Device::sensor("Humidity", Feature::Humidity, 60.0, "%");
        let status = dev.current_status();
        assert_eq!(status.human_state, "60.0 %");
        assert_eq!(status.kind, DeviceKind::Sensor);
        assert!(status.actuator.is_none());
    }

    #[test]
    fn test_apply_set_reply() {
        let mut dev = heater();
        let reply = dev.apply_command(&Command::set_actuator(Feature::Temperature, "Heater", 30.0));

        assert_eq!(reply.response_text, STATUS_UPDATED);
        assert!(reply.statuses[0].on);
    }

    #[test]
    fn test_apply_get_reply() {
        let mut dev = heater();
        let reply = dev.apply_command(&Command::get_actuator(Feature::Temperature, "Heater"));

        assert!(reply.response_text.is_empty());
        assert_eq!(reply.statuses, vec![dev.current_status()]);
    }
}
