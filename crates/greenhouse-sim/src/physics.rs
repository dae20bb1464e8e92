// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Physical process model.
//!
//! Once per tick every sensor moves according to the actuators coupled
//! to its feature, plus uniform ambient noise. Noise is applied first so
//! that the actuator clamps always hold after a tick.

use crate::device::{ActuatorRole, Device};
use greenhouse_proto::Feature;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Law coefficients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsParams {
    /// Humidity gained per tick per unit of irrigator intensity.
    pub irrigation_rate: f32,
    /// Irrigation stops raising humidity here.
    pub humidity_ceiling: f32,
    /// Temperature change per tick while heating or cooling.
    pub temperature_step: f32,
    /// Distance kept from the heater/cooler set point.
    pub temperature_margin: f32,
    pub humidity_noise: f32,
    pub temperature_noise: f32,
    pub light_noise: f32,
}

impl Default for PhysicsParams {
    fn default() -> Self {
        Self {
            irrigation_rate: 0.1,
            humidity_ceiling: 99.5,
            temperature_step: 0.1,
            temperature_margin: 0.5,
            humidity_noise: 0.5,
            temperature_noise: 0.1,
            light_noise: 1.0,
        }
    }
}

impl PhysicsParams {
    /// Same laws, no noise.
    pub fn noiseless() -> Self {
        Self {
            humidity_noise: 0.0,
            temperature_noise: 0.0,
            light_noise: 0.0,
            ..Self::default()
        }
    }
}

/// Actuator intensities seen by one tick (`None` = off or absent).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Drives {
    pub irrigator: Option<f32>,
    pub heater: Option<f32>,
    pub cooler: Option<f32>,
    pub lamps: Option<f32>,
    pub curtains: Option<f32>,
}

impl Drives {
    /// Collect the active intensities from a device set.
    pub fn from_devices(devices: &[Device]) -> Self {
        let mut drives = Self::default();
        for device in devices {
            let Device::Actuator(a) = device else { continue };
            let Some(intensity) = a.active_intensity() else { continue };
            let slot = match a.role {
                Some(ActuatorRole::Irrigator) => &mut drives.irrigator,
                Some(ActuatorRole::Heater) => &mut drives.heater,
                Some(ActuatorRole::Cooler) => &mut drives.cooler,
                Some(ActuatorRole::Lamps) => &mut drives.lamps,
                Some(ActuatorRole::Curtains) => &mut drives.curtains,
                None => continue,
            };
            *slot = Some(intensity);
        }
        drives
    }
}

/// Humidity after one tick.
pub fn humidity_law(value: f32, irrigator: Option<f32>, noise: f32, params: &PhysicsParams) -> f32 {
    let mut value = value + noise;
    if let Some(intensity) = irrigator {
        let raised = value + intensity * params.irrigation_rate;
        // Irrigation never lifts humidity past the ceiling, but never lowers it.
        value = raised.min(params.humidity_ceiling.max(value));
    }
    value.clamp(0.0, 100.0)
}

/// Temperature after one tick.
///
/// The heater clamp is `intensity - margin` and the cooler floor is
/// `intensity + margin`. Both on: heater first, then cooler.
pub fn temperature_law(
    value: f32,
    heater: Option<f32>,
    cooler: Option<f32>,
    noise: f32,
    params: &PhysicsParams,
) -> f32 {
    let mut value = value + noise;
    if let Some(intensity) = heater {
        value = (value + params.temperature_step).min(intensity - params.temperature_margin);
    }
    if let Some(intensity) = cooler {
        value = (value - params.temperature_step).max(intensity + params.temperature_margin);
    }
    value
}

/// Evolves a device set tick by tick.
pub struct PhysicsEngine<R> {
    params: PhysicsParams,
    rng: R,
    /// Light level captured when the curtains opened.
    curtain_baseline: Option<f32>,
}

impl<R: Rng> PhysicsEngine<R> {
    pub fn new(params: PhysicsParams, rng: R) -> Self {
        Self {
            params,
            rng,
            curtain_baseline: None,
        }
    }

    pub fn params(&self) -> &PhysicsParams {
        &self.params
    }

    pub fn curtain_baseline(&self) -> Option<f32> {
        self.curtain_baseline
    }

    fn noise(&mut self, amplitude: f32) -> f32 {
        if amplitude > 0.0 {
            self.rng.gen_range(-amplitude..=amplitude)
        } else {
            0.0
        }
    }

    /// Light after one tick.
    ///
    /// Lamps set the level, then curtains shade the captured baseline.
    /// The tick after the curtains close restores the baseline once,
    /// unless the lamps are setting the level.
    pub fn light_law(&mut self, value: f32, lamps: Option<f32>, curtains: Option<f32>) -> f32 {
        let before = value;
        let mut value = (value + self.noise(self.params.light_noise)).max(0.0);

        if let Some(intensity) = lamps {
            value = intensity;
        }

        match (curtains, self.curtain_baseline) {
            (Some(intensity), _) => {
                let baseline = *self.curtain_baseline.get_or_insert(before);
                value = baseline * (1.0 - intensity / 100.0);
            }
            (None, Some(baseline)) => {
                if lamps.is_none() {
                    value = baseline;
                }
                self.curtain_baseline = None;
            }
            (None, None) => {}
        }

        value.max(0.0)
    }

    /// Advance every sensor by one tick.
    pub fn tick(&mut self, devices: &mut [Device]) {
        let drives = Drives::from_devices(devices);

        for device in devices.iter_mut() {
            let Device::Sensor(sensor) = device else { continue };
            let value = sensor.state.value;
            sensor.state.value = match sensor.feature {
                Feature::Humidity => {
                    let noise = self.noise(self.params.humidity_noise);
                    humidity_law(value, drives.irrigator, noise, &self.params)
                }
                Feature::Temperature => {
                    let noise = self.noise(self.params.temperature_noise);
                    temperature_law(value, drives.heater, drives.cooler, noise, &self.params)
                }
                Feature::Light => self.light_law(value, drives.lamps, drives.curtains),
            };
        }
    }
}
