//! HAL configuration file.
//!
//! The drive file (`[service]`, `[drive]`, `[engine]`) plus the
//! `[simulation]` section read by the simulation driver.
//!
//! ```toml
//! [drive]
//! max_rpm_setting = 1500.0
//! pid_enabled = true
//!
//! [simulation]
//! mains_frequency_hz = 50.0
//!
//! [simulation.motor]
//! inertia = 0.002
//! ```

use std::path::Path;

use needle_common::config::{ConfigError, ConfigLoader, ServiceConfig};
use needle_common::drive::config::{DriveConfig, EngineTuning};
use serde::{Deserialize, Serialize};

use crate::drivers::simulation::{MotorParams, NeedleCam};

/// Simulation driver section.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulationConfig {
    pub mains_frequency_hz: f64,
    /// Shaft angle at power-up [deg], 0 = needle up.
    pub initial_angle_deg: f64,
    pub motor: MotorParams,
    pub needle: NeedleCam,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            mains_frequency_hz: 50.0,
            initial_angle_deg: 180.0,
            motor: MotorParams::default(),
            needle: NeedleCam::default(),
        }
    }
}

impl SimulationConfig {
    pub fn validate(&self) -> Result<(), String> {
        if !(45.0..=65.0).contains(&self.mains_frequency_hz) {
            return Err(format!(
                "simulation.mains_frequency_hz {} must be 50 or 60 Hz mains",
                self.mains_frequency_hz
            ));
        }
        if !self.initial_angle_deg.is_finite() {
            return Err("simulation.initial_angle_deg must be finite".to_string());
        }
        self.motor.validate()?;
        self.needle.validate()
    }
}

/// Complete HAL configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HalFileConfig {
    pub service: ServiceConfig,
    pub drive: DriveConfig,
    pub engine: EngineTuning,
    pub simulation: SimulationConfig,
}

impl HalFileConfig {
    /// Validate all sections.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.service.validate()?;
        self.drive
            .validate()
            .map_err(|e| ConfigError::ValidationError(e.to_string()))?;
        self.engine.validate().map_err(ConfigError::ValidationError)?;
        self.simulation
            .validate()
            .map_err(ConfigError::ValidationError)?;
        Ok(())
    }

    /// Load and validate in one step.
    pub fn load_validated(path: &Path) -> Result<Self, ConfigError> {
        let cfg = Self::load(path)?;
        cfg.validate()?;
        Ok(cfg)
    }
}
