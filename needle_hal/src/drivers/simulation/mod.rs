//! Simulation driver module.
//!
//! This module provides a physics simulation of the sewing head for
//! development and testing without a machine on the bench.

mod driver;
mod mains;
mod physics;

pub use driver::SimulationDriver;
pub use mains::MainsWaveform;
pub use physics::{MotorModel, MotorParams, NeedleCam};

use crate::config::HalFileConfig;
use crate::driver::HalDriver;

/// Factory function to create a simulation driver instance.
pub fn create_driver(config: &HalFileConfig) -> Box<dyn HalDriver> {
    Box::new(SimulationDriver::new(config.simulation))
}
