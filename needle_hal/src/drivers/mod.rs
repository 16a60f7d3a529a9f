//! HAL driver implementations.
//!
//! - [`simulation`] - Physics simulation of the sewing head
//!
//! # Adding New Drivers
//!
//! 1. Create a new submodule under `drivers/`
//! 2. Implement the `HalDriver` trait from [`crate::driver`]
//! 3. Add it to [`DRIVERS`]

pub mod simulation;

use crate::config::HalFileConfig;
use crate::driver::{DriverFactory, HalDriver, HalError};

/// Built-in drivers by name.
pub const DRIVERS: &[(&str, DriverFactory)] = &[("simulation", simulation::create_driver)];

/// Instantiate the driver registered under `name`.
pub fn create_driver(name: &str, config: &HalFileConfig) -> Result<Box<dyn HalDriver>, HalError> {
    DRIVERS
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, factory)| factory(config))
        .ok_or_else(|| HalError::DriverNotFound(name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simulation_is_registered() {
        let driver = create_driver("simulation", &HalFileConfig::default()).unwrap();
        assert_eq!(driver.name(), "simulation");
    }

    #[test]
    fn unknown_driver_rejected() {
        assert!(matches!(
            create_driver("ethercat", &HalFileConfig::default()),
            Err(HalError::DriverNotFound(name)) if name == "ethercat"
        ));
    }
}
