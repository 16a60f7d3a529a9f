//! Foot pedal: ADC sample shared with the sampling context, and the
//! deadband + linear mapping to a target RPM or open-loop power.

use core::sync::atomic::{AtomicU16, Ordering};

use needle_common::drive::config::{DriveConfig, PedalTuning};

/// Latest pedal ADC conversion.
#[derive(Debug, Default)]
pub struct PedalSample(AtomicU16);

impl PedalSample {
    pub const fn new() -> Self {
        Self(AtomicU16::new(0))
    }

    #[inline]
    pub fn store(&self, adc: u16) {
        self.0.store(adc, Ordering::Relaxed);
    }

    #[inline]
    pub fn load(&self) -> u16 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Pedal mapping.
#[derive(Debug, Clone, Copy)]
pub struct PedalInput {
    deadband: u16,
    adc_max: u16,
}

impl PedalInput {
    pub fn new(tuning: &PedalTuning) -> Self {
        Self {
            deadband: tuning.deadband,
            adc_max: tuning.adc_max.max(tuning.deadband.saturating_add(1)),
        }
    }

    /// Pedal travel above the deadband, in [0, 1].
    #[inline]
    pub fn fraction(&self, adc: u16) -> f64 {
        if adc <= self.deadband {
            return 0.0;
        }
        let span = (self.adc_max - self.deadband) as f64;
        ((adc - self.deadband) as f64 / span).clamp(0.0, 1.0)
    }

    /// Requested RPM in [0, max_rpm_setting].
    #[inline]
    pub fn target_rpm(&self, adc: u16, config: &DriveConfig) -> f64 {
        (self.fraction(adc) * config.max_rpm_setting).clamp(0.0, config.max_rpm_setting)
    }

    /// Open-loop power [%] in [0, free-running + load offset (max 100)].
    #[inline]
    pub fn open_loop_power(&self, adc: u16, config: &DriveConfig) -> f64 {
        self.fraction(adc) * config.open_loop_power_ceiling()
    }
}
