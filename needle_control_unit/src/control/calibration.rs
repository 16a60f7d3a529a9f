//! Max-RPM calibration: full power until RPM stops increasing.
//!
//! RPM is sampled on a fixed interval. Once it exceeds the minimum plateau
//! level, every sample that does not beat the run's reference by more than
//! the tolerance counts towards the plateau; a larger rise restarts the
//! count. The plateau value is the highest RPM seen.

use needle_common::drive::config::CalibrationTuning;
use needle_common::drive::error::CalibrationFailureKind;

/// Outcome of one calibration step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CalibrationStep {
    /// Keep driving at full power.
    Continue,
    /// Plateau found at this RPM.
    Done(f64),
    Failed(CalibrationFailureKind),
}

#[derive(Debug, Clone)]
pub struct Calibrator {
    tuning: CalibrationTuning,
    start_us: Option<u64>,
    next_sample_us: u64,
    best_rpm: f64,
    reference_rpm: f64,
    stable_samples: u32,
}

impl Calibrator {
    pub fn new(tuning: &CalibrationTuning) -> Self {
        Self {
            tuning: *tuning,
            start_us: None,
            next_sample_us: 0,
            best_rpm: 0.0,
            reference_rpm: 0.0,
            stable_samples: 0,
        }
    }

    pub fn start(&mut self, now_us: u64) {
        self.start_us = Some(now_us);
        self.next_sample_us = now_us + self.interval_us();
        self.best_rpm = 0.0;
        self.reference_rpm = 0.0;
        self.stable_samples = 0;
    }

    pub fn cancel(&mut self) {
        self.start_us = None;
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.start_us.is_some()
    }

    #[inline]
    pub fn best_rpm(&self) -> f64 {
        self.best_rpm
    }

    fn interval_us(&self) -> u64 {
        self.tuning.sample_interval_ms.max(1) as u64 * 1_000
    }

    pub fn tick(&mut self, rpm: f64, now_us: u64) -> CalibrationStep {
        let Some(start) = self.start_us else {
            return CalibrationStep::Failed(CalibrationFailureKind::Aborted);
        };

        if now_us >= self.next_sample_us {
            self.next_sample_us += self.interval_us();
            self.sample(rpm);
            if self.stable_samples >= self.tuning.plateau_samples {
                self.start_us = None;
                return CalibrationStep::Done(self.best_rpm);
            }
        }

        if now_us.saturating_sub(start) >= self.tuning.max_duration_ms as u64 * 1_000 {
            self.start_us = None;
            let kind = if self.best_rpm < self.tuning.min_plateau_rpm {
                CalibrationFailureKind::NoRotation
            } else {
                CalibrationFailureKind::NoPlateau
            };
            return CalibrationStep::Failed(kind);
        }

        CalibrationStep::Continue
    }

    fn sample(&mut self, rpm: f64) {
        let rpm = if rpm.is_finite() { rpm.max(0.0) } else { 0.0 };
        self.best_rpm = self.best_rpm.max(rpm);
        if self.best_rpm < self.tuning.min_plateau_rpm {
            self.stable_samples = 0;
            return;
        }
        if rpm > self.reference_rpm + self.tuning.plateau_tolerance_rpm {
            self.reference_rpm = rpm;
            self.stable_samples = 0;
        } else {
            self.stable_samples += 1;
        }
    }
}
