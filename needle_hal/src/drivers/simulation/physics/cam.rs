//! Needle position cam.
//!
//! Two sensor windows on the arm shaft: one around needle-up, one around
//! needle-down. A sensor reads active while the shaft angle is within
//! `window_deg / 2` of its center.

use needle_common::drive::state::NeedleState;
use serde::{Deserialize, Serialize};

/// Cam geometry (`[simulation.needle]`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NeedleCam {
    pub up_center_deg: f64,
    pub down_center_deg: f64,
    pub window_deg: f64,
}

impl Default for NeedleCam {
    fn default() -> Self {
        Self {
            up_center_deg: 0.0,
            down_center_deg: 180.0,
            window_deg: 60.0,
        }
    }
}

impl NeedleCam {
    pub fn validate(&self) -> Result<(), String> {
        if !(self.window_deg > 0.0 && self.window_deg < 180.0) {
            return Err(format!(
                "simulation.needle.window_deg {} must be in (0, 180)",
                self.window_deg
            ));
        }
        if angle_between(self.up_center_deg, self.down_center_deg) < self.window_deg {
            return Err("simulation.needle: up and down windows overlap".to_string());
        }
        Ok(())
    }

    /// Sensor levels at shaft angle `angle_deg`.
    pub fn levels(&self, angle_deg: f64) -> NeedleState {
        let half = self.window_deg / 2.0;
        NeedleState {
            up_active: angle_between(angle_deg, self.up_center_deg) < half,
            down_active: angle_between(angle_deg, self.down_center_deg) < half,
        }
    }
}

/// Shortest angular distance in degrees, in [0, 180].
fn angle_between(a: f64, b: f64) -> f64 {
    let d = (a - b).rem_euclid(360.0);
    d.min(360.0 - d)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn windows_wrap_around_zero() {
        let cam = NeedleCam::default();
        assert!(cam.levels(350.0).up_active);
        assert!(cam.levels(10.0).up_active);
        assert!(!cam.levels(40.0).up_active);
        assert!(cam.levels(180.0).down_active);
        assert_eq!(cam.levels(90.0), NeedleState::default());
    }

    #[test]
    fn overlapping_windows_rejected() {
        let cam = NeedleCam {
            down_center_deg: 40.0,
            ..NeedleCam::default()
        };
        assert!(cam.validate().is_err());
        assert!(NeedleCam::default().validate().is_ok());
    }
}
