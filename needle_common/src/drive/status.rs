//! Read-only status projection for the telemetry sink.

use serde::Serialize;

use super::error::{DriveError, FaultFlags};
use super::state::{AutotuneStage, MotorState};

/// Snapshot of controller state and configuration.
///
/// Produced on demand by the engine. Consumers never write back.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Default)]
pub struct StatusSnapshot {
    pub state: MotorState,
    pub pedal_adc: u16,
    pub target_rpm: f64,
    pub current_rpm: f64,
    pub motor_power_percent: f64,
    pub needle_up_active: bool,
    pub needle_down_active: bool,
    pub pid_enabled: bool,
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
    pub max_rpm_setting: f64,
    pub max_motor_rpm_calibrated: f64,
    pub autotune_active: bool,
    pub autotune_stage: AutotuneStage,
    pub calibration_active: bool,
    /// Latched fault causes as raw bits (`FaultFlags`).
    pub fault_bits: u8,
    /// Most recent failure reported by the engine.
    pub last_failure: Option<DriveError>,
    pub consecutive_stale: u32,
    /// Latest zero-cross id seen by the engine.
    pub cycle_id: u32,
}

impl StatusSnapshot {
    #[inline]
    pub fn faults(&self) -> FaultFlags {
        FaultFlags::from_bits_truncate(self.fault_bits)
    }

    #[inline]
    pub fn is_faulted(&self) -> bool {
        self.state == MotorState::Fault
    }
}
