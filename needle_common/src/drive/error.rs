//! Error taxonomy for the motor drive.
//!
//! Only sensor-derived safety faults latch (`FaultFlags`, engine → FAULT).
//! Configuration and tuning failures are reported to the caller and leave
//! the engine operable.

use bitflags::bitflags;
use serde::Serialize;
use thiserror::Error;

use super::state::MotorState;

bitflags! {
    /// Latched fault causes. Any set flag forces `MotorState::Fault`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct FaultFlags: u8 {
        /// No zero-cross within the mains-loss timeout.
        const MAINS_LOSS        = 0x01;
        /// Rotation sensor silent while the motor is powered.
        const RPM_SENSOR_SILENT = 0x02;
        /// Up and down needle sensors active at once.
        const NEEDLE_CONFLICT   = 0x04;
        /// Firing commands repeatedly rejected as stale.
        const STALE_FIRING      = 0x08;
    }
}

impl FaultFlags {
    /// Flags raised by a silent sensor (`SensorTimeoutFault`).
    pub const TIMEOUT_MASK: Self =
        Self::from_bits_truncate(Self::MAINS_LOSS.bits() | Self::RPM_SENSOR_SILENT.bits());

    /// Map the highest-priority flag to its error.
    pub fn to_error(self) -> Option<DriveError> {
        if self.contains(Self::MAINS_LOSS) {
            Some(DriveError::SensorTimeout(SensorTimeoutKind::Mains))
        } else if self.contains(Self::RPM_SENSOR_SILENT) {
            Some(DriveError::SensorTimeout(SensorTimeoutKind::RotationSensor))
        } else if self.contains(Self::NEEDLE_CONFLICT) {
            Some(DriveError::SensorInconsistency)
        } else if self.contains(Self::STALE_FIRING) {
            Some(DriveError::InvariantViolation)
        } else {
            None
        }
    }
}

impl Default for FaultFlags {
    fn default() -> Self {
        Self::empty()
    }
}

/// A rejected configuration parameter. No state change happened.
#[derive(Debug, Clone, Copy, PartialEq, Error, Serialize)]
pub enum ConfigValidationError {
    #[error("{param} = {value} out of range [{min}, {max}]")]
    OutOfRange {
        param: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("{param} must be a finite number")]
    NonFinite { param: &'static str },

    #[error("{param} expects {expected}")]
    WrongType {
        param: &'static str,
        expected: &'static str,
    },

    #[error("inconsistent configuration: {0}")]
    Inconsistent(&'static str),

    #[error("unknown parameter")]
    UnknownParameter,
}

/// Which sensor went silent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SensorTimeoutKind {
    Mains,
    RotationSensor,
}

/// Why an autotune run failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AutotuneFailureKind {
    /// Overall time budget exhausted before enough stable cycles.
    Timeout,
    /// RPM never reached the autotune target during spin-up.
    TargetNotReached,
    /// Oscillation amplitude or period too small to measure.
    NoOscillation,
    /// Aborted by stop-operations or a fault.
    Aborted,
}

/// Why a max-RPM calibration failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CalibrationFailureKind {
    /// RPM kept changing until the duration bound.
    NoPlateau,
    /// The motor never turned.
    NoRotation,
    /// Aborted by stop-operations or a fault.
    Aborted,
}

/// Engine-level error.
#[derive(Debug, Clone, Copy, PartialEq, Error, Serialize)]
pub enum DriveError {
    #[error("parameter rejected: {0}")]
    ConfigValidation(#[from] ConfigValidationError),

    #[error("sensor timeout: {0:?}")]
    SensorTimeout(SensorTimeoutKind),

    #[error("needle sensors report up and down at once")]
    SensorInconsistency,

    #[error("autotune failed: {0:?}")]
    AutotuneFailure(AutotuneFailureKind),

    #[error("calibration failed: {0:?}")]
    CalibrationFailure(CalibrationFailureKind),

    #[error("{command} rejected in state {state:?}")]
    Rejected {
        command: &'static str,
        state: MotorState,
    },

    #[error("stale firing commands repeatedly rejected")]
    InvariantViolation,
}

impl DriveError {
    /// Whether this error latches the engine in FAULT.
    #[inline]
    pub const fn is_latching(&self) -> bool {
        matches!(
            self,
            Self::SensorTimeout(_) | Self::SensorInconsistency | Self::InvariantViolation
        )
    }
}
