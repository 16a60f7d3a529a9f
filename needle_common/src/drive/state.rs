//! State enums for the motor drive.
//!
//! All enums use `#[repr(u8)]` so they can be published as a single byte
//! in the status snapshot.

use core::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::ConfigValidationError;

/// Motor control engine state.
///
/// Exactly one state is active. `Fault` exits only via an explicit
/// stop-operations/reset command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum MotorState {
    /// Power off, waiting for the pedal.
    Idle = 0,
    /// Closed- or open-loop speed regulation.
    Running = 1,
    /// Ramp-down and needle parking.
    Stopping = 2,
    /// Full-power max-RPM measurement.
    Calibrating = 3,
    /// Relay-feedback PID tuning.
    Autotuning = 4,
    /// Latched safety fault, power forced to zero.
    Fault = 5,
}

impl MotorState {
    /// Convert from raw `u8`. Returns `None` for invalid values.
    #[inline]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Idle),
            1 => Some(Self::Running),
            2 => Some(Self::Stopping),
            3 => Some(Self::Calibrating),
            4 => Some(Self::Autotuning),
            5 => Some(Self::Fault),
            _ => None,
        }
    }

    /// Whether the motor may be energized in this state.
    #[inline]
    pub const fn may_energize(self) -> bool {
        !matches!(self, Self::Idle | Self::Fault)
    }
}

impl Default for MotorState {
    fn default() -> Self {
        Self::Idle
    }
}

/// Preferred needle stop position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum StopPosition {
    Up = 0,
    Down = 1,
}

impl Default for StopPosition {
    fn default() -> Self {
        Self::Down
    }
}

impl FromStr for StopPosition {
    type Err = ConfigValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("up") {
            Ok(Self::Up)
        } else if s.eq_ignore_ascii_case("down") {
            Ok(Self::Down)
        } else {
            Err(ConfigValidationError::WrongType {
                param: "stop_position_default",
                expected: "\"up\" or \"down\"",
            })
        }
    }
}

/// Autotune progress, published as `autotune_stage`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum AutotuneStage {
    /// Not running.
    Idle = 0,
    /// Driving high power until the target RPM is first reached.
    SpinUp = 1,
    /// Relay switching, collecting oscillation cycles.
    Oscillating = 2,
    /// Gains derived and applied.
    Complete = 3,
    /// Timed out or did not converge; previous gains kept.
    Failed = 4,
}

impl Default for AutotuneStage {
    fn default() -> Self {
        Self::Idle
    }
}

/// Debounced needle sensor state. Both false means mid-travel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NeedleState {
    pub up_active: bool,
    pub down_active: bool,
}

impl NeedleState {
    /// Whether the sensor for `position` is active.
    #[inline]
    pub const fn at(&self, position: StopPosition) -> bool {
        match position {
            StopPosition::Up => self.up_active,
            StopPosition::Down => self.down_active,
        }
    }

    /// Both sensors active at once: physically impossible.
    #[inline]
    pub const fn is_conflicting(&self) -> bool {
        self.up_active && self.down_active
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn motor_state_roundtrip() {
        for v in 0..=5u8 {
            let s = MotorState::from_u8(v).unwrap();
            assert_eq!(s as u8, v);
        }
        assert_eq!(MotorState::from_u8(6), None);
    }

    #[test]
    fn stop_position_parses_any_case() {
        assert_eq!("DOWN".parse::<StopPosition>().unwrap(), StopPosition::Down);
        assert_eq!("up".parse::<StopPosition>().unwrap(), StopPosition::Up);
        assert!("sideways".parse::<StopPosition>().is_err());
    }

    #[test]
    fn needle_state_queries() {
        let n = NeedleState {
            up_active: false,
            down_active: true,
        };
        assert!(n.at(StopPosition::Down));
        assert!(!n.at(StopPosition::Up));
        assert!(!n.is_conflicting());
        let both = NeedleState {
            up_active: true,
            down_active: true,
        };
        assert!(both.is_conflicting());
    }

    #[test]
    fn energize_only_in_active_states() {
        assert!(!MotorState::Idle.may_energize());
        assert!(!MotorState::Fault.may_energize());
        assert!(MotorState::Running.may_energize());
        assert!(MotorState::Calibrating.may_energize());
    }
}
