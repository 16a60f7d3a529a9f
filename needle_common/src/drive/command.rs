//! Command surface of the drive.
//!
//! Every command is idempotent from the caller's point of view: repeating
//! a command whose effect is already in place acknowledges with
//! [`CommandAck::NoOp`] rather than failing.

use serde::{Deserialize, Serialize};

use super::config::{ParamName, ParamValue};

/// A command from the command sink.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    /// Validate and apply one named parameter.
    #[serde(alias = "set_param")]
    SetParameter { name: ParamName, value: ParamValue },
    /// Measure the full-power RPM plateau.
    CalibrateMaxRpm,
    /// Relay-feedback PID tuning (IDLE only).
    AutotunePid,
    /// Leave any active state for a safe one; resets a latched FAULT.
    StopOperations,
    /// Reset the controller to its boot state. Config survives.
    Reboot,
}

impl Command {
    /// Wire name, used in logs and rejection errors.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::SetParameter { .. } => "set_parameter",
            Self::CalibrateMaxRpm => "calibrate_max_rpm",
            Self::AutotunePid => "autotune_pid",
            Self::StopOperations => "stop_operations",
            Self::Reboot => "reboot",
        }
    }
}

/// Successful command outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandAck {
    /// Parameter stored or controller reset.
    Applied,
    /// A procedure (stop, calibration, autotune) was started.
    Started,
    /// Nothing to do; the requested effect already holds.
    NoOp,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drive::state::StopPosition;

    #[derive(Deserialize)]
    struct Wrapper {
        cmd: Command,
    }

    #[test]
    fn deserializes_set_parameter() {
        let w: Wrapper = toml::from_str(
            r#"cmd = { command = "set_parameter", name = "kp", value = 0.8 }"#,
        )
        .unwrap();
        assert_eq!(
            w.cmd,
            Command::SetParameter {
                name: ParamName::Kp,
                value: ParamValue::Number(0.8),
            }
        );
    }

    #[test]
    fn deserializes_position_and_flag_values() {
        let w: Wrapper = toml::from_str(
            r#"cmd = { command = "set_param", name = "stop_position_default", value = "up" }"#,
        )
        .unwrap();
        assert_eq!(
            w.cmd,
            Command::SetParameter {
                name: ParamName::StopPositionDefault,
                value: ParamValue::Position(StopPosition::Up),
            }
        );
        let w: Wrapper =
            toml::from_str(r#"cmd = { command = "set_parameter", name = "pid_enabled", value = true }"#)
                .unwrap();
        assert_eq!(
            w.cmd,
            Command::SetParameter {
                name: ParamName::PidEnabled,
                value: ParamValue::Flag(true),
            }
        );
    }

    #[test]
    fn unit_commands() {
        let w: Wrapper = toml::from_str(r#"cmd = { command = "autotune_pid" }"#).unwrap();
        assert_eq!(w.cmd, Command::AutotunePid);
        assert_eq!(w.cmd.name(), "autotune_pid");
        assert_eq!(Command::Reboot.name(), "reboot");
    }
}
