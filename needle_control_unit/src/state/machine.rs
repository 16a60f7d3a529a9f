//! Motor state transitions.
//!
//! Idle → Running → Stopping → Idle is the sewing path. Calibration and
//! autotune are entered on command; Fault is reachable from every state and
//! left only by an explicit reset.

use needle_common::drive::state::MotorState;

/// Result of a MotorState transition attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionResult {
    /// Transition succeeded, new state.
    Ok(MotorState),
    /// Transition rejected, reason.
    Rejected(&'static str),
}

/// Event that can trigger a state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotorEvent {
    /// Pedal pressed past the deadband.
    PedalPressed,
    /// Pedal released while the motor still turns.
    PedalReleasedMoving,
    /// Pedal released with the motor at rest.
    PedalReleasedStill,
    /// Ramp-down and parking done (or timed out).
    StopComplete,
    /// `calibrate_max_rpm` command.
    Calibrate,
    /// Calibration succeeded or failed.
    CalibrationFinished,
    /// `autotune_pid` command.
    Autotune,
    /// Autotune succeeded or failed.
    AutotuneFinished,
    /// `stop_operations` while the motor is energized.
    Abort,
    /// Safety fault detected.
    Fault,
    /// `stop_operations` in Fault.
    Reset,
    /// `reboot` command.
    Reboot,
}

#[derive(Debug, Clone)]
pub struct MotorStateMachine {
    state: MotorState,
}

impl Default for MotorStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl MotorStateMachine {
    pub const fn new() -> Self {
        Self {
            state: MotorState::Idle,
        }
    }

    #[inline]
    pub const fn state(&self) -> MotorState {
        self.state
    }

    pub fn handle_event(&mut self, event: MotorEvent) -> TransitionResult {
        use MotorEvent::*;
        use MotorState::*;

        let next = match (self.state, event) {
            // any → Fault, any → Idle on reboot
            (_, MotorEvent::Fault) => MotorState::Fault,
            (_, Reboot) => Idle,

            (MotorState::Fault, Reset) => Idle,

            (Idle, PedalPressed) => Running,
            (Running, PedalReleasedMoving) => Stopping,
            (Running, PedalReleasedStill) => Idle,
            (Stopping, StopComplete) => Idle,

            (Idle | Running, Calibrate) => Calibrating,
            (Calibrating, CalibrationFinished) => Idle,

            (Idle, Autotune) => Autotuning,
            (Autotuning, AutotuneFinished) => Idle,

            (Running | Calibrating | Autotuning, Abort) => Stopping,

            _ => {
                return TransitionResult::Rejected(invalid_transition_reason(self.state, event));
            }
        };

        self.state = next;
        TransitionResult::Ok(next)
    }
}

fn invalid_transition_reason(state: MotorState, event: MotorEvent) -> &'static str {
    use MotorEvent::*;
    match (state, event) {
        (MotorState::Fault, _) => "Fault: only Reset or Reboot allowed",
        (_, Autotune) => "autotune only allowed from Idle",
        (_, Calibrate) => "calibration only allowed from Idle or Running",
        (MotorState::Idle, _) => "Idle: invalid event for current state",
        (MotorState::Running, _) => "Running: invalid event for current state",
        (MotorState::Stopping, _) => "Stopping: invalid event for current state",
        (MotorState::Calibrating, _) => "Calibrating: invalid event for current state",
        (MotorState::Autotuning, _) => "Autotuning: invalid event for current state",
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
