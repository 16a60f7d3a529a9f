//! Needle-positioning stop sequence.
//!
//! RampDown: power falls from the running level to the creep level in the
//! soft-start steps, or ends early once RPM is near zero.
//! Creep: a small power turns the handwheel until the selected needle sensor
//! asserts.
//! Settling: power cut; the needle is parked once the sensor is still active
//! with RPM near zero. Losing the sensor at rest re-enters Creep.
//!
//! The whole sequence is bounded by a timeout that cuts power and reports
//! an unparked stop.

use needle_common::drive::config::{DriveConfig, StopTuning};
use needle_common::drive::state::{NeedleState, StopPosition};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopPhase {
    Idle,
    RampDown,
    Creep,
    Settling,
    /// Sequence finished; `parked` is false after a timeout.
    Complete { parked: bool },
}

/// Action to perform this cycle during a stop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StopAction {
    /// No stop in progress.
    None,
    /// Drive at this power [%].
    Drive(f64),
    /// Power off, sequence still running.
    Cut,
    /// Sequence finished, power off.
    Complete { parked: bool },
}

#[derive(Debug, Clone)]
pub struct NeedleStopExecutor {
    creep_power: f64,
    near_zero_rpm: f64,
    timeout_us: u64,
    step_us: u64,
    steps: u32,
    phase: StopPhase,
    position: StopPosition,
    start_power: f64,
    start_us: u64,
}

impl NeedleStopExecutor {
    pub fn new(tuning: &StopTuning, config: &DriveConfig) -> Self {
        let mut executor = Self {
            creep_power: tuning.creep_power_percent,
            near_zero_rpm: tuning.near_zero_rpm,
            timeout_us: tuning.timeout_ms as u64 * 1_000,
            step_us: 1,
            steps: 1,
            phase: StopPhase::Idle,
            position: config.stop_position_default,
            start_power: 0.0,
            start_us: 0,
        };
        executor.configure(config);
        executor
    }

    /// Pick up changed ramp parameters.
    pub fn configure(&mut self, config: &DriveConfig) {
        self.step_us = config.soft_start_time_step_ms.max(1) as u64 * 1_000;
        self.steps = config.soft_start_ramp_steps.max(1);
    }

    #[inline]
    pub const fn phase(&self) -> StopPhase {
        self.phase
    }

    #[inline]
    pub const fn position(&self) -> StopPosition {
        self.position
    }

    #[inline]
    pub const fn is_active(&self) -> bool {
        matches!(
            self.phase,
            StopPhase::RampDown | StopPhase::Creep | StopPhase::Settling
        )
    }

    /// Start the sequence from `start_power` [%]. Ignored while active.
    pub fn trigger(&mut self, start_power: f64, position: StopPosition, now_us: u64) {
        if self.is_active() {
            return;
        }
        self.position = position;
        self.start_power = start_power.clamp(0.0, 100.0);
        self.start_us = now_us;
        self.phase = StopPhase::RampDown;
    }

    pub fn tick(&mut self, rpm: f64, needle: NeedleState, now_us: u64) -> StopAction {
        if !self.is_active() {
            return match self.phase {
                StopPhase::Complete { parked } => StopAction::Complete { parked },
                _ => StopAction::None,
            };
        }

        let elapsed = now_us.saturating_sub(self.start_us);
        if elapsed >= self.timeout_us {
            self.phase = StopPhase::Complete { parked: false };
            return StopAction::Complete { parked: false };
        }

        let at_target = needle.at(self.position);
        let near_zero = rpm <= self.near_zero_rpm;

        match self.phase {
            StopPhase::RampDown => {
                let step = (elapsed / self.step_us + 1).min(self.steps as u64) as f64;
                let fraction = 1.0 - step / self.steps as f64;
                let power = self.creep_power + (self.start_power - self.creep_power).max(0.0) * fraction;
                if step as u32 >= self.steps || near_zero {
                    self.phase = StopPhase::Creep;
                    return self.creep(at_target, near_zero);
                }
                StopAction::Drive(power)
            }
            StopPhase::Creep => self.creep(at_target, near_zero),
            StopPhase::Settling => {
                if at_target && near_zero {
                    self.phase = StopPhase::Complete { parked: true };
                    StopAction::Complete { parked: true }
                } else if !at_target && near_zero {
                    // Rolled past the window; nudge again.
                    self.phase = StopPhase::Creep;
                    StopAction::Drive(self.creep_power)
                } else {
                    StopAction::Cut
                }
            }
            StopPhase::Idle | StopPhase::Complete { .. } => StopAction::None,
        }
    }

    fn creep(&mut self, at_target: bool, near_zero: bool) -> StopAction {
        if !at_target {
            return StopAction::Drive(self.creep_power);
        }
        if near_zero {
            self.phase = StopPhase::Complete { parked: true };
            return StopAction::Complete { parked: true };
        }
        self.phase = StopPhase::Settling;
        StopAction::Cut
    }

    pub fn reset(&mut self) {
        self.phase = StopPhase::Idle;
        self.start_power = 0.0;
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
