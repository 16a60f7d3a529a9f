//! Motor control engine: one tick per control period.
//!
//! Each tick takes a [`Readings`] snapshot of the sensors, evaluates faults,
//! advances the state machine and returns the motor power together with at
//! most one firing command for the current half-cycle. The engine never
//! touches interrupt-side state itself; the cycle runner hands its output
//! to the TRIAC scheduler.
//!
//! Power sources per state:
//!
//! | State       | Power                                         |
//! |-------------|-----------------------------------------------|
//! | Idle, Fault | 0                                             |
//! | Running     | PID on the ramped setpoint, or open-loop ramp  |
//! | Stopping    | ramp-down, creep, cut                         |
//! | Calibrating | 100 %                                         |
//! | Autotuning  | relay high/low                                |

use needle_common::config::ConfigError;
use needle_common::consts::RPM_CALIBRATED_MAX;
use needle_common::drive::command::{Command, CommandAck};
use needle_common::drive::config::{DriveConfig, EngineTuning, ParamName, ParamValue};
use needle_common::drive::error::{
    AutotuneFailureKind, CalibrationFailureKind, ConfigValidationError, DriveError, FaultFlags,
};
use needle_common::drive::state::{MotorState, NeedleState};
use needle_common::drive::status::StatusSnapshot;
use needle_common::drive::timing::{FiringCommand, MainsStatus};
use tracing::{debug, error, info, warn};

use crate::control::autotune::{AutotuneStep, Autotuner, TunedGains};
use crate::control::calibration::{CalibrationStep, Calibrator};
use crate::control::pid::{PidController, PidGains};
use crate::control::ramp::SoftStartRamp;
use crate::safety::monitor::FaultMonitor;
use crate::sensors::pedal::PedalInput;
use crate::state::machine::{MotorEvent, MotorStateMachine, TransitionResult};
use crate::state::stop::{NeedleStopExecutor, StopAction};
use crate::triac::PhaseCurve;

/// Sensor snapshot for one tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Readings {
    pub now_us: u64,
    pub mains: MainsStatus,
    pub rpm: f64,
    pub needle: NeedleState,
    pub pedal_adc: u16,
    /// Stale firing submissions since the last accepted one.
    pub consecutive_stale: u32,
}

/// Result of one tick.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TickOutput {
    pub power_percent: f64,
    /// Command for the current half-cycle, emitted once per cycle.
    pub firing: Option<FiringCommand>,
    /// Drop whatever the scheduler still holds.
    pub cancel_pending: bool,
}

/// Everything `reboot` resets. The configuration lives outside.
#[derive(Debug)]
struct ControllerState {
    machine: MotorStateMachine,
    monitor: FaultMonitor,
    pid: PidController,
    ramp: SoftStartRamp,
    stop: NeedleStopExecutor,
    calibrator: Calibrator,
    autotuner: Autotuner,
    faults: FaultFlags,
    last_failure: Option<DriveError>,
    power: f64,
    target_rpm: f64,
    last_pid_cycle: Option<u32>,
    last_fired_cycle: Option<u32>,
    /// STOPPING entered since the last tick output; drop the pending command.
    stop_entered: bool,
    /// Pedal seen released since boot or the last reset.
    pedal_armed: bool,
    last: Option<Readings>,
}

impl ControllerState {
    fn new(config: &DriveConfig, tuning: &EngineTuning) -> Self {
        let half_cycle_s = tuning.mains.nominal_half_cycle_us as f64 / 1_000_000.0;
        Self {
            machine: MotorStateMachine::new(),
            monitor: FaultMonitor::new(tuning),
            pid: PidController::new(
                PidGains::power(config.kp, config.ki, config.kd)
                    .with_derivative_filter(tuning.pid.derivative_filter_s()),
                half_cycle_s,
            ),
            ramp: SoftStartRamp::new(config),
            stop: NeedleStopExecutor::new(&tuning.stop, config),
            calibrator: Calibrator::new(&tuning.calibration),
            autotuner: Autotuner::new(&tuning.autotune),
            faults: FaultFlags::empty(),
            last_failure: None,
            power: 0.0,
            target_rpm: 0.0,
            last_pid_cycle: None,
            last_fired_cycle: None,
            stop_entered: false,
            pedal_armed: false,
            last: None,
        }
    }
}

pub struct MotorControlEngine {
    config: DriveConfig,
    tuning: EngineTuning,
    pedal: PedalInput,
    curve: PhaseCurve,
    ctl: ControllerState,
}

impl MotorControlEngine {
    /// Build an engine in IDLE. Both records are validated.
    pub fn new(config: DriveConfig, tuning: EngineTuning) -> Result<Self, ConfigError> {
        config
            .validate()
            .map_err(|e| ConfigError::ValidationError(e.to_string()))?;
        tuning.validate().map_err(ConfigError::ValidationError)?;

        info!(
            pid_enabled = config.pid_enabled,
            max_rpm = config.max_rpm_setting,
            curve = ?tuning.triac.curve,
            "Motor control engine initialized"
        );
        Ok(Self {
            pedal: PedalInput::new(&tuning.pedal),
            curve: PhaseCurve::new(tuning.triac.curve, &tuning.triac),
            ctl: ControllerState::new(&config, &tuning),
            config,
            tuning,
        })
    }

    #[inline]
    pub fn state(&self) -> MotorState {
        self.ctl.machine.state()
    }

    #[inline]
    pub fn config(&self) -> &DriveConfig {
        &self.config
    }

    #[inline]
    pub fn tuning(&self) -> &EngineTuning {
        &self.tuning
    }

    #[inline]
    pub fn faults(&self) -> FaultFlags {
        self.ctl.faults
    }

    #[inline]
    pub fn last_failure(&self) -> Option<DriveError> {
        self.ctl.last_failure
    }

    // ─── Tick ───────────────────────────────────────────────────────

    pub fn tick(&mut self, r: &Readings) -> TickOutput {
        let now = r.now_us;
        self.ctl.last = Some(*r);

        let raised = self.ctl.monitor.evaluate(r, self.ctl.power, now);
        if !raised.is_empty() {
            self.latch_fault(raised);
        }

        let pedal_fraction = self.pedal.fraction(r.pedal_adc);
        if pedal_fraction <= 0.0 {
            self.ctl.pedal_armed = true;
        }

        let power = match self.state() {
            MotorState::Idle => {
                self.ctl.target_rpm = 0.0;
                if pedal_fraction > 0.0 && self.ctl.pedal_armed {
                    self.start_running(now);
                    self.run(r)
                } else {
                    0.0
                }
            }
            MotorState::Running => {
                if pedal_fraction > 0.0 {
                    self.run(r)
                } else {
                    self.pedal_released(r)
                }
            }
            MotorState::Stopping => self.stopping(r),
            MotorState::Calibrating => self.calibrating(r),
            MotorState::Autotuning => self.autotuning(r),
            MotorState::Fault => 0.0,
        };

        self.ctl.power = if self.state().may_energize() {
            power.clamp(0.0, 100.0)
        } else {
            0.0
        };
        self.firing_output(r)
    }

    fn firing_output(&mut self, r: &Readings) -> TickOutput {
        let power = self.ctl.power;
        let stop_entered = core::mem::take(&mut self.ctl.stop_entered);
        if power <= 0.0 {
            return TickOutput {
                power_percent: 0.0,
                firing: None,
                cancel_pending: true,
            };
        }

        let mut out = TickOutput {
            power_percent: power,
            firing: None,
            cancel_pending: stop_entered,
        };
        if let MainsStatus::Synced {
            event,
            half_cycle_us,
        } = r.mains
        {
            if self.ctl.last_fired_cycle != Some(event.cycle_id) {
                self.ctl.last_fired_cycle = Some(event.cycle_id);
                out.firing = self
                    .curve
                    .delay_us(power, half_cycle_us)
                    .map(|delay_us| FiringCommand {
                        delay_us,
                        cycle_id: event.cycle_id,
                    });
            }
        }
        out
    }

    fn transition(&mut self, event: MotorEvent) -> Result<MotorState, &'static str> {
        let from = self.state();
        match self.ctl.machine.handle_event(event) {
            TransitionResult::Ok(to) => {
                if from != to {
                    info!(?from, ?to, ?event, "Motor state transition");
                }
                Ok(to)
            }
            TransitionResult::Rejected(reason) => {
                debug!(?from, ?event, reason, "Transition rejected");
                Err(reason)
            }
        }
    }

    fn latch_fault(&mut self, raised: FaultFlags) {
        let new = raised - self.ctl.faults;
        self.ctl.faults |= raised;
        if self.state() == MotorState::Fault {
            return;
        }
        let _ = self.transition(MotorEvent::Fault);
        self.ctl.calibrator.cancel();
        self.ctl.autotuner.cancel();
        self.ctl.stop.reset();
        self.ctl.ramp.stop();
        self.ctl.pid.reset();
        self.ctl.power = 0.0;
        self.ctl.last_failure = raised.to_error();
        error!(
            faults = ?new,
            error = ?self.ctl.last_failure,
            "Fault latched, motor power cut"
        );
    }

    // ─── Running ────────────────────────────────────────────────────

    fn start_running(&mut self, now: u64) {
        if self.transition(MotorEvent::PedalPressed).is_ok() {
            self.ctl.ramp.start(now);
            self.ctl.pid.reset();
            self.ctl.last_pid_cycle = None;
        }
    }

    fn run(&mut self, r: &Readings) -> f64 {
        let ramp = self.ctl.ramp.fraction(r.now_us);
        if !self.config.pid_enabled {
            self.ctl.target_rpm = 0.0;
            return self.pedal.open_loop_power(r.pedal_adc, &self.config) * ramp;
        }

        let target = self.pedal.target_rpm(r.pedal_adc, &self.config);
        self.ctl.target_rpm = target;
        let cycle = r.mains.event().map(|e| e.cycle_id);
        if cycle.is_none() || cycle == self.ctl.last_pid_cycle {
            return self.ctl.power;
        }
        self.ctl.last_pid_cycle = cycle;
        self.ctl.pid.update(target * ramp, r.rpm, r.now_us)
    }

    fn pedal_released(&mut self, r: &Readings) -> f64 {
        self.ctl.target_rpm = 0.0;
        self.ctl.ramp.stop();
        if r.rpm > 0.0 {
            if self.transition(MotorEvent::PedalReleasedMoving).is_ok() {
                self.begin_stop(r.now_us);
                return self.stopping(r);
            }
        } else {
            let _ = self.transition(MotorEvent::PedalReleasedStill);
        }
        0.0
    }

    fn begin_stop(&mut self, now: u64) {
        let position = self.config.stop_position_default;
        self.ctl.stop.reset();
        self.ctl.stop.trigger(self.ctl.power, position, now);
        self.ctl.stop_entered = true;
        debug!(?position, start_power = self.ctl.power, "Needle stop started");
    }

    fn stopping(&mut self, r: &Readings) -> f64 {
        match self.ctl.stop.tick(r.rpm, r.needle, r.now_us) {
            StopAction::Drive(p) => p,
            StopAction::Cut => 0.0,
            StopAction::Complete { parked } => {
                if parked {
                    info!(position = ?self.ctl.stop.position(), "Needle parked");
                } else {
                    warn!(
                        position = ?self.ctl.stop.position(),
                        rpm = r.rpm,
                        "Stop timed out, needle not parked"
                    );
                }
                self.ctl.stop.reset();
                self.ctl.pid.reset();
                let _ = self.transition(MotorEvent::StopComplete);
                0.0
            }
            StopAction::None => {
                self.ctl.stop.reset();
                let _ = self.transition(MotorEvent::StopComplete);
                0.0
            }
        }
    }

    // ─── Calibration / Autotune ─────────────────────────────────────

    fn calibrating(&mut self, r: &Readings) -> f64 {
        match self.ctl.calibrator.tick(r.rpm, r.now_us) {
            CalibrationStep::Continue => 100.0,
            CalibrationStep::Done(rpm) => {
                let value = rpm.clamp(0.0, RPM_CALIBRATED_MAX);
                match self
                    .config
                    .set_parameter(ParamName::MaxMotorRpmCalibrated, ParamValue::Number(value))
                {
                    Ok(()) => info!(max_motor_rpm = value, "Calibration complete"),
                    Err(e) => {
                        warn!(error = %e, "Calibrated value rejected");
                        self.ctl.last_failure = Some(e.into());
                    }
                }
                self.finish_procedure(MotorEvent::CalibrationFinished);
                0.0
            }
            CalibrationStep::Failed(kind) => {
                warn!(?kind, best_rpm = self.ctl.calibrator.best_rpm(), "Calibration failed");
                self.ctl.last_failure = Some(DriveError::CalibrationFailure(kind));
                self.finish_procedure(MotorEvent::CalibrationFinished);
                0.0
            }
        }
    }

    fn autotuning(&mut self, r: &Readings) -> f64 {
        self.ctl.target_rpm = self.config.autotune_target_rpm;
        match self.ctl.autotuner.tick(r.rpm, r.now_us) {
            AutotuneStep::Drive(p) => p,
            AutotuneStep::Done(result) => {
                match self.apply_tuned_gains(result.gains) {
                    Ok(()) => info!(
                        kp = result.gains.kp,
                        ki = result.gains.ki,
                        kd = result.gains.kd,
                        ku = result.ku,
                        tu_s = result.tu_s,
                        amplitude_rpm = result.amplitude_rpm,
                        "Autotune complete, PID enabled"
                    ),
                    Err(e) => {
                        warn!(error = %e, "Tuned gains rejected, previous gains kept");
                        self.ctl.last_failure =
                            Some(DriveError::AutotuneFailure(AutotuneFailureKind::NoOscillation));
                    }
                }
                self.finish_procedure(MotorEvent::AutotuneFinished);
                0.0
            }
            AutotuneStep::Failed(kind) => {
                warn!(?kind, "Autotune failed, previous gains kept");
                self.ctl.last_failure = Some(DriveError::AutotuneFailure(kind));
                self.finish_procedure(MotorEvent::AutotuneFinished);
                0.0
            }
        }
    }

    /// Store tuned gains and enable PID, all or nothing.
    fn apply_tuned_gains(&mut self, gains: TunedGains) -> Result<(), ConfigValidationError> {
        let mut next = self.config.clone();
        next.set_parameter(ParamName::Kp, ParamValue::Number(gains.kp))?;
        next.set_parameter(ParamName::Ki, ParamValue::Number(gains.ki))?;
        next.set_parameter(ParamName::Kd, ParamValue::Number(gains.kd))?;
        next.set_parameter(ParamName::PidEnabled, ParamValue::Flag(true))?;
        self.config = next;
        self.ctl.pid.set_gains(gains.kp, gains.ki, gains.kd);
        self.ctl.pid.reset();
        Ok(())
    }

    fn finish_procedure(&mut self, event: MotorEvent) {
        self.ctl.target_rpm = 0.0;
        // A held pedal must be released before the motor restarts.
        self.ctl.pedal_armed = false;
        let _ = self.transition(event);
    }

    // ─── Commands ───────────────────────────────────────────────────

    pub fn handle_command(&mut self, command: Command, now_us: u64) -> Result<CommandAck, DriveError> {
        let result = match command {
            Command::SetParameter { name, value } => self.set_parameter(name, value),
            Command::CalibrateMaxRpm => self.calibrate_max_rpm(now_us),
            Command::AutotunePid => self.autotune_pid(now_us),
            Command::StopOperations => self.stop_operations(now_us),
            Command::Reboot => Ok(self.reboot()),
        };
        match &result {
            Ok(ack) => debug!(command = command.name(), ?ack, "Command accepted"),
            Err(e) => warn!(command = command.name(), error = %e, "Command rejected"),
        }
        result
    }

    /// Validate and store one parameter. Dependent controllers pick the
    /// new value up immediately.
    pub fn set_parameter(
        &mut self,
        name: ParamName,
        value: ParamValue,
    ) -> Result<CommandAck, DriveError> {
        let was_pid = self.config.pid_enabled;
        self.config.set_parameter(name, value)?;

        let cfg = &self.config;
        self.ctl.ramp.configure(cfg);
        self.ctl.stop.configure(cfg);
        self.ctl.pid.set_gains(cfg.kp, cfg.ki, cfg.kd);
        if was_pid != cfg.pid_enabled {
            self.ctl.pid.reset();
            self.ctl.last_pid_cycle = None;
        }
        info!(param = name.as_str(), ?value, "Parameter set");
        Ok(CommandAck::Applied)
    }

    pub fn calibrate_max_rpm(&mut self, now_us: u64) -> Result<CommandAck, DriveError> {
        if self.state() == MotorState::Calibrating {
            return Ok(CommandAck::NoOp);
        }
        let state = self.state();
        self.transition(MotorEvent::Calibrate)
            .map_err(|_| DriveError::Rejected {
                command: "calibrate_max_rpm",
                state,
            })?;
        self.ctl.ramp.stop();
        self.ctl.pid.reset();
        self.ctl.calibrator.start(now_us);
        info!("Max-RPM calibration started");
        Ok(CommandAck::Started)
    }

    pub fn autotune_pid(&mut self, now_us: u64) -> Result<CommandAck, DriveError> {
        if self.state() == MotorState::Autotuning {
            return Ok(CommandAck::NoOp);
        }
        let state = self.state();
        self.transition(MotorEvent::Autotune)
            .map_err(|_| DriveError::Rejected {
                command: "autotune_pid",
                state,
            })?;
        self.ctl.autotuner.start(&self.config, now_us);
        info!(
            target_rpm = self.config.autotune_target_rpm,
            high = self.config.autotune_power_high,
            low = self.config.autotune_power_low,
            rule = ?self.tuning.autotune.rule,
            "Autotune started"
        );
        Ok(CommandAck::Started)
    }

    /// Leave any active state for a safe one. In FAULT this is the reset.
    pub fn stop_operations(&mut self, now_us: u64) -> Result<CommandAck, DriveError> {
        match self.state() {
            MotorState::Idle | MotorState::Stopping => Ok(CommandAck::NoOp),
            MotorState::Fault => {
                let _ = self.transition(MotorEvent::Reset);
                info!(cleared = ?self.ctl.faults, "Fault reset");
                self.ctl.faults = FaultFlags::empty();
                self.ctl.monitor.reset();
                self.ctl.pedal_armed = false;
                self.ctl.power = 0.0;
                self.ctl.last_fired_cycle = None;
                Ok(CommandAck::Applied)
            }
            state @ (MotorState::Running | MotorState::Calibrating | MotorState::Autotuning) => {
                match state {
                    MotorState::Calibrating => {
                        self.ctl.calibrator.cancel();
                        self.ctl.last_failure =
                            Some(DriveError::CalibrationFailure(CalibrationFailureKind::Aborted));
                    }
                    MotorState::Autotuning => {
                        self.ctl.autotuner.cancel();
                        self.ctl.last_failure =
                            Some(DriveError::AutotuneFailure(AutotuneFailureKind::Aborted));
                    }
                    _ => {}
                }
                self.ctl.ramp.stop();
                self.ctl.pedal_armed = false;
                self.transition(MotorEvent::Abort)
                    .map_err(|_| DriveError::Rejected {
                        command: "stop_operations",
                        state,
                    })?;
                self.begin_stop(now_us);
                Ok(CommandAck::Started)
            }
        }
    }

    /// Back to the boot state. The configuration survives.
    pub fn reboot(&mut self) -> CommandAck {
        warn!(state = ?self.state(), "Controller reboot");
        self.ctl = ControllerState::new(&self.config, &self.tuning);
        CommandAck::Applied
    }

    // ─── Status ─────────────────────────────────────────────────────

    pub fn status(&self) -> StatusSnapshot {
        let last = self.ctl.last;
        let needle = last.map(|r| r.needle).unwrap_or_default();
        let cfg = &self.config;
        StatusSnapshot {
            state: self.state(),
            pedal_adc: last.map_or(0, |r| r.pedal_adc),
            target_rpm: self.ctl.target_rpm,
            current_rpm: last.map_or(0.0, |r| r.rpm),
            motor_power_percent: self.ctl.power,
            needle_up_active: needle.up_active,
            needle_down_active: needle.down_active,
            pid_enabled: cfg.pid_enabled,
            kp: cfg.kp,
            ki: cfg.ki,
            kd: cfg.kd,
            max_rpm_setting: cfg.max_rpm_setting,
            max_motor_rpm_calibrated: cfg.max_motor_rpm_calibrated,
            autotune_active: self.state() == MotorState::Autotuning,
            autotune_stage: self.ctl.autotuner.stage(),
            calibration_active: self.state() == MotorState::Calibrating,
            fault_bits: self.ctl.faults.bits(),
            last_failure: self.ctl.last_failure,
            consecutive_stale: last.map_or(0, |r| r.consecutive_stale),
            cycle_id: last
                .and_then(|r| r.mains.event())
                .map_or(0, |e| e.cycle_id),
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
