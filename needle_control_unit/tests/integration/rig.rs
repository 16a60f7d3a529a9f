//! Test rig: interrupt bus + cycle runner driving a first-order motor.
//!
//! The motor settles at `GAIN_RPM × conducted − FRICTION × TAU` with time
//! constant `TAU`. Conduction is measured from the actual gate edges and
//! applied over the following half-cycle. Needle sensors are 60° windows
//! at 0° (up) and 180° (down).

use core::f64::consts::PI;

use needle_common::drive::command::{Command, CommandAck};
use needle_common::drive::config::{DriveConfig, EngineTuning, RpmTuning, StopTuning};
use needle_common::drive::error::DriveError;
use needle_common::drive::state::{MotorState, NeedleState};
use needle_common::drive::status::StatusSnapshot;
use needle_control_unit::cycle::CycleRunner;
use needle_control_unit::isr::IsrBus;
use needle_control_unit::triac::conducted_power_fraction;

pub const STEP_US: u64 = 50;
pub const HALF_CYCLE_US: u64 = 10_000;
pub const TICK_US: u64 = 1_000;
pub const PULSES_PER_REV: u32 = 4;

const GAIN_RPM: f64 = 4_500.0;
const TAU_S: f64 = 0.3;
const FRICTION_RPM_PER_S: f64 = 2_000.0;
const WINDOW_REV: f64 = 1.0 / 6.0;

pub fn tuning() -> EngineTuning {
    EngineTuning {
        rpm: RpmTuning {
            pulses_per_rev: PULSES_PER_REV,
            ..RpmTuning::default()
        },
        stop: StopTuning {
            creep_power_percent: 15.0,
            ..StopTuning::default()
        },
        ..EngineTuning::default()
    }
}

pub fn closed_loop(max_rpm: f64) -> DriveConfig {
    DriveConfig {
        pid_enabled: true,
        kp: 0.02,
        ki: 0.1,
        kd: 0.0,
        max_rpm_setting: max_rpm,
        ..DriveConfig::default()
    }
}

pub struct Rig {
    pub bus: IsrBus,
    pub runner: CycleRunner,
    pub now_us: u64,
    /// True motor speed.
    pub rpm: f64,
    revs: f64,
    next_pulse_rev: f64,
    next_zc_us: u64,
    zc_us: u64,
    dropout: Option<(u64, u64)>,
    pending: f64,
    applied: f64,
    gate_prev: bool,
    gate_high_since: u64,
    fires_this_half: u32,
    /// Rising gate edges since boot.
    pub fires: u64,
    pub max_fires_per_half: u32,
    pub max_gate_high_us: u64,
    /// Fires inside the late guard band.
    pub late_fires: u64,
}

impl Rig {
    pub fn new(config: DriveConfig) -> Self {
        let tuning = tuning();
        Self {
            bus: IsrBus::new(&tuning, 0),
            runner: CycleRunner::new(config, tuning, 500).unwrap(),
            now_us: 0,
            rpm: 0.0,
            revs: 0.0,
            next_pulse_rev: 1.0 / PULSES_PER_REV as f64,
            next_zc_us: HALF_CYCLE_US,
            zc_us: 0,
            dropout: None,
            pending: 0.0,
            applied: 0.0,
            gate_prev: false,
            gate_high_since: 0,
            fires_this_half: 0,
            fires: 0,
            max_fires_per_half: 0,
            max_gate_high_us: 0,
            late_fires: 0,
        }
    }

    fn mains_on(&self, t: u64) -> bool {
        !matches!(self.dropout, Some((from, until)) if t >= from && t < until)
    }

    pub fn step(&mut self) {
        self.now_us += STEP_US;
        let t = self.now_us;

        // ── Mains ──
        if t >= self.next_zc_us {
            self.next_zc_us += HALF_CYCLE_US;
            if self.mains_on(t) {
                self.bus.zero_cross_edge(t);
                self.zc_us = t;
            }
            self.applied = self.pending;
            self.pending = 0.0;
            self.fires_this_half = 0;
        }
        if !self.mains_on(t) {
            self.applied = 0.0;
            self.pending = 0.0;
        }

        // ── Gate ──
        let gate = self.bus.timer(t);
        if gate && !self.gate_prev {
            let into_half = t - self.zc_us;
            let alpha = PI * into_half as f64 / HALF_CYCLE_US as f64;
            if self.mains_on(t) {
                self.pending = conducted_power_fraction(alpha);
            }
            self.fires += 1;
            self.fires_this_half += 1;
            self.max_fires_per_half = self.max_fires_per_half.max(self.fires_this_half);
            if into_half >= HALF_CYCLE_US - 200 {
                self.late_fires += 1;
            }
            self.gate_high_since = t;
        }
        if gate {
            self.max_gate_high_us = self.max_gate_high_us.max(t - self.gate_high_since + STEP_US);
        }
        self.gate_prev = gate;

        // ── Motor ──
        let dt = STEP_US as f64 / 1_000_000.0;
        let drive = (GAIN_RPM * self.applied - self.rpm) / TAU_S - FRICTION_RPM_PER_S;
        let accel = if self.rpm > 0.0 { drive } else { drive.max(0.0) };
        self.rpm = (self.rpm + accel * dt).max(0.0);
        self.revs += self.rpm / 60.0 * dt;
        while self.revs >= self.next_pulse_rev {
            self.bus.rpm_pulse(t);
            self.next_pulse_rev += 1.0 / PULSES_PER_REV as f64;
        }
        let needle = self.needle();
        self.bus.needle.set_levels(needle.up_active, needle.down_active);

        // ── Control ──
        if t % TICK_US == 0 {
            self.runner.tick(&self.bus, t);
        }
    }

    pub fn run_for(&mut self, duration_us: u64) {
        let end = self.now_us + duration_us;
        while self.now_us < end {
            self.step();
        }
    }

    /// Step until `done` holds or `limit_us` elapses. Returns whether it held.
    pub fn run_until(&mut self, limit_us: u64, done: impl Fn(&Rig) -> bool) -> bool {
        let end = self.now_us + limit_us;
        while self.now_us < end {
            self.step();
            if done(self) {
                return true;
            }
        }
        false
    }

    /// True needle sensor levels at the current shaft angle.
    pub fn needle(&self) -> NeedleState {
        let phase = self.revs.fract();
        NeedleState {
            up_active: phase < WINDOW_REV,
            down_active: (0.5..0.5 + WINDOW_REV).contains(&phase),
        }
    }

    pub fn set_pedal(&self, adc: u16) {
        self.bus.pedal.store(adc);
    }

    /// No zero-cross edges for `duration_us` from now.
    pub fn mains_dropout(&mut self, duration_us: u64) {
        self.dropout = Some((self.now_us, self.now_us + duration_us));
    }

    pub fn command(&mut self, command: Command) -> Result<CommandAck, DriveError> {
        self.runner.handle_command(&self.bus, command, self.now_us)
    }

    pub fn state(&self) -> MotorState {
        self.runner.engine().state()
    }

    pub fn status(&self) -> StatusSnapshot {
        self.runner.status()
    }

    /// Release, then press the pedal to `adc`, and let the ramp start.
    pub fn start_sewing(&mut self, adc: u16) {
        self.set_pedal(0);
        self.run_for(20_000);
        self.set_pedal(adc);
        self.run_for(5 * TICK_US);
    }
}
