//! Simulation driver implementation.
//!
//! The `SimulationDriver` implements the `HalDriver` trait to provide a
//! software sewing head: mains, TRIAC, motor, rotation sensor, needle cam
//! and pedal, all raised through the same interrupt hooks the board uses.

use needle_common::drive::config::EngineTuning;
use needle_control_unit::isr::IsrBus;
use tracing::{debug, info};

use super::mains::MainsWaveform;
use super::physics::{MotorModel, NeedleCam};
use crate::config::SimulationConfig;
use crate::driver::{DriverDiagnostics, HalDriver, HalError};

/// Simulation driver implementing the HalDriver trait.
pub struct SimulationDriver {
    /// Driver name
    name: &'static str,
    /// Driver version
    version: &'static str,
    /// Initialized flag
    initialized: bool,
    config: SimulationConfig,
    mains: MainsWaveform,
    motor: MotorModel,
    cam: NeedleCam,
    pulses_per_rev: f64,
    next_pulse_rev: f64,
    /// TRIAC latched on since the last gate pulse, until the next crossing.
    conducting: bool,
    gate_prev: bool,
    gate_pulses: u64,
    pedal_adc: u16,
    last_step_us: u64,
}

impl SimulationDriver {
    /// Create a new simulation driver instance.
    pub fn new(config: SimulationConfig) -> Self {
        let motor = MotorModel::new(config.motor, config.initial_angle_deg);
        Self {
            name: "simulation",
            version: env!("CARGO_PKG_VERSION"),
            initialized: false,
            mains: MainsWaveform::new(config.mains_frequency_hz),
            cam: config.needle,
            pulses_per_rev: 1.0,
            next_pulse_rev: next_pulse_after(motor.revs(), 1.0),
            motor,
            config,
            conducting: false,
            gate_prev: false,
            gate_pulses: 0,
            pedal_adc: 0,
            last_step_us: 0,
        }
    }

    /// Advance the plant to `now_us`.
    ///
    /// Order within a step follows the hardware: mains edge, gate, then the
    /// shaft integrates over the elapsed interval and the sensors follow it.
    pub fn step(&mut self, bus: &IsrBus, now_us: u64) {
        if !self.initialized {
            return;
        }
        let dt_us = now_us.saturating_sub(self.last_step_us);
        self.last_step_us = now_us;

        // ── Mains ──
        if self.mains.advance(now_us) {
            // Current through the TRIAC falls to zero at every crossing.
            self.conducting = false;
            if self.mains.edge_visible(now_us) {
                bus.zero_cross_edge(now_us);
            }
        }
        let live = self.mains.is_live(now_us);
        if !live {
            self.conducting = false;
        }

        // ── Gate ──
        let gate = bus.timer(now_us);
        if gate && !self.gate_prev {
            self.gate_pulses += 1;
            if live {
                self.conducting = true;
            }
        }
        self.gate_prev = gate;

        // ── Shaft ──
        let p_inst = if self.conducting {
            2.0 * self.mains.phase(now_us).sin().powi(2)
        } else {
            0.0
        };
        self.motor.step(p_inst, dt_us as f64 * 1e-6);

        // ── Sensors ──
        let revs = self.motor.revs();
        while revs >= self.next_pulse_rev {
            bus.rpm_pulse(now_us);
            self.next_pulse_rev += 1.0 / self.pulses_per_rev;
        }
        let needle = self.cam.levels(self.motor.angle_deg());
        bus.needle.set_levels(needle.up_active, needle.down_active);
        bus.pedal.store(self.pedal_adc);
    }
}

/// First pulse position strictly after `revs`.
fn next_pulse_after(revs: f64, pulses_per_rev: f64) -> f64 {
    ((revs * pulses_per_rev).floor() + 1.0) / pulses_per_rev
}

impl HalDriver for SimulationDriver {
    fn name(&self) -> &'static str {
        self.name
    }

    fn version(&self) -> &'static str {
        self.version
    }

    fn init(&mut self, tuning: &EngineTuning) -> Result<(), HalError> {
        self.config.validate().map_err(HalError::InitFailed)?;
        if tuning.rpm.pulses_per_rev == 0 {
            return Err(HalError::InitFailed(
                "rotation sensor needs at least one pulse per revolution".to_string(),
            ));
        }
        self.pulses_per_rev = tuning.rpm.pulses_per_rev as f64;
        self.next_pulse_rev = next_pulse_after(self.motor.revs(), self.pulses_per_rev);

        let nominal = tuning.mains.nominal_half_cycle_us as u64;
        let actual = self.mains.half_cycle_us();
        if nominal.abs_diff(actual) > 1_000 {
            debug!(
                nominal,
                actual, "Simulated mains differs from the nominal half-cycle"
            );
        }

        info!(
            "Initializing simulation driver: {:.0} Hz mains, {} pulse(s)/rev, {:.0} rpm at full power",
            self.config.mains_frequency_hz,
            tuning.rpm.pulses_per_rev,
            self.motor.params().steady_rpm(1.0)
        );
        self.initialized = true;
        Ok(())
    }

    fn step(&mut self, bus: &IsrBus, now_us: u64) {
        SimulationDriver::step(self, bus, now_us);
    }

    fn set_pedal(&mut self, adc: u16) {
        self.pedal_adc = adc;
    }

    fn inject_mains_dropout(&mut self, now_us: u64, duration_us: u64) -> Result<(), HalError> {
        if !self.initialized {
            return Err(HalError::NotInitialized(self.name));
        }
        info!(at_us = now_us, duration_us, "Mains dropout injected");
        self.mains.inject_dropout(now_us, duration_us);
        Ok(())
    }

    fn diagnostics(&self) -> DriverDiagnostics {
        DriverDiagnostics {
            rpm: self.motor.rpm(),
            shaft_angle_deg: self.motor.angle_deg(),
            needle: self.cam.levels(self.motor.angle_deg()),
            conducting: self.conducting,
            mains_live: self.mains.is_live(self.last_step_us),
            gate_pulses: self.gate_pulses,
        }
    }

    fn shutdown(&mut self) -> Result<(), HalError> {
        info!(
            "Simulation driver shutdown: {} gate pulses, shaft at {:.1}°",
            self.gate_pulses,
            self.motor.angle_deg()
        );
        self.conducting = false;
        self.initialized = false;
        Ok(())
    }
}
