//! Universal motor and handwheel dynamics.
//!
//! Series-wound universal motor driving the arm shaft through a 1:1 belt.
//! Torque falls linearly from stall to the no-load speed and is scaled by
//! the instantaneous conducted power, `2·sin²θ` while the TRIAC conducts,
//! whose half-cycle mean is the conducted power fraction. Load is Coulomb
//! plus viscous friction; the shaft only turns forward.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

const RPM_PER_RAD_S: f64 = 60.0 / (2.0 * PI);

/// Mechanical parameters (`[simulation.motor]`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MotorParams {
    /// Stall torque at full conduction [N·m].
    pub stall_torque_nm: f64,
    /// Speed at which motor torque vanishes [rpm].
    pub no_load_rpm: f64,
    /// Coulomb (static and sliding) friction [N·m].
    pub coulomb_friction_nm: f64,
    /// Viscous friction [N·m·s/rad].
    pub viscous_friction: f64,
    /// Motor, belt and handwheel inertia [kg·m²].
    pub inertia: f64,
}

impl Default for MotorParams {
    fn default() -> Self {
        Self {
            stall_torque_nm: 2.0,
            no_load_rpm: 8_000.0,
            coulomb_friction_nm: 0.22,
            viscous_friction: 0.001,
            inertia: 0.0015,
        }
    }
}

impl MotorParams {
    pub fn validate(&self) -> Result<(), String> {
        let positive = [
            ("stall_torque_nm", self.stall_torque_nm),
            ("no_load_rpm", self.no_load_rpm),
            ("inertia", self.inertia),
        ];
        for (name, v) in positive {
            if !v.is_finite() || v <= 0.0 {
                return Err(format!("simulation.motor.{name} must be positive, got {v}"));
            }
        }
        let non_negative = [
            ("coulomb_friction_nm", self.coulomb_friction_nm),
            ("viscous_friction", self.viscous_friction),
        ];
        for (name, v) in non_negative {
            if !v.is_finite() || v < 0.0 {
                return Err(format!("simulation.motor.{name} must be >= 0, got {v}"));
            }
        }
        if self.coulomb_friction_nm >= self.stall_torque_nm {
            return Err("simulation.motor: friction exceeds stall torque".to_string());
        }
        Ok(())
    }

    /// Steady speed under constant mean power `fraction` [rpm].
    pub fn steady_rpm(&self, fraction: f64) -> f64 {
        let drive = self.stall_torque_nm * fraction.clamp(0.0, 1.0);
        if drive <= self.coulomb_friction_nm {
            return 0.0;
        }
        let omega_nl = self.no_load_rpm / RPM_PER_RAD_S;
        let omega = (drive - self.coulomb_friction_nm) / (drive / omega_nl + self.viscous_friction);
        omega * RPM_PER_RAD_S
    }
}

/// Shaft state integrated with explicit Euler steps.
#[derive(Debug, Clone)]
pub struct MotorModel {
    params: MotorParams,
    omega_nl: f64,
    /// [rad/s]
    omega: f64,
    /// Cumulative shaft travel [rev].
    revs: f64,
}

impl MotorModel {
    pub fn new(params: MotorParams, initial_angle_deg: f64) -> Self {
        Self {
            params,
            omega_nl: params.no_load_rpm / RPM_PER_RAD_S,
            omega: 0.0,
            revs: initial_angle_deg.rem_euclid(360.0) / 360.0,
        }
    }

    /// Advance by `dt_s` with instantaneous power `p_inst` (0..=2).
    pub fn step(&mut self, p_inst: f64, dt_s: f64) {
        let p = self.params;
        let drive = p.stall_torque_nm * (1.0 - self.omega / self.omega_nl).max(0.0) * p_inst;

        if self.omega <= 0.0 && drive <= p.coulomb_friction_nm {
            // Static friction holds the shaft.
            self.omega = 0.0;
            return;
        }

        let load = p.coulomb_friction_nm + p.viscous_friction * self.omega;
        let accel = (drive - load) / p.inertia;
        let next = (self.omega + accel * dt_s).max(0.0);
        self.revs += 0.5 * (self.omega + next) * dt_s / (2.0 * PI);
        self.omega = next;
    }

    #[inline]
    pub fn rpm(&self) -> f64 {
        self.omega * RPM_PER_RAD_S
    }

    #[inline]
    pub fn revs(&self) -> f64 {
        self.revs
    }

    /// Shaft angle in [0, 360).
    #[inline]
    pub fn angle_deg(&self) -> f64 {
        self.revs.fract() * 360.0
    }

    #[inline]
    pub fn params(&self) -> &MotorParams {
        &self.params
    }
}
