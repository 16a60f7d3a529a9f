//! Speed PID with backward Euler integration, optional derivative filter
//! (Tf) and anti-windup by conditional integration.
//!
//! Input is RPM error, output is motor power [%] clamped to
//! `[out_min, out_max]`. While the unclamped output is saturated, the
//! integrator is frozen for every step that would push it further into
//! saturation. Steps that pull it back out still integrate.
//!
//! Zero Ki disables integral; zero Kd disables derivative.

/// Internal state of the PID controller.
#[derive(Debug, Clone, Copy, Default)]
pub struct PidState {
    /// Integral accumulator (already multiplied by Ki).
    integral: f64,
    /// Previous error (for derivative).
    prev_error: f64,
    /// Filtered derivative term (low-pass via Tf).
    derivative_filtered: f64,
    /// Whether `prev_error` holds a real sample.
    primed: bool,
}

impl PidState {
    /// Reset all internal state to zero.
    #[inline]
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    #[inline]
    pub fn integral(&self) -> f64 {
        self.integral
    }
}

/// PID gains and output limits.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PidGains {
    /// Proportional gain [%/rpm].
    pub kp: f64,
    /// Integral gain [%/(rpm·s)] (0 = disabled).
    pub ki: f64,
    /// Derivative gain [%·s/rpm] (0 = disabled).
    pub kd: f64,
    /// Derivative filter time constant [s] (0 = unfiltered).
    pub tf: f64,
    pub out_min: f64,
    pub out_max: f64,
}

impl PidGains {
    pub const fn power(kp: f64, ki: f64, kd: f64) -> Self {
        Self {
            kp,
            ki,
            kd,
            tf: 0.0,
            out_min: 0.0,
            out_max: 100.0,
        }
    }

    /// Same gains with derivative filter time constant `tf` [s].
    pub const fn with_derivative_filter(self, tf: f64) -> Self {
        Self { tf, ..self }
    }
}

/// Compute one PID step. Returns the clamped output.
///
/// - `error`: target − measured [rpm].
/// - `dt`: actual elapsed time since the previous step [s].
#[inline]
pub fn pid_compute(state: &mut PidState, gains: &PidGains, error: f64, dt: f64) -> f64 {
    if !(dt > 0.0) || !error.is_finite() {
        return state.integral.clamp(gains.out_min, gains.out_max);
    }

    // ── P term ──────────────────────────────────────────────
    let p_term = gains.kp * error;

    // ── D term (with first-order filter) ────────────────────
    let d_term = if gains.kd != 0.0 && state.primed {
        let raw_derivative = (error - state.prev_error) / dt;
        if gains.tf > 0.0 {
            let alpha = dt / (gains.tf + dt);
            state.derivative_filtered += alpha * (raw_derivative - state.derivative_filtered);
            gains.kd * state.derivative_filtered
        } else {
            gains.kd * raw_derivative
        }
    } else {
        state.derivative_filtered = 0.0;
        0.0
    };

    state.prev_error = error;
    state.primed = true;

    // ── I term (backward Euler, conditional integration) ────
    if gains.ki != 0.0 {
        let step = gains.ki * error * dt;
        let raw = p_term + state.integral + step + d_term;
        let saturated_high = raw > gains.out_max && step > 0.0;
        let saturated_low = raw < gains.out_min && step < 0.0;
        if !saturated_high && !saturated_low {
            state.integral += step;
        }
    } else {
        state.integral = 0.0;
    }

    (p_term + state.integral + d_term).clamp(gains.out_min, gains.out_max)
}

/// PID with its own time base.
#[derive(Debug, Clone)]
pub struct PidController {
    state: PidState,
    gains: PidGains,
    last_us: Option<u64>,
    nominal_dt_s: f64,
}

impl PidController {
    pub fn new(gains: PidGains, nominal_dt_s: f64) -> Self {
        Self {
            state: PidState::default(),
            gains,
            last_us: None,
            nominal_dt_s,
        }
    }

    /// One step; `dt` is measured from the previous call.
    pub fn update(&mut self, setpoint: f64, measured: f64, now_us: u64) -> f64 {
        let dt = match self.last_us {
            Some(last) => now_us.saturating_sub(last) as f64 / 1_000_000.0,
            None => self.nominal_dt_s,
        };
        self.last_us = Some(now_us);
        pid_compute(&mut self.state, &self.gains, setpoint - measured, dt)
    }

    pub fn reset(&mut self) {
        self.state.reset();
        self.last_us = None;
    }

    /// Replace gains. Integral memory is kept (it is stored Ki-weighted).
    pub fn set_gains(&mut self, kp: f64, ki: f64, kd: f64) {
        self.gains.kp = kp;
        self.gains.ki = ki;
        self.gains.kd = kd;
    }

    #[inline]
    pub fn gains(&self) -> &PidGains {
        &self.gains
    }

    #[inline]
    pub fn state(&self) -> &PidState {
        &self.state
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const DT: f64 = 0.01; // one 50 Hz half-cycle

    #[test]
    fn pure_proportional() {
        let mut s = PidState::default();
        let g = PidGains::power(0.01, 0.0, 0.0);
        let out = pid_compute(&mut s, &g, 1_000.0, DT);
        assert!((out - 10.0).abs() < 1e-12);
    }

    #[test]
    fn output_is_clamped() {
        let mut s = PidState::default();
        let g = PidGains::power(1.0, 0.0, 0.0);
        assert_eq!(pid_compute(&mut s, &g, 5_000.0, DT), 100.0);
        assert_eq!(pid_compute(&mut s, &g, -5_000.0, DT), 0.0);
    }

    #[test]
    fn integral_accumulates() {
        let mut s = PidState::default();
        let g = PidGains::power(0.0, 0.1, 0.0);
        for _ in 0..10 {
            pid_compute(&mut s, &g, 100.0, DT);
        }
        // 0.1 * 100 * 0.01 * 10 = 1.0
        assert!((s.integral - 1.0).abs() < 1e-10);
    }

    #[test]
    fn derivative_responds_to_error_change() {
        let mut s = PidState::default();
        let g = PidGains {
            out_min: -1e9,
            out_max: 1e9,
            ..PidGains::power(0.0, 0.0, 0.01)
        };
        assert_eq!(pid_compute(&mut s, &g, 0.0, DT), 0.0);
        // (100 - 0) / 0.01 = 10_000; * 0.01 = 100
        let out = pid_compute(&mut s, &g, 100.0, DT);
        assert!((out - 100.0).abs() < 1e-8);
    }

    #[test]
    fn derivative_filter_smooths_step() {
        let mut s = PidState::default();
        let g = PidGains {
            out_min: -1e9,
            out_max: 1e9,
            ..PidGains::power(0.0, 0.0, 0.01).with_derivative_filter(DT)
        };
        pid_compute(&mut s, &g, 0.0, DT);
        // alpha = dt / (tf + dt) = 0.5, half of the raw 100.
        let first = pid_compute(&mut s, &g, 100.0, DT);
        assert!((first - 50.0).abs() < 1e-8);
        // Error holds: raw derivative 0, filter decays by half.
        let second = pid_compute(&mut s, &g, 100.0, DT);
        assert!((second - 25.0).abs() < 1e-8);
    }

    #[test]
    fn set_gains_keeps_filter() {
        let gains = PidGains::power(0.01, 0.1, 0.0).with_derivative_filter(0.02);
        let mut c = PidController::new(gains, DT);
        c.set_gains(0.02, 0.2, 0.001);
        assert_eq!(c.gains().tf, 0.02);
        assert_eq!(c.gains().kd, 0.001);
    }

    #[test]
    fn no_derivative_kick_on_first_sample() {
        let mut s = PidState::default();
        let g = PidGains::power(0.0, 0.0, 1.0);
        assert_eq!(pid_compute(&mut s, &g, 3_000.0, DT), 0.0);
    }

    #[test]
    fn anti_windup_freezes_integral_when_pinned_high() {
        let mut s = PidState::default();
        let g = PidGains::power(0.01, 0.5, 0.0);
        // Stalled motor: error 3000 rpm for 60 s of half-cycles.
        for _ in 0..6_000 {
            let out = pid_compute(&mut s, &g, 3_000.0, DT);
            assert!(out <= 100.0);
        }
        // Unfrozen it would be 0.5 * 3000 * 60 = 90_000.
        assert!(s.integral <= 100.0, "integral = {}", s.integral);
    }

    #[test]
    fn anti_windup_freezes_integral_when_pinned_low() {
        let mut s = PidState::default();
        let g = PidGains::power(0.01, 0.5, 0.0);
        for _ in 0..6_000 {
            assert_eq!(pid_compute(&mut s, &g, -3_000.0, DT), 0.0);
        }
        assert!(s.integral.abs() < 1e-9);
    }

    #[test]
    fn recovers_quickly_after_saturation() {
        let mut s = PidState::default();
        let g = PidGains::power(0.01, 0.5, 0.0);
        for _ in 0..1_000 {
            pid_compute(&mut s, &g, 3_000.0, DT);
        }
        // Small negative error must bring output below the rail soon.
        let mut out = 100.0;
        for _ in 0..200 {
            out = pid_compute(&mut s, &g, -50.0, DT);
        }
        assert!(out < 100.0);
    }

    #[test]
    fn controller_uses_actual_dt() {
        let mut c = PidController::new(PidGains::power(0.0, 1.0, 0.0), DT);
        c.update(10.0, 0.0, 0); // nominal dt: +0.1
        c.update(10.0, 0.0, 20_000); // 20 ms: +0.2
        assert!((c.state().integral() - 0.3).abs() < 1e-9);
    }

    #[test]
    fn reset_clears_state() {
        let mut c = PidController::new(PidGains::power(0.01, 0.1, 0.001), DT);
        for i in 0..50 {
            c.update(500.0, 100.0, i * 10_000);
        }
        assert!(c.state().integral() > 0.0);
        c.reset();
        assert_eq!(c.state().integral(), 0.0);
    }

    #[test]
    fn zero_dt_does_not_integrate() {
        let mut s = PidState::default();
        let g = PidGains::power(0.0, 1.0, 0.0);
        pid_compute(&mut s, &g, 5.0, 0.0);
        assert_eq!(s.integral, 0.0);
    }
}
