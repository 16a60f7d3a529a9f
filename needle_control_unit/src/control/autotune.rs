//! PID autotune by the Åström–Hägglund relay method.
//!
//! The motor is driven at `autotune_power_high` until it first reaches the
//! target RPM, then the relay switches between high and low power whenever
//! RPM leaves the hysteresis band around the target. One oscillation cycle
//! runs from one high→low switch to the next; its period and peak-to-peak
//! amplitude are recorded. The first cycle is discarded. Once the last
//! `cycles_required` cycles agree within the stability spread:
//!
//! ```text
//! d  = (high - low) / 2          relay amplitude [%]
//! a  = mean peak-to-peak / 2     process amplitude [rpm]
//! Ku = 4·d / (π·a)               ultimate gain [%/rpm]
//! Tu = mean period               ultimate period [s]
//! ```
//!
//! and a [`TuningRule`] maps `(Ku, Tu)` to PID gains.

use core::f64::consts::PI;

use heapless::Deque;
use needle_common::consts::{AUTOTUNE_MAX_CYCLES, GAIN_MAX};
use needle_common::drive::config::{AutotuneTuning, DriveConfig, TuningRuleKind};
use needle_common::drive::error::AutotuneFailureKind;
use needle_common::drive::state::AutotuneStage;

/// Derived PID gains.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TunedGains {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
}

/// Maps ultimate gain and period to PID gains.
pub trait TuningRule {
    fn gains(&self, ku: f64, tu: f64) -> TunedGains;
}

/// Gains from `Kp` and the integral/derivative times `Ti`, `Td`.
#[inline]
fn from_times(kp: f64, ti: f64, td: f64) -> TunedGains {
    TunedGains {
        kp,
        ki: if ti > 0.0 { kp / ti } else { 0.0 },
        kd: kp * td,
    }
}

impl TuningRule for TuningRuleKind {
    fn gains(&self, ku: f64, tu: f64) -> TunedGains {
        match self {
            // Kp = 0.6 Ku, Ti = Tu/2, Td = Tu/8
            Self::ZieglerNichols => from_times(0.6 * ku, tu / 2.0, tu / 8.0),
            // Kp = Ku/2.2, Ti = 2.2 Tu, Td = Tu/6.3
            Self::TyreusLuyben => from_times(ku / 2.2, 2.2 * tu, tu / 6.3),
            // Kp = 0.2 Ku, Ti = Tu/2, Td = Tu/3
            Self::NoOvershoot => from_times(0.2 * ku, tu / 2.0, tu / 3.0),
        }
    }
}

/// Outcome of one autotune step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AutotuneStep {
    /// Drive the motor at this power [%].
    Drive(f64),
    Done(AutotuneResult),
    Failed(AutotuneFailureKind),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AutotuneResult {
    pub gains: TunedGains,
    pub ku: f64,
    pub tu_s: f64,
    pub amplitude_rpm: f64,
}

#[derive(Debug, Clone, Copy)]
struct Cycle {
    period_s: f64,
    peak_to_peak: f64,
}

#[derive(Debug, Clone, Copy)]
struct Relay {
    target: f64,
    high: f64,
    low: f64,
    band: f64,
}

/// Relay-feedback autotuner.
#[derive(Debug)]
pub struct Autotuner {
    tuning: AutotuneTuning,
    stage: AutotuneStage,
    relay: Relay,
    output_high: bool,
    start_us: u64,
    last_switch_us: Option<u64>,
    cycle_max: f64,
    cycle_min: f64,
    discarded_first: bool,
    cycles: Deque<Cycle, AUTOTUNE_MAX_CYCLES>,
}

impl Autotuner {
    pub fn new(tuning: &AutotuneTuning) -> Self {
        Self {
            tuning: *tuning,
            stage: AutotuneStage::Idle,
            relay: Relay {
                target: 0.0,
                high: 0.0,
                low: 0.0,
                band: 0.0,
            },
            output_high: false,
            start_us: 0,
            last_switch_us: None,
            cycle_max: f64::MIN,
            cycle_min: f64::MAX,
            discarded_first: false,
            cycles: Deque::new(),
        }
    }

    #[inline]
    pub fn stage(&self) -> AutotuneStage {
        self.stage
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        matches!(self.stage, AutotuneStage::SpinUp | AutotuneStage::Oscillating)
    }

    /// Cycles collected so far (after the discarded one).
    #[inline]
    pub fn cycle_count(&self) -> usize {
        self.cycles.len()
    }

    pub fn start(&mut self, config: &DriveConfig, now_us: u64) {
        let target = config.autotune_target_rpm;
        self.relay = Relay {
            target,
            high: config.autotune_power_high,
            low: config.autotune_power_low,
            band: target * self.tuning.hysteresis_fraction,
        };
        self.stage = AutotuneStage::SpinUp;
        self.output_high = true;
        self.start_us = now_us;
        self.last_switch_us = None;
        self.cycle_max = f64::MIN;
        self.cycle_min = f64::MAX;
        self.discarded_first = false;
        self.cycles.clear();
    }

    pub fn cancel(&mut self) {
        if self.is_active() {
            self.stage = AutotuneStage::Failed;
        }
    }

    pub fn tick(&mut self, rpm: f64, now_us: u64) -> AutotuneStep {
        let elapsed_us = now_us.saturating_sub(self.start_us);
        match self.stage {
            AutotuneStage::SpinUp => {
                if rpm >= self.relay.target {
                    self.stage = AutotuneStage::Oscillating;
                    self.switch_low(now_us);
                    return AutotuneStep::Drive(self.relay.low);
                }
                if elapsed_us >= self.tuning.spin_up_timeout_ms as u64 * 1_000 {
                    return self.fail(AutotuneFailureKind::TargetNotReached);
                }
                AutotuneStep::Drive(self.relay.high)
            }
            AutotuneStage::Oscillating => {
                if elapsed_us >= self.tuning.timeout_ms as u64 * 1_000 {
                    return self.fail(AutotuneFailureKind::Timeout);
                }
                self.cycle_max = self.cycle_max.max(rpm);
                self.cycle_min = self.cycle_min.min(rpm);

                if self.output_high && rpm > self.relay.target + self.relay.band {
                    if let Some(result) = self.complete_cycle(now_us) {
                        return result;
                    }
                    self.switch_low(now_us);
                } else if !self.output_high && rpm < self.relay.target - self.relay.band {
                    self.output_high = true;
                }

                AutotuneStep::Drive(if self.output_high {
                    self.relay.high
                } else {
                    self.relay.low
                })
            }
            AutotuneStage::Idle | AutotuneStage::Complete | AutotuneStage::Failed => {
                AutotuneStep::Failed(AutotuneFailureKind::Aborted)
            }
        }
    }

    fn switch_low(&mut self, now_us: u64) {
        self.output_high = false;
        self.last_switch_us = Some(now_us);
        self.cycle_max = f64::MIN;
        self.cycle_min = f64::MAX;
    }

    fn fail(&mut self, kind: AutotuneFailureKind) -> AutotuneStep {
        self.stage = AutotuneStage::Failed;
        AutotuneStep::Failed(kind)
    }

    /// Close the cycle ending at this high→low switch.
    fn complete_cycle(&mut self, now_us: u64) -> Option<AutotuneStep> {
        let start = self.last_switch_us?;
        if !self.discarded_first {
            self.discarded_first = true;
            return None;
        }
        let cycle = Cycle {
            period_s: now_us.saturating_sub(start) as f64 / 1_000_000.0,
            peak_to_peak: self.cycle_max - self.cycle_min,
        };
        if self.cycles.is_full() {
            self.cycles.pop_front();
        }
        let _ = self.cycles.push_back(cycle);

        let required = self.tuning.cycles_required as usize;
        if self.cycles.len() < required {
            return None;
        }

        let recent = self.cycles.iter().skip(self.cycles.len() - required);
        let (mut p_sum, mut p_min, mut p_max) = (0.0, f64::MAX, f64::MIN);
        let (mut a_sum, mut a_min, mut a_max) = (0.0, f64::MAX, f64::MIN);
        for c in recent {
            p_sum += c.period_s;
            p_min = p_min.min(c.period_s);
            p_max = p_max.max(c.period_s);
            a_sum += c.peak_to_peak;
            a_min = a_min.min(c.peak_to_peak);
            a_max = a_max.max(c.peak_to_peak);
        }
        let n = required as f64;
        let period = p_sum / n;
        let peak_to_peak = a_sum / n;

        if !(period > 0.0) || !(peak_to_peak > 0.0) {
            return Some(self.fail(AutotuneFailureKind::NoOscillation));
        }
        let spread = self.tuning.stability_spread;
        if (p_max - p_min) / period > spread || (a_max - a_min) / peak_to_peak > spread {
            return None;
        }

        let amplitude = peak_to_peak / 2.0;
        let d = (self.relay.high - self.relay.low) / 2.0;
        let ku = 4.0 * d / (PI * amplitude);
        let gains = self.tuning.rule.gains(ku, period);
        let valid = |g: f64| g.is_finite() && (0.0..=GAIN_MAX).contains(&g);
        if !(valid(gains.kp) && valid(gains.ki) && valid(gains.kd)) {
            return Some(self.fail(AutotuneFailureKind::NoOscillation));
        }

        self.stage = AutotuneStage::Complete;
        Some(AutotuneStep::Done(AutotuneResult {
            gains,
            ku,
            tu_s: period,
            amplitude_rpm: amplitude,
        }))
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
