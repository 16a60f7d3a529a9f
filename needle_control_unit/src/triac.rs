//! TRIAC phase-cut firing.
//!
//! [`PhaseCurve`] maps a power fraction to a firing delay after the
//! zero-cross. [`TriacFiringScheduler`] holds at most one pending
//! [`FiringCommand`] and is driven from interrupt context:
//!
//! - `on_zero_cross` at every accepted mains edge,
//! - `on_timer` from a periodic timer interrupt, returning the gate level.
//!
//! A command only fires inside the half-cycle whose `cycle_id` it carries.
//! Anything else is dropped without touching the gate. The gate is driven
//! as a pulse of bounded width, never as a level.

use core::f64::consts::PI;
use core::sync::atomic::{AtomicU8, AtomicU32, AtomicU64, Ordering};

use needle_common::consts::PHASE_TABLE_LEN;
use needle_common::drive::config::{PhaseCurveKind, TriacTuning};
use needle_common::drive::timing::{FiringCommand, StampCell, ZeroCrossEvent, pack, split};

// ─── Phase Curve ────────────────────────────────────────────────────

/// Fraction of full-wave power conducted when firing at angle `alpha`
/// (resistive load): `1 - α/π + sin(2α)/(2π)`.
#[inline]
pub fn conducted_power_fraction(alpha: f64) -> f64 {
    let a = alpha.clamp(0.0, PI);
    1.0 - a / PI + (2.0 * a).sin() / (2.0 * PI)
}

/// Firing angle that conducts `fraction` of full power.
fn firing_angle_for(fraction: f64) -> f64 {
    let target = fraction.clamp(0.0, 1.0);
    let (mut lo, mut hi) = (0.0_f64, PI);
    for _ in 0..48 {
        let mid = 0.5 * (lo + hi);
        if conducted_power_fraction(mid) > target {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    0.5 * (lo + hi)
}

/// Power [%] → firing delay lookup.
#[derive(Debug, Clone)]
pub struct PhaseCurve {
    /// Delay as a fraction of the half-cycle, indexed by whole percent.
    table: [f32; PHASE_TABLE_LEN],
    min_delay_us: u32,
    late_guard_us: u32,
}

impl PhaseCurve {
    pub fn new(kind: PhaseCurveKind, tuning: &TriacTuning) -> Self {
        let mut table = [0.0_f32; PHASE_TABLE_LEN];
        let last = (PHASE_TABLE_LEN - 1) as f64;
        for (i, slot) in table.iter_mut().enumerate() {
            let p = i as f64 / last;
            *slot = match kind {
                PhaseCurveKind::RmsPower => (firing_angle_for(p) / PI) as f32,
                PhaseCurveKind::Linear => (1.0 - p) as f32,
            };
        }
        Self {
            table,
            min_delay_us: tuning.min_fire_delay_us,
            late_guard_us: tuning.late_guard_us,
        }
    }

    /// Delay as a fraction of the half-cycle for `power_percent` in [0, 100].
    pub fn delay_fraction(&self, power_percent: f64) -> f64 {
        let p = power_percent.clamp(0.0, 100.0);
        let idx = p.floor() as usize;
        if idx >= PHASE_TABLE_LEN - 1 {
            return self.table[PHASE_TABLE_LEN - 1] as f64;
        }
        let frac = p - idx as f64;
        let a = self.table[idx] as f64;
        let b = self.table[idx + 1] as f64;
        a + (b - a) * frac
    }

    /// Firing delay [µs], or `None` when nothing should fire.
    ///
    /// The result lies in `[min_delay, half_cycle - late_guard]`.
    pub fn delay_us(&self, power_percent: f64, half_cycle_us: u32) -> Option<u32> {
        if !(power_percent > 0.0) {
            return None;
        }
        let latest = half_cycle_us.saturating_sub(self.late_guard_us);
        let earliest = self.min_delay_us.min(latest);
        let raw = (self.delay_fraction(power_percent) * half_cycle_us as f64).round() as u32;
        Some(raw.clamp(earliest, latest))
    }
}

// ─── Firing Scheduler ───────────────────────────────────────────────

const NO_COMMAND: u64 = u64::MAX;

/// Gate pulse state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum GateState {
    /// Waiting for a command in this half-cycle.
    Idle = 0,
    /// Gate pulse in progress.
    Triggering = 1,
    /// Fired in this half-cycle; waiting for the next zero-cross.
    Triggered = 2,
}

impl GateState {
    #[inline]
    const fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Triggering,
            2 => Self::Triggered,
            _ => Self::Idle,
        }
    }
}

/// A firing command computed against a different half-cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaleCommand {
    pub command: FiringCommand,
    pub current_cycle: u32,
}

/// Interrupt-driven single-slot firing scheduler.
#[derive(Debug)]
pub struct TriacFiringScheduler {
    /// `(cycle_id, zero_cross_ts)`; id 0 = no zero-cross yet.
    current: StampCell,
    half_cycle_us: AtomicU32,
    /// Packed `(cycle_id, delay_us)` or `NO_COMMAND`.
    pending: AtomicU64,
    gate: AtomicU8,
    pulse_start_us: AtomicU64,
    fired_cycle: AtomicU32,
    consecutive_stale: AtomicU32,
    gate_pulse_us: u64,
    late_guard_us: u64,
}

impl TriacFiringScheduler {
    pub fn new(tuning: &TriacTuning, nominal_half_cycle_us: u32) -> Self {
        Self {
            current: StampCell::new(),
            half_cycle_us: AtomicU32::new(nominal_half_cycle_us),
            pending: AtomicU64::new(NO_COMMAND),
            gate: AtomicU8::new(GateState::Idle as u8),
            pulse_start_us: AtomicU64::new(0),
            fired_cycle: AtomicU32::new(0),
            consecutive_stale: AtomicU32::new(0),
            gate_pulse_us: tuning.gate_pulse_us as u64,
            late_guard_us: tuning.late_guard_us as u64,
        }
    }

    /// Zero-cross interrupt hook.
    #[inline]
    pub fn on_zero_cross(&self, event: ZeroCrossEvent, half_cycle_us: u32) {
        self.current.store(event.cycle_id, event.timestamp_us);
        self.half_cycle_us.store(half_cycle_us, Ordering::Relaxed);
        if self.gate() == GateState::Triggered {
            self.gate.store(GateState::Idle as u8, Ordering::Release);
        }
        let p = self.pending.load(Ordering::Acquire);
        if p != NO_COMMAND && split(p).0 != event.cycle_id {
            let _ = self
                .pending
                .compare_exchange(p, NO_COMMAND, Ordering::AcqRel, Ordering::Relaxed);
        }
    }

    /// Accept a command for the current half-cycle.
    ///
    /// A command for any other cycle is rejected and counted.
    pub fn submit(&self, command: FiringCommand) -> Result<(), StaleCommand> {
        let current_cycle = self.current.id();
        if current_cycle == 0 || command.cycle_id != current_cycle {
            self.consecutive_stale.fetch_add(1, Ordering::Relaxed);
            return Err(StaleCommand {
                command,
                current_cycle,
            });
        }
        self.pending.store(
            pack(command.cycle_id, command.delay_us),
            Ordering::Release,
        );
        self.consecutive_stale.store(0, Ordering::Relaxed);
        Ok(())
    }

    /// Drop any pending command. A pulse already in progress still ends
    /// at its bounded width.
    #[inline]
    pub fn cancel(&self) {
        self.pending.store(NO_COMMAND, Ordering::Release);
    }

    /// Timer interrupt hook. Returns the gate output level.
    pub fn on_timer(&self, now_us: u64) -> bool {
        if self.gate() == GateState::Triggering {
            let started = self.pulse_start_us.load(Ordering::Relaxed);
            if now_us.saturating_sub(started) < self.gate_pulse_us {
                return true;
            }
            self.gate.store(GateState::Triggered as u8, Ordering::Release);
            return false;
        }

        let p = self.pending.load(Ordering::Acquire);
        if p == NO_COMMAND {
            return false;
        }
        let (cmd_cycle, delay_us) = split(p);
        let delay_us = delay_us as u64;
        let (cycle_id, zc_us) = self.current.load();

        if cmd_cycle != cycle_id || self.fired_cycle.load(Ordering::Relaxed) == cycle_id {
            self.consume(p);
            return false;
        }

        if now_us < zc_us + delay_us {
            return false;
        }
        if !self.consume(p) {
            return false;
        }

        let half = self.half_cycle_us.load(Ordering::Relaxed) as u64;
        let latest = zc_us + half.saturating_sub(self.late_guard_us);
        if now_us >= latest {
            return false;
        }

        self.fired_cycle.store(cycle_id, Ordering::Relaxed);
        self.pulse_start_us.store(now_us, Ordering::Relaxed);
        self.gate.store(GateState::Triggering as u8, Ordering::Release);
        true
    }

    #[inline]
    fn consume(&self, p: u64) -> bool {
        self.pending
            .compare_exchange(p, NO_COMMAND, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
    }

    #[inline]
    pub fn gate(&self) -> GateState {
        GateState::from_u8(self.gate.load(Ordering::Acquire))
    }

    #[inline]
    pub fn has_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire) != NO_COMMAND
    }

    /// Submissions rejected as stale since the last accepted one.
    #[inline]
    pub fn consecutive_stale(&self) -> u32 {
        self.consecutive_stale.load(Ordering::Relaxed)
    }

    /// Clear the stale counter (fault reset).
    #[inline]
    pub fn reset_stale(&self) {
        self.consecutive_stale.store(0, Ordering::Relaxed);
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const HALF: u32 = 10_000;

    fn curve(kind: PhaseCurveKind) -> PhaseCurve {
        PhaseCurve::new(kind, &TriacTuning::default())
    }

    fn scheduler() -> TriacFiringScheduler {
        TriacFiringScheduler::new(&TriacTuning::default(), HALF)
    }

    fn zc(id: u32, ts: u64) -> ZeroCrossEvent {
        ZeroCrossEvent {
            timestamp_us: ts,
            cycle_id: id,
        }
    }

    #[test]
    fn rms_table_endpoints() {
        let c = curve(PhaseCurveKind::RmsPower);
        assert!((c.delay_fraction(0.0) - 1.0).abs() < 1e-4);
        assert!(c.delay_fraction(100.0).abs() < 1e-4);
        // Half power at half-cycle by symmetry of sin².
        assert!((c.delay_fraction(50.0) - 0.5).abs() < 1e-3);
    }

    #[test]
    fn zero_power_never_fires() {
        let c = curve(PhaseCurveKind::RmsPower);
        assert_eq!(c.delay_us(0.0, HALF), None);
        assert_eq!(c.delay_us(-3.0, HALF), None);
        assert_eq!(c.delay_us(f64::NAN, HALF), None);
    }

    #[test]
    fn delay_monotonic_and_bounded() {
        for kind in [PhaseCurveKind::RmsPower, PhaseCurveKind::Linear] {
            let c = curve(kind);
            for half in [8_333, 10_000] {
                let mut prev = u32::MAX;
                for step in 1..=1_000 {
                    let p = step as f64 / 10.0;
                    let d = c.delay_us(p, half).unwrap();
                    assert!(d <= prev, "{kind:?}: delay rose at {p}%");
                    assert!(d <= half);
                    assert!(d >= 100);
                    assert!(d <= half - 200);
                    prev = d;
                }
            }
        }
    }

    #[test]
    fn fires_once_at_delay_with_bounded_pulse() {
        let s = scheduler();
        s.on_zero_cross(zc(1, 0), HALF);
        s.submit(FiringCommand {
            delay_us: 3_000,
            cycle_id: 1,
        })
        .unwrap();
        assert!(!s.on_timer(2_950));
        assert!(s.on_timer(3_000));
        assert!(s.on_timer(3_025));
        assert!(!s.on_timer(3_050));
        assert_eq!(s.gate(), GateState::Triggered);
        // No second pulse in the same half-cycle.
        for t in (3_100..10_000).step_by(50) {
            assert!(!s.on_timer(t));
        }
    }

    #[test]
    fn stale_command_rejected_and_counted() {
        let s = scheduler();
        s.on_zero_cross(zc(1, 0), HALF);
        s.on_zero_cross(zc(2, 10_000), HALF);
        let err = s
            .submit(FiringCommand {
                delay_us: 1_000,
                cycle_id: 1,
            })
            .unwrap_err();
        assert_eq!(err.current_cycle, 2);
        assert_eq!(s.consecutive_stale(), 1);
        assert!(!s.has_pending());
        s.submit(FiringCommand {
            delay_us: 1_000,
            cycle_id: 2,
        })
        .unwrap();
        assert_eq!(s.consecutive_stale(), 0);
    }

    #[test]
    fn pending_expires_at_next_zero_cross() {
        let s = scheduler();
        s.on_zero_cross(zc(1, 0), HALF);
        s.submit(FiringCommand {
            delay_us: 9_500,
            cycle_id: 1,
        })
        .unwrap();
        s.on_zero_cross(zc(2, 10_000), HALF);
        assert!(!s.has_pending());
        for t in (10_000..20_000).step_by(50) {
            assert!(!s.on_timer(t));
        }
    }

    #[test]
    fn fires_on_time_hours_after_boot() {
        let s = scheduler();
        let zc_us = (1u64 << 32) * 2 + 123;
        s.on_zero_cross(zc(7, zc_us), HALF);
        s.submit(FiringCommand {
            delay_us: 4_000,
            cycle_id: 7,
        })
        .unwrap();
        assert!(!s.on_timer(zc_us + 3_950));
        assert!(s.on_timer(zc_us + 4_000));
    }

    #[test]
    fn late_guard_blocks_firing() {
        let s = scheduler();
        s.on_zero_cross(zc(1, 0), HALF);
        s.submit(FiringCommand {
            delay_us: 1_000,
            cycle_id: 1,
        })
        .unwrap();
        // Timer was not serviced until inside the guard band.
        assert!(!s.on_timer(9_850));
        assert!(!s.has_pending());
    }

    #[test]
    fn cancel_drops_pending() {
        let s = scheduler();
        s.on_zero_cross(zc(1, 0), HALF);
        s.submit(FiringCommand {
            delay_us: 2_000,
            cycle_id: 1,
        })
        .unwrap();
        s.cancel();
        assert!(!s.on_timer(2_000));
    }

    #[test]
    fn no_zero_cross_rejects_everything() {
        let s = scheduler();
        assert!(
            s.submit(FiringCommand {
                delay_us: 10,
                cycle_id: 0,
            })
            .is_err()
        );
    }

    /// Random interleavings of zero-crosses, submissions and timer ticks:
    /// every pulse must start inside the half-cycle its command was built for.
    #[test]
    fn stale_never_fires_under_reordering() {
        let mut seed: u64 = 0x9E37_79B9_7F4A_7C15;
        let mut rand = move || {
            seed ^= seed << 13;
            seed ^= seed >> 7;
            seed ^= seed << 17;
            seed
        };

        for _ in 0..200 {
            let s = scheduler();
            let mut now = 0u64;
            let mut cycle = 0u32;
            let mut cycle_start = 0u64;
            let mut accepted: Option<FiringCommand> = None;
            for _ in 0..400 {
                now += 50 + rand() % 400;
                match rand() % 4 {
                    0 => {
                        cycle += 1;
                        cycle_start = now;
                        s.on_zero_cross(zc(cycle, now), HALF);
                        accepted = None;
                    }
                    1 => {
                        // Command built for the current, a past, or a future cycle.
                        let offset = (rand() % 3) as i64 - 1;
                        let id = (cycle as i64 + offset).max(0) as u32;
                        let cmd = FiringCommand {
                            delay_us: (rand() % HALF as u64) as u32,
                            cycle_id: id,
                        };
                        if s.submit(cmd).is_ok() {
                            assert_eq!(id, cycle);
                            accepted = Some(cmd);
                        }
                    }
                    _ => {
                        let before = s.gate();
                        if s.on_timer(now) && before != GateState::Triggering {
                            let cmd = accepted.expect("pulse without an accepted command");
                            assert_eq!(cmd.cycle_id, cycle);
                            assert!(now >= cycle_start + cmd.delay_us as u64);
                            assert!(now < cycle_start + (HALF - 200) as u64);
                        }
                    }
                }
            }
        }
    }
}
