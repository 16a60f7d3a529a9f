//! Rotation sensor: pulse counting (interrupt context) and RPM estimation
//! (control loop).
//!
//! The pulse handler publishes `(count, last_pulse_ts)` through a
//! [`StampCell`].
//! `RpmSensor` keeps a fixed-capacity ring of distinct observations and
//! derives RPM from the count delta across the sliding window. RPM is never
//! negative and drops to exactly 0 once no pulse has arrived for the quiet
//! interval.

use heapless::Deque;
use needle_common::consts::RPM_RING_CAPACITY;
use needle_common::drive::config::RpmTuning;
use needle_common::drive::timing::StampCell;

const MICROS_PER_MINUTE: f64 = 60_000_000.0;

/// Interrupt-side pulse counter.
#[derive(Debug)]
pub struct RpmPulseCounter {
    /// `(count, last_pulse_ts)`. Count 0 = no pulse yet.
    last: StampCell,
    debounce_us: u64,
}

impl RpmPulseCounter {
    pub fn new(tuning: &RpmTuning) -> Self {
        Self {
            last: StampCell::new(),
            debounce_us: tuning.debounce_us as u64,
        }
    }

    /// Pulse interrupt handler.
    #[inline]
    pub fn on_pulse(&self, now_us: u64) {
        let (count, last) = self.last.load();
        if count != 0 && now_us.saturating_sub(last) < self.debounce_us {
            return;
        }
        let next = match count.wrapping_add(1) {
            0 => 1,
            c => c,
        };
        self.last.store(next, now_us);
    }

    /// `(count, last_pulse_us)`; count 0 means no pulse seen yet.
    #[inline]
    pub fn snapshot(&self) -> (u32, u64) {
        self.last.load()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Observation {
    count: u32,
    pulse_us: u64,
}

/// Sliding-window RPM estimator.
#[derive(Debug)]
pub struct RpmSensor {
    pulses_per_rev: f64,
    window_us: u64,
    quiet_us: u64,
    ring: Deque<Observation, RPM_RING_CAPACITY>,
    rpm: f64,
}

impl RpmSensor {
    pub fn new(tuning: &RpmTuning) -> Self {
        Self {
            pulses_per_rev: tuning.pulses_per_rev.max(1) as f64,
            window_us: tuning.window_ms as u64 * 1_000,
            quiet_us: tuning.quiet_interval_ms as u64 * 1_000,
            ring: Deque::new(),
            rpm: 0.0,
        }
    }

    /// Last computed RPM.
    #[inline]
    pub fn rpm(&self) -> f64 {
        self.rpm
    }

    /// Sample the counter and update the estimate.
    pub fn sample(&mut self, counter: &RpmPulseCounter, now_us: u64) -> f64 {
        let (count, pulse_us) = counter.snapshot();
        if count == 0 {
            self.rpm = 0.0;
            return self.rpm;
        }

        let obs = Observation { count, pulse_us };
        if self.ring.back() != Some(&obs) {
            // A pulse from before a standstill says nothing about this run.
            let resumed = self
                .ring
                .back()
                .is_some_and(|prev| pulse_us.saturating_sub(prev.pulse_us) >= self.quiet_us);
            if resumed {
                self.ring.clear();
            }
            if self.ring.is_full() {
                self.ring.pop_front();
            }
            let _ = self.ring.push_back(obs);
        }

        let since_pulse = now_us.saturating_sub(pulse_us);
        if since_pulse >= self.quiet_us {
            // Keep only the latest pulse as the anchor for the next start.
            while self.ring.len() > 1 {
                self.ring.pop_front();
            }
            self.rpm = 0.0;
            return self.rpm;
        }

        // Keep one observation at or before the window start as anchor.
        let window_start = now_us.saturating_sub(self.window_us);
        while self.ring.len() > 2 {
            match self.ring.iter().nth(1) {
                Some(second) if second.pulse_us <= window_start => {
                    self.ring.pop_front();
                }
                _ => break,
            }
        }

        self.rpm = match (self.ring.front(), self.ring.back()) {
            (Some(first), Some(last)) if last.pulse_us > first.pulse_us => {
                let pulses = last.count.wrapping_sub(first.count) as f64;
                let span = (last.pulse_us - first.pulse_us) as f64;
                let windowed = pulses * MICROS_PER_MINUTE / (self.pulses_per_rev * span);
                // No pulse for `since_pulse` bounds the speed from above.
                if since_pulse > 0 {
                    let bound =
                        MICROS_PER_MINUTE / (self.pulses_per_rev * since_pulse as f64);
                    windowed.min(bound)
                } else {
                    windowed
                }
            }
            _ => 0.0,
        };
        self.rpm
    }

    /// Forget all observations.
    pub fn reset(&mut self) {
        self.ring.clear();
        self.rpm = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup(ppr: u32) -> (RpmPulseCounter, RpmSensor) {
        let tuning = RpmTuning {
            pulses_per_rev: ppr,
            ..RpmTuning::default()
        };
        (RpmPulseCounter::new(&tuning), RpmSensor::new(&tuning))
    }

    /// Feed pulses every `period_us` from `from` to `to`, sampling every ms.
    fn run(
        counter: &RpmPulseCounter,
        sensor: &mut RpmSensor,
        from: u64,
        to: u64,
        period_us: u64,
    ) -> f64 {
        let mut next_pulse = from;
        let mut t = from;
        while t <= to {
            if t >= next_pulse {
                counter.on_pulse(t);
                next_pulse += period_us;
            }
            sensor.sample(counter, t);
            t += 1_000;
        }
        sensor.rpm()
    }

    #[test]
    fn no_pulses_is_zero() {
        let (c, mut s) = setup(1);
        assert_eq!(s.sample(&c, 5_000_000), 0.0);
    }

    #[test]
    fn steady_3000_rpm() {
        let (c, mut s) = setup(1);
        // 3000 rpm, 1 ppr → one pulse every 20 ms.
        let rpm = run(&c, &mut s, 0, 1_000_000, 20_000);
        assert!((rpm - 3000.0).abs() < 1.0, "rpm = {rpm}");
    }

    #[test]
    fn pulses_per_rev_scaling() {
        let (c, mut s) = setup(4);
        // 4 ppr, pulse every 5 ms → 3000 rpm.
        let rpm = run(&c, &mut s, 0, 1_000_000, 5_000);
        assert!((rpm - 3000.0).abs() < 1.0, "rpm = {rpm}");
    }

    #[test]
    fn debounce_ignores_glitches() {
        let (c, _) = setup(1);
        c.on_pulse(1_000);
        c.on_pulse(1_050);
        assert_eq!(c.snapshot().0, 1);
        c.on_pulse(1_200);
        assert_eq!(c.snapshot().0, 2);
    }

    #[test]
    fn zero_after_quiet_interval() {
        let (c, mut s) = setup(1);
        let rpm = run(&c, &mut s, 0, 500_000, 10_000);
        assert!(rpm > 5_000.0);
        // Last pulse at 500 ms; quiet interval 1.5 s.
        assert_eq!(s.sample(&c, 2_000_000), 0.0);
        assert_eq!(s.sample(&c, 60_000_000), 0.0);
    }

    #[test]
    fn estimate_decays_while_pulses_stop() {
        let (c, mut s) = setup(1);
        run(&c, &mut s, 0, 500_000, 20_000);
        let at_stop = s.sample(&c, 520_000);
        let later = s.sample(&c, 1_000_000);
        assert!(later < at_stop);
        assert!(later >= 0.0);
    }

    #[test]
    fn restarts_cleanly_after_long_standstill() {
        let (c, mut s) = setup(1);
        run(&c, &mut s, 0, 500_000, 20_000);

        // Forty minutes parked, sampled every 10 ms.
        let idle_end = 500_000 + 40 * 60 * 1_000_000;
        let mut t = 500_000;
        while t < idle_end {
            let rpm = s.sample(&c, t);
            if t >= 2_000_000 {
                assert_eq!(rpm, 0.0);
            }
            t += 10_000;
        }

        let rpm = run(&c, &mut s, idle_end, idle_end + 2_000_000, 20_000);
        assert!((rpm - 3000.0).abs() < 1.0, "rpm = {rpm}");
    }

    #[test]
    fn first_pulses_after_standstill_ignore_old_anchor() {
        let (c, mut s) = setup(1);
        run(&c, &mut s, 0, 200_000, 20_000);
        let restart = 10_000_000;
        c.on_pulse(restart);
        assert_eq!(s.sample(&c, restart), 0.0);
        c.on_pulse(restart + 20_000);
        let rpm = s.sample(&c, restart + 20_000);
        assert!((rpm - 3000.0).abs() < 1.0, "rpm = {rpm}");
    }
}
