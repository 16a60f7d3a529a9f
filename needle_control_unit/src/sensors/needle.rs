//! Needle up/down position sensors.

use core::sync::atomic::{AtomicBool, Ordering};

use needle_common::drive::config::NeedleTuning;
use needle_common::drive::state::NeedleState;

/// Raw sensor levels written by the edge interrupt.
#[derive(Debug, Default)]
pub struct NeedleInputs {
    up: AtomicBool,
    down: AtomicBool,
}

impl NeedleInputs {
    pub const fn new() -> Self {
        Self {
            up: AtomicBool::new(false),
            down: AtomicBool::new(false),
        }
    }

    #[inline]
    pub fn set_levels(&self, up: bool, down: bool) {
        self.up.store(up, Ordering::Release);
        self.down.store(down, Ordering::Release);
    }

    #[inline]
    pub fn levels(&self) -> (bool, bool) {
        (
            self.up.load(Ordering::Acquire),
            self.down.load(Ordering::Acquire),
        )
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Channel {
    stable: bool,
    candidate: bool,
    since_us: u64,
}

impl Channel {
    fn update(&mut self, raw: bool, now_us: u64, debounce_us: u64) -> bool {
        if raw != self.candidate {
            self.candidate = raw;
            self.since_us = now_us;
        }
        if self.candidate != self.stable && now_us.saturating_sub(self.since_us) >= debounce_us {
            self.stable = self.candidate;
        }
        self.stable
    }
}

/// Debounces each sensor independently.
#[derive(Debug)]
pub struct NeedlePositionSensor {
    debounce_us: u64,
    up: Channel,
    down: Channel,
}

impl NeedlePositionSensor {
    pub fn new(tuning: &NeedleTuning) -> Self {
        Self {
            debounce_us: tuning.debounce_us as u64,
            up: Channel::default(),
            down: Channel::default(),
        }
    }

    pub fn sample(&mut self, inputs: &NeedleInputs, now_us: u64) -> NeedleState {
        let (up, down) = inputs.levels();
        NeedleState {
            up_active: self.up.update(up, now_us, self.debounce_us),
            down_active: self.down.update(down, now_us, self.debounce_us),
        }
    }

    pub fn state(&self) -> NeedleState {
        NeedleState {
            up_active: self.up.stable,
            down_active: self.down.stable,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_must_hold_for_debounce() {
        let inputs = NeedleInputs::new();
        let mut s = NeedlePositionSensor::new(&NeedleTuning::default());
        inputs.set_levels(false, true);
        assert!(!s.sample(&inputs, 0).down_active);
        assert!(!s.sample(&inputs, 1_000).down_active);
        assert!(s.sample(&inputs, 2_000).down_active);
    }

    #[test]
    fn glitch_is_filtered() {
        let inputs = NeedleInputs::new();
        let mut s = NeedlePositionSensor::new(&NeedleTuning::default());
        inputs.set_levels(true, false);
        s.sample(&inputs, 0);
        inputs.set_levels(false, false);
        s.sample(&inputs, 500);
        inputs.set_levels(true, false);
        let st = s.sample(&inputs, 1_000);
        assert!(!st.up_active);
        // Candidate restarted at 1 ms.
        assert!(s.sample(&inputs, 3_000).up_active);
    }

    #[test]
    fn both_false_is_mid_travel() {
        let inputs = NeedleInputs::new();
        let mut s = NeedlePositionSensor::new(&NeedleTuning::default());
        let st = s.sample(&inputs, 10_000);
        assert_eq!(st, NeedleState::default());
    }
}
