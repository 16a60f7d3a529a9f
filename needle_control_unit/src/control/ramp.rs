//! Stepped soft-start ramp: `steps` steps of `step_ms` each.

use needle_common::drive::config::DriveConfig;

#[derive(Debug, Clone, Copy)]
pub struct SoftStartRamp {
    step_us: u64,
    steps: u32,
    start_us: Option<u64>,
}

impl SoftStartRamp {
    pub fn new(config: &DriveConfig) -> Self {
        let mut ramp = Self {
            step_us: 1,
            steps: 1,
            start_us: None,
        };
        ramp.configure(config);
        ramp
    }

    /// Pick up changed ramp parameters. A running ramp keeps its start.
    pub fn configure(&mut self, config: &DriveConfig) {
        self.step_us = config.soft_start_time_step_ms.max(1) as u64 * 1_000;
        self.steps = config.soft_start_ramp_steps.max(1);
    }

    pub fn start(&mut self, now_us: u64) {
        self.start_us = Some(now_us);
    }

    pub fn stop(&mut self) {
        self.start_us = None;
    }

    /// Completed step index, starting at 1 on the first step.
    pub fn step(&self, now_us: u64) -> u32 {
        match self.start_us {
            None => self.steps,
            Some(start) => {
                let elapsed = now_us.saturating_sub(start) / self.step_us;
                (elapsed.saturating_add(1)).min(self.steps as u64) as u32
            }
        }
    }

    /// Ramp fraction in `(0, 1]`. An idle ramp reports 1.
    pub fn fraction(&self, now_us: u64) -> f64 {
        self.step(now_us) as f64 / self.steps as f64
    }

    pub fn is_complete(&self, now_us: u64) -> bool {
        self.step(now_us) >= self.steps
    }

    /// Total ramp duration [µs].
    pub fn duration_us(&self) -> u64 {
        self.step_us * self.steps as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(step_ms: u32, steps: u32) -> SoftStartRamp {
        SoftStartRamp::new(&DriveConfig {
            soft_start_time_step_ms: step_ms,
            soft_start_ramp_steps: steps,
            ..DriveConfig::default()
        })
    }

    #[test]
    fn steps_up_in_equal_increments() {
        let mut r = ramp(20, 50);
        r.start(1_000_000);
        assert!((r.fraction(1_000_000) - 0.02).abs() < 1e-12);
        assert!((r.fraction(1_019_999) - 0.02).abs() < 1e-12);
        assert!((r.fraction(1_020_000) - 0.04).abs() < 1e-12);
        assert!((r.fraction(1_500_000) - 0.52).abs() < 1e-12);
        assert!(!r.is_complete(1_970_000));
        assert!(r.is_complete(1_980_000));
        assert_eq!(r.fraction(9_000_000), 1.0);
    }

    #[test]
    fn idle_ramp_is_full() {
        let r = ramp(20, 50);
        assert_eq!(r.fraction(0), 1.0);
        assert_eq!(r.duration_us(), 1_000_000);
    }
}
