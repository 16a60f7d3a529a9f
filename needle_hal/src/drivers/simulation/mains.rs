//! Mains waveform with dropout injection.

use std::f64::consts::PI;

/// Sinusoidal mains seen through the zero-cross comparator.
#[derive(Debug, Clone)]
pub struct MainsWaveform {
    half_cycle_us: u64,
    next_zc_us: u64,
    last_zc_us: u64,
    dropout: Option<(u64, u64)>,
}

impl MainsWaveform {
    pub fn new(frequency_hz: f64) -> Self {
        let half_cycle_us = (500_000.0 / frequency_hz).round() as u64;
        Self {
            half_cycle_us,
            next_zc_us: half_cycle_us,
            last_zc_us: 0,
            dropout: None,
        }
    }

    #[inline]
    pub fn half_cycle_us(&self) -> u64 {
        self.half_cycle_us
    }

    /// Voltage present at `now_us`.
    #[inline]
    pub fn is_live(&self, now_us: u64) -> bool {
        !matches!(self.dropout, Some((from, until)) if now_us >= from && now_us < until)
    }

    pub fn inject_dropout(&mut self, now_us: u64, duration_us: u64) {
        self.dropout = Some((now_us, now_us + duration_us));
    }

    /// Advance to `now_us`. Returns true when a zero crossing happened since
    /// the previous call, even during a dropout (the half-cycle still ends).
    pub fn advance(&mut self, now_us: u64) -> bool {
        if now_us < self.next_zc_us {
            return false;
        }
        self.last_zc_us = now_us;
        while self.next_zc_us <= now_us {
            self.next_zc_us += self.half_cycle_us;
        }
        true
    }

    /// Comparator edge visible at `now_us` (a crossing with voltage present).
    #[inline]
    pub fn edge_visible(&self, now_us: u64) -> bool {
        self.last_zc_us == now_us && self.is_live(now_us)
    }

    /// Phase within the current half-cycle, in [0, π).
    #[inline]
    pub fn phase(&self, now_us: u64) -> f64 {
        let into = now_us.saturating_sub(self.last_zc_us).min(self.half_cycle_us);
        PI * into as f64 / self.half_cycle_us as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edges(mains: &mut MainsWaveform, until_us: u64) -> Vec<u64> {
        let mut out = Vec::new();
        for t in (50..=until_us).step_by(50) {
            if mains.advance(t) && mains.edge_visible(t) {
                out.push(t);
            }
        }
        out
    }

    #[test]
    fn fifty_hertz_edges_every_ten_ms() {
        let mut mains = MainsWaveform::new(50.0);
        assert_eq!(mains.half_cycle_us(), 10_000);
        assert_eq!(edges(&mut mains, 40_000), vec![10_000, 20_000, 30_000, 40_000]);
    }

    #[test]
    fn sixty_hertz_half_cycle() {
        assert_eq!(MainsWaveform::new(60.0).half_cycle_us(), 8_333);
    }

    #[test]
    fn dropout_hides_edges_and_voltage() {
        let mut mains = MainsWaveform::new(50.0);
        mains.inject_dropout(15_000, 30_000);
        assert!(mains.is_live(14_950));
        assert!(!mains.is_live(15_000));
        assert!(mains.is_live(45_000));
        assert_eq!(edges(&mut mains, 60_000), vec![10_000, 50_000, 60_000]);
    }

    #[test]
    fn phase_spans_half_cycle() {
        let mut mains = MainsWaveform::new(50.0);
        assert!(mains.advance(10_000));
        assert_eq!(mains.phase(10_000), 0.0);
        assert!((mains.phase(15_000) - PI / 2.0).abs() < 1e-12);
    }
}
