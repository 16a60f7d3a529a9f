//! Fault detection over one control tick.
//!
//! Raises `FaultFlags` for conditions that must latch the engine in FAULT:
//! mains loss, a silent rotation sensor under power, a persistent needle
//! sensor conflict and repeatedly stale firing commands. The monitor does
//! not latch by itself; the engine keeps the flags until reset.

use needle_common::drive::config::EngineTuning;
use needle_common::drive::error::FaultFlags;
use needle_common::drive::timing::MainsStatus;

use crate::engine::Readings;

#[derive(Debug, Clone)]
pub struct FaultMonitor {
    conflict_window_us: u64,
    silence_min_power: f64,
    silence_timeout_us: u64,
    stale_limit: u32,
    /// Start of the current needle-conflict episode.
    conflict_since: Option<u64>,
    /// Start of the current powered-without-rotation episode.
    silent_since: Option<u64>,
}

impl FaultMonitor {
    pub fn new(tuning: &EngineTuning) -> Self {
        Self {
            conflict_window_us: tuning.needle.conflict_window_ms as u64 * 1_000,
            silence_min_power: tuning.faults.rpm_silence_min_power,
            silence_timeout_us: tuning.faults.rpm_silence_timeout_ms as u64 * 1_000,
            stale_limit: tuning.triac.stale_reject_limit,
            conflict_since: None,
            silent_since: None,
        }
    }

    /// Flags raised by this tick. `power` is the power applied on the
    /// previous tick [%].
    pub fn evaluate(&mut self, readings: &Readings, power: f64, now_us: u64) -> FaultFlags {
        let mut flags = FaultFlags::empty();

        // ── Mains ──
        if matches!(readings.mains, MainsStatus::Lost) {
            flags |= FaultFlags::MAINS_LOSS;
        }

        // ── Needle sensors ──
        if readings.needle.is_conflicting() {
            let since = *self.conflict_since.get_or_insert(now_us);
            if now_us.saturating_sub(since) >= self.conflict_window_us {
                flags |= FaultFlags::NEEDLE_CONFLICT;
            }
        } else {
            self.conflict_since = None;
        }

        // ── Rotation sensor ──
        if power >= self.silence_min_power && readings.rpm <= 0.0 {
            let since = *self.silent_since.get_or_insert(now_us);
            if now_us.saturating_sub(since) >= self.silence_timeout_us {
                flags |= FaultFlags::RPM_SENSOR_SILENT;
            }
        } else {
            self.silent_since = None;
        }

        // ── Firing ──
        if readings.consecutive_stale >= self.stale_limit {
            flags |= FaultFlags::STALE_FIRING;
        }

        flags
    }

    pub fn reset(&mut self) {
        self.conflict_since = None;
        self.silent_since = None;
    }
}
