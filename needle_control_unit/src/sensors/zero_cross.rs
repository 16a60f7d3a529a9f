//! Mains zero-cross detection (interrupt-context front end).
//!
//! The edge handler only compares timestamps and publishes one stamp.
//! The control loop samples [`ZeroCrossDetector::status`] without blocking.

use core::sync::atomic::{AtomicU32, Ordering};

use needle_common::consts::{HALF_CYCLE_50HZ_US, HALF_CYCLE_60HZ_US};
use needle_common::drive::config::MainsTuning;
use needle_common::drive::timing::{MainsStatus, StampCell, ZeroCrossEvent};

/// Intervals outside this band are not mains half-cycles and do not
/// update the measured period.
const HALF_CYCLE_PLAUSIBLE_MIN_US: u64 = HALF_CYCLE_60HZ_US as u64 * 4 / 5;
const HALF_CYCLE_PLAUSIBLE_MAX_US: u64 = HALF_CYCLE_50HZ_US as u64 * 6 / 5;

/// Debounced zero-cross edge detector.
///
/// Single writer (edge interrupt), any number of readers.
#[derive(Debug)]
pub struct ZeroCrossDetector {
    /// `(cycle_id, timestamp)` of the last accepted edge. Id 0 = none.
    last: StampCell,
    /// Measured half-cycle duration [µs].
    half_cycle_us: AtomicU32,
    boot_us: u64,
    min_interval_us: u64,
    loss_timeout_us: u64,
}

impl ZeroCrossDetector {
    pub fn new(tuning: &MainsTuning, boot_us: u64) -> Self {
        Self {
            last: StampCell::new(),
            half_cycle_us: AtomicU32::new(tuning.nominal_half_cycle_us),
            boot_us,
            min_interval_us: tuning.min_interval_us as u64,
            loss_timeout_us: tuning.loss_timeout_ms as u64 * 1_000,
        }
    }

    /// Edge interrupt handler. Returns the event if the edge was accepted.
    #[inline]
    pub fn on_edge(&self, now_us: u64) -> Option<ZeroCrossEvent> {
        let (prev_id, prev_ts) = self.last.load();

        let cycle_id = if prev_id == 0 {
            1
        } else {
            let interval = now_us.saturating_sub(prev_ts);
            if interval < self.min_interval_us {
                return None;
            }
            if (HALF_CYCLE_PLAUSIBLE_MIN_US..=HALF_CYCLE_PLAUSIBLE_MAX_US).contains(&interval) {
                self.half_cycle_us.store(interval as u32, Ordering::Relaxed);
            }
            match prev_id.wrapping_add(1) {
                0 => 1,
                id => id,
            }
        };

        self.last.store(cycle_id, now_us);
        Some(ZeroCrossEvent {
            timestamp_us: now_us,
            cycle_id,
        })
    }

    /// Measured (or nominal) half-cycle duration [µs].
    #[inline]
    pub fn half_cycle_us(&self) -> u32 {
        self.half_cycle_us.load(Ordering::Relaxed)
    }

    /// Latest accepted edge, if any.
    #[inline]
    pub fn latest(&self) -> Option<ZeroCrossEvent> {
        let (cycle_id, timestamp_us) = self.last.load();
        (cycle_id != 0).then_some(ZeroCrossEvent {
            timestamp_us,
            cycle_id,
        })
    }

    /// Non-blocking mains status for the control loop.
    pub fn status(&self, now_us: u64) -> MainsStatus {
        match self.latest() {
            None if now_us.saturating_sub(self.boot_us) >= self.loss_timeout_us => {
                MainsStatus::Lost
            }
            None => MainsStatus::Waiting,
            // An edge may land between reading the clock and this call.
            Some(event) if now_us.saturating_sub(event.timestamp_us) >= self.loss_timeout_us => {
                MainsStatus::Lost
            }
            Some(event) => MainsStatus::Synced {
                event,
                half_cycle_us: self.half_cycle_us(),
            },
        }
    }
}
