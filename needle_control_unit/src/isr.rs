//! Interrupt-context surface.
//!
//! Everything reachable from an interrupt lives here and is shared with the
//! control loop by reference: atomics only, no allocation, no logging, no
//! locks. Hardware (or the simulation driver) calls the `*_edge`/`timer`
//! hooks; the cycle runner samples the same objects once per tick.

use needle_common::drive::config::EngineTuning;
use needle_common::drive::timing::ZeroCrossEvent;

use crate::sensors::needle::NeedleInputs;
use crate::sensors::pedal::PedalSample;
use crate::sensors::rpm::RpmPulseCounter;
use crate::sensors::zero_cross::ZeroCrossDetector;
use crate::triac::TriacFiringScheduler;

#[derive(Debug)]
pub struct IsrBus {
    pub zero_cross: ZeroCrossDetector,
    pub rpm: RpmPulseCounter,
    pub needle: NeedleInputs,
    pub pedal: PedalSample,
    pub triac: TriacFiringScheduler,
}

impl IsrBus {
    pub fn new(tuning: &EngineTuning, boot_us: u64) -> Self {
        Self {
            zero_cross: ZeroCrossDetector::new(&tuning.mains, boot_us),
            rpm: RpmPulseCounter::new(&tuning.rpm),
            needle: NeedleInputs::new(),
            pedal: PedalSample::new(),
            triac: TriacFiringScheduler::new(&tuning.triac, tuning.mains.nominal_half_cycle_us),
        }
    }

    /// Zero-cross comparator edge.
    #[inline]
    pub fn zero_cross_edge(&self, now_us: u64) -> Option<ZeroCrossEvent> {
        let event = self.zero_cross.on_edge(now_us)?;
        self.triac
            .on_zero_cross(event, self.zero_cross.half_cycle_us());
        Some(event)
    }

    /// Rotation sensor edge.
    #[inline]
    pub fn rpm_pulse(&self, now_us: u64) {
        self.rpm.on_pulse(now_us);
    }

    /// Periodic timer tick. Returns the TRIAC gate level.
    #[inline]
    pub fn timer(&self, now_us: u64) -> bool {
        self.triac.on_timer(now_us)
    }
}
