//! # Needle Control Unit Library
//!
//! Real-time core of a phase-cut sewing-machine drive. An AC universal
//! motor is powered through a TRIAC fired once per mains half-cycle; the
//! engine regulates speed from the pedal, parks the needle at a known
//! position on stop, and measures and tunes itself on command.
//!
//! ## Layers
//!
//! 1. **Interrupt context** ([`isr`], [`triac`], sensor front ends):
//!    atomics only, bounded work, no logging.
//! 2. **Control loop** ([`cycle::CycleRunner`]): samples the front ends,
//!    ticks the [`engine::MotorControlEngine`], programs the scheduler.
//! 3. **Engine**: state machine, PID, ramp, stop sequence, calibration,
//!    autotune and the fault monitor.
//!
//! ## Safety Rules
//!
//! - The gate is only ever pulsed, never held.
//! - A firing command fires only inside the half-cycle it was computed for.
//! - Any latched fault forces zero power until an explicit reset.

pub mod control;
pub mod cycle;
pub mod engine;
pub mod isr;
pub mod safety;
pub mod sensors;
pub mod state;
pub mod triac;
