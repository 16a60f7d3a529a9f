//! Sensor front ends.
//!
//! Each sensor is split into an interrupt-side part (atomics only, no
//! allocation, no logging) and a control-loop part that samples it.

pub mod needle;
pub mod pedal;
pub mod rpm;
pub mod zero_cross;
