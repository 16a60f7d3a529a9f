//! Control algorithms.
//!
//! Speed PID with anti-windup, stepped soft-start ramp, relay autotune and
//! max-RPM calibration. All of them are pure state machines over
//! `(rpm, now_us)` samples so they can be tested without hardware.

pub mod autotune;
pub mod calibration;
pub mod pid;
pub mod ramp;
