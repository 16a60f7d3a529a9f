//! Fault detection.

pub mod monitor;
