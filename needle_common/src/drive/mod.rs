//! Motor drive shared types.
//!
//! Everything the control unit, the HAL and external collaborators
//! exchange: operator configuration and engine tunables, state enums,
//! error taxonomy, commands, the status snapshot and mains timing records.

pub mod command;
pub mod config;
pub mod error;
pub mod state;
pub mod status;
pub mod timing;
