//! Physics simulation module.
//!
//! Shaft dynamics of the motor and handwheel, and the needle cam that
//! drives the up/down position sensors.

mod cam;
mod motor;

pub use cam::NeedleCam;
pub use motor::{MotorModel, MotorParams};
