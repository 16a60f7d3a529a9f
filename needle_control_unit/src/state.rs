//! Motor state machine and the needle-positioning stop sequence.

pub mod machine;
pub mod stop;
