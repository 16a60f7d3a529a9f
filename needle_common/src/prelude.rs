//! Prelude module for common re-exports.
//!
//! ```rust
//! use needle_common::prelude::*;
//! ```

use std::time::Duration;

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{ConfigError, ConfigLoader, DriveFileConfig, LogLevel, ServiceConfig};
pub use crate::drive::config::{
    DriveConfig, EngineTuning, ParamName, ParamValue, PhaseCurveKind, TuningRuleKind,
};

// ─── Drive Types ────────────────────────────────────────────────────
pub use crate::drive::command::{Command, CommandAck};
pub use crate::drive::error::{
    AutotuneFailureKind, CalibrationFailureKind, ConfigValidationError, DriveError, FaultFlags,
    SensorTimeoutKind,
};
pub use crate::drive::state::{AutotuneStage, MotorState, NeedleState, StopPosition};
pub use crate::drive::status::StatusSnapshot;
pub use crate::drive::timing::{FiringCommand, MainsStatus, ZeroCrossEvent};

// ─── System Constants ───────────────────────────────────────────────
pub use crate::consts::CONTROL_PERIOD_US;

/// Default control period as Duration.
pub const DEFAULT_CONTROL_PERIOD: Duration = Duration::from_micros(CONTROL_PERIOD_US as u64);
