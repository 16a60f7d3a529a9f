//! HAL driver trait and error types.
//!
//! This module defines:
//! - `HalDriver` trait - Interface for pluggable drive back ends
//! - `HalError` enum - Error types for HAL operations
//! - `DriverDiagnostics` struct - Ground truth a driver can report

use needle_common::drive::config::EngineTuning;
use needle_common::drive::state::NeedleState;
use needle_control_unit::cycle::CycleError;
use needle_control_unit::isr::IsrBus;
use thiserror::Error;

/// Error types for HAL operations.
#[derive(Debug, Clone, Error)]
pub enum HalError {
    /// Driver initialization failed
    #[error("Initialization failed: {0}")]
    InitFailed(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Driver used before `init()`
    #[error("Driver {0} is not initialized")]
    NotInitialized(&'static str),

    /// Driver not found
    #[error("Driver not found: {0}")]
    DriverNotFound(String),

    /// The driver cannot perform this operation
    #[error("Driver {driver} does not support {operation}")]
    Unsupported {
        driver: &'static str,
        operation: &'static str,
    },

    /// Real-time setup or cycle timing failure
    #[error("Timing error: {0}")]
    Timing(String),

    /// Status sink write failed
    #[error("Status output error: {0}")]
    Output(String),
}

impl From<CycleError> for HalError {
    fn from(e: CycleError) -> Self {
        Self::Timing(e.to_string())
    }
}

/// Physical quantities a driver observes directly (not via the sensors).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DriverDiagnostics {
    /// Shaft speed [rpm]
    pub rpm: f64,
    /// Shaft angle in [0, 360) degrees, 0 = needle up
    pub shaft_angle_deg: f64,
    /// Raw needle cam levels
    pub needle: NeedleState,
    /// TRIAC currently conducting
    pub conducting: bool,
    /// Mains voltage present
    pub mains_live: bool,
    /// Rising gate edges seen since init
    pub gate_pulses: u64,
}

/// Trait defining the interface for drive back ends.
///
/// HAL Core owns the [`IsrBus`] and hands it to the driver every step; the
/// driver raises the interrupt hooks (`zero_cross_edge`, `rpm_pulse`,
/// `timer`) and refreshes the level inputs (needle cams, pedal ADC) exactly
/// as the board's interrupt handlers would.
///
/// # Lifecycle
///
/// 1. `init()` - Called once before the loop starts
/// 2. `step()` - Called every simulation/interrupt step
/// 3. `shutdown()` - Called when HAL Core is stopping
pub trait HalDriver: Send {
    /// Returns the driver's unique identifier (e.g., "simulation").
    fn name(&self) -> &'static str;

    /// Returns the driver's semantic version.
    fn version(&self) -> &'static str;

    /// Prepare the driver for the given engine tunables.
    ///
    /// # Errors
    /// `HalError::InitFailed` if the driver cannot honour the tunables.
    fn init(&mut self, tuning: &EngineTuning) -> Result<(), HalError>;

    /// Advance to `now_us`, raising interrupt hooks on `bus`.
    ///
    /// Must be deterministic and allocation-free.
    fn step(&mut self, bus: &IsrBus, now_us: u64);

    /// Operator pedal position as a raw ADC value.
    fn set_pedal(&mut self, adc: u16);

    /// Suppress mains for `duration_us` starting at `now_us`.
    ///
    /// # Errors
    /// `HalError::Unsupported` on drivers attached to real mains.
    fn inject_mains_dropout(&mut self, now_us: u64, duration_us: u64) -> Result<(), HalError>;

    /// Ground-truth readings for diagnostics and tests.
    fn diagnostics(&self) -> DriverDiagnostics;

    /// Release resources; the gate must be left low.
    fn shutdown(&mut self) -> Result<(), HalError>;
}

/// Factory function type for creating driver instances.
pub type DriverFactory = fn(&crate::config::HalFileConfig) -> Box<dyn HalDriver>;
