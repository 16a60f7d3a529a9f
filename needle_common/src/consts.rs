//! System-wide constants for the needle drive.
//!
//! Single source of truth for defaults, parameter bounds and fixed-size
//! buffer capacities. Every crate imports from here.

use static_assertions::const_assert;

// ─── Mains ──────────────────────────────────────────────────────────

/// Nominal half-cycle duration for 50 Hz mains [µs].
pub const HALF_CYCLE_50HZ_US: u32 = 10_000;

/// Nominal half-cycle duration for 60 Hz mains [µs].
pub const HALF_CYCLE_60HZ_US: u32 = 8_333;

/// Zero-cross edges closer than this are contact bounce or noise [µs].
pub const ZERO_CROSS_MIN_INTERVAL_US: u32 = 2_000;

/// No accepted zero-cross for this long means mains loss [ms].
pub const MAINS_LOSS_TIMEOUT_MS: u32 = 50;

const_assert!(ZERO_CROSS_MIN_INTERVAL_US < HALF_CYCLE_60HZ_US);
const_assert!(MAINS_LOSS_TIMEOUT_MS * 1000 > 2 * HALF_CYCLE_50HZ_US);

// ─── TRIAC ──────────────────────────────────────────────────────────

/// Gate pulse width [µs]. The gate is never held as a level.
pub const GATE_PULSE_US: u32 = 50;

/// Smallest firing delay after the zero-cross [µs].
pub const MIN_FIRE_DELAY_US: u32 = 100;

/// No firing later than `half_cycle - LATE_GUARD_US` [µs].
pub const LATE_GUARD_US: u32 = 200;

/// Consecutive stale firing commands before the engine latches FAULT.
pub const STALE_REJECT_LIMIT: u32 = 5;

/// Entries in the power → phase lookup table (0..=100 %).
pub const PHASE_TABLE_LEN: usize = 101;

// ─── Rotation sensor ────────────────────────────────────────────────

/// Rotation sensor pulses per handwheel revolution.
pub const PULSES_PER_REV_DEFAULT: u32 = 1;
pub const PULSES_PER_REV_MAX: u32 = 360;

/// Edges closer than this on the rotation sensor are ignored [µs].
pub const RPM_PULSE_DEBOUNCE_US: u32 = 100;

/// Sliding RPM window [ms].
pub const RPM_WINDOW_MS: u32 = 200;

/// No pulse for this long reports RPM = 0 [ms].
pub const RPM_QUIET_INTERVAL_MS: u32 = 1_500;

/// Capacity of the RPM pulse observation ring.
pub const RPM_RING_CAPACITY: usize = 256;

// ─── Needle sensors ─────────────────────────────────────────────────

/// A needle sensor level must be stable this long before it is accepted [µs].
pub const NEEDLE_DEBOUNCE_US: u32 = 2_000;

/// Both needle sensors active longer than this is a sensor fault [ms].
pub const NEEDLE_CONFLICT_WINDOW_MS: u32 = 50;

// ─── Pedal ──────────────────────────────────────────────────────────

/// Full scale of the 16-bit pedal ADC.
pub const PEDAL_ADC_MAX: u16 = 65_535;

/// ADC readings at or below this are "pedal released".
pub const PEDAL_DEADBAND_DEFAULT: u16 = 1_000;

// ─── Control loop ───────────────────────────────────────────────────

/// Control-loop tick period [µs].
pub const CONTROL_PERIOD_US: u32 = 1_000;
pub const CONTROL_PERIOD_US_MIN: u32 = 100;
pub const CONTROL_PERIOD_US_MAX: u32 = 10_000;

/// Status publishing interval of the cycle runner [ms].
pub const STATUS_INTERVAL_MS: u32 = 500;

// ─── Operator parameter bounds ──────────────────────────────────────

pub const RPM_SETTING_MAX: f64 = 10_000.0;
pub const RPM_CALIBRATED_MAX: f64 = 20_000.0;
pub const GAIN_MAX: f64 = 1_000.0;
pub const SOFT_START_STEP_MS_MIN: u32 = 1;
pub const SOFT_START_STEP_MS_MAX: u32 = 1_000;
pub const SOFT_START_STEPS_MIN: u32 = 1;
pub const SOFT_START_STEPS_MAX: u32 = 1_000;

// ─── Needle stop ────────────────────────────────────────────────────

/// Power that turns the handwheel slowly towards the stop sensor [%].
pub const STOP_CREEP_POWER_DEFAULT: f64 = 12.0;

/// RPM below which the machine counts as stopped.
pub const NEAR_ZERO_RPM_DEFAULT: f64 = 90.0;

/// Give up parking after this long [ms].
pub const STOP_TIMEOUT_MS_DEFAULT: u32 = 5_000;

// ─── Calibration ────────────────────────────────────────────────────

pub const CAL_SAMPLE_INTERVAL_MS: u32 = 100;
pub const CAL_PLATEAU_SAMPLES: u32 = 5;
pub const CAL_PLATEAU_TOLERANCE_RPM: f64 = 10.0;
pub const CAL_MAX_DURATION_MS: u32 = 5_000;
pub const CAL_MIN_PLATEAU_RPM: f64 = 50.0;

// ─── Autotune ───────────────────────────────────────────────────────

/// Maximum oscillation cycles retained by the autotuner.
pub const AUTOTUNE_MAX_CYCLES: usize = 16;
pub const AUTOTUNE_CYCLES_REQUIRED: u32 = 4;
pub const AUTOTUNE_TIMEOUT_MS: u32 = 45_000;
pub const AUTOTUNE_SPIN_UP_TIMEOUT_MS: u32 = 5_000;

/// Relay hysteresis as a fraction of the autotune target RPM.
pub const AUTOTUNE_HYSTERESIS_FRACTION: f64 = 0.02;

/// Cycle-to-cycle spread accepted as "stable" (fraction of the mean).
pub const AUTOTUNE_STABILITY_SPREAD: f64 = 0.25;

const_assert!(AUTOTUNE_CYCLES_REQUIRED as usize <= AUTOTUNE_MAX_CYCLES);

// ─── Fault monitor ──────────────────────────────────────────────────

/// Power at or above which a silent rotation sensor is suspicious [%].
pub const RPM_SILENCE_MIN_POWER: f64 = 30.0;

/// Silent rotation sensor under power for this long is a fault [ms].
pub const RPM_SILENCE_TIMEOUT_MS: u32 = 3_000;

// ─── PID ────────────────────────────────────────────────────────────

/// Derivative low-pass time constant: two 50 Hz half-cycles.
pub const PID_DERIVATIVE_FILTER_MS: u32 = 20;
pub const PID_DERIVATIVE_FILTER_MS_MAX: u32 = 1_000;
