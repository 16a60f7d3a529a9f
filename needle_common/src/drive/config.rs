//! Drive configuration and engine tunables.
//!
//! `DriveConfig` holds the operator parameters. It is loaded once at boot
//! and afterwards mutated only through [`DriveConfig::set_parameter`],
//! which validates a single named field and leaves the record untouched
//! on rejection.
//!
//! `EngineTuning` holds fixed timing and threshold constants. It is read
//! from the `[engine]` TOML section and is not runtime-settable.
//!
//! All fields use `#[serde(default)]` so a partial file is valid.

use core::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::ConfigValidationError;
use super::state::StopPosition;
use crate::consts::*;

// ─── Operator Parameters ────────────────────────────────────────────

/// Operator-facing drive configuration.
///
/// `max_motor_rpm_calibrated` may exceed `max_rpm_setting`; the engine
/// clamps targets to `max_rpm_setting`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DriveConfig {
    /// User RPM ceiling for normal operation.
    pub max_rpm_setting: f64,
    /// Measured full-power RPM (written by calibration).
    #[serde(alias = "max_motor_rpm")]
    pub max_motor_rpm_calibrated: f64,
    /// Closed-loop regulation when true, open-loop power mapping otherwise.
    pub pid_enabled: bool,
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
    /// Soft-start step period [ms].
    pub soft_start_time_step_ms: u32,
    /// Number of soft-start steps.
    pub soft_start_ramp_steps: u32,
    pub stop_position_default: StopPosition,
    /// Open-loop power that reaches `max_rpm_setting` free-running [%].
    pub calibrated_motor_power_free_running_percent: f64,
    /// Extra open-loop power for sewing load [%].
    pub calibrated_motor_power_load_offset_percent: f64,
    pub autotune_target_rpm: f64,
    pub autotune_power_high: f64,
    pub autotune_power_low: f64,
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            max_rpm_setting: 500.0,
            max_motor_rpm_calibrated: 2000.0,
            pid_enabled: false,
            kp: 0.5,
            ki: 0.01,
            kd: 0.05,
            soft_start_time_step_ms: 20,
            soft_start_ramp_steps: 50,
            stop_position_default: StopPosition::Down,
            calibrated_motor_power_free_running_percent: 80.0,
            calibrated_motor_power_load_offset_percent: 10.0,
            autotune_target_rpm: 300.0,
            autotune_power_high: 70.0,
            autotune_power_low: 30.0,
        }
    }
}

/// Named operator parameter, as used by the set-parameter command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamName {
    MaxRpmSetting,
    #[serde(alias = "max_motor_rpm")]
    MaxMotorRpmCalibrated,
    PidEnabled,
    Kp,
    Ki,
    Kd,
    SoftStartTimeStepMs,
    SoftStartRampSteps,
    StopPositionDefault,
    CalibratedMotorPowerFreeRunningPercent,
    CalibratedMotorPowerLoadOffsetPercent,
    AutotuneTargetRpm,
    AutotunePowerHigh,
    AutotunePowerLow,
}

impl ParamName {
    pub const ALL: [ParamName; 14] = [
        Self::MaxRpmSetting,
        Self::MaxMotorRpmCalibrated,
        Self::PidEnabled,
        Self::Kp,
        Self::Ki,
        Self::Kd,
        Self::SoftStartTimeStepMs,
        Self::SoftStartRampSteps,
        Self::StopPositionDefault,
        Self::CalibratedMotorPowerFreeRunningPercent,
        Self::CalibratedMotorPowerLoadOffsetPercent,
        Self::AutotuneTargetRpm,
        Self::AutotunePowerHigh,
        Self::AutotunePowerLow,
    ];

    /// Wire name of the parameter.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MaxRpmSetting => "max_rpm_setting",
            Self::MaxMotorRpmCalibrated => "max_motor_rpm_calibrated",
            Self::PidEnabled => "pid_enabled",
            Self::Kp => "kp",
            Self::Ki => "ki",
            Self::Kd => "kd",
            Self::SoftStartTimeStepMs => "soft_start_time_step_ms",
            Self::SoftStartRampSteps => "soft_start_ramp_steps",
            Self::StopPositionDefault => "stop_position_default",
            Self::CalibratedMotorPowerFreeRunningPercent => {
                "calibrated_motor_power_free_running_percent"
            }
            Self::CalibratedMotorPowerLoadOffsetPercent => {
                "calibrated_motor_power_load_offset_percent"
            }
            Self::AutotuneTargetRpm => "autotune_target_rpm",
            Self::AutotunePowerHigh => "autotune_power_high",
            Self::AutotunePowerLow => "autotune_power_low",
        }
    }
}

impl FromStr for ParamName {
    type Err = ConfigValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "max_motor_rpm" {
            return Ok(Self::MaxMotorRpmCalibrated);
        }
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or(ConfigValidationError::UnknownParameter)
    }
}

/// Value carried by a set-parameter command.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Flag(bool),
    Number(f64),
    Position(StopPosition),
}

impl ParamValue {
    /// Parse the textual form of a value for `name`.
    pub fn parse_for(name: ParamName, text: &str) -> Result<Self, ConfigValidationError> {
        let text = text.trim();
        match name {
            ParamName::PidEnabled => match text.to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => Ok(Self::Flag(true)),
                "false" | "0" | "no" | "off" => Ok(Self::Flag(false)),
                _ => Err(ConfigValidationError::WrongType {
                    param: name.as_str(),
                    expected: "a boolean",
                }),
            },
            ParamName::StopPositionDefault => text.parse().map(Self::Position),
            _ => text
                .parse::<f64>()
                .map(Self::Number)
                .map_err(|_| ConfigValidationError::WrongType {
                    param: name.as_str(),
                    expected: "a number",
                }),
        }
    }
}

fn number(name: ParamName, value: ParamValue) -> Result<f64, ConfigValidationError> {
    match value {
        ParamValue::Number(v) if v.is_finite() => Ok(v),
        ParamValue::Number(_) => Err(ConfigValidationError::NonFinite {
            param: name.as_str(),
        }),
        _ => Err(ConfigValidationError::WrongType {
            param: name.as_str(),
            expected: "a number",
        }),
    }
}

fn in_range(name: ParamName, v: f64, min: f64, max: f64) -> Result<f64, ConfigValidationError> {
    if !v.is_finite() {
        return Err(ConfigValidationError::NonFinite {
            param: name.as_str(),
        });
    }
    if v < min || v > max {
        return Err(ConfigValidationError::OutOfRange {
            param: name.as_str(),
            value: v,
            min,
            max,
        });
    }
    Ok(v)
}

fn integer(name: ParamName, v: f64, min: u32, max: u32) -> Result<u32, ConfigValidationError> {
    let v = in_range(name, v, min as f64, max as f64)?;
    if v.fract() != 0.0 {
        return Err(ConfigValidationError::WrongType {
            param: name.as_str(),
            expected: "an integer",
        });
    }
    Ok(v as u32)
}

impl DriveConfig {
    /// Check one field against its bounds.
    fn check(&self, name: ParamName) -> Result<(), ConfigValidationError> {
        use ParamName::*;
        match name {
            MaxRpmSetting => in_range(name, self.max_rpm_setting, 1.0, RPM_SETTING_MAX).map(drop),
            MaxMotorRpmCalibrated => {
                in_range(name, self.max_motor_rpm_calibrated, 0.0, RPM_CALIBRATED_MAX).map(drop)
            }
            Kp => in_range(name, self.kp, 0.0, GAIN_MAX).map(drop),
            Ki => in_range(name, self.ki, 0.0, GAIN_MAX).map(drop),
            Kd => in_range(name, self.kd, 0.0, GAIN_MAX).map(drop),
            SoftStartTimeStepMs => integer(
                name,
                self.soft_start_time_step_ms as f64,
                SOFT_START_STEP_MS_MIN,
                SOFT_START_STEP_MS_MAX,
            )
            .map(drop),
            SoftStartRampSteps => integer(
                name,
                self.soft_start_ramp_steps as f64,
                SOFT_START_STEPS_MIN,
                SOFT_START_STEPS_MAX,
            )
            .map(drop),
            CalibratedMotorPowerFreeRunningPercent => in_range(
                name,
                self.calibrated_motor_power_free_running_percent,
                0.0,
                100.0,
            )
            .map(drop),
            CalibratedMotorPowerLoadOffsetPercent => in_range(
                name,
                self.calibrated_motor_power_load_offset_percent,
                0.0,
                100.0,
            )
            .map(drop),
            AutotuneTargetRpm => {
                in_range(name, self.autotune_target_rpm, 1.0, RPM_SETTING_MAX).map(drop)
            }
            AutotunePowerHigh => in_range(name, self.autotune_power_high, 0.0, 100.0).map(drop),
            AutotunePowerLow => in_range(name, self.autotune_power_low, 0.0, 100.0).map(drop),
            PidEnabled | StopPositionDefault => Ok(()),
        }
    }

    fn check_cross_field(&self) -> Result<(), ConfigValidationError> {
        if self.autotune_power_high <= self.autotune_power_low {
            return Err(ConfigValidationError::Inconsistent(
                "autotune_power_high must exceed autotune_power_low",
            ));
        }
        Ok(())
    }

    /// Validate every field and the cross-field rules.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        for name in ParamName::ALL {
            self.check(name)?;
        }
        self.check_cross_field()
    }

    /// Validate and apply a single named parameter.
    ///
    /// On error the configuration is unchanged.
    pub fn set_parameter(
        &mut self,
        name: ParamName,
        value: ParamValue,
    ) -> Result<(), ConfigValidationError> {
        let mut next = self.clone();
        match name {
            ParamName::PidEnabled => match value {
                ParamValue::Flag(b) => next.pid_enabled = b,
                _ => {
                    return Err(ConfigValidationError::WrongType {
                        param: name.as_str(),
                        expected: "a boolean",
                    });
                }
            },
            ParamName::StopPositionDefault => match value {
                ParamValue::Position(p) => next.stop_position_default = p,
                _ => {
                    return Err(ConfigValidationError::WrongType {
                        param: name.as_str(),
                        expected: "\"up\" or \"down\"",
                    });
                }
            },
            ParamName::SoftStartTimeStepMs => {
                let v = number(name, value)?;
                next.soft_start_time_step_ms =
                    integer(name, v, SOFT_START_STEP_MS_MIN, SOFT_START_STEP_MS_MAX)?;
            }
            ParamName::SoftStartRampSteps => {
                let v = number(name, value)?;
                next.soft_start_ramp_steps =
                    integer(name, v, SOFT_START_STEPS_MIN, SOFT_START_STEPS_MAX)?;
            }
            _ => {
                let v = number(name, value)?;
                *next.float_mut(name) = v;
            }
        }
        next.check(name)?;
        next.check_cross_field()?;
        *self = next;
        Ok(())
    }

    fn float_mut(&mut self, name: ParamName) -> &mut f64 {
        use ParamName::*;
        match name {
            MaxRpmSetting => &mut self.max_rpm_setting,
            MaxMotorRpmCalibrated => &mut self.max_motor_rpm_calibrated,
            Kp => &mut self.kp,
            Ki => &mut self.ki,
            Kd => &mut self.kd,
            CalibratedMotorPowerFreeRunningPercent => {
                &mut self.calibrated_motor_power_free_running_percent
            }
            CalibratedMotorPowerLoadOffsetPercent => {
                &mut self.calibrated_motor_power_load_offset_percent
            }
            AutotuneTargetRpm => &mut self.autotune_target_rpm,
            AutotunePowerHigh => &mut self.autotune_power_high,
            AutotunePowerLow | PidEnabled | StopPositionDefault | SoftStartTimeStepMs
            | SoftStartRampSteps => &mut self.autotune_power_low,
        }
    }

    /// Open-loop power ceiling [%].
    #[inline]
    pub fn open_loop_power_ceiling(&self) -> f64 {
        (self.calibrated_motor_power_free_running_percent
            + self.calibrated_motor_power_load_offset_percent)
            .min(100.0)
    }
}

// ─── Engine Tunables ────────────────────────────────────────────────

/// Power → firing-phase mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PhaseCurveKind {
    /// Inverse of the conducted RMS power integral (resistive load).
    #[default]
    RmsPower,
    /// Delay proportional to `1 - power`.
    Linear,
}

/// Autotune gain-mapping rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TuningRuleKind {
    /// Classic Ziegler–Nichols ultimate-cycle PID.
    #[default]
    ZieglerNichols,
    /// Tyreus–Luyben: less aggressive, more robust.
    TyreusLuyben,
    /// Ziegler–Nichols "no overshoot" variant.
    NoOvershoot,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MainsTuning {
    /// Half-cycle assumed until two edges have been measured [µs].
    pub nominal_half_cycle_us: u32,
    pub min_interval_us: u32,
    pub loss_timeout_ms: u32,
}

impl Default for MainsTuning {
    fn default() -> Self {
        Self {
            nominal_half_cycle_us: HALF_CYCLE_50HZ_US,
            min_interval_us: ZERO_CROSS_MIN_INTERVAL_US,
            loss_timeout_ms: MAINS_LOSS_TIMEOUT_MS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RpmTuning {
    pub pulses_per_rev: u32,
    pub debounce_us: u32,
    pub window_ms: u32,
    pub quiet_interval_ms: u32,
}

impl Default for RpmTuning {
    fn default() -> Self {
        Self {
            pulses_per_rev: PULSES_PER_REV_DEFAULT,
            debounce_us: RPM_PULSE_DEBOUNCE_US,
            window_ms: RPM_WINDOW_MS,
            quiet_interval_ms: RPM_QUIET_INTERVAL_MS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NeedleTuning {
    pub debounce_us: u32,
    pub conflict_window_ms: u32,
}

impl Default for NeedleTuning {
    fn default() -> Self {
        Self {
            debounce_us: NEEDLE_DEBOUNCE_US,
            conflict_window_ms: NEEDLE_CONFLICT_WINDOW_MS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PedalTuning {
    pub deadband: u16,
    pub adc_max: u16,
}

impl Default for PedalTuning {
    fn default() -> Self {
        Self {
            deadband: PEDAL_DEADBAND_DEFAULT,
            adc_max: PEDAL_ADC_MAX,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TriacTuning {
    pub curve: PhaseCurveKind,
    pub gate_pulse_us: u32,
    pub min_fire_delay_us: u32,
    pub late_guard_us: u32,
    pub stale_reject_limit: u32,
}

impl Default for TriacTuning {
    fn default() -> Self {
        Self {
            curve: PhaseCurveKind::RmsPower,
            gate_pulse_us: GATE_PULSE_US,
            min_fire_delay_us: MIN_FIRE_DELAY_US,
            late_guard_us: LATE_GUARD_US,
            stale_reject_limit: STALE_REJECT_LIMIT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StopTuning {
    pub creep_power_percent: f64,
    pub near_zero_rpm: f64,
    pub timeout_ms: u32,
}

impl Default for StopTuning {
    fn default() -> Self {
        Self {
            creep_power_percent: STOP_CREEP_POWER_DEFAULT,
            near_zero_rpm: NEAR_ZERO_RPM_DEFAULT,
            timeout_ms: STOP_TIMEOUT_MS_DEFAULT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CalibrationTuning {
    pub sample_interval_ms: u32,
    pub plateau_samples: u32,
    pub plateau_tolerance_rpm: f64,
    pub max_duration_ms: u32,
    pub min_plateau_rpm: f64,
}

impl Default for CalibrationTuning {
    fn default() -> Self {
        Self {
            sample_interval_ms: CAL_SAMPLE_INTERVAL_MS,
            plateau_samples: CAL_PLATEAU_SAMPLES,
            plateau_tolerance_rpm: CAL_PLATEAU_TOLERANCE_RPM,
            max_duration_ms: CAL_MAX_DURATION_MS,
            min_plateau_rpm: CAL_MIN_PLATEAU_RPM,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AutotuneTuning {
    pub rule: TuningRuleKind,
    pub cycles_required: u32,
    pub timeout_ms: u32,
    pub spin_up_timeout_ms: u32,
    pub hysteresis_fraction: f64,
    pub stability_spread: f64,
}

impl Default for AutotuneTuning {
    fn default() -> Self {
        Self {
            rule: TuningRuleKind::ZieglerNichols,
            cycles_required: AUTOTUNE_CYCLES_REQUIRED,
            timeout_ms: AUTOTUNE_TIMEOUT_MS,
            spin_up_timeout_ms: AUTOTUNE_SPIN_UP_TIMEOUT_MS,
            hysteresis_fraction: AUTOTUNE_HYSTERESIS_FRACTION,
            stability_spread: AUTOTUNE_STABILITY_SPREAD,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FaultTuning {
    pub rpm_silence_min_power: f64,
    pub rpm_silence_timeout_ms: u32,
}

impl Default for FaultTuning {
    fn default() -> Self {
        Self {
            rpm_silence_min_power: RPM_SILENCE_MIN_POWER,
            rpm_silence_timeout_ms: RPM_SILENCE_TIMEOUT_MS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PidTuning {
    /// First-order filter on the derivative term; 0 leaves it unfiltered.
    pub derivative_filter_ms: u32,
}

impl Default for PidTuning {
    fn default() -> Self {
        Self {
            derivative_filter_ms: PID_DERIVATIVE_FILTER_MS,
        }
    }
}

impl PidTuning {
    /// Filter time constant [s].
    #[inline]
    pub fn derivative_filter_s(&self) -> f64 {
        self.derivative_filter_ms as f64 / 1_000.0
    }
}

/// Fixed engine tunables (`[engine]` section).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineTuning {
    pub control_period_us: u32,
    pub mains: MainsTuning,
    pub rpm: RpmTuning,
    pub needle: NeedleTuning,
    pub pedal: PedalTuning,
    pub triac: TriacTuning,
    pub pid: PidTuning,
    pub stop: StopTuning,
    pub calibration: CalibrationTuning,
    pub autotune: AutotuneTuning,
    pub faults: FaultTuning,
}

impl Default for EngineTuning {
    fn default() -> Self {
        Self {
            control_period_us: CONTROL_PERIOD_US,
            mains: MainsTuning::default(),
            rpm: RpmTuning::default(),
            needle: NeedleTuning::default(),
            pedal: PedalTuning::default(),
            triac: TriacTuning::default(),
            pid: PidTuning::default(),
            stop: StopTuning::default(),
            calibration: CalibrationTuning::default(),
            autotune: AutotuneTuning::default(),
            faults: FaultTuning::default(),
        }
    }
}

impl EngineTuning {
    /// Validate tunable bounds.
    pub fn validate(&self) -> Result<(), String> {
        if self.control_period_us < CONTROL_PERIOD_US_MIN
            || self.control_period_us > CONTROL_PERIOD_US_MAX
        {
            return Err(format!(
                "control_period_us {} out of range [{}, {}]",
                self.control_period_us, CONTROL_PERIOD_US_MIN, CONTROL_PERIOD_US_MAX
            ));
        }
        let m = &self.mains;
        if m.nominal_half_cycle_us < HALF_CYCLE_60HZ_US - 500
            || m.nominal_half_cycle_us > HALF_CYCLE_50HZ_US + 500
        {
            return Err(format!(
                "mains.nominal_half_cycle_us {} is neither 50 Hz nor 60 Hz",
                m.nominal_half_cycle_us
            ));
        }
        if m.min_interval_us == 0 || m.min_interval_us >= m.nominal_half_cycle_us {
            return Err(format!(
                "mains.min_interval_us {} must be in (0, {})",
                m.min_interval_us, m.nominal_half_cycle_us
            ));
        }
        if m.loss_timeout_ms * 1000 <= 2 * m.nominal_half_cycle_us {
            return Err("mains.loss_timeout_ms must exceed two half-cycles".to_string());
        }
        if self.rpm.pulses_per_rev == 0 || self.rpm.pulses_per_rev > PULSES_PER_REV_MAX {
            return Err(format!(
                "rpm.pulses_per_rev {} out of range [1, {}]",
                self.rpm.pulses_per_rev, PULSES_PER_REV_MAX
            ));
        }
        if self.rpm.window_ms == 0 || self.rpm.quiet_interval_ms < self.rpm.window_ms {
            return Err("rpm.quiet_interval_ms must be >= rpm.window_ms > 0".to_string());
        }
        if self.pedal.deadband >= self.pedal.adc_max {
            return Err(format!(
                "pedal.deadband {} must be below pedal.adc_max {}",
                self.pedal.deadband, self.pedal.adc_max
            ));
        }
        let t = &self.triac;
        if t.gate_pulse_us == 0 || t.gate_pulse_us > 1_000 {
            return Err(format!(
                "triac.gate_pulse_us {} out of range [1, 1000]",
                t.gate_pulse_us
            ));
        }
        if t.min_fire_delay_us + t.late_guard_us >= m.nominal_half_cycle_us {
            return Err("triac.min_fire_delay_us + late_guard_us exceed the half-cycle".to_string());
        }
        if t.stale_reject_limit == 0 {
            return Err("triac.stale_reject_limit must be at least 1".to_string());
        }
        if self.pid.derivative_filter_ms > PID_DERIVATIVE_FILTER_MS_MAX {
            return Err(format!(
                "pid.derivative_filter_ms {} out of range [0, {}]",
                self.pid.derivative_filter_ms, PID_DERIVATIVE_FILTER_MS_MAX
            ));
        }
        let s = &self.stop;
        if !(0.0..=100.0).contains(&s.creep_power_percent) || !(s.near_zero_rpm > 0.0) {
            return Err("stop.creep_power_percent in [0, 100] and near_zero_rpm > 0".to_string());
        }
        let c = &self.calibration;
        if c.sample_interval_ms == 0 || c.plateau_samples == 0 || c.max_duration_ms == 0 {
            return Err("calibration intervals and counts must be non-zero".to_string());
        }
        let a = &self.autotune;
        if a.cycles_required == 0 || a.cycles_required as usize > AUTOTUNE_MAX_CYCLES {
            return Err(format!(
                "autotune.cycles_required {} out of range [1, {}]",
                a.cycles_required, AUTOTUNE_MAX_CYCLES
            ));
        }
        if !(0.0..0.5).contains(&a.hysteresis_fraction) || !(a.stability_spread > 0.0) {
            return Err("autotune.hysteresis_fraction in [0, 0.5), stability_spread > 0".to_string());
        }
        Ok(())
    }

    /// Control period in seconds.
    #[inline]
    pub fn control_period_s(&self) -> f64 {
        self.control_period_us as f64 / 1_000_000.0
    }
}
