//! Closed-loop scenarios against the physics simulation.
//!
//! The engine runs unmodified against the simulated sewing head: mains
//! edges, gate pulses, rotation pulses and needle cams all go through the
//! interrupt bus. Assertions use the true shaft state from the driver.

use std::path::PathBuf;

use needle_common::config::ConfigError;
use needle_common::drive::command::Command;
use needle_common::drive::config::DriveConfig;
use needle_common::drive::error::{DriveError, FaultFlags};
use needle_common::drive::state::{AutotuneStage, MotorState};
use needle_hal::config::{HalFileConfig, SimulationConfig};
use needle_hal::core::{HalCore, RunOptions};
use needle_hal::drivers::create_driver;
use needle_hal::drivers::simulation::MotorParams;
use needle_hal::scenario::{Scenario, ScenarioAction, ScenarioEvent};
use tempfile::TempDir;

const FULL_PEDAL: u16 = 65_535;

fn hal(config: HalFileConfig) -> HalCore {
    let driver = create_driver("simulation", &config).unwrap();
    let mut core = HalCore::new(config, driver, RunOptions::default()).unwrap();
    core.init().unwrap();
    core
}

fn closed_loop(max_rpm: f64) -> HalFileConfig {
    HalFileConfig {
        drive: DriveConfig {
            pid_enabled: true,
            kp: 0.02,
            ki: 0.05,
            kd: 0.0,
            max_rpm_setting: max_rpm,
            ..DriveConfig::default()
        },
        ..HalFileConfig::default()
    }
}

fn scenario(duration_ms: u64, events: &[(u64, ScenarioAction)]) -> Scenario {
    let events = events
        .iter()
        .map(|&(at_ms, action)| ScenarioEvent::new(at_ms, action))
        .collect();
    Scenario::new("test", duration_ms, events).unwrap()
}

fn manifest_path(rel: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join(rel)
}

// ── Sewing ──────────────────────────────────────────────────────────

#[test]
fn sewing_converges_then_parks_down() {
    let mut core = hal(closed_loop(1_500.0));

    let sew = core
        .run(&scenario(4_000, &[(100, ScenarioAction::Pedal { adc: FULL_PEDAL })]))
        .unwrap();
    assert_eq!(sew.status.state, MotorState::Running);
    assert_eq!(sew.status.target_rpm, 1_500.0);
    assert!(
        (sew.final_rpm - 1_500.0).abs() < 200.0,
        "shaft at {} rpm",
        sew.final_rpm
    );
    assert!(sew.peak_rpm < 2_500.0, "overshoot to {}", sew.peak_rpm);
    assert!(sew.faults_seen.is_empty());

    let park = core
        .run(&scenario(6_000, &[(0, ScenarioAction::Pedal { adc: 0 })]))
        .unwrap();
    assert_eq!(park.status.state, MotorState::Idle);
    assert_eq!(park.status.motor_power_percent, 0.0);
    assert_eq!(park.final_rpm, 0.0);
    assert!(park.needle.down_active, "needle not parked down");
    assert!(park.faults_seen.is_empty());
}

#[test]
fn open_loop_follows_pedal() {
    let mut core = hal(HalFileConfig::default());
    let half = core
        .run(&scenario(3_000, &[(100, ScenarioAction::Pedal { adc: 33_000 })]))
        .unwrap();
    assert_eq!(half.status.state, MotorState::Running);
    let half_power = half.status.motor_power_percent;
    assert!(half_power > 35.0 && half_power < 55.0, "power {half_power}");

    let full = core
        .run(&scenario(3_000, &[(0, ScenarioAction::Pedal { adc: FULL_PEDAL })]))
        .unwrap();
    assert!((full.status.motor_power_percent - 90.0).abs() < 1e-9);
    assert!(full.final_rpm > half.final_rpm + 300.0);
}

#[test]
fn sixty_hertz_mains_is_tracked() {
    let mut config = HalFileConfig::default();
    config.simulation = SimulationConfig {
        mains_frequency_hz: 60.0,
        ..SimulationConfig::default()
    };
    let mut core = hal(config);
    let summary = core
        .run(&scenario(2_000, &[(100, ScenarioAction::Pedal { adc: 40_000 })]))
        .unwrap();
    assert_eq!(summary.status.state, MotorState::Running);
    assert!(summary.faults_seen.is_empty());
    assert!(summary.final_rpm > 1_000.0);
}

// ── Procedures ──────────────────────────────────────────────────────

#[test]
fn calibration_finds_full_power_plateau() {
    let mut core = hal(HalFileConfig::default());
    let summary = core
        .run(&scenario(
            6_000,
            &[(100, ScenarioAction::Command(Command::CalibrateMaxRpm))],
        ))
        .unwrap();

    let status = summary.status;
    assert_eq!(status.state, MotorState::Idle);
    assert_eq!(status.last_failure, None);
    assert!(!status.calibration_active);
    let expected = MotorParams::default().steady_rpm(1.0);
    let measured = status.max_motor_rpm_calibrated;
    assert!(
        (measured - expected).abs() < 0.08 * expected,
        "calibrated {measured}, plant plateau {expected}"
    );
    assert_eq!(status.max_rpm_setting, DriveConfig::default().max_rpm_setting);
}

#[test]
fn autotune_enables_pid() {
    let config = HalFileConfig {
        drive: DriveConfig {
            autotune_target_rpm: 2_000.0,
            autotune_power_high: 60.0,
            autotune_power_low: 20.0,
            ..DriveConfig::default()
        },
        ..HalFileConfig::default()
    };
    let mut core = hal(config);
    let summary = core
        .run(&scenario(
            47_000,
            &[(100, ScenarioAction::Command(Command::AutotunePid))],
        ))
        .unwrap();

    let status = summary.status;
    assert_eq!(status.state, MotorState::Idle);
    assert_eq!(status.last_failure, None);
    assert_eq!(status.autotune_stage, AutotuneStage::Complete);
    assert!(status.pid_enabled);
    assert!(status.kp > 0.0 && status.kp.is_finite());
    assert!(status.ki > 0.0 && status.ki.is_finite());
    assert!(status.kd >= 0.0 && status.kd.is_finite());
}

// ── Faults ──────────────────────────────────────────────────────────

#[test]
fn mains_dropout_latches_fault_until_stop_operations() {
    let mut core = hal(HalFileConfig::default());
    let dropout = core
        .run(&scenario(
            2_400,
            &[
                (100, ScenarioAction::Pedal { adc: 40_000 }),
                (1_500, ScenarioAction::MainsDropout { duration_ms: 80 }),
            ],
        ))
        .unwrap();
    assert_eq!(dropout.status.state, MotorState::Fault);
    assert_eq!(dropout.status.motor_power_percent, 0.0);
    assert!(dropout.faults_seen.contains(FaultFlags::MAINS_LOSS));
    assert!(matches!(
        dropout.status.last_failure,
        Some(DriveError::SensorTimeout(_))
    ));

    let reset = core
        .run(&scenario(
            1_500,
            &[
                (0, ScenarioAction::Pedal { adc: 0 }),
                (500, ScenarioAction::Command(Command::StopOperations)),
            ],
        ))
        .unwrap();
    assert_eq!(reset.status.state, MotorState::Idle);
    assert!(reset.status.faults().is_empty());
}

// ── Files ───────────────────────────────────────────────────────────

#[test]
fn shipped_files_load() {
    let config = HalFileConfig::load_validated(&manifest_path("config/drive.toml")).unwrap();
    assert!(config.drive.pid_enabled);
    for name in ["sew_and_park", "calibrate_and_tune", "mains_dropout"] {
        let path = manifest_path(&format!("config/{name}.toml"));
        let scenario = Scenario::load(&path).unwrap();
        assert!(!scenario.events.is_empty(), "{name} has no events");
    }
}

#[test]
fn invalid_config_file_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("drive.toml");
    std::fs::write(&path, "[drive]\nkp = -1.0\n").unwrap();
    assert!(matches!(
        HalFileConfig::load_validated(&path),
        Err(ConfigError::ValidationError(_))
    ));
    assert!(matches!(
        HalFileConfig::load_validated(&dir.path().join("missing.toml")),
        Err(ConfigError::FileNotFound)
    ));
}
