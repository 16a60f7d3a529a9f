//! Integration test: end-to-end drive scenarios.
//!
//! 1. Pedal press → soft start → PID converges on the pedal target
//! 2. Pedal release → ramp-down → needle parks at the selected sensor
//! 3. Mains dropout → FAULT latched until stop_operations
//! 4. Calibration and autotune on command

use needle_common::drive::command::{Command, CommandAck};
use needle_common::drive::config::{DriveConfig, ParamName, ParamValue};
use needle_common::drive::error::{DriveError, FaultFlags};
use needle_common::drive::state::{AutotuneStage, MotorState, StopPosition};

use super::rig::{Rig, closed_loop};

const FULL_PEDAL: u16 = 65_535;

// ── Running ─────────────────────────────────────────────────────────

#[test]
fn pedal_press_soft_starts_and_converges() {
    let mut rig = Rig::new(closed_loop(3_000.0));
    rig.start_sewing(FULL_PEDAL);
    assert_eq!(rig.state(), MotorState::Running);
    assert_eq!(rig.status().target_rpm, 3_000.0);

    // Setpoint ramp: far from target after 200 ms of a 1 s ramp.
    rig.run_for(200_000);
    assert!(rig.rpm < 1_200.0, "rpm {} after 200 ms", rig.rpm);
    let early_power = rig.status().motor_power_percent;
    assert!(early_power < 100.0);

    rig.run_for(3_800_000);
    assert_eq!(rig.state(), MotorState::Running);
    assert!(
        (rig.rpm - 3_000.0).abs() < 150.0,
        "rpm {} did not converge to 3000",
        rig.rpm
    );
    let status = rig.status();
    assert!((status.current_rpm - 3_000.0).abs() < 200.0);
    assert!(status.motor_power_percent > 50.0 && status.motor_power_percent < 100.0);
    assert!(status.faults().is_empty());
}

#[test]
fn pedal_release_parks_needle_down() {
    let mut rig = Rig::new(closed_loop(3_000.0));
    rig.start_sewing(FULL_PEDAL);
    rig.run_for(3_000_000);

    rig.set_pedal(0);
    rig.run_for(2 * super::rig::TICK_US);
    assert_eq!(rig.state(), MotorState::Stopping);

    assert!(
        rig.run_until(5_500_000, |r| r.state() != MotorState::Stopping),
        "stop did not finish"
    );
    assert_eq!(rig.state(), MotorState::Idle);
    assert_eq!(rig.status().motor_power_percent, 0.0);

    rig.run_for(500_000);
    assert_eq!(rig.rpm, 0.0);
    assert!(rig.needle().down_active, "needle not parked down");
    assert_eq!(rig.status().last_failure, None);
}

#[test]
fn needle_parks_up_when_selected() {
    let mut rig = Rig::new(closed_loop(1_500.0));
    rig.command(Command::SetParameter {
        name: ParamName::StopPositionDefault,
        value: ParamValue::Position(StopPosition::Up),
    })
    .unwrap();
    rig.start_sewing(FULL_PEDAL);
    rig.run_for(2_000_000);
    rig.set_pedal(0);
    assert!(rig.run_until(6_000_000, |r| r.state() == MotorState::Idle));
    rig.run_for(500_000);
    assert!(rig.needle().up_active, "needle not parked up");
}

#[test]
fn open_loop_power_follows_pedal() {
    let mut rig = Rig::new(DriveConfig::default());
    rig.start_sewing(FULL_PEDAL);
    rig.run_for(2_000_000);
    // 80 % free-running + 10 % load offset.
    assert!((rig.status().motor_power_percent - 90.0).abs() < 1e-9);
    assert!(rig.rpm > 3_000.0);
}

// ── Faults ──────────────────────────────────────────────────────────

#[test]
fn mains_loss_latches_fault() {
    let mut rig = Rig::new(DriveConfig::default());
    rig.start_sewing(40_000);
    rig.run_for(1_000_000);
    assert_eq!(rig.state(), MotorState::Running);

    rig.mains_dropout(60_000);
    rig.run_for(100_000);
    assert_eq!(rig.state(), MotorState::Fault);
    let status = rig.status();
    assert_eq!(status.motor_power_percent, 0.0);
    assert!(status.faults().contains(FaultFlags::MAINS_LOSS));
    assert!(matches!(status.last_failure, Some(DriveError::SensorTimeout(_))));

    // Mains is back and the pedal is held: nothing fires.
    let fires = rig.fires;
    rig.run_for(500_000);
    assert_eq!(rig.state(), MotorState::Fault);
    assert_eq!(rig.fires, fires);

    assert_eq!(rig.command(Command::StopOperations), Ok(CommandAck::Applied));
    assert_eq!(rig.state(), MotorState::Idle);
    rig.run_for(100_000);
    assert_eq!(rig.state(), MotorState::Idle, "held pedal must not restart");

    rig.start_sewing(40_000);
    assert_eq!(rig.state(), MotorState::Running);
}

#[test]
fn stop_operations_is_idempotent() {
    let mut rig = Rig::new(DriveConfig::default());
    rig.run_for(20_000);
    assert_eq!(rig.command(Command::StopOperations), Ok(CommandAck::NoOp));
    assert_eq!(rig.command(Command::StopOperations), Ok(CommandAck::NoOp));
    assert_eq!(rig.state(), MotorState::Idle);
}

// ── Commands ────────────────────────────────────────────────────────

#[test]
fn autotune_rejected_while_running() {
    let mut rig = Rig::new(closed_loop(2_000.0));
    rig.start_sewing(FULL_PEDAL);
    rig.run_for(500_000);
    let before = rig.runner.engine().config().clone();

    let result = rig.command(Command::AutotunePid);
    assert_eq!(
        result,
        Err(DriveError::Rejected {
            command: "autotune_pid",
            state: MotorState::Running,
        })
    );
    assert_eq!(rig.state(), MotorState::Running);
    assert_eq!(rig.runner.engine().config(), &before);
    assert_eq!(rig.status().autotune_stage, AutotuneStage::Idle);
}

#[test]
fn calibration_measures_plateau() {
    let mut rig = Rig::new(DriveConfig::default());
    rig.run_for(20_000);
    assert_eq!(rig.command(Command::CalibrateMaxRpm), Ok(CommandAck::Started));
    assert_eq!(rig.state(), MotorState::Calibrating);
    assert!(rig.status().calibration_active);

    assert!(rig.run_until(5_200_000, |r| r.state() != MotorState::Calibrating));
    assert_eq!(rig.state(), MotorState::Idle);
    let status = rig.status();
    assert_eq!(status.motor_power_percent, 0.0);
    assert!(!status.calibration_active);
    assert_eq!(status.last_failure, None);
    // Full conduction settles at 4500 − 600 rpm.
    let measured = status.max_motor_rpm_calibrated;
    assert!(
        (3_700.0..=4_000.0).contains(&measured),
        "calibrated {measured}"
    );
    // Calibration does not touch the user ceiling.
    assert_eq!(status.max_rpm_setting, 500.0);
}

#[test]
fn autotune_derives_gains_and_enables_pid() {
    let mut rig = Rig::new(DriveConfig {
        autotune_target_rpm: 1_500.0,
        autotune_power_high: 60.0,
        autotune_power_low: 20.0,
        ..DriveConfig::default()
    });
    rig.run_for(20_000);
    assert_eq!(rig.command(Command::AutotunePid), Ok(CommandAck::Started));
    assert_eq!(rig.command(Command::AutotunePid), Ok(CommandAck::NoOp));

    assert!(rig.run_until(46_000_000, |r| r.state() != MotorState::Autotuning));
    let status = rig.status();
    assert_eq!(status.state, MotorState::Idle);
    assert_eq!(status.last_failure, None);
    assert_eq!(status.autotune_stage, AutotuneStage::Complete);
    assert!(status.pid_enabled);
    assert!(status.kp > 0.0 && status.kp.is_finite());
    assert!(status.ki > 0.0 && status.ki.is_finite());
    assert!(status.kd >= 0.0 && status.kd.is_finite());
    assert_ne!(status.kp, DriveConfig::default().kp);
}

#[test]
fn reboot_resets_controller_but_keeps_config() {
    let mut rig = Rig::new(DriveConfig::default());
    rig.command(Command::SetParameter {
        name: ParamName::MaxRpmSetting,
        value: ParamValue::Number(2_500.0),
    })
    .unwrap();
    rig.start_sewing(40_000);
    rig.run_for(300_000);
    assert_eq!(rig.command(Command::Reboot), Ok(CommandAck::Applied));
    assert_eq!(rig.state(), MotorState::Idle);
    assert!(!rig.bus.triac.has_pending());

    rig.run_for(50_000);
    assert_eq!(rig.state(), MotorState::Idle, "reboot requires a pedal release");
    assert_eq!(rig.status().max_rpm_setting, 2_500.0);
}
