//! Integration test: gate timing invariants under a running engine.
//!
//! At most one bounded pulse per half-cycle, never inside the late guard
//! band, and stale commands never reach the gate.

use needle_common::drive::command::Command;
use needle_common::drive::config::DriveConfig;
use needle_common::drive::error::FaultFlags;
use needle_common::drive::state::MotorState;
use needle_common::drive::timing::FiringCommand;

use super::rig::{Rig, STEP_US, closed_loop};

#[test]
fn one_bounded_pulse_per_half_cycle() {
    let mut rig = Rig::new(closed_loop(2_500.0));
    rig.start_sewing(50_000);
    rig.run_for(2_000_000);
    rig.set_pedal(20_000);
    rig.run_for(1_000_000);
    rig.set_pedal(0);
    rig.run_for(3_000_000);

    assert!(rig.fires > 100);
    assert_eq!(rig.max_fires_per_half, 1);
    assert_eq!(rig.late_fires, 0);
    assert!(rig.max_gate_high_us <= 50 + STEP_US, "gate high {} µs", rig.max_gate_high_us);
}

#[test]
fn full_power_calibration_respects_guard_band() {
    let mut rig = Rig::new(DriveConfig::default());
    rig.run_for(20_000);
    rig.command(Command::CalibrateMaxRpm).unwrap();
    rig.run_for(1_000_000);
    assert!(rig.fires >= 95);
    assert_eq!(rig.max_fires_per_half, 1);
    assert_eq!(rig.late_fires, 0);
}

#[test]
fn stale_command_never_fires() {
    let mut rig = Rig::new(DriveConfig::default());
    rig.run_for(25_000);
    let current = rig.status().cycle_id;
    assert!(current > 0);

    let stale = FiringCommand {
        delay_us: 500,
        cycle_id: current.wrapping_sub(1),
    };
    assert!(rig.bus.triac.submit(stale).is_err());
    let fires = rig.fires;
    rig.run_for(500);
    assert_eq!(rig.fires, fires);
    assert!(!rig.bus.triac.has_pending());
}

#[test]
fn repeated_stale_commands_latch_fault() {
    let mut rig = Rig::new(DriveConfig::default());
    rig.run_for(25_000);
    let current = rig.status().cycle_id;
    for _ in 0..5 {
        let _ = rig.bus.triac.submit(FiringCommand {
            delay_us: 500,
            cycle_id: current + 7,
        });
    }
    rig.run_for(2_000);
    assert_eq!(rig.state(), MotorState::Fault);
    assert!(rig.status().faults().contains(FaultFlags::STALE_FIRING));

    rig.command(Command::StopOperations).unwrap();
    assert_eq!(rig.bus.triac.consecutive_stale(), 0);
    rig.run_for(10_000);
    assert_eq!(rig.state(), MotorState::Idle);
}
