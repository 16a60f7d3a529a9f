//! Control cycle: sample → decide → program the TRIAC.
//!
//! ## RT Setup Sequence
//! 1. `mlockall(MCL_CURRENT | MCL_FUTURE)`: lock all pages.
//! 2. Prefault stack pages.
//! 3. `sched_setaffinity`: pin to an isolated CPU core.
//! 4. `sched_setscheduler(SCHED_FIFO, prio)`.
//!
//! ## Cycle Body
//! The runner samples the interrupt-side objects of an [`IsrBus`] into a
//! [`Readings`] snapshot, ticks the engine and hands the result back to
//! the TRIAC scheduler. The runner owns no clock; callers pass `now_us`
//! and pace with a [`Pacer`].

use needle_common::config::ConfigError;
use needle_common::drive::command::{Command, CommandAck};
use needle_common::drive::config::{DriveConfig, EngineTuning};
use needle_common::drive::error::DriveError;
use needle_common::drive::state::MotorState;
use needle_common::drive::status::StatusSnapshot;
use thiserror::Error;
use tracing::{debug, info, trace};

use crate::engine::{MotorControlEngine, Readings, TickOutput};
use crate::isr::IsrBus;
use crate::sensors::needle::NeedlePositionSensor;
use crate::sensors::rpm::RpmSensor;

// ─── Cycle Statistics ───────────────────────────────────────────────

/// O(1) per-cycle timing statistics.
#[derive(Debug, Clone)]
pub struct CycleStats {
    /// Total cycles executed.
    pub cycle_count: u64,
    /// Last cycle duration [ns].
    pub last_cycle_ns: i64,
    /// Minimum cycle duration [ns].
    pub min_cycle_ns: i64,
    /// Maximum cycle duration [ns].
    pub max_cycle_ns: i64,
    /// Running sum for average computation.
    pub sum_cycle_ns: i64,
    /// Number of overruns detected.
    pub overruns: u64,
    /// Maximum wake-up latency [ns].
    pub max_latency_ns: i64,
}

impl Default for CycleStats {
    fn default() -> Self {
        Self::new()
    }
}

impl CycleStats {
    pub const fn new() -> Self {
        Self {
            cycle_count: 0,
            last_cycle_ns: 0,
            min_cycle_ns: i64::MAX,
            max_cycle_ns: 0,
            sum_cycle_ns: 0,
            overruns: 0,
            max_latency_ns: 0,
        }
    }

    /// Record a cycle duration. O(1), no allocation.
    #[inline]
    pub fn record(&mut self, duration_ns: i64, latency_ns: i64) {
        self.cycle_count += 1;
        self.last_cycle_ns = duration_ns;
        if duration_ns < self.min_cycle_ns {
            self.min_cycle_ns = duration_ns;
        }
        if duration_ns > self.max_cycle_ns {
            self.max_cycle_ns = duration_ns;
        }
        self.sum_cycle_ns += duration_ns;
        if latency_ns > self.max_latency_ns {
            self.max_latency_ns = latency_ns;
        }
    }

    /// Average cycle time [ns] (returns 0 if no cycles).
    #[inline]
    pub fn avg_cycle_ns(&self) -> i64 {
        if self.cycle_count == 0 {
            0
        } else {
            self.sum_cycle_ns / self.cycle_count as i64
        }
    }
}

// ─── Errors ─────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum CycleError {
    #[error("RT setup error: {0}")]
    RtSetup(String),

    #[error("cycle overrun: {actual_ns}ns > {budget_ns}ns budget")]
    CycleOverrun {
        /// Actual cycle duration [ns].
        actual_ns: i64,
        /// Configured cycle budget [ns].
        budget_ns: i64,
    },
}

// ─── RT Setup ───────────────────────────────────────────────────────

/// Lock all current and future memory pages.
///
/// No-op when the `rt` feature is not enabled.
#[cfg(feature = "rt")]
fn rt_mlockall() -> Result<(), CycleError> {
    use nix::sys::mman::{MlockallFlags, mlockall};
    mlockall(MlockallFlags::MCL_CURRENT | MlockallFlags::MCL_FUTURE)
        .map_err(|e| CycleError::RtSetup(format!("mlockall failed: {e}")))
}

#[cfg(not(feature = "rt"))]
fn rt_mlockall() -> Result<(), CycleError> {
    Ok(())
}

/// Touch 256 KiB of stack so the control thread never page-faults on it.
fn prefault_stack() {
    let mut buf = [0u8; 256 * 1024];
    for byte in buf.iter_mut() {
        // SAFETY: `byte` is a valid, exclusive reference into `buf`.
        unsafe { core::ptr::write_volatile(byte, 0xFF) };
    }
    core::hint::black_box(&buf);
}

#[cfg(feature = "rt")]
fn rt_set_affinity(cpu: usize) -> Result<(), CycleError> {
    use nix::sched::{CpuSet, sched_setaffinity};
    use nix::unistd::Pid;

    let mut cpuset = CpuSet::new();
    cpuset
        .set(cpu)
        .map_err(|e| CycleError::RtSetup(format!("CpuSet::set({cpu}) failed: {e}")))?;
    sched_setaffinity(Pid::from_raw(0), &cpuset)
        .map_err(|e| CycleError::RtSetup(format!("sched_setaffinity failed: {e}")))
}

#[cfg(not(feature = "rt"))]
fn rt_set_affinity(_cpu: usize) -> Result<(), CycleError> {
    Ok(())
}

#[cfg(feature = "rt")]
fn rt_set_scheduler(priority: i32) -> Result<(), CycleError> {
    let param = libc::sched_param {
        sched_priority: priority,
    };
    // SAFETY: `param` outlives the call; pid 0 is the calling thread.
    let ret = unsafe { libc::sched_setscheduler(0, libc::SCHED_FIFO, &param) };
    if ret != 0 {
        let err = std::io::Error::last_os_error();
        return Err(CycleError::RtSetup(format!(
            "sched_setscheduler(SCHED_FIFO, {priority}) failed: {err}"
        )));
    }
    Ok(())
}

#[cfg(not(feature = "rt"))]
fn rt_set_scheduler(_priority: i32) -> Result<(), CycleError> {
    Ok(())
}

/// Full RT setup. Call once on the control thread before the loop.
/// Without the `rt` feature every step except the stack prefault is a no-op.
pub fn rt_setup(cpu_core: usize, rt_priority: i32) -> Result<(), CycleError> {
    rt_mlockall()?;
    prefault_stack();
    rt_set_affinity(cpu_core)?;
    rt_set_scheduler(rt_priority)?;
    info!(cpu_core, rt_priority, rt = cfg!(feature = "rt"), "RT setup complete");
    Ok(())
}

// ─── Pacer ──────────────────────────────────────────────────────────

/// Sleeps to absolute cycle boundaries.
///
/// With the `rt` feature this is `clock_nanosleep(TIMER_ABSTIME)` on
/// `CLOCK_MONOTONIC`; otherwise `std::thread::sleep` on an `Instant`
/// schedule. Either way the schedule does not drift.
pub struct Pacer {
    period_ns: i64,
    #[cfg(feature = "rt")]
    next_wake: nix::sys::time::TimeSpec,
    #[cfg(not(feature = "rt"))]
    next_wake: std::time::Instant,
}

impl Pacer {
    #[cfg(feature = "rt")]
    pub fn new(period_us: u32) -> Result<Self, CycleError> {
        use nix::time::{ClockId, clock_gettime};
        let now = clock_gettime(ClockId::CLOCK_MONOTONIC)
            .map_err(|e| CycleError::RtSetup(format!("clock_gettime: {e}")))?;
        Ok(Self {
            period_ns: period_us as i64 * 1_000,
            next_wake: now,
        })
    }

    #[cfg(not(feature = "rt"))]
    pub fn new(period_us: u32) -> Result<Self, CycleError> {
        Ok(Self {
            period_ns: period_us as i64 * 1_000,
            next_wake: std::time::Instant::now(),
        })
    }

    #[inline]
    pub fn period_ns(&self) -> i64 {
        self.period_ns
    }

    /// Sleep until the next boundary. Returns the wake-up latency [ns].
    #[cfg(feature = "rt")]
    pub fn wait(&mut self) -> Result<i64, CycleError> {
        use nix::time::{ClockId, ClockNanosleepFlags, clock_gettime, clock_nanosleep};
        let clock = ClockId::CLOCK_MONOTONIC;
        self.next_wake = timespec_add_ns(self.next_wake, self.period_ns);
        let _ = clock_nanosleep(clock, ClockNanosleepFlags::TIMER_ABSTIME, &self.next_wake);
        let woke = clock_gettime(clock)
            .map_err(|e| CycleError::RtSetup(format!("clock_gettime: {e}")))?;
        Ok(timespec_diff_ns(&woke, &self.next_wake).abs())
    }

    #[cfg(not(feature = "rt"))]
    pub fn wait(&mut self) -> Result<i64, CycleError> {
        use std::time::{Duration, Instant};
        self.next_wake += Duration::from_nanos(self.period_ns as u64);
        let now = Instant::now();
        if let Some(remaining) = self.next_wake.checked_duration_since(now) {
            std::thread::sleep(remaining);
        }
        Ok(Instant::now()
            .saturating_duration_since(self.next_wake)
            .as_nanos() as i64)
    }
}

// ─── Cycle Runner ───────────────────────────────────────────────────

/// Owns the engine and the control-loop halves of the sensors.
pub struct CycleRunner {
    engine: MotorControlEngine,
    rpm: RpmSensor,
    needle: NeedlePositionSensor,
    stats: CycleStats,
    status_interval_us: u64,
    next_status_us: u64,
}

impl CycleRunner {
    pub fn new(
        config: DriveConfig,
        tuning: EngineTuning,
        status_interval_ms: u32,
    ) -> Result<Self, ConfigError> {
        let rpm = RpmSensor::new(&tuning.rpm);
        let needle = NeedlePositionSensor::new(&tuning.needle);
        let engine = MotorControlEngine::new(config, tuning)?;
        Ok(Self {
            engine,
            rpm,
            needle,
            stats: CycleStats::new(),
            status_interval_us: status_interval_ms.max(1) as u64 * 1_000,
            next_status_us: 0,
        })
    }

    /// One control period.
    pub fn tick(&mut self, bus: &IsrBus, now_us: u64) -> TickOutput {
        let readings = Readings {
            now_us,
            mains: bus.zero_cross.status(now_us),
            rpm: self.rpm.sample(&bus.rpm, now_us),
            needle: self.needle.sample(&bus.needle, now_us),
            pedal_adc: bus.pedal.load(),
            consecutive_stale: bus.triac.consecutive_stale(),
        };

        let out = self.engine.tick(&readings);

        if out.cancel_pending {
            bus.triac.cancel();
        }
        if let Some(cmd) = out.firing {
            if let Err(stale) = bus.triac.submit(cmd) {
                // Counted by the scheduler; the fault monitor acts on the count.
                trace!(
                    cycle_id = stale.command.cycle_id,
                    current = stale.current_cycle,
                    "Stale firing command dropped"
                );
            }
        }
        out
    }

    /// Apply a command and bring the scheduler in line with the result.
    pub fn handle_command(
        &mut self,
        bus: &IsrBus,
        command: Command,
        now_us: u64,
    ) -> Result<CommandAck, DriveError> {
        let before = self.engine.state();
        let result = self.engine.handle_command(command, now_us);
        let after = self.engine.state();
        if !after.may_energize() || (after == MotorState::Stopping && before != after) {
            bus.triac.cancel();
            bus.triac.reset_stale();
        }
        if matches!(command, Command::Reboot) {
            self.rpm.reset();
        }
        result
    }

    /// Record the duration of the last tick. Returns an error on overrun
    /// when `strict` is set.
    pub fn record_timing(
        &mut self,
        duration_ns: i64,
        latency_ns: i64,
        budget_ns: i64,
        strict: bool,
    ) -> Result<(), CycleError> {
        self.stats.record(duration_ns, latency_ns);
        if duration_ns > budget_ns {
            self.stats.overruns += 1;
            if strict {
                return Err(CycleError::CycleOverrun {
                    actual_ns: duration_ns,
                    budget_ns,
                });
            }
            debug!(duration_ns, budget_ns, "Cycle overrun");
        }
        Ok(())
    }

    /// Status snapshot when the publishing interval has elapsed.
    pub fn poll_status(&mut self, now_us: u64) -> Option<StatusSnapshot> {
        if now_us < self.next_status_us {
            return None;
        }
        self.next_status_us = now_us + self.status_interval_us;
        let status = self.engine.status();
        debug!(
            state = ?status.state,
            rpm = status.current_rpm,
            target = status.target_rpm,
            power = status.motor_power_percent,
            faults = status.fault_bits,
            "Status"
        );
        Some(status)
    }

    #[inline]
    pub fn status(&self) -> StatusSnapshot {
        self.engine.status()
    }

    #[inline]
    pub fn stats(&self) -> &CycleStats {
        &self.stats
    }

    #[inline]
    pub fn engine(&self) -> &MotorControlEngine {
        &self.engine
    }
}

// ─── Time Helpers ───────────────────────────────────────────────────

#[cfg(feature = "rt")]
fn timespec_add_ns(ts: nix::sys::time::TimeSpec, ns: i64) -> nix::sys::time::TimeSpec {
    use nix::sys::time::TimeSpec;
    let mut secs = ts.tv_sec();
    let mut nanos = ts.tv_nsec() + ns;
    while nanos >= 1_000_000_000 {
        secs += 1;
        nanos -= 1_000_000_000;
    }
    while nanos < 0 {
        secs -= 1;
        nanos += 1_000_000_000;
    }
    TimeSpec::new(secs, nanos)
}

/// (a - b) in nanoseconds.
#[cfg(feature = "rt")]
fn timespec_diff_ns(a: &nix::sys::time::TimeSpec, b: &nix::sys::time::TimeSpec) -> i64 {
    (a.tv_sec() - b.tv_sec()) * 1_000_000_000 + (a.tv_nsec() - b.tv_nsec())
}

// ─── Tests ──────────────────────────────────────────────────────────
