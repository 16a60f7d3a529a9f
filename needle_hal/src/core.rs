//! HAL Core struct and simulation loop management.
//!
//! The `HalCore` owns the interrupt bus, the control-unit cycle runner and
//! the active driver. Time advances in fixed interrupt steps; every control
//! period the runner ticks against the bus exactly as it does on the board.

use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use needle_common::consts::STATUS_INTERVAL_MS;
use needle_common::drive::error::FaultFlags;
use needle_common::drive::state::{MotorState, NeedleState};
use needle_common::drive::status::StatusSnapshot;
use needle_control_unit::cycle::{CycleRunner, CycleStats, Pacer};
use needle_control_unit::isr::IsrBus;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::HalFileConfig;
use crate::driver::{HalDriver, HalError};
use crate::scenario::{Scenario, ScenarioAction};

/// Interrupt/physics step [µs].
pub const SIM_STEP_US: u64 = 50;

/// Loop options from the command line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunOptions {
    /// Pace control ticks to the wall clock.
    pub realtime: bool,
    /// Fail the run on a control tick overrun (realtime only).
    pub strict_timing: bool,
    pub status_interval_ms: u32,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            realtime: false,
            strict_timing: false,
            status_interval_ms: STATUS_INTERVAL_MS,
        }
    }
}

/// Outcome of one `run()`.
#[derive(Debug, Clone, Copy)]
pub struct RunSummary {
    /// Simulated time covered by this run [ms].
    pub sim_time_ms: u64,
    pub control_ticks: u64,
    /// Highest true shaft speed seen [rpm].
    pub peak_rpm: f64,
    /// True shaft speed at the end [rpm].
    pub final_rpm: f64,
    /// True needle cam levels at the end.
    pub needle: NeedleState,
    /// Every fault cause latched during the run.
    pub faults_seen: FaultFlags,
    pub status: StatusSnapshot,
}

#[derive(Serialize)]
struct StatusLine<'a> {
    t_ms: u64,
    #[serde(flatten)]
    status: &'a StatusSnapshot,
}

/// HAL Core manages the driver and the control loop.
pub struct HalCore {
    bus: IsrBus,
    runner: CycleRunner,
    driver: Box<dyn HalDriver>,
    options: RunOptions,
    control_period_us: u64,
    /// Running flag for loop control
    running: Arc<AtomicBool>,
    initialized: bool,
    now_us: u64,
    status_sink: Option<Box<dyn Write + Send>>,
}

impl HalCore {
    /// Create a new HalCore instance with the given configuration.
    ///
    /// # Errors
    /// Returns `HalError::ConfigError` if the configuration is invalid or
    /// the control period is not a whole number of interrupt steps.
    pub fn new(
        config: HalFileConfig,
        driver: Box<dyn HalDriver>,
        options: RunOptions,
    ) -> Result<Self, HalError> {
        config
            .validate()
            .map_err(|e| HalError::ConfigError(e.to_string()))?;

        let control_period_us = config.engine.control_period_us as u64;
        if control_period_us % SIM_STEP_US != 0 {
            return Err(HalError::ConfigError(format!(
                "control_period_us {control_period_us} is not a multiple of the {SIM_STEP_US} µs step"
            )));
        }

        let runner = CycleRunner::new(config.drive, config.engine, options.status_interval_ms)
            .map_err(|e| HalError::ConfigError(e.to_string()))?;

        info!(
            "HalCore created: driver={}, control period {} µs, step {} µs",
            driver.name(),
            control_period_us,
            SIM_STEP_US
        );

        Ok(Self {
            bus: IsrBus::new(&config.engine, 0),
            runner,
            driver,
            options,
            control_period_us,
            running: Arc::new(AtomicBool::new(true)),
            initialized: false,
            now_us: 0,
            status_sink: None,
        })
    }

    /// Initialize the driver.
    pub fn init(&mut self) -> Result<(), HalError> {
        info!(
            "Initializing driver {} v{}",
            self.driver.name(),
            self.driver.version()
        );
        self.driver.init(self.runner.engine().tuning())?;
        self.initialized = true;
        Ok(())
    }

    /// Shared flag; storing `false` ends the current run after the tick.
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// Write each published status as one JSON line to `sink`.
    pub fn set_status_sink(&mut self, sink: Box<dyn Write + Send>) {
        self.status_sink = Some(sink);
    }

    /// Run `scenario` from the current simulated time.
    ///
    /// Event times are relative to the start of this call, so consecutive
    /// runs continue the same machine.
    pub fn run(&mut self, scenario: &Scenario) -> Result<RunSummary, HalError> {
        if !self.initialized {
            return Err(HalError::NotInitialized(self.driver.name()));
        }

        let start_us = self.now_us;
        let end_us = start_us + scenario.duration_ms * 1_000;
        info!(
            "Running scenario '{}' for {} ms ({} events)",
            scenario.name,
            scenario.duration_ms,
            scenario.events.len()
        );

        let mut pacer = if self.options.realtime {
            Some(Pacer::new(self.control_period_us as u32)?)
        } else {
            None
        };
        let budget_ns = self.control_period_us as i64 * 1_000;

        let mut events = scenario.events.iter().peekable();
        let mut control_ticks = 0_u64;
        let mut peak_rpm = 0.0_f64;
        let mut faults_seen = FaultFlags::empty();
        let mut last_state = self.runner.engine().state();

        while self.now_us < end_us && self.running.load(Ordering::SeqCst) {
            self.now_us += SIM_STEP_US;
            let now = self.now_us;

            while let Some(event) = events.next_if(|e| start_us + e.at_ms * 1_000 <= now) {
                self.apply(event.action, now)?;
            }

            self.driver.step(&self.bus, now);
            peak_rpm = peak_rpm.max(self.driver.diagnostics().rpm);

            if now % self.control_period_us != 0 {
                continue;
            }

            let latency_ns = match pacer.as_mut() {
                Some(p) => p.wait()?,
                None => 0,
            };
            let started = Instant::now();
            self.runner.tick(&self.bus, now);
            let duration_ns = started.elapsed().as_nanos() as i64;
            control_ticks += 1;

            let strict = self.options.realtime && self.options.strict_timing;
            self.runner
                .record_timing(duration_ns, latency_ns, budget_ns, strict)?;

            let state = self.runner.engine().state();
            if state != last_state {
                debug!(t_ms = now / 1_000, from = ?last_state, to = ?state, "Drive state");
                last_state = state;
            }
            faults_seen |= self.runner.engine().faults();

            if let Some(status) = self.runner.poll_status(now) {
                self.publish(&status, now)?;
            }
        }

        let diag = self.driver.diagnostics();
        let summary = RunSummary {
            sim_time_ms: (self.now_us - start_us) / 1_000,
            control_ticks,
            peak_rpm,
            final_rpm: diag.rpm,
            needle: diag.needle,
            faults_seen,
            status: self.runner.status(),
        };
        info!(
            "Scenario '{}' finished at {} ms: state={:?}, rpm={:.0}, peak={:.0}",
            scenario.name,
            self.now_us / 1_000,
            summary.status.state,
            summary.final_rpm,
            summary.peak_rpm
        );
        Ok(summary)
    }

    fn apply(&mut self, action: ScenarioAction, now_us: u64) -> Result<(), HalError> {
        match action {
            ScenarioAction::Pedal { adc } => {
                debug!(t_ms = now_us / 1_000, adc, "Pedal");
                self.driver.set_pedal(adc);
            }
            ScenarioAction::Command(command) => {
                if let Err(e) = self.runner.handle_command(&self.bus, command, now_us) {
                    warn!(t_ms = now_us / 1_000, "Scenario command {} failed: {e}", command.name());
                }
            }
            ScenarioAction::MainsDropout { duration_ms } => {
                self.driver
                    .inject_mains_dropout(now_us, duration_ms as u64 * 1_000)?;
            }
        }
        Ok(())
    }

    fn publish(&mut self, status: &StatusSnapshot, now_us: u64) -> Result<(), HalError> {
        let Some(sink) = self.status_sink.as_mut() else {
            return Ok(());
        };
        let line = StatusLine {
            t_ms: now_us / 1_000,
            status,
        };
        serde_json::to_writer(&mut *sink, &line).map_err(|e| HalError::Output(e.to_string()))?;
        writeln!(sink).map_err(|e| HalError::Output(e.to_string()))?;
        Ok(())
    }

    /// Stop the driver, leaving the gate low.
    pub fn shutdown(&mut self) -> Result<(), HalError> {
        self.bus.triac.cancel();
        if let Some(sink) = self.status_sink.as_mut() {
            sink.flush().map_err(|e| HalError::Output(e.to_string()))?;
        }
        let stats = self.runner.stats();
        info!(
            "HAL shutdown: {} control ticks, avg {} ns, max {} ns, {} overruns",
            stats.cycle_count,
            stats.avg_cycle_ns(),
            stats.max_cycle_ns,
            stats.overruns
        );
        self.driver.shutdown()?;
        self.initialized = false;
        Ok(())
    }

    #[inline]
    pub fn now_us(&self) -> u64 {
        self.now_us
    }

    #[inline]
    pub fn state(&self) -> MotorState {
        self.runner.engine().state()
    }

    #[inline]
    pub fn status(&self) -> StatusSnapshot {
        self.runner.status()
    }

    #[inline]
    pub fn stats(&self) -> &CycleStats {
        self.runner.stats()
    }

    #[inline]
    pub fn driver(&self) -> &dyn HalDriver {
        self.driver.as_ref()
    }
}
