//! # Needle HAL Binary
//!
//! Runs the motor control engine against a driver, by default the physics
//! simulation of the sewing head, optionally replaying a timed scenario.
//!
//! # Usage
//!
//! ```bash
//! # Ten idle seconds with the default configuration
//! needle_hal
//!
//! # Replay a scenario with status lines as JSON on stdout
//! needle_hal --config config/drive.toml --scenario config/sew_and_park.toml --status-json
//!
//! # Pace to the wall clock on an isolated core (build with --features rt)
//! needle_hal --realtime --cpu-core 2 --rt-priority 80 -v
//! ```

use std::path::PathBuf;
use std::sync::atomic::Ordering;

use clap::Parser;
use needle_control_unit::cycle::rt_setup;
use needle_hal::config::HalFileConfig;
use needle_hal::core::{HalCore, RunOptions};
use needle_hal::drivers::create_driver;
use needle_hal::scenario::Scenario;
use tracing::{error, info, warn, Level};
use tracing_subscriber::EnvFilter;

/// Needle HAL - motor control engine on a pluggable drive back end
#[derive(Parser, Debug)]
#[command(name = "needle_hal")]
#[command(author = "RTS007")]
#[command(version)]
#[command(about = "Phase-cut needle drive on a simulated or real sewing head")]
#[command(long_about = None)]
struct Args {
    /// Drive configuration file ([service], [drive], [engine], [simulation])
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Scenario file with timed pedal, command and mains events
    #[arg(long, value_name = "FILE")]
    scenario: Option<PathBuf>,

    /// Driver back end
    #[arg(short, long, default_value = "simulation")]
    driver: String,

    /// Run length in milliseconds (overrides the scenario's duration_ms)
    #[arg(long)]
    duration_ms: Option<u64>,

    /// Pace control ticks to the wall clock
    #[arg(long)]
    realtime: bool,

    /// CPU core for the loop thread (realtime only)
    #[arg(long, default_value_t = 1)]
    cpu_core: usize,

    /// SCHED_FIFO priority (realtime only)
    #[arg(long, default_value_t = 80)]
    rt_priority: i32,

    /// Status publishing interval
    #[arg(long, default_value_t = needle_common::consts::STATUS_INTERVAL_MS)]
    status_interval_ms: u32,

    /// Print status snapshots as JSON lines on stdout
    #[arg(long)]
    status_json: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long)]
    json: bool,
}

fn main() {
    let args = Args::parse();
    setup_tracing(&args);

    if let Err(e) = run(&args) {
        error!("FATAL: {e}");
        std::process::exit(1);
    }
}

fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    info!("Needle HAL v{} starting...", env!("CARGO_PKG_VERSION"));

    let config = match &args.config {
        Some(path) => {
            info!("Loading configuration from {}", path.display());
            HalFileConfig::load_validated(path)?
        }
        None => {
            warn!("No --config given, using built-in defaults");
            HalFileConfig::default()
        }
    };
    info!(
        "Service '{}': max_rpm_setting={}, pid_enabled={}, stop at {:?}",
        config.service.service_name,
        config.drive.max_rpm_setting,
        config.drive.pid_enabled,
        config.drive.stop_position_default
    );

    let mut scenario = match &args.scenario {
        Some(path) => {
            info!("Loading scenario from {}", path.display());
            Scenario::load(path)?
        }
        None => Scenario::default(),
    };
    if let Some(duration_ms) = args.duration_ms {
        scenario.duration_ms = duration_ms;
    }

    if args.realtime {
        rt_setup(args.cpu_core, args.rt_priority)?;
    }

    let driver = create_driver(&args.driver, &config)?;
    let options = RunOptions {
        realtime: args.realtime,
        strict_timing: false,
        status_interval_ms: args.status_interval_ms,
    };
    let mut hal_core = HalCore::new(config, driver, options)?;
    if args.status_json {
        hal_core.set_status_sink(Box::new(std::io::stdout()));
    }

    let running = hal_core.running_flag();
    ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        running.store(false, Ordering::SeqCst);
    })?;

    hal_core.init()?;
    let result = hal_core.run(&scenario);
    hal_core.shutdown()?;
    let summary = result?;

    info!(
        "Needle HAL shutdown complete: {} ms simulated, state={:?}, faults={:?}",
        summary.sim_time_ms, summary.status.state, summary.faults_seen
    );
    Ok(())
}

/// Setup tracing subscriber based on CLI arguments.
fn setup_tracing(args: &Args) {
    let level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .compact()
            .init();
    }
}
