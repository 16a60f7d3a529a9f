//! # Needle HAL Library
//!
//! Hardware abstraction for the needle drive with a pluggable driver
//! architecture, plus the physics simulation used for development.
//!
//! # Module Structure
//!
//! - [`core`] - HalCore struct, simulation loop management
//! - [`driver`] - `HalDriver` trait and `HalError`
//! - [`drivers`] - Driver implementations and registry
//! - [`scenario`] - Timed stimulus files
//! - [`config`] - HAL configuration file
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                     needle_hal (single crate)                    │
//! │  ┌─────────────┐    ┌──────────────┐    ┌─────────────────────┐  │
//! │  │  Scenario   │───►│  HalCore     │◄──►│  CycleRunner        │  │
//! │  │  (TOML)     │    │  (loop)      │    │  (control unit)     │  │
//! │  └─────────────┘    └──────┬───────┘    └──────────┬──────────┘  │
//! │                            │                       │             │
//! │                            ▼                       ▼             │
//! │                   ┌────────────────┐      ┌────────────────┐     │
//! │                   │  HalDriver     │─────►│  IsrBus        │     │
//! │                   │  trait         │      │  (interrupts)  │     │
//! │                   └────────────────┘      └────────────────┘     │
//! └──────────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod core;
pub mod driver;
pub mod drivers;
pub mod scenario;

// Re-export key types for convenience
pub use crate::config::{HalFileConfig, SimulationConfig};
pub use crate::core::{HalCore, RunOptions, RunSummary};
pub use crate::driver::{HalDriver, HalError};
pub use crate::scenario::{Scenario, ScenarioError};
