//! Timed simulation scenarios.
//!
//! A scenario is a TOML list of actions stamped in milliseconds from the
//! start of the run:
//!
//! ```toml
//! name = "sew and park"
//! duration_ms = 8000
//!
//! [[event]]
//! at_ms = 100
//! action = "pedal"
//! adc = 65535
//!
//! [[event]]
//! at_ms = 3000
//! action = "command"
//! command = "set_parameter"
//! name = "stop_position_default"
//! value = "up"
//!
//! [[event]]
//! at_ms = 5000
//! action = "mains_dropout"
//! duration_ms = 80
//! ```

use std::path::Path;

use needle_common::drive::command::Command;
use serde::Deserialize;
use thiserror::Error;

/// Run length when neither the scenario nor the CLI sets one [ms].
pub const DEFAULT_DURATION_MS: u64 = 10_000;

#[derive(Debug, Clone, Error)]
pub enum ScenarioError {
    #[error("Cannot read scenario {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("Failed to parse scenario: {0}")]
    Parse(String),

    #[error("Invalid scenario: {0}")]
    Invalid(String),
}

/// One stimulus applied to the simulated machine.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ScenarioAction {
    /// Set the pedal potentiometer to a raw ADC value.
    Pedal { adc: u16 },
    /// Deliver a command to the engine.
    Command(Command),
    /// Cut mains for `duration_ms`.
    MainsDropout { duration_ms: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct ScenarioEvent {
    pub at_ms: u64,
    #[serde(flatten)]
    pub action: ScenarioAction,
}

impl ScenarioEvent {
    pub const fn new(at_ms: u64, action: ScenarioAction) -> Self {
        Self { at_ms, action }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_duration_ms")]
    pub duration_ms: u64,
    #[serde(default, rename = "event")]
    pub events: Vec<ScenarioEvent>,
}

fn default_duration_ms() -> u64 {
    DEFAULT_DURATION_MS
}

impl Default for Scenario {
    fn default() -> Self {
        Self::idle(DEFAULT_DURATION_MS)
    }
}

impl Scenario {
    /// No stimuli; the machine sits with the pedal released.
    pub fn idle(duration_ms: u64) -> Self {
        Self {
            name: "idle".to_string(),
            duration_ms,
            events: Vec::new(),
        }
    }

    /// Build from events in any order.
    pub fn new(
        name: impl Into<String>,
        duration_ms: u64,
        events: Vec<ScenarioEvent>,
    ) -> Result<Self, ScenarioError> {
        let mut scenario = Self {
            name: name.into(),
            duration_ms,
            events,
        };
        scenario.normalize()?;
        Ok(scenario)
    }

    pub fn load(path: &Path) -> Result<Self, ScenarioError> {
        let content = std::fs::read_to_string(path).map_err(|e| ScenarioError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ScenarioError> {
        let mut scenario: Self =
            toml::from_str(content).map_err(|e| ScenarioError::Parse(e.to_string()))?;
        scenario.normalize()?;
        Ok(scenario)
    }

    /// Sort events by time (stable) and check they fall inside the run.
    fn normalize(&mut self) -> Result<(), ScenarioError> {
        if self.duration_ms == 0 {
            return Err(ScenarioError::Invalid("duration_ms must be > 0".to_string()));
        }
        self.events.sort_by_key(|e| e.at_ms);
        if let Some(last) = self.events.last() {
            if last.at_ms > self.duration_ms {
                return Err(ScenarioError::Invalid(format!(
                    "event at {} ms is past the end of the run ({} ms)",
                    last.at_ms, self.duration_ms
                )));
            }
        }
        if let Some(e) = self.events.iter().find(|e| {
            matches!(e.action, ScenarioAction::MainsDropout { duration_ms: 0 })
        }) {
            return Err(ScenarioError::Invalid(format!(
                "mains dropout at {} ms has zero length",
                e.at_ms
            )));
        }
        Ok(())
    }
}
