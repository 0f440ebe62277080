use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{MaestroError, Result};

pub const DEFAULT_BUS_CAPACITY: usize = 120;
pub const DEFAULT_OVERFLOW_WARNING_INTERVAL_MS: f64 = 5_000.0;
pub const DEFAULT_FRAME_BUDGET_MS: f64 = 2.0;
pub const DEFAULT_MAX_COMMANDS_PER_FRAME: usize = 10;
pub const DEFAULT_STATS_LOG_INTERVAL_MS: f64 = 10_000.0;
pub const DEFAULT_REFRESH_HZ: f64 = 60.0;
pub const DEFAULT_MAX_HISTORY_SIZE: usize = 300;
pub const DEFAULT_SNAPSHOT_INTERVAL_MS: f64 = 100.0;
pub const DEFAULT_PULSE_DECAY_MS: f64 = 250.0;

/// Top-level configuration structure for the orchestration core.
///
/// Every section falls back to its defaults, so a JSON file only needs to
/// name the values it overrides.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MaestroConfig {
    pub bus: BusConfig,
    pub scheduler: SchedulerConfig,
    pub state: StateConfig,
    pub scene: SceneConfig,
}

impl MaestroConfig {
    pub fn live_defaults() -> Self {
        Self::default()
    }

    /// Parses and validates a configuration from JSON text.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        self.bus.validate()?;
        self.scheduler.validate()?;
        self.state.validate()?;
        self.scene.validate()
    }
}

/// Configuration for the command bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BusConfig {
    pub capacity: usize,
    /// Minimum spacing between two overflow warnings.
    pub overflow_warning_interval_ms: f64,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_BUS_CAPACITY,
            overflow_warning_interval_ms: DEFAULT_OVERFLOW_WARNING_INTERVAL_MS,
        }
    }
}

impl BusConfig {
    fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(MaestroError::invalid_config("bus capacity must be at least 1"));
        }
        non_negative("bus.overflowWarningIntervalMs", self.overflow_warning_interval_ms)
    }
}

/// Configuration for the frame-budgeted scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SchedulerConfig {
    /// Time the dequeue phase of a tick may spend before yielding.
    pub frame_budget_ms: f64,
    /// Hard cap on commands dispatched per tick, independent of the budget.
    pub max_commands_per_frame: usize,
    pub stats_log_interval_ms: f64,
    /// Rate at which the host refresh loop fires ticks.
    pub refresh_hz: f64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            frame_budget_ms: DEFAULT_FRAME_BUDGET_MS,
            max_commands_per_frame: DEFAULT_MAX_COMMANDS_PER_FRAME,
            stats_log_interval_ms: DEFAULT_STATS_LOG_INTERVAL_MS,
            refresh_hz: DEFAULT_REFRESH_HZ,
        }
    }
}

impl SchedulerConfig {
    fn validate(&self) -> Result<()> {
        if self.max_commands_per_frame == 0 {
            return Err(MaestroError::invalid_config(
                "scheduler maxCommandsPerFrame must be at least 1",
            ));
        }
        if !(self.frame_budget_ms.is_finite() && self.frame_budget_ms > 0.0) {
            return Err(MaestroError::invalid_config(
                "scheduler frameBudgetMs must be a positive number",
            ));
        }
        if !(self.refresh_hz.is_finite() && self.refresh_hz > 0.0) {
            return Err(MaestroError::invalid_config(
                "scheduler refreshHz must be a positive number",
            ));
        }
        non_negative("scheduler.statsLogIntervalMs", self.stats_log_interval_ms)
    }
}

/// Configuration for the state history recorder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StateConfig {
    pub max_history_size: usize,
    /// How often the orchestrator pushes a snapshot into the store.
    pub snapshot_interval_ms: f64,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            max_history_size: DEFAULT_MAX_HISTORY_SIZE,
            snapshot_interval_ms: DEFAULT_SNAPSHOT_INTERVAL_MS,
        }
    }
}

impl StateConfig {
    fn validate(&self) -> Result<()> {
        if self.max_history_size == 0 {
            return Err(MaestroError::invalid_config(
                "state maxHistorySize must be at least 1",
            ));
        }
        non_negative("state.snapshotIntervalMs", self.snapshot_interval_ms)
    }
}

/// Configuration for the scene consumer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SceneConfig {
    pub pulse_decay_ms: f64,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            pulse_decay_ms: DEFAULT_PULSE_DECAY_MS,
        }
    }
}

impl SceneConfig {
    fn validate(&self) -> Result<()> {
        non_negative("scene.pulseDecayMs", self.pulse_decay_ms)
    }
}

fn non_negative(field: &str, value: f64) -> Result<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(MaestroError::invalid_config(format!(
            "{field} must be a non-negative number"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_constants() {
        let config = MaestroConfig::default();
        assert_eq!(config.bus.capacity, 120);
        assert_eq!(config.bus.overflow_warning_interval_ms, 5_000.0);
        assert_eq!(config.scheduler.frame_budget_ms, 2.0);
        assert_eq!(config.scheduler.max_commands_per_frame, 10);
        assert_eq!(config.scheduler.stats_log_interval_ms, 10_000.0);
        assert_eq!(config.state.max_history_size, 300);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_json_keeps_remaining_defaults() {
        let config =
            MaestroConfig::from_json_str(r#"{ "bus": { "capacity": 16 } }"#).unwrap();
        assert_eq!(config.bus.capacity, 16);
        assert_eq!(
            config.bus.overflow_warning_interval_ms,
            DEFAULT_OVERFLOW_WARNING_INTERVAL_MS
        );
        assert_eq!(config.scheduler, SchedulerConfig::default());
    }

    #[test]
    fn rejects_zero_capacity() {
        let err = MaestroConfig::from_json_str(r#"{ "bus": { "capacity": 0 } }"#).unwrap_err();
        assert!(matches!(err, MaestroError::InvalidConfig(_)));
        assert!(format!("{err}").contains("capacity"));
    }

    #[test]
    fn rejects_non_positive_budget() {
        let mut config = MaestroConfig::default();
        config.scheduler.frame_budget_ms = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn malformed_json_is_reported() {
        let err = MaestroConfig::from_json_str("{ bus: ").unwrap_err();
        assert!(matches!(err, MaestroError::Json(_)));
    }

    #[test]
    fn serialized_config_round_trips() {
        let config = MaestroConfig::live_defaults();
        let json = config.to_json_pretty().unwrap();
        assert!(json.contains("maxCommandsPerFrame"));
        assert_eq!(MaestroConfig::from_json_str(&json).unwrap(), config);
    }
}
