//! Pipeline configuration
//!
//! Loaded from JSON or YAML (picked by file extension):
//!
//! ```yaml
//! grid: { reels: 5, rows: 3, fill_symbol: "A" }
//! timing: normal
//! default_timing: { reel_stagger_ms: 150, cell_step_ms: 100, effect_ms: 600 }
//! reel_stop_order: [0, 1, 2, 3, 4]
//! phase_execution:
//!   reels_stopped_callback: concurrent
//! modules:
//!   symbol_replace: { order: 10, params: { play_effect: true } }
//!   meters: { enabled: false }
//! ```

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use rf_board::GridSpec;
use rf_phase::{Phase, PhaseExecution};
use rf_task::SchedulerConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::timing::{DelayPolicy, ModuleTiming, TimingProfile};

/// Configuration error
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON config error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML config error: {0}")]
    Yaml(#[from] serde_yml::Error),

    #[error("Unsupported config format: {0}")]
    UnsupportedFormat(String),

    #[error("Missing required parameter: {0}")]
    MissingParam(String),

    #[error("Invalid parameter value: {0}")]
    InvalidValue(String),
}

/// Configuration of one module
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModuleConfig {
    /// Disabled modules are not registered
    pub enabled: bool,

    /// Dispatch order within a phase (lower first, ties by registration)
    pub order: i32,

    /// Module-specific parameters
    pub params: HashMap<String, serde_json::Value>,

    /// Timing override; the pipeline default applies when absent
    pub timing: Option<ModuleTiming>,
}

impl Default for ModuleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            order: 0,
            params: HashMap::new(),
            timing: None,
        }
    }
}

impl ModuleConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: set dispatch order
    pub fn with_order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }

    /// Builder: set timing override
    pub fn with_timing(mut self, timing: ModuleTiming) -> Self {
        self.timing = Some(timing);
        self
    }

    /// Builder: set a parameter
    pub fn with_param<T: Serialize>(mut self, key: impl Into<String>, value: T) -> Self {
        self.set(key, value);
        self
    }

    /// Get a parameter value
    pub fn get<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.params
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Get a parameter with default
    pub fn get_or<T: serde::de::DeserializeOwned>(&self, key: &str, default: T) -> T {
        self.get(key).unwrap_or(default)
    }

    /// Get a parameter that must be present and well-typed
    pub fn require<T: serde::de::DeserializeOwned>(&self, key: &str) -> Result<T, ConfigError> {
        let value = self
            .params
            .get(key)
            .ok_or_else(|| ConfigError::MissingParam(key.to_string()))?;
        serde_json::from_value(value.clone())
            .map_err(|e| ConfigError::InvalidValue(format!("{key}: {e}")))
    }

    /// Set a parameter
    pub fn set<T: Serialize>(&mut self, key: impl Into<String>, value: T) {
        if let Ok(v) = serde_json::to_value(value) {
            self.params.insert(key.into(), v);
        }
    }

    /// Check if a parameter exists
    pub fn has(&self, key: &str) -> bool {
        self.params.contains_key(key)
    }
}

/// Whole-pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub grid: GridSpec,

    /// Global pacing profile
    pub timing: TimingProfile,

    /// Timing for modules without their own override
    pub default_timing: ModuleTiming,

    /// Order in which the outer driver stops reels; empty = left to right
    pub reel_stop_order: Vec<usize>,

    /// Per-phase execution overrides (sequential/concurrent only)
    pub phase_execution: BTreeMap<Phase, PhaseExecution>,

    /// Per-module configuration keyed by module id
    pub modules: BTreeMap<String, ModuleConfig>,

    pub scheduler: SchedulerConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            grid: GridSpec::default(),
            timing: TimingProfile::Normal,
            default_timing: ModuleTiming::default(),
            reel_stop_order: Vec::new(),
            phase_execution: BTreeMap::new(),
            modules: BTreeMap::new(),
            scheduler: SchedulerConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Builder: set timing profile
    pub fn with_timing(mut self, profile: TimingProfile) -> Self {
        self.timing = profile;
        self
    }

    /// Builder: set grid
    pub fn with_grid(mut self, grid: GridSpec) -> Self {
        self.grid = grid;
        self
    }

    /// Builder: configure a module
    pub fn with_module(mut self, id: impl Into<String>, config: ModuleConfig) -> Self {
        self.modules.insert(id.into(), config);
        self
    }

    /// Builder: override a phase's execution
    pub fn with_phase_execution(mut self, phase: Phase, execution: PhaseExecution) -> Self {
        self.phase_execution.insert(phase, execution);
        self
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // LOADING
    // ═══════════════════════════════════════════════════════════════════════════

    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a `.json`, `.yaml` or `.yml` file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();

        log::debug!("Loading pipeline config from {}", path.display());
        match extension.as_str() {
            "json" => Self::from_json_str(&raw),
            "yaml" | "yml" => Self::from_yaml_str(&raw),
            other => Err(ConfigError::UnsupportedFormat(other.to_string())),
        }
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Reject shapes the pipeline cannot run
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.grid
            .validate()
            .map_err(|e| ConfigError::InvalidValue(e.to_string()))?;

        for (phase, execution) in &self.phase_execution {
            phase
                .check_execution(*execution)
                .map_err(|e| ConfigError::InvalidValue(e.to_string()))?;
        }

        if !self.reel_stop_order.is_empty() {
            let mut seen = self.reel_stop_order.clone();
            seen.sort_unstable();
            seen.dedup();
            let complete = seen.len() == self.grid.reels
                && seen.iter().enumerate().all(|(i, reel)| i == *reel);
            if !complete || self.reel_stop_order.len() != self.grid.reels {
                return Err(ConfigError::InvalidValue(format!(
                    "reel_stop_order {:?} is not a permutation of 0..{}",
                    self.reel_stop_order, self.grid.reels
                )));
            }
        }

        if self.scheduler.max_polls == 0 {
            return Err(ConfigError::InvalidValue("scheduler.max_polls is 0".into()));
        }
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // QUERIES
    // ═══════════════════════════════════════════════════════════════════════════

    /// Effective execution for a phase
    pub fn execution_for(&self, phase: Phase) -> PhaseExecution {
        self.phase_execution
            .get(&phase)
            .copied()
            .unwrap_or_else(|| phase.default_execution())
    }

    /// Reel stop order, left to right unless configured
    pub fn reel_order(&self) -> Vec<usize> {
        if self.reel_stop_order.is_empty() {
            (0..self.grid.reels).collect()
        } else {
            self.reel_stop_order.clone()
        }
    }

    /// Configuration of a module (default when not listed)
    pub fn module(&self, id: &str) -> ModuleConfig {
        self.modules.get(id).cloned().unwrap_or_default()
    }

    pub fn is_enabled(&self, id: &str) -> bool {
        self.modules.get(id).is_none_or(|m| m.enabled)
    }

    /// Delay policy for a module
    pub fn delay_policy(&self, id: &str) -> DelayPolicy {
        let timing = self
            .modules
            .get(id)
            .and_then(|m| m.timing.clone())
            .unwrap_or_else(|| self.default_timing.clone());
        DelayPolicy::new(self.timing, timing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_module_params() {
        let config = ModuleConfig::new()
            .with_param("play_effect", true)
            .with_param("effect", "wild_burst");

        assert_eq!(config.get::<bool>("play_effect"), Some(true));
        assert_eq!(config.get_or("missing", 7u32), 7);
        assert_eq!(config.require::<String>("effect").unwrap(), "wild_burst");
        assert!(matches!(
            config.require::<u32>("effect"),
            Err(ConfigError::InvalidValue(_))
        ));
        assert!(matches!(
            config.require::<u32>("nope"),
            Err(ConfigError::MissingParam(_))
        ));
    }

    #[test]
    fn test_execution_overrides() {
        let config = PipelineConfig::default()
            .with_phase_execution(Phase::ReelsStoppedCallback, PhaseExecution::Concurrent);
        assert!(config.validate().is_ok());
        assert_eq!(
            config.execution_for(Phase::ReelsStoppedCallback),
            PhaseExecution::Concurrent
        );
        assert_eq!(config.execution_for(Phase::PreSpin), PhaseExecution::Sequential);

        let advisory = PipelineConfig::default()
            .with_phase_execution(Phase::ReelsStoppedCallback, PhaseExecution::Advisory);
        assert!(advisory.validate().is_err());
    }

    #[test]
    fn test_reel_stop_order() {
        let mut config = PipelineConfig::default();
        assert_eq!(config.reel_order(), vec![0, 1, 2, 3, 4]);

        config.reel_stop_order = vec![4, 3, 2, 1, 0];
        assert!(config.validate().is_ok());
        assert_eq!(config.reel_order(), vec![4, 3, 2, 1, 0]);

        config.reel_stop_order = vec![0, 0, 1, 2, 3];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_json_round_trip_through_file() {
        let config = PipelineConfig::default()
            .with_timing(TimingProfile::Turbo)
            .with_module("symbol_replace", ModuleConfig::new().with_order(5));

        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        file.write_all(config.to_json().unwrap().as_bytes()).unwrap();

        let loaded = PipelineConfig::load(file.path()).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.module("symbol_replace").order, 5);
    }

    #[test]
    fn test_yaml_file() {
        let yaml = r#"
grid:
  reels: 3
  rows: 3
  origin: bottom_up
timing: instant
phase_execution:
  reels_stopped_callback: concurrent
modules:
  meters:
    enabled: false
  symbol_replace:
    order: 2
    params:
      play_effect: true
"#;
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        file.write_all(yaml.as_bytes()).unwrap();

        let config = PipelineConfig::load(file.path()).unwrap();
        assert_eq!(config.grid.reels, 3);
        assert_eq!(config.timing, TimingProfile::Instant);
        assert!(!config.is_enabled("meters"));
        assert!(config.is_enabled("trigger_reveal"));
        assert_eq!(
            config.module("symbol_replace").get::<bool>("play_effect"),
            Some(true)
        );
        assert_eq!(config.delay_policy("symbol_replace").start_delay(), 0);
    }

    #[test]
    fn test_unsupported_extension() {
        let file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        assert!(matches!(
            PipelineConfig::load(file.path()),
            Err(ConfigError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_invalid_grid_rejected() {
        let raw = r#"{"grid": {"reels": 0, "rows": 3}}"#;
        assert!(matches!(
            PipelineConfig::from_json_str(raw),
            Err(ConfigError::InvalidValue(_))
        ));
    }
}
