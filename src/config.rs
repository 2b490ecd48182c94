//! Engine configuration.
//!
//! Stored as TOML. Every field has a default, so an empty or missing file is a
//! valid configuration.
//!
//! ```toml
//! log_level = "info"
//!
//! [store]
//! path = "user_facts.json"
//!
//! [limits]
//! max_turns = 8
//! max_categories = 5
//! max_ranked_facts = 3
//!
//! [timeouts]
//! capability_secs = 60
//!
//! [llm]
//! base_url = "http://localhost:8080"
//! n_predict = 1024
//! temperature = 0.2
//! ```

use crate::error::{EngineError, EngineResult};
use crate::planner::MachineConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Default filter when RUST_LOG is unset (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub limits: LimitsConfig,

    #[serde(default)]
    pub timeouts: TimeoutsConfig,

    #[serde(default)]
    pub llm: LlmConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Planner turns per conversation
    #[serde(default = "default_max_turns")]
    pub max_turns: u32,

    /// Categories handed to the planner
    #[serde(default = "default_max_categories")]
    pub max_categories: usize,

    /// Facts handed to the direct responder
    #[serde(default = "default_max_ranked_facts")]
    pub max_ranked_facts: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeoutsConfig {
    /// Upper bound on any single capability call
    #[serde(default = "default_capability_secs")]
    pub capability_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmConfig {
    /// llama-server style endpoint root; `/completion` is appended
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,

    #[serde(default = "default_n_predict")]
    pub n_predict: usize,

    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_store_path() -> PathBuf {
    PathBuf::from("user_facts.json")
}

fn default_max_turns() -> u32 {
    crate::planner::DEFAULT_MAX_TURNS
}

fn default_max_categories() -> usize {
    5
}

fn default_max_ranked_facts() -> usize {
    3
}

fn default_capability_secs() -> u64 {
    60
}

fn default_llm_base_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_n_predict() -> usize {
    1024
}

fn default_temperature() -> f32 {
    0.2
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_turns: default_max_turns(),
            max_categories: default_max_categories(),
            max_ranked_facts: default_max_ranked_facts(),
        }
    }
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            capability_secs: default_capability_secs(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_llm_base_url(),
            n_predict: default_n_predict(),
            temperature: default_temperature(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            store: StoreConfig::default(),
            limits: LimitsConfig::default(),
            timeouts: TimeoutsConfig::default(),
            llm: LlmConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load from `path`. A missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// `EngineError::Config` if the file cannot be read, is not valid TOML,
    /// or sets a limit to zero.
    pub fn load(path: &Path) -> EngineResult<Self> {
        if !path.exists() {
            warn!("Config file {} not found, using defaults", path.display());
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("Failed to read config file: {}", e)))?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> EngineResult<Self> {
        let config: EngineConfig = toml::from_str(contents)
            .map_err(|e| EngineError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> EngineResult<()> {
        if self.limits.max_turns == 0 {
            return Err(EngineError::Config("limits.max_turns must be at least 1".to_string()));
        }
        if self.timeouts.capability_secs == 0 {
            return Err(EngineError::Config("timeouts.capability_secs must be at least 1".to_string()));
        }
        Ok(())
    }

    pub fn capability_timeout(&self) -> Duration {
        Duration::from_secs(self.timeouts.capability_secs)
    }

    pub fn machine(&self) -> MachineConfig {
        MachineConfig {
            max_turns: self.limits.max_turns,
            call_timeout: self.capability_timeout(),
        }
    }
}
