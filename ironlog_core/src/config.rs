//! Configuration file support for ironlog.
//!
//! Configuration is loaded from `$XDG_CONFIG_HOME/ironlog/config.toml`.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application configuration
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub data: DataConfig,

    #[serde(default)]
    pub lifter: LifterConfig,

    #[serde(default)]
    pub progression: ProgressionConfig,

    #[serde(default)]
    pub history: HistoryConfig,
}

/// Data storage configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DataConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

/// Per-lifter settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LifterConfig {
    #[serde(default = "default_user_id")]
    pub user_id: String,

    /// Empty-bar weight every session's first block starts from
    #[serde(default = "default_bar_weight")]
    pub bar_weight: f64,
}

impl Default for LifterConfig {
    fn default() -> Self {
        Self {
            user_id: default_user_id(),
            bar_weight: default_bar_weight(),
        }
    }
}

/// Weight ramp parameters
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProgressionConfig {
    #[serde(default = "default_increment")]
    pub fallback_increment: f64,

    #[serde(default = "default_increment")]
    pub carry_over_increment: f64,
}

impl Default for ProgressionConfig {
    fn default() -> Self {
        Self {
            fallback_increment: default_increment(),
            carry_over_increment: default_increment(),
        }
    }
}

/// History lookups
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Look-back window for "last time on this block"
    #[serde(default = "default_recent_days")]
    pub recent_days: i64,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            recent_days: default_recent_days(),
        }
    }
}

// Default value functions
fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join(".local/share")))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ironlog")
}

fn default_user_id() -> String {
    "local".into()
}

fn default_bar_weight() -> f64 {
    20.0
}

fn default_increment() -> f64 {
    crate::progression::DEFAULT_INCREMENT
}

fn default_recent_days() -> i64 {
    90
}

impl Config {
    /// Load configuration from the standard config path
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path();
        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        tracing::info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Reject values the planner cannot work with
    pub fn validate(&self) -> Result<()> {
        if !self.lifter.bar_weight.is_finite() || self.lifter.bar_weight < 0.0 {
            return Err(Error::Config(format!(
                "bar_weight must be a non-negative number, got {}",
                self.lifter.bar_weight
            )));
        }
        if self.lifter.user_id.trim().is_empty() {
            return Err(Error::Config("user_id must not be empty".into()));
        }
        if self.history.recent_days < 1 {
            return Err(Error::Config("recent_days must be at least 1".into()));
        }
        Ok(())
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .or_else(|| dirs::home_dir().map(|home| home.join(".config")))
            .unwrap_or_else(|| PathBuf::from("."))
            .join("ironlog")
            .join("config.toml")
    }

    /// Save the current configuration to the default path
    pub fn save(&self) -> Result<()> {
        let config_path = Self::default_config_path();
        self.save_to(&config_path)
    }

    /// Save the current configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, contents)?;
        tracing::info!("Saved config to {:?}", path);
        Ok(())
    }
}
