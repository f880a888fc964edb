//! Configuration management for device-bench
//!
//! Config file location:
//! - Linux: ~/.config/device-bench/config.toml
//! - macOS: ~/Library/Application Support/device-bench/config.toml
//! - Windows: %APPDATA%/device-bench/config.toml
//!
//! You can override the config location by setting `DEVICE_BENCH_CONFIG_PATH`.

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::BenchResult;
use crate::sustained::SustainedConfig;
use crate::throttle::StutterThresholds;

pub const CONFIG_PATH_ENV: &str = "DEVICE_BENCH_CONFIG_PATH";

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Sustained-load defaults
    #[serde(default)]
    pub sustained: SustainedSettings,

    /// Stutter-risk cutoffs
    #[serde(default)]
    pub stutter: StutterThresholds,

    /// Report history and scratch locations
    #[serde(default)]
    pub storage: StorageSettings,
}

impl Config {
    /// Load configuration from file or create default
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml = toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        fs::write(path, toml)
            .with_context(|| format!("Failed to write config to {}", path.display()))?;

        Ok(())
    }

    /// Get the configuration file path
    pub fn config_path() -> Result<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            let trimmed = path.trim();
            if !trimmed.is_empty() {
                return Ok(PathBuf::from(trimmed));
            }
        }

        let proj_dirs = ProjectDirs::from("dev", "device-bench", "device-bench")
            .context("Could not determine project directories")?;

        Ok(proj_dirs.config_dir().join("config.toml"))
    }

    /// Create default config file if it doesn't exist
    pub fn init() -> Result<Self> {
        let config = Self::load()?;

        let config_path = Self::config_path()?;
        if !config_path.exists() {
            config.save()?;
        }

        Ok(config)
    }

    /// Reject settings that would make a run misbehave.
    pub fn validate(&self) -> BenchResult<()> {
        self.sustained.to_config().validate()
    }
}

/// Sustained-load settings as written in the config file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SustainedSettings {
    #[serde(default = "default_min_cycles")]
    pub min_cycles: u32,

    #[serde(default = "default_max_cycles")]
    pub max_cycles: u32,

    /// Pause between cycles in seconds
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Matching trailing thermal samples needed to stop early
    #[serde(default = "default_stable_window")]
    pub stable_thermal_window: u32,
}

impl Default for SustainedSettings {
    fn default() -> Self {
        Self {
            min_cycles: default_min_cycles(),
            max_cycles: default_max_cycles(),
            interval_secs: default_interval_secs(),
            stable_thermal_window: default_stable_window(),
        }
    }
}

impl SustainedSettings {
    pub fn to_config(&self) -> SustainedConfig {
        SustainedConfig {
            min_cycles: self.min_cycles,
            max_cycles: self.max_cycles,
            interval: Duration::from_secs(self.interval_secs),
            stable_thermal_window: self.stable_thermal_window,
        }
    }
}

fn default_min_cycles() -> u32 {
    3
}

fn default_max_cycles() -> u32 {
    10
}

fn default_interval_secs() -> u64 {
    5
}

fn default_stable_window() -> u32 {
    3
}

/// Storage locations
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageSettings {
    /// Report history directory (platform data dir when unset)
    pub data_dir: Option<PathBuf>,

    /// Where the storage benchmark creates its scratch directory (system temp dir when unset)
    pub scratch_dir: Option<PathBuf>,
}

impl StorageSettings {
    pub fn scratch_root(&self) -> PathBuf {
        self.scratch_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

/// Get configuration file path for display purposes
pub fn get_config_path() -> Result<String> {
    let path = Config::config_path()?;
    Ok(path.display().to_string())
}
