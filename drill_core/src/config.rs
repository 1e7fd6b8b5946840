//! Configuration file support.
//!
//! Configuration is loaded from `$XDG_CONFIG_HOME/drills/config.toml`.

use crate::{Error, FilterPreferences, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application configuration
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub data: DataConfig,

    #[serde(default)]
    pub autosave: AutoSaveConfig,

    #[serde(default)]
    pub sync: SyncConfig,

    #[serde(default)]
    pub preferences: PreferencesConfig,
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

impl DataConfig {
    /// Root of the per-user cache
    pub fn cache_dir(&self) -> PathBuf {
        self.data_dir.join("cache")
    }
}

/// Debounced auto-save configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AutoSaveConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

impl Default for AutoSaveConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            debounce_ms: default_debounce_ms(),
        }
    }
}

impl AutoSaveConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

/// Remote sync configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "default_true")]
    pub remote_enabled: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            remote_enabled: true,
        }
    }
}

/// Defaults for a user's first filter preferences
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PreferencesConfig {
    #[serde(default = "default_equipment")]
    pub equipment: Vec<String>,
}

impl Default for PreferencesConfig {
    fn default() -> Self {
        Self {
            equipment: default_equipment(),
        }
    }
}

impl PreferencesConfig {
    pub fn initial_preferences(&self) -> FilterPreferences {
        FilterPreferences {
            equipment: self.equipment.iter().cloned().collect(),
            ..FilterPreferences::default()
        }
    }
}

// Default value functions
fn default_data_dir() -> PathBuf {
    let base = dirs::data_local_dir().unwrap_or_else(|| {
        std::env::var("HOME")
            .map(|home| PathBuf::from(home).join(".local/share"))
            .unwrap_or_else(|_| PathBuf::from("."))
    });
    base.join("drills")
}

fn default_true() -> bool {
    true
}

fn default_debounce_ms() -> u64 {
    3000
}

fn default_equipment() -> Vec<String> {
    vec!["ball".into()]
}

impl Config {
    /// Load configuration from the standard config path
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path();
        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            tracing::info!(
                "No config file found at {:?}, using defaults",
                config_path
            );
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

    pub fn validate(&self) -> Result<()> {
        if self.autosave.enabled && self.autosave.debounce_ms == 0 {
            return Err(Error::Config(
                "autosave.debounce_ms must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        let base = dirs::config_dir().unwrap_or_else(|| {
            std::env::var("HOME")
                .map(|home| PathBuf::from(home).join(".config"))
                .unwrap_or_else(|_| PathBuf::from("."))
        });
        base.join("drills").join("config.toml")
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
