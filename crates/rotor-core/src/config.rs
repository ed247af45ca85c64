//! Configuration management for Rotor.
//!
//! This module provides multi-layer configuration support with:
//! - File-based configuration (YAML)
//! - Environment variable overrides
//!
//! ## Configuration Layers
//!
//! Configuration values are resolved in this priority order:
//! 1. Environment variables (`ROTOR_` prefix, `__` between path segments)
//! 2. Values loaded from file
//! 3. Default values
//!
//! ## Example
//!
//! ```no_run
//! use rotor_core::config::RotorConfig;
//!
//! let config = RotorConfig::load_from("/etc/rotor/config").unwrap();
//! println!("shadow suffix: {}", config.rotation.shadow_suffix);
//! ```

use rotor_types::config::{BackendConfig, LogConfig, RotationSettings};
use rotor_types::{RotationError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Prefix for environment variable overrides.
pub const ENV_PREFIX: &str = "ROTOR_";

/// Configuration layer priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ConfigLayer {
    /// Default values
    Default = 0,
    /// Values loaded from file
    Loaded = 1,
    /// Values from environment variables
    Environment = 2,
}

const LAYERS_LOW_TO_HIGH: [ConfigLayer; 3] = [
    ConfigLayer::Default,
    ConfigLayer::Loaded,
    ConfigLayer::Environment,
];

/// Main configuration structure with multi-layer support.
///
/// This is the low-level configuration type. Typed access goes through
/// [`RotorConfig`].
#[derive(Clone, Debug)]
pub struct Config {
    layers: HashMap<ConfigLayer, Value>,
}

impl Config {
    /// Create a new configuration from a file path.
    ///
    /// If the file doesn't exist, an empty configuration is created.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut layers = HashMap::new();

        if path.exists() {
            let content = fs::read_to_string(path)
                .map_err(|e| RotationError::Config(format!("Failed to read config file: {}", e)))?;

            let value: Value = serde_yaml::from_str(&content)
                .map_err(|e| RotationError::Config(format!("Failed to parse config: {}", e)))?;

            if !value.is_null() {
                layers.insert(ConfigLayer::Loaded, value);
            }
        }

        Ok(Self { layers })
    }

    /// Replace the defaults layer.
    pub fn with_defaults(mut self, defaults: impl Serialize) -> Result<Self> {
        let value = serde_json::to_value(defaults)
            .map_err(|e| RotationError::Config(format!("Failed to serialize defaults: {}", e)))?;
        self.layers.insert(ConfigLayer::Default, value);
        Ok(self)
    }

    /// Populate the environment layer from `ROTOR_*` variables.
    ///
    /// `ROTOR_ROTATION__SHADOW_SUFFIX=_next` sets `rotation.shadow_suffix`.
    /// Values that parse as YAML scalars (numbers, booleans) keep their type.
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_env_vars(std::env::vars())
    }

    /// Populate the environment layer from an explicit variable list.
    pub fn with_env_vars(mut self, vars: impl IntoIterator<Item = (String, String)>) -> Result<Self> {
        let mut env_layer = Value::Object(Default::default());

        for (key, raw) in vars {
            let Some(stripped) = key.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            let path = stripped
                .split("__")
                .map(|part| part.to_lowercase())
                .collect::<Vec<_>>()
                .join(".");
            if path.is_empty() {
                continue;
            }

            let value = match serde_yaml::from_str::<Value>(&raw) {
                Ok(v @ (Value::Bool(_) | Value::Number(_))) => v,
                _ => Value::String(raw),
            };
            Self::set_value_at_path_impl(&mut env_layer, &path, value)?;
        }

        self.layers.insert(ConfigLayer::Environment, env_layer);
        Ok(self)
    }

    /// Get merged data from all layers.
    pub fn merged_data(&self) -> Value {
        let mut merged = Value::Object(serde_json::Map::new());

        for layer in &LAYERS_LOW_TO_HIGH {
            if let Some(layer_data) = self.layers.get(layer) {
                merged = crate::util::data::deep_merge(merged, layer_data.clone());
            }
        }

        merged
    }

    // Helper: Set value at dotted path
    fn set_value_at_path_impl(data: &mut Value, path: &str, value: Value) -> Result<()> {
        let parts: Vec<&str> = path.split('.').collect();
        let Some((last, parents)) = parts.split_last() else {
            return Err(RotationError::Config("Empty path".to_string()));
        };

        let mut current = data;
        for part in parents {
            if !current.is_object() {
                *current = Value::Object(Default::default());
            }
            current = match current {
                Value::Object(map) => map
                    .entry(part.to_string())
                    .or_insert_with(|| Value::Object(Default::default())),
                _ => rotor_types::bug!("config layer is not an object after normalisation"),
            };
        }

        if !current.is_object() {
            *current = Value::Object(Default::default());
        }
        if let Value::Object(map) = current {
            map.insert(last.to_string(), value);
        }

        Ok(())
    }
}

/// Typed Rotor configuration (`~/.rotor/config`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RotorConfig {
    /// Credential store backend
    #[serde(default)]
    pub backend: BackendConfig,

    /// Rotation behaviour
    #[serde(default)]
    pub rotation: RotationSettings,

    /// Directory holding the audit log and expiry schedules
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ledger_dir: Option<PathBuf>,

    /// Log configurations
    #[serde(default)]
    pub logs: Vec<LogConfig>,
}

impl RotorConfig {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self> {
        Self::load_from(Self::default_path()?)
    }

    /// Load configuration from a specific path, applying defaults and
    /// environment overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let config = Config::load(path)?
            .with_defaults(RotorConfig::default())?
            .with_env_overrides()?;
        Self::from_layers(&config)
    }

    /// Build the typed configuration from resolved layers.
    pub fn from_layers(config: &Config) -> Result<Self> {
        serde_json::from_value(config.merged_data())
            .map_err(|e| RotationError::Config(format!("Failed to parse rotor config: {}", e)))
    }

    /// Get the default path for the configuration file.
    pub fn default_path() -> Result<PathBuf> {
        Ok(Self::home_dir()?.join("config"))
    }

    /// Ledger directory, defaulting to `~/.rotor/ledger`.
    pub fn ledger_dir(&self) -> Result<PathBuf> {
        match &self.ledger_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(Self::home_dir()?.join("ledger")),
        }
    }

    fn home_dir() -> Result<PathBuf> {
        dirs::home_dir()
            .map(|home| home.join(".rotor"))
            .ok_or_else(|| RotationError::Config("Could not determine home directory".to_string()))
    }
}
