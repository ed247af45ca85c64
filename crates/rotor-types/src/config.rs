//! Configuration types and structures.

use serde::{Deserialize, Serialize};

/// Credential store backend configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Connection URL of the administrative account
    /// (e.g. `postgres://admin@db.internal:5432/app_db`)
    pub url: String,
    /// Database the application principals are granted access to;
    /// taken from the URL path when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    /// Schema the application principals use
    #[serde(default = "default_schema")]
    pub schema: String,
    /// Maximum pooled administrative sessions
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Seconds to wait when acquiring a session
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

fn default_schema() -> String {
    "public".to_string()
}

fn default_max_connections() -> u32 {
    4
}

fn default_connect_timeout() -> u64 {
    30
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: "postgres://postgres@localhost:5432/app_db".to_string(),
            database: None,
            schema: default_schema(),
            max_connections: default_max_connections(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

/// Rotation behaviour settings.
///
/// Durations are written as `<n><unit>` with units `s`, `m`, `h`, `d`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RotationSettings {
    /// Suffix appended to a principal name to form its shadow
    pub shadow_suffix: String,
    /// Length of generated secrets
    pub secret_length: usize,
    /// Symbol set generated secrets must draw at least one character from
    pub symbols: String,
    /// Authenticate with the new secret after a single rotation
    pub verify_single: bool,
    /// Drop the shadow principal when a dual rotation aborts cleanly
    pub rollback_shadow_on_abort: bool,
    /// Default transition window for dual rotations
    pub transition_window: String,
    /// Default time-to-live when scheduling expiry
    pub default_ttl: String,
    /// Default look-ahead when scanning for expiring credentials
    pub expiry_horizon: String,
}

impl Default for RotationSettings {
    fn default() -> Self {
        Self {
            shadow_suffix: "_new".to_string(),
            secret_length: 32,
            symbols: "!@#$%^&*".to_string(),
            verify_single: true,
            rollback_shadow_on_abort: true,
            transition_window: "30s".to_string(),
            default_ttl: "90d".to_string(),
            expiry_horizon: "7d".to_string(),
        }
    }
}

/// Log configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log file path, or `stdout` / `stderr`
    pub path: String,
    /// Log level for this output
    pub level: crate::LogLevel,
    /// Log format (pretty, json, compact)
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
}

fn default_log_format() -> LogFormat {
    LogFormat::Pretty
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable format with colors
    Pretty,
    /// JSON format for machine parsing
    Json,
    /// Compact single-line format
    Compact,
}
