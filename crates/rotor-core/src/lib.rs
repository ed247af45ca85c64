//! # Rotor Core
//!
//! Core utilities, configuration management, and logging for the Rotor
//! credential rotation engine.
//!
//! This crate provides:
//!
//! - **Configuration**: Multi-layer configuration (defaults, file, programmatic, environment)
//! - **Logging**: Structured logging with multiple outputs and formats
//! - **Time Utilities**: Duration parsing and human-readable formatting
//! - **Data Structures**: Deep merging and dotted-path lookup
//!
//! ## Example
//!
//! ```no_run
//! use rotor_core::config::RotorConfig;
//!
//! let config = RotorConfig::load().unwrap();
//! let _guards = rotor_core::log::init_from_config(&config.logs).unwrap();
//! let ttl = rotor_core::time::parse_duration(&config.rotation.default_ttl).unwrap();
//! assert!(ttl.num_days() > 0);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod log;
pub mod util;
pub mod time;

// Re-export commonly used items
pub use config::{Config, RotorConfig};
pub use rotor_types::{RotationError, Result};

/// Rotor application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Rotor application name
pub const APP_NAME: &str = "rotor";
