//! Logging system for Rotor.
//!
//! Builds a `tracing` subscriber with one fmt layer per configured output.
//! File outputs write through non-blocking appenders; the returned
//! [`LogGuards`] must be held for as long as logging is needed, since
//! dropping them flushes and closes the writers.

use rotor_types::config::{LogConfig, LogFormat};
use rotor_types::{LogLevel, RotationError, Result};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

/// Default filter when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "rotor=info";

/// Flush guards for non-blocking log writers.
#[must_use = "dropping the guards stops file logging"]
#[derive(Default)]
pub struct LogGuards(Vec<WorkerGuard>);

impl LogGuards {
    /// Number of file writers being kept alive.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no file writers are active.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Initialize the logging system with default configuration.
///
/// Honors `RUST_LOG`, falling back to [`DEFAULT_FILTER`].
pub fn init_default() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .try_init()
        .map_err(|e| RotationError::Config(format!("Failed to initialize logging: {}", e)))
}

/// Initialize logging from configuration.
///
/// With no configured outputs this is [`init_default`].
pub fn init_from_config(configs: &[LogConfig]) -> Result<LogGuards> {
    if configs.is_empty() {
        init_default()?;
        return Ok(LogGuards::default());
    }

    let mut guards = LogGuards::default();
    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();

    for config in configs {
        let (writer, guard) = make_writer(&config.path)?;
        if let Some(guard) = guard {
            guards.0.push(guard);
        }
        layers.push(build_layer(config, writer));
    }

    tracing_subscriber::registry()
        .with(layers)
        .try_init()
        .map_err(|e| RotationError::Config(format!("Failed to initialize logging: {}", e)))?;

    Ok(guards)
}

fn level_filter(level: LogLevel) -> LevelFilter {
    match level {
        LogLevel::None => LevelFilter::OFF,
        LogLevel::Error => LevelFilter::ERROR,
        LogLevel::Warn => LevelFilter::WARN,
        LogLevel::Info => LevelFilter::INFO,
        LogLevel::Debug => LevelFilter::DEBUG,
        LogLevel::Trace => LevelFilter::TRACE,
    }
}

fn build_layer(config: &LogConfig, writer: BoxMakeWriter) -> Box<dyn Layer<Registry> + Send + Sync> {
    let filter = level_filter(config.level);
    let base = tracing_subscriber::fmt::layer().with_writer(writer);

    match config.format {
        LogFormat::Pretty => base.pretty().with_filter(filter).boxed(),
        LogFormat::Json => base.json().with_ansi(false).with_filter(filter).boxed(),
        LogFormat::Compact => base.compact().with_ansi(false).with_filter(filter).boxed(),
    }
}

fn make_writer(path: &str) -> Result<(BoxMakeWriter, Option<WorkerGuard>)> {
    match path {
        "stdout" | "-" => Ok((BoxMakeWriter::new(std::io::stdout), None)),
        "stderr" => Ok((BoxMakeWriter::new(std::io::stderr), None)),
        file => {
            let path = Path::new(file);
            let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
            let name = path.file_name().ok_or_else(|| {
                RotationError::Config(format!("Log path '{}' has no file name", file))
            })?;

            std::fs::create_dir_all(dir)?;
            let appender = tracing_appender::rolling::never(dir, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            Ok((BoxMakeWriter::new(writer), Some(guard)))
        }
    }
}
