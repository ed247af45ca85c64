//! Common enumerations used throughout Rotor.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use crate::errors::{RotationError, Result};

/// Log level enumeration for the logging system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    /// No logging
    None,
    /// Error messages only
    Error,
    /// Warnings and errors
    Warn,
    /// Informational messages
    Info,
    /// Debug messages
    Debug,
    /// Detailed trace messages
    Trace,
}

impl LogLevel {
    /// Directive understood by `tracing_subscriber::EnvFilter`.
    pub fn as_directive(&self) -> &'static str {
        match self {
            LogLevel::None => "off",
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

impl FromStr for LogLevel {
    type Err = RotationError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_uppercase().as_str() {
            "NONE" | "OFF" => Ok(LogLevel::None),
            "ERROR" => Ok(LogLevel::Error),
            "WARN" | "WARNING" => Ok(LogLevel::Warn),
            "INFO" => Ok(LogLevel::Info),
            "DEBUG" => Ok(LogLevel::Debug),
            "TRACE" => Ok(LogLevel::Trace),
            _ => Err(RotationError::Validation(format!("Invalid log level: {}", s))),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::None => write!(f, "NONE"),
            LogLevel::Error => write!(f, "ERROR"),
            LogLevel::Warn => write!(f, "WARN"),
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Debug => write!(f, "DEBUG"),
            LogLevel::Trace => write!(f, "TRACE"),
        }
    }
}

/// Rotation protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RotationType {
    /// Alter the secret of the existing principal in place
    Single,
    /// Shadow principal, transition window, retire the old principal
    Dual,
}

impl fmt::Display for RotationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RotationType::Single => write!(f, "single"),
            RotationType::Dual => write!(f, "dual"),
        }
    }
}

/// Final outcome of a rotation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    /// The new credential is active
    Success,
    /// The attempt failed; see the failure kind
    Failed,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Success => write!(f, "success"),
            Outcome::Failed => write!(f, "failed"),
        }
    }
}

/// Classification of a failed rotation, stored on the audit record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// No secret satisfying the composition policy was produced
    GenerationFailed,
    /// A backend call failed before any irreversible step
    BackendError,
    /// The new secret did not authenticate
    VerificationFailed,
    /// A backend call failed after an irreversible step
    PartialRotation,
    /// The transition window was cancelled
    Cancelled,
    /// An unfinished dual rotation must be resumed first
    ResumeRequired,
    /// Anything else (invalid configuration, nothing to resume)
    Other,
}

impl FailureKind {
    /// Classify a rotation error.
    pub fn of(error: &RotationError) -> Self {
        match error {
            RotationError::GenerationFailed { .. } => FailureKind::GenerationFailed,
            RotationError::Backend { .. } => FailureKind::BackendError,
            RotationError::VerificationFailed { .. } => FailureKind::VerificationFailed,
            RotationError::PartialRotation { .. } => FailureKind::PartialRotation,
            RotationError::Cancelled { .. } => FailureKind::Cancelled,
            RotationError::ResumeRequired { .. } => FailureKind::ResumeRequired,
            _ => FailureKind::Other,
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::GenerationFailed => "GenerationFailed",
            FailureKind::BackendError => "BackendError",
            FailureKind::VerificationFailed => "VerificationFailed",
            FailureKind::PartialRotation => "PartialRotation",
            FailureKind::Cancelled => "Cancelled",
            FailureKind::ResumeRequired => "ResumeRequired",
            FailureKind::Other => "Other",
        };
        f.write_str(name)
    }
}

/// A privilege that can be granted to a principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Privilege {
    /// Connect to a database
    Connect,
    /// Use objects in a schema
    Usage,
    /// Read rows
    Select,
    /// Insert rows
    Insert,
    /// Update rows
    Update,
    /// Delete rows
    Delete,
    /// Empty a table
    Truncate,
    /// Create foreign keys referencing a table
    References,
    /// Create triggers on a table
    Trigger,
    /// Create objects in a database or schema
    Create,
    /// Create temporary tables in a database
    Temporary,
    /// Every privilege applicable to the target
    All,
}

impl Privilege {
    /// SQL keyword for the privilege.
    pub fn keyword(&self) -> &'static str {
        match self {
            Privilege::Connect => "CONNECT",
            Privilege::Usage => "USAGE",
            Privilege::Select => "SELECT",
            Privilege::Insert => "INSERT",
            Privilege::Update => "UPDATE",
            Privilege::Delete => "DELETE",
            Privilege::Truncate => "TRUNCATE",
            Privilege::References => "REFERENCES",
            Privilege::Trigger => "TRIGGER",
            Privilege::Create => "CREATE",
            Privilege::Temporary => "TEMPORARY",
            Privilege::All => "ALL PRIVILEGES",
        }
    }
}

impl FromStr for Privilege {
    type Err = RotationError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_uppercase().as_str() {
            "CONNECT" => Ok(Privilege::Connect),
            "USAGE" => Ok(Privilege::Usage),
            "SELECT" => Ok(Privilege::Select),
            "INSERT" => Ok(Privilege::Insert),
            "UPDATE" => Ok(Privilege::Update),
            "DELETE" => Ok(Privilege::Delete),
            "TRUNCATE" => Ok(Privilege::Truncate),
            "REFERENCES" => Ok(Privilege::References),
            "TRIGGER" => Ok(Privilege::Trigger),
            "CREATE" => Ok(Privilege::Create),
            "TEMPORARY" | "TEMP" => Ok(Privilege::Temporary),
            "ALL" | "ALL PRIVILEGES" => Ok(Privilege::All),
            _ => Err(RotationError::Validation(format!("Unknown privilege: {}", s))),
        }
    }
}

impl fmt::Display for Privilege {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}
