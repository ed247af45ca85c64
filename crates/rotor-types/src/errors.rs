//! Error types for Rotor operations.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Identifies a credential store operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreOp {
    /// Open a backend session
    Session,
    /// Read a principal and its grants
    Describe,
    /// Enumerate principals
    List,
    /// Create (or replace) a principal
    Create,
    /// Change a principal's secret
    Alter,
    /// Drop a principal
    Drop,
    /// Rename a principal
    Rename,
    /// Revoke every privilege held by a principal
    RevokeAll,
    /// Authenticate as a principal
    Authenticate,
}

impl fmt::Display for StoreOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StoreOp::Session => "session",
            StoreOp::Describe => "describe",
            StoreOp::List => "list",
            StoreOp::Create => "create",
            StoreOp::Alter => "alter",
            StoreOp::Drop => "drop",
            StoreOp::Rename => "rename",
            StoreOp::RevokeAll => "revoke-all",
            StoreOp::Authenticate => "authenticate",
        };
        f.write_str(name)
    }
}

/// Failure reported by a credential store backend.
///
/// Adapters never retry; the error carries the operation and the
/// backend's own description of the cause.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{operation} failed: {message}")]
pub struct BackendError {
    /// Operation that failed
    pub operation: StoreOp,
    /// Underlying cause
    pub message: String,
}

impl BackendError {
    /// Create a backend error for an operation.
    pub fn new(operation: StoreOp, message: impl Into<String>) -> Self {
        Self {
            operation,
            message: message.into(),
        }
    }
}

/// A specialized Result type for credential store calls.
pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// Step of a rotation protocol, used to tag failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RotationStep {
    /// Secret generation
    Generate,
    /// Reading backend state before acting
    Inspect,
    /// Applying a new secret to an existing principal
    Alter,
    /// Authenticating with the new secret
    Verify,
    /// Creating the shadow principal
    CreateShadow,
    /// Waiting out the transition window
    Transition,
    /// Revoking the old principal's privileges
    Revoke,
    /// Dropping the old principal
    Drop,
    /// Renaming the shadow principal to the original name
    Rename,
    /// Provisioning a principal
    Provision,
}

impl fmt::Display for RotationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RotationStep::Generate => "generate",
            RotationStep::Inspect => "inspect",
            RotationStep::Alter => "alter",
            RotationStep::Verify => "verify",
            RotationStep::CreateShadow => "create-shadow",
            RotationStep::Transition => "transition",
            RotationStep::Revoke => "revoke",
            RotationStep::Drop => "drop",
            RotationStep::Rename => "rename",
            RotationStep::Provision => "provision",
        };
        f.write_str(name)
    }
}

/// Named intermediate state left behind by an interrupted dual rotation.
///
/// Variants are ordered by progress through retirement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartialState {
    /// Old principal present with privileges possibly partially revoked;
    /// shadow present
    RevokeIncomplete,
    /// Old principal revoked but present; shadow present
    OldRevoked,
    /// Old principal gone; shadow present under its suffixed name
    OldDropped,
    /// Shadow renamed to the original name, but the new secret does not
    /// authenticate under it; a single rotation sets a working secret
    Renamed,
}

impl fmt::Display for PartialState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PartialState::RevokeIncomplete => "revoke-incomplete",
            PartialState::OldRevoked => "old-revoked",
            PartialState::OldDropped => "old-dropped",
            PartialState::Renamed => "renamed",
        };
        f.write_str(name)
    }
}

/// The main error type for Rotor operations.
#[derive(Error, Debug)]
pub enum RotationError {
    /// Composition rules could not be satisfied within the retry bound
    #[error("Secret generation failed after {attempts} attempts")]
    GenerationFailed {
        /// Number of candidates sampled
        attempts: u32,
    },

    /// A backend call failed before any irreversible step
    #[error("Backend error during {step}: {source}")]
    Backend {
        /// Protocol step that issued the call
        step: RotationStep,
        /// Backend failure
        #[source]
        source: BackendError,
    },

    /// The new secret does not authenticate
    #[error("Verification failed: new secret for '{principal}' does not authenticate")]
    VerificationFailed {
        /// Principal whose secret was checked
        principal: String,
    },

    /// Dual rotation failed after an irreversible step
    #[error("Partial rotation of '{principal}' at {step} (state {state}, shadow '{shadow}'): {message}")]
    PartialRotation {
        /// Step that failed
        step: RotationStep,
        /// Original principal name
        principal: String,
        /// Shadow principal name
        shadow: String,
        /// Intermediate state left in the backend
        state: PartialState,
        /// Backend cause
        message: String,
    },

    /// An operator cancelled the transition window
    #[error("Rotation of '{principal}' was cancelled")]
    Cancelled {
        /// Principal being rotated
        principal: String,
    },

    /// A dual rotation was requested while a partial one is outstanding
    #[error("Principal '{principal}' has an unfinished dual rotation ({state}); resume it first")]
    ResumeRequired {
        /// Principal being rotated
        principal: String,
        /// Detected intermediate state
        state: PartialState,
    },

    /// A resume was requested but no partial rotation exists
    #[error("No unfinished dual rotation for '{principal}'")]
    NothingToResume {
        /// Principal named in the request
        principal: String,
    },

    /// Audit record could not be persisted
    #[error("Audit error: {0}")]
    Audit(String),

    /// Configuration-related error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing error
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON parsing error
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    /// Internal bug - should never happen in production
    #[error("Bug detected: {0}\n\nThis is an internal error. Please report this issue at:\nhttps://github.com/rotor-project/rotor/issues")]
    Bug(String),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl RotationError {
    /// Wrap a backend failure with the step that issued it.
    pub fn backend(step: RotationStep, source: BackendError) -> Self {
        RotationError::Backend { step, source }
    }

    /// Whether the backend was left in an ambiguous state.
    pub fn is_partial(&self) -> bool {
        matches!(self, RotationError::PartialRotation { .. })
    }

    /// The protocol step a rotation failure is attributed to, if any.
    pub fn step(&self) -> Option<RotationStep> {
        match self {
            RotationError::GenerationFailed { .. } => Some(RotationStep::Generate),
            RotationError::Backend { step, .. } => Some(*step),
            RotationError::VerificationFailed { .. } => Some(RotationStep::Verify),
            RotationError::PartialRotation { step, .. } => Some(*step),
            RotationError::Cancelled { .. } => Some(RotationStep::Transition),
            RotationError::ResumeRequired { .. } | RotationError::NothingToResume { .. } => {
                Some(RotationStep::Inspect)
            }
            _ => None,
        }
    }
}

/// A specialized Result type for Rotor operations.
pub type Result<T> = std::result::Result<T, RotationError>;

/// Helper macro to create and return a RotationError::Bug
///
/// This should be used for conditions that should never occur
/// in normal operation and indicate a bug in Rotor itself.
#[macro_export]
macro_rules! bug {
    ($msg:expr) => {
        return Err($crate::RotationError::Bug($msg.to_string()))
    };
    ($fmt:expr, $($arg:tt)*) => {
        return Err($crate::RotationError::Bug(format!($fmt, $($arg)*)))
    };
}

/// Helper macro to bail out with a RotationError
///
/// # Example
///
/// ```ignore
/// if ttl <= Duration::zero() {
///     bail!(Validation, "TTL must be positive, got {}", ttl);
/// }
/// ```
#[macro_export]
macro_rules! bail {
    ($variant:ident, $msg:expr) => {
        return Err($crate::RotationError::$variant($msg.to_string()))
    };
    ($variant:ident, $fmt:expr, $($arg:tt)*) => {
        return Err($crate::RotationError::$variant(format!($fmt, $($arg)*)))
    };
    ($msg:expr) => {
        return Err($crate::RotationError::Other($msg.to_string()))
    };
    ($fmt:expr, $($arg:tt)*) => {
        return Err($crate::RotationError::Other(format!($fmt, $($arg)*)))
    };
}
