//! # Rotor Types
//!
//! Core types, traits, and errors shared across all Rotor crates.
//!
//! This crate provides the fundamental building blocks for the Rotor
//! credential rotation engine, including:
//!
//! - Validated principal names that are safe to hand to any backend
//! - Grants, principals, audit records, and expiry schedules
//! - The credential store, audit store, and expiry store traits
//! - Error types and result aliases
//!
//! ## Example
//!
//! ```
//! use rotor_types::{PrincipalName, Grant};
//!
//! let name = PrincipalName::new("api_service").unwrap();
//! let shadow = name.shadow("_new").unwrap();
//! assert_eq!(shadow.as_str(), "api_service_new");
//!
//! let grants = Grant::application_defaults("app_db", "public");
//! assert_eq!(grants.len(), 3);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod errors;
pub mod identifiers;
pub mod enums;
pub mod records;
pub mod secret;
pub mod traits;
pub mod config;

// Re-export common types for convenience
pub use errors::{
    BackendError, BackendResult, PartialState, Result, RotationError, RotationStep, StoreOp,
};
pub use identifiers::PrincipalName;
pub use enums::{FailureKind, LogLevel, Outcome, Privilege, RotationType};
pub use records::{ExpirySchedule, Grant, GrantTarget, HistoryOrder, Principal, RotationRecord};
pub use secret::Secret;
pub use traits::{AuditStore, CredentialSession, CredentialStore, ExpiryStore};
