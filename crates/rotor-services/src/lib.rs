//! # Rotor Services
//!
//! Credential store backends for Rotor.
//!
//! This crate provides:
//! - **PostgreSQL**: login roles managed over a pooled administrative
//!   connection
//! - **Memory**: an in-process store with fault injection, used by tests
//!   and dry runs

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod memory;
pub mod postgres;
mod statement;

pub use memory::{FaultMode, MemoryCredentialStore};
pub use postgres::PostgresCredentialStore;
