//! Command implementations.

pub mod expiry;
pub mod generate;
pub mod history;
pub mod provision;
pub mod reconcile;
pub mod rotate;
pub mod version;

use anyhow::{Context, Result};
use rotor_core::time::parse_duration;
use rotor_core::RotorConfig;
use rotor_engine::{AuditLog, EngineSettings, ExpiryTracker, FileAuditStore, FileExpiryStore, RotationEngine};
use rotor_secrets::{SecretGenerator, SecretPolicy};
use rotor_services::PostgresCredentialStore;
use rotor_types::PrincipalName;
use std::sync::Arc;

/// Validate a principal name given on the command line.
pub(crate) fn principal(name: &str) -> Result<PrincipalName> {
    PrincipalName::new(name).with_context(|| format!("Invalid principal name '{}'", name))
}

/// Parse an optional duration argument, falling back to a configured default.
pub(crate) fn duration_or(value: Option<&str>, default: chrono::Duration) -> Result<chrono::Duration> {
    match value {
        Some(raw) => parse_duration(raw).with_context(|| format!("Invalid duration '{}'", raw)),
        None => Ok(default),
    }
}

pub(crate) fn settings(config: &RotorConfig) -> Result<EngineSettings> {
    EngineSettings::from_settings(&config.rotation).context("Invalid rotation settings")
}

/// Audit log over the ledger directory.
pub(crate) fn audit_log(config: &RotorConfig) -> Result<AuditLog> {
    let dir = config.ledger_dir()?;
    Ok(AuditLog::new(Arc::new(FileAuditStore::new(dir))))
}

/// Expiry tracker over the ledger directory.
pub(crate) fn expiry_tracker(config: &RotorConfig) -> Result<ExpiryTracker> {
    let dir = config.ledger_dir()?;
    Ok(ExpiryTracker::new(Arc::new(FileExpiryStore::new(dir))))
}

pub(crate) fn generator(config: &RotorConfig) -> Result<SecretGenerator> {
    SecretGenerator::new(SecretPolicy::from_settings(&config.rotation)).context("Invalid secret policy")
}

/// Connect to the configured backend and assemble the rotation engine.
///
/// Also returns the database the application grants target.
pub(crate) async fn engine(config: &RotorConfig) -> Result<(RotationEngine, String)> {
    let store = PostgresCredentialStore::connect(&config.backend)
        .await
        .context("Failed to connect to the credential store")?;
    let database = store.database().to_string();

    let engine = RotationEngine::new(Arc::new(store), audit_log(config)?, expiry_tracker(config)?)
        .with_generator(generator(config)?)
        .with_settings(settings(config)?);

    Ok((engine, database))
}
