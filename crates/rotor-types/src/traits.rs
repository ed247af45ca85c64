//! Core trait definitions for Rotor abstractions.

use async_trait::async_trait;
use crate::errors::{BackendResult, Result};
use crate::identifiers::PrincipalName;
use crate::records::{ExpirySchedule, Grant, HistoryOrder, Principal, RotationRecord};
use crate::secret::Secret;

/// Trait for account-management backends (PostgreSQL, in-memory, ...).
///
/// A store hands out sessions; every account operation runs on a session.
/// Sessions are released when dropped, so a session acquired inside a
/// scope is returned on every exit path of that scope.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Acquire an administrative session.
    async fn session(&self) -> BackendResult<Box<dyn CredentialSession>>;

    /// Get the backend type name (e.g., "postgres", "memory").
    fn backend_type(&self) -> &'static str;
}

/// Account operations available on an open backend session.
///
/// Implementations must be idempotent where the backend allows it:
/// `create_principal` replaces an existing principal, `drop_principal`
/// tolerates a missing one, `revoke_all` may be repeated. Implementations
/// never retry.
#[async_trait]
pub trait CredentialSession: Send {
    /// Read a principal and the privileges it holds.
    ///
    /// Returns `None` if the principal does not exist.
    async fn describe_principal(&mut self, name: &PrincipalName) -> BackendResult<Option<Principal>>;

    /// List every principal name the backend knows about.
    async fn list_principals(&mut self) -> BackendResult<Vec<PrincipalName>>;

    /// Create a principal with a secret and grants, replacing any existing one.
    async fn create_principal(
        &mut self,
        name: &PrincipalName,
        secret: &Secret,
        grants: &[Grant],
    ) -> BackendResult<()>;

    /// Replace a principal's secret.
    async fn alter_secret(&mut self, name: &PrincipalName, secret: &Secret) -> BackendResult<()>;

    /// Drop a principal. Succeeds if it does not exist.
    async fn drop_principal(&mut self, name: &PrincipalName) -> BackendResult<()>;

    /// Rename a principal.
    async fn rename_principal(&mut self, from: &PrincipalName, to: &PrincipalName) -> BackendResult<()>;

    /// Revoke every privilege the principal holds.
    async fn revoke_all(&mut self, name: &PrincipalName) -> BackendResult<()>;

    /// Try to authenticate as the principal.
    ///
    /// Returns `Ok(false)` when the backend rejects the credentials and
    /// `Err` when the attempt itself could not be made.
    async fn test_authenticate(&mut self, name: &PrincipalName, secret: &Secret) -> BackendResult<bool>;
}

/// Trait for durable rotation history.
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Append a record.
    async fn append(&self, record: &RotationRecord) -> Result<()>;

    /// Read every record in the requested order.
    async fn list(&self, order: HistoryOrder) -> Result<Vec<RotationRecord>>;
}

/// Trait for durable expiry schedules.
#[async_trait]
pub trait ExpiryStore: Send + Sync {
    /// Get the schedule for a principal.
    async fn get(&self, principal: &str) -> Result<Option<ExpirySchedule>>;

    /// Store the schedule unless one exists for the principal.
    ///
    /// Returns `true` if the schedule was stored.
    async fn insert_if_absent(&self, schedule: &ExpirySchedule) -> Result<bool>;

    /// Store the schedule, replacing any existing one.
    async fn upsert(&self, schedule: &ExpirySchedule) -> Result<()>;

    /// Read every schedule.
    async fn list(&self) -> Result<Vec<ExpirySchedule>>;
}
