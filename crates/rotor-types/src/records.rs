//! Principals, grants, and the records kept about rotations.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;
use crate::enums::{FailureKind, Outcome, Privilege, RotationType};
use crate::errors::{Result, RotationError, RotationStep};
use crate::identifiers::PrincipalName;

/// The object a grant applies to.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantTarget {
    /// A database
    Database(String),
    /// A schema
    Schema(String),
    /// Every table in a schema
    AllTablesInSchema(String),
    /// One table
    Table {
        /// Schema holding the table
        schema: String,
        /// Table name
        table: String,
    },
}

impl fmt::Display for GrantTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GrantTarget::Database(name) => write!(f, "DATABASE {}", name),
            GrantTarget::Schema(name) => write!(f, "SCHEMA {}", name),
            GrantTarget::AllTablesInSchema(name) => write!(f, "ALL TABLES IN SCHEMA {}", name),
            GrantTarget::Table { schema, table } => write!(f, "TABLE {}.{}", schema, table),
        }
    }
}

/// A set of privileges on one target.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Grant {
    /// Granted privileges
    pub privileges: BTreeSet<Privilege>,
    /// Object the privileges apply to
    pub target: GrantTarget,
}

impl Grant {
    /// Create a grant.
    pub fn new(privileges: impl IntoIterator<Item = Privilege>, target: GrantTarget) -> Self {
        Self {
            privileges: privileges.into_iter().collect(),
            target,
        }
    }

    /// The grant set an application service account normally holds:
    /// connect to the database, use the schema, and read/write its tables.
    pub fn application_defaults(database: &str, schema: &str) -> Vec<Grant> {
        vec![
            Grant::new([Privilege::Connect], GrantTarget::Database(database.to_string())),
            Grant::new([Privilege::Usage], GrantTarget::Schema(schema.to_string())),
            Grant::new(
                [Privilege::Select, Privilege::Insert, Privilege::Update, Privilege::Delete],
                GrantTarget::AllTablesInSchema(schema.to_string()),
            ),
        ]
    }
}

impl fmt::Display for Grant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let privileges: Vec<&str> = self.privileges.iter().map(|p| p.keyword()).collect();
        write!(f, "{} ON {}", privileges.join(", "), self.target)
    }
}

/// An authenticatable identity as seen by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// Principal name
    pub name: PrincipalName,
    /// Privileges currently held
    pub grants: Vec<Grant>,
}

impl Principal {
    /// Whether the principal holds no privileges at all.
    pub fn is_revoked(&self) -> bool {
        self.grants.iter().all(|g| g.privileges.is_empty())
    }
}

/// Immutable audit entry for one rotation attempt.
///
/// Never carries the secret itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RotationRecord {
    /// Record ID
    pub id: Uuid,
    /// Principal that was rotated
    pub principal: String,
    /// Rotation protocol
    pub rotation_type: RotationType,
    /// Outcome
    pub outcome: Outcome,
    /// Failure classification, for failed attempts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
    /// Step that failed, for failed attempts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<RotationStep>,
    /// When the attempt concluded
    pub recorded_at: DateTime<Utc>,
    /// Free-text note
    pub note: String,
}

impl RotationRecord {
    /// Record for a successful attempt.
    pub fn success(principal: &PrincipalName, rotation_type: RotationType, note: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            principal: principal.to_string(),
            rotation_type,
            outcome: Outcome::Success,
            failure: None,
            step: None,
            recorded_at: Utc::now(),
            note: note.into(),
        }
    }

    /// Record for a failed attempt.
    pub fn failed(
        principal: &PrincipalName,
        rotation_type: RotationType,
        failure: FailureKind,
        step: Option<RotationStep>,
        note: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            principal: principal.to_string(),
            rotation_type,
            outcome: Outcome::Failed,
            failure: Some(failure),
            step,
            recorded_at: Utc::now(),
            note: note.into(),
        }
    }

    /// Whether the attempt succeeded.
    pub fn is_success(&self) -> bool {
        self.outcome == Outcome::Success
    }
}

/// Ordering for history reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryOrder {
    /// Oldest first
    Ascending,
    /// Newest first
    #[default]
    Descending,
}

/// Expected expiry of a principal's credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpirySchedule {
    /// Principal name
    pub principal: String,
    /// When the schedule was written
    pub scheduled_at: DateTime<Utc>,
    /// When the credential should have been rotated by
    pub expires_at: DateTime<Utc>,
}

impl ExpirySchedule {
    /// Schedule expiring `ttl` after `now`.
    ///
    /// Fails with a validation error when the expiry is not representable.
    pub fn starting_at(principal: &PrincipalName, now: DateTime<Utc>, ttl: Duration) -> Result<Self> {
        let expires_at = now.checked_add_signed(ttl).ok_or_else(|| {
            RotationError::Validation(format!("TTL of {} days is out of range", ttl.num_days()))
        })?;
        Ok(Self {
            principal: principal.to_string(),
            scheduled_at: now,
            expires_at,
        })
    }

    /// Whether the credential has already expired at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_application_defaults() {
        let grants = Grant::application_defaults("app_db", "public");
        assert_eq!(grants.len(), 3);
        assert_eq!(grants[0].to_string(), "CONNECT ON DATABASE app_db");
        assert_eq!(
            grants[2].to_string(),
            "SELECT, INSERT, UPDATE, DELETE ON ALL TABLES IN SCHEMA public"
        );
    }

    #[test]
    fn test_revoked_principal() {
        let name = PrincipalName::new("svc").unwrap();
        let revoked = Principal { name: name.clone(), grants: vec![] };
        assert!(revoked.is_revoked());

        let granted = Principal {
            name,
            grants: Grant::application_defaults("app_db", "public"),
        };
        assert!(!granted.is_revoked());
    }

    #[test]
    fn test_record_serialization_omits_empty_failure() {
        let name = PrincipalName::new("svc_a").unwrap();
        let record = RotationRecord::success(&name, RotationType::Single, "rotated");
        let json = serde_json::to_string(&record).unwrap();
        assert!(!json.contains("failure"));

        let parsed: RotationRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, record);
    }

    #[test]
    fn test_schedule_expiry() {
        let name = PrincipalName::new("svc_a").unwrap();
        let now = Utc::now();
        let schedule = ExpirySchedule::starting_at(&name, now, Duration::days(90)).unwrap();
        assert_eq!(schedule.expires_at - schedule.scheduled_at, Duration::days(90));
        assert!(!schedule.is_expired_at(now));
        assert!(schedule.is_expired_at(now + Duration::days(91)));
    }

    #[test]
    fn test_schedule_beyond_calendar_is_rejected() {
        let name = PrincipalName::new("svc_a").unwrap();
        let result = ExpirySchedule::starting_at(&name, Utc::now(), Duration::days(100_000_000));
        assert!(matches!(result, Err(RotationError::Validation(_))));
    }
}
