//! Credential expiry tracking.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use rotor_types::{ExpirySchedule, ExpiryStore, PrincipalName, Result, RotationError};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Result of a [`ExpiryTracker::schedule`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleOutcome {
    /// Whether a new schedule was written
    pub created: bool,
    /// The schedule in effect after the call
    pub schedule: ExpirySchedule,
}

/// A schedule found by an expiry scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpiringCredential {
    /// The schedule
    pub schedule: ExpirySchedule,
    /// Whether it had already expired at scan time
    pub expired: bool,
}

/// Tracks when each principal's credential is due for rotation.
///
/// Schedules are only written on request; rotations never update them
/// implicitly.
#[derive(Clone)]
pub struct ExpiryTracker {
    store: Arc<dyn ExpiryStore>,
}

impl ExpiryTracker {
    /// Create a tracker over a store.
    pub fn new(store: Arc<dyn ExpiryStore>) -> Self {
        Self { store }
    }

    /// Schedule expiry `ttl` from now, unless a schedule already exists.
    pub async fn schedule(&self, principal: &PrincipalName, ttl: Duration) -> Result<ScheduleOutcome> {
        self.schedule_at(principal, ttl, Utc::now()).await
    }

    /// [`schedule`](Self::schedule) with an explicit clock.
    pub async fn schedule_at(
        &self,
        principal: &PrincipalName,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<ScheduleOutcome> {
        check_ttl(ttl)?;

        let candidate = ExpirySchedule::starting_at(principal, now, ttl)?;
        if self.store.insert_if_absent(&candidate).await? {
            info!(principal = %principal, expires_at = %candidate.expires_at, "Scheduled expiry");
            return Ok(ScheduleOutcome {
                created: true,
                schedule: candidate,
            });
        }

        let existing = self.store.get(principal.as_str()).await?.ok_or_else(|| {
            RotationError::Bug(format!("Expiry schedule for '{}' vanished", principal))
        })?;
        debug!(principal = %principal, expires_at = %existing.expires_at, "Expiry already scheduled");
        Ok(ScheduleOutcome {
            created: false,
            schedule: existing,
        })
    }

    /// Overwrite the schedule with expiry `ttl` from now.
    pub async fn renew(&self, principal: &PrincipalName, ttl: Duration) -> Result<ExpirySchedule> {
        self.renew_at(principal, ttl, Utc::now()).await
    }

    /// [`renew`](Self::renew) with an explicit clock.
    pub async fn renew_at(
        &self,
        principal: &PrincipalName,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<ExpirySchedule> {
        check_ttl(ttl)?;

        let schedule = ExpirySchedule::starting_at(principal, now, ttl)?;
        self.store.upsert(&schedule).await?;
        info!(principal = %principal, expires_at = %schedule.expires_at, "Renewed expiry");
        Ok(schedule)
    }

    /// Current schedule for a principal.
    pub async fn get(&self, principal: &PrincipalName) -> Result<Option<ExpirySchedule>> {
        self.store.get(principal.as_str()).await
    }

    /// Schedules expiring within `horizon` from now, soonest first.
    ///
    /// Already-expired schedules are included and flagged.
    pub async fn scan_expiring_soon(&self, horizon: Duration) -> Result<Vec<ExpiringCredential>> {
        self.scan_at(horizon, Utc::now()).await
    }

    /// [`scan_expiring_soon`](Self::scan_expiring_soon) with an explicit clock.
    pub async fn scan_at(&self, horizon: Duration, now: DateTime<Utc>) -> Result<Vec<ExpiringCredential>> {
        if horizon < Duration::zero() {
            return Err(RotationError::Validation(format!(
                "Expiry horizon must not be negative, got {}s",
                horizon.num_seconds()
            )));
        }

        let cutoff = now.checked_add_signed(horizon).ok_or_else(|| {
            RotationError::Validation(format!(
                "Expiry horizon of {} days is out of range",
                horizon.num_days()
            ))
        })?;
        let mut due: Vec<ExpiringCredential> = self
            .store
            .list()
            .await?
            .into_iter()
            .filter(|s| s.expires_at <= cutoff)
            .map(|schedule| ExpiringCredential {
                expired: schedule.is_expired_at(now),
                schedule,
            })
            .collect();

        due.sort_by(|a, b| {
            a.schedule
                .expires_at
                .cmp(&b.schedule.expires_at)
                .then_with(|| a.schedule.principal.cmp(&b.schedule.principal))
        });
        Ok(due)
    }
}

fn check_ttl(ttl: Duration) -> Result<()> {
    if ttl <= Duration::zero() {
        return Err(RotationError::Validation(format!(
            "TTL must be positive, got {}s",
            ttl.num_seconds()
        )));
    }
    Ok(())
}

/// Expiry store held in memory.
#[derive(Debug, Default)]
pub struct MemoryExpiryStore {
    schedules: Mutex<BTreeMap<String, ExpirySchedule>>,
}

impl MemoryExpiryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ExpiryStore for MemoryExpiryStore {
    async fn get(&self, principal: &str) -> Result<Option<ExpirySchedule>> {
        Ok(self.schedules.lock().get(principal).cloned())
    }

    async fn insert_if_absent(&self, schedule: &ExpirySchedule) -> Result<bool> {
        let mut schedules = self.schedules.lock();
        if schedules.contains_key(&schedule.principal) {
            return Ok(false);
        }
        schedules.insert(schedule.principal.clone(), schedule.clone());
        Ok(true)
    }

    async fn upsert(&self, schedule: &ExpirySchedule) -> Result<()> {
        self.schedules
            .lock()
            .insert(schedule.principal.clone(), schedule.clone());
        Ok(())
    }

    async fn list(&self) -> Result<Vec<ExpirySchedule>> {
        Ok(self.schedules.lock().values().cloned().collect())
    }
}

/// Expiry store kept as a JSON map from principal to schedule.
///
/// Every write replaces the file atomically.
#[derive(Debug)]
pub struct FileExpiryStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileExpiryStore {
    /// File name used inside a ledger directory.
    pub const FILE_NAME: &'static str = "expiry.json";

    /// Store schedules in `dir/expiry.json`.
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(Self::FILE_NAME),
            lock: Mutex::new(()),
        }
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<BTreeMap<String, ExpirySchedule>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let content = std::fs::read_to_string(&self.path)?;
        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        Ok(serde_json::from_str(&content)?)
    }

    fn save(&self, schedules: &BTreeMap<String, ExpirySchedule>) -> Result<()> {
        let dir = self
            .path
            .parent()
            .ok_or_else(|| RotationError::Bug("Expiry file has no parent directory".to_string()))?;
        std::fs::create_dir_all(dir)?;

        let content = serde_json::to_string_pretty(schedules)?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(content.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| RotationError::Io(e.error))?;
        Ok(())
    }
}

#[async_trait]
impl ExpiryStore for FileExpiryStore {
    async fn get(&self, principal: &str) -> Result<Option<ExpirySchedule>> {
        let _guard = self.lock.lock();
        Ok(self.load()?.remove(principal))
    }

    async fn insert_if_absent(&self, schedule: &ExpirySchedule) -> Result<bool> {
        let _guard = self.lock.lock();
        let mut schedules = self.load()?;
        if schedules.contains_key(&schedule.principal) {
            return Ok(false);
        }
        schedules.insert(schedule.principal.clone(), schedule.clone());
        self.save(&schedules)?;
        Ok(true)
    }

    async fn upsert(&self, schedule: &ExpirySchedule) -> Result<()> {
        let _guard = self.lock.lock();
        let mut schedules = self.load()?;
        schedules.insert(schedule.principal.clone(), schedule.clone());
        self.save(&schedules)
    }

    async fn list(&self) -> Result<Vec<ExpirySchedule>> {
        let _guard = self.lock.lock();
        Ok(self.load()?.into_values().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn name(s: &str) -> PrincipalName {
        PrincipalName::new(s).unwrap()
    }

    fn tracker() -> ExpiryTracker {
        ExpiryTracker::new(Arc::new(MemoryExpiryStore::new()))
    }

    #[tokio::test]
    async fn test_schedule_is_set_if_absent() {
        let tracker = tracker();
        let now = Utc::now();

        let first = tracker.schedule_at(&name("svc_a"), Duration::days(90), now).await.unwrap();
        assert!(first.created);

        let later = now + Duration::days(1);
        let second = tracker.schedule_at(&name("svc_a"), Duration::days(30), later).await.unwrap();
        assert!(!second.created);
        assert_eq!(second.schedule.expires_at, now + Duration::days(90));
    }

    #[tokio::test]
    async fn test_renew_overwrites() {
        let tracker = tracker();
        let now = Utc::now();
        tracker.schedule_at(&name("svc_a"), Duration::days(90), now).await.unwrap();

        let renewed = tracker.renew_at(&name("svc_a"), Duration::days(30), now).await.unwrap();
        assert_eq!(renewed.expires_at, now + Duration::days(30));
        assert_eq!(
            tracker.get(&name("svc_a")).await.unwrap().unwrap().expires_at,
            now + Duration::days(30)
        );
    }

    #[tokio::test]
    async fn test_non_positive_ttl_rejected() {
        let tracker = tracker();
        assert!(matches!(
            tracker.schedule(&name("svc_a"), Duration::zero()).await,
            Err(RotationError::Validation(_))
        ));
        assert!(tracker.renew(&name("svc_a"), Duration::days(-1)).await.is_err());
    }

    #[tokio::test]
    async fn test_scan_orders_and_flags_expired() {
        let tracker = tracker();
        let now = Utc::now();
        let past = now - Duration::days(10);

        tracker.schedule_at(&name("soon"), Duration::days(3), now).await.unwrap();
        tracker.schedule_at(&name("later"), Duration::days(30), now).await.unwrap();
        tracker.schedule_at(&name("overdue"), Duration::days(1), past).await.unwrap();

        let due = tracker.scan_at(Duration::days(7), now).await.unwrap();
        let names: Vec<&str> = due.iter().map(|d| d.schedule.principal.as_str()).collect();
        assert_eq!(names, vec!["overdue", "soon"]);
        assert!(due[0].expired);
        assert!(!due[1].expired);
    }

    #[tokio::test]
    async fn test_scan_is_read_only() {
        let tracker = tracker();
        let now = Utc::now();
        tracker.schedule_at(&name("svc_a"), Duration::days(3), now).await.unwrap();

        let first = tracker.scan_at(Duration::days(7), now).await.unwrap();
        let second = tracker.scan_at(Duration::days(7), now).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_negative_horizon_rejected() {
        assert!(tracker().scan_expiring_soon(Duration::days(-1)).await.is_err());
    }

    #[tokio::test]
    async fn test_unrepresentable_ttl_and_horizon_rejected() {
        let tracker = tracker();
        let huge = Duration::days(100_000_000);

        assert!(matches!(
            tracker.schedule(&name("svc_a"), huge).await,
            Err(RotationError::Validation(_))
        ));
        assert!(matches!(
            tracker.renew(&name("svc_a"), huge).await,
            Err(RotationError::Validation(_))
        ));
        assert!(tracker.get(&name("svc_a")).await.unwrap().is_none());
        assert!(matches!(
            tracker.scan_expiring_soon(huge).await,
            Err(RotationError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_file_store_persists() {
        let dir = TempDir::new().unwrap();
        let now = Utc::now();
        {
            let tracker = ExpiryTracker::new(Arc::new(FileExpiryStore::new(dir.path())));
            tracker.schedule_at(&name("svc_a"), Duration::days(90), now).await.unwrap();
        }

        let store = FileExpiryStore::new(dir.path());
        assert!(store.path().exists());
        let reloaded = store.get("svc_a").await.unwrap().unwrap();
        assert_eq!(reloaded.expires_at, now + Duration::days(90));
        assert!(!store
            .insert_if_absent(&ExpirySchedule::starting_at(&name("svc_a"), now, Duration::days(1)).unwrap())
            .await
            .unwrap());
    }
}
