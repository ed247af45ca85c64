//! Rotation audit log and its stores.

use async_trait::async_trait;
use parking_lot::Mutex;
use rotor_types::{AuditStore, HistoryOrder, Result, RotationError, RotationRecord};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Append-only history of rotation attempts.
#[derive(Clone)]
pub struct AuditLog {
    store: Arc<dyn AuditStore>,
}

impl AuditLog {
    /// Create an audit log over a store.
    pub fn new(store: Arc<dyn AuditStore>) -> Self {
        Self { store }
    }

    /// Append a record.
    ///
    /// Failures are logged and returned as [`RotationError::Audit`].
    pub async fn record(&self, record: &RotationRecord) -> Result<()> {
        match self.store.append(record).await {
            Ok(()) => {
                debug!(id = %record.id, principal = %record.principal, "Recorded rotation");
                Ok(())
            }
            Err(e) => {
                error!(
                    id = %record.id,
                    principal = %record.principal,
                    outcome = %record.outcome,
                    error = %e,
                    "Failed to write audit record"
                );
                Err(match e {
                    RotationError::Audit(msg) => RotationError::Audit(msg),
                    other => RotationError::Audit(other.to_string()),
                })
            }
        }
    }

    /// Every record, ordered by time.
    pub async fn history(&self, order: HistoryOrder) -> Result<Vec<RotationRecord>> {
        self.store.list(order).await
    }

    /// Records for one principal, ordered by time.
    pub async fn history_for(&self, principal: &str, order: HistoryOrder) -> Result<Vec<RotationRecord>> {
        Ok(self
            .history(order)
            .await?
            .into_iter()
            .filter(|r| r.principal == principal)
            .collect())
    }
}

/// Sort records by time. Records with equal timestamps keep append order
/// when ascending and come out newest-appended first when descending.
fn order_records(mut records: Vec<RotationRecord>, order: HistoryOrder) -> Vec<RotationRecord> {
    records.sort_by(|a, b| a.recorded_at.cmp(&b.recorded_at));
    if order == HistoryOrder::Descending {
        records.reverse();
    }
    records
}

/// Audit store held in memory.
#[derive(Debug, Default)]
pub struct MemoryAuditStore {
    records: Mutex<Vec<RotationRecord>>,
}

impl MemoryAuditStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// Whether no records are stored.
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

#[async_trait]
impl AuditStore for MemoryAuditStore {
    async fn append(&self, record: &RotationRecord) -> Result<()> {
        self.records.lock().push(record.clone());
        Ok(())
    }

    async fn list(&self, order: HistoryOrder) -> Result<Vec<RotationRecord>> {
        let records = self.records.lock().clone();
        Ok(order_records(records, order))
    }
}

/// Audit store kept as a JSON-lines file.
///
/// One record per line, appended; the file is never rewritten.
#[derive(Debug)]
pub struct FileAuditStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileAuditStore {
    /// File name used inside a ledger directory.
    pub const FILE_NAME: &'static str = "audit.jsonl";

    /// Store records in `dir/audit.jsonl`.
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(Self::FILE_NAME),
            write_lock: Mutex::new(()),
        }
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl AuditStore for FileAuditStore {
    async fn append(&self, record: &RotationRecord) -> Result<()> {
        let line = serde_json::to_string(record)
            .map_err(|e| RotationError::Audit(format!("Failed to serialize audit record: {}", e)))?;

        let _guard = self.write_lock.lock();
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                RotationError::Audit(format!("Failed to create ledger directory: {}", e))
            })?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| RotationError::Audit(format!("Failed to open audit file: {}", e)))?;
        writeln!(file, "{}", line)
            .and_then(|_| file.sync_data())
            .map_err(|e| RotationError::Audit(format!("Failed to write audit record: {}", e)))
    }

    async fn list(&self, order: HistoryOrder) -> Result<Vec<RotationRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let content = std::fs::read_to_string(&self.path)
            .map_err(|e| RotationError::Audit(format!("Failed to read audit file: {}", e)))?;

        let mut records = Vec::new();
        for (index, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<RotationRecord>(line) {
                Ok(record) => records.push(record),
                Err(e) => warn!(line = index + 1, error = %e, "Skipping unreadable audit record"),
            }
        }

        Ok(order_records(records, order))
    }
}
