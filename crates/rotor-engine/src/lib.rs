//! # Rotor Engine
//!
//! Zero-downtime credential rotation:
//! - **Single rotation**: replace a principal's secret in place and verify it
//! - **Dual rotation**: create a shadow principal, hold a transition window
//!   during which both credentials work, then retire the old principal
//! - **Resume and reconcile**: find and finish dual rotations that stopped
//!   after an irreversible step
//! - **Expiry tracking** and an append-only **audit log**
//!
//! ## Example
//!
//! ```ignore
//! let engine = RotationEngine::new(store, AuditLog::new(audit_store), ExpiryTracker::new(expiry_store));
//! let report = engine.rotate_dual(&principal, Duration::from_secs(30)).await;
//! if let Some(secret) = &report.secret {
//!     distribute(secret.expose());
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod audit;
pub mod engine;
pub mod expiry;
pub mod reconcile;
pub mod report;
pub mod state;

pub use audit::{AuditLog, FileAuditStore, MemoryAuditStore};
pub use engine::{EngineSettings, RotationEngine};
pub use expiry::{ExpiringCredential, ExpiryTracker, FileExpiryStore, MemoryExpiryStore, ScheduleOutcome};
pub use reconcile::{PendingRotation, PendingState};
pub use report::RotationReport;
pub use state::{RotationControl, RotationState};
