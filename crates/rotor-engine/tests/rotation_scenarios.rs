//! End-to-end rotation scenarios against the in-memory credential store.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use mockall::mock;
use rotor_engine::{
    AuditLog, EngineSettings, ExpiryTracker, MemoryAuditStore, MemoryExpiryStore, PendingState,
    RotationControl, RotationEngine, RotationState,
};
use rotor_services::{FaultMode, MemoryCredentialStore};
use rotor_types::{
    AuditStore, FailureKind, Grant, HistoryOrder, PartialState, PrincipalName, RotationError,
    RotationRecord, RotationStep, RotationType, StoreOp,
};
use std::sync::Arc;
use std::time::Duration;

const INITIAL: &str = "InitialPass123!";

fn name(s: &str) -> PrincipalName {
    PrincipalName::new(s).unwrap()
}

fn app_grants() -> Vec<Grant> {
    Grant::application_defaults("app_db", "public")
}

fn store_with(principals: &[&str]) -> MemoryCredentialStore {
    let store = MemoryCredentialStore::new();
    for principal in principals {
        store.insert_principal(&name(principal), INITIAL, app_grants());
    }
    store
}

struct Harness {
    store: MemoryCredentialStore,
    audit: Arc<MemoryAuditStore>,
    engine: RotationEngine,
}

impl Harness {
    fn new(store: MemoryCredentialStore) -> Self {
        Self::with_settings(store, EngineSettings::default())
    }

    fn with_settings(store: MemoryCredentialStore, settings: EngineSettings) -> Self {
        let audit = Arc::new(MemoryAuditStore::new());
        let engine = RotationEngine::new(
            Arc::new(store.clone()),
            AuditLog::new(audit.clone()),
            ExpiryTracker::new(Arc::new(MemoryExpiryStore::new())),
        )
        .with_settings(settings);
        Self { store, audit, engine }
    }

    async fn history(&self) -> Vec<RotationRecord> {
        self.engine.audit().history(HistoryOrder::Ascending).await.unwrap()
    }
}

#[tokio::test]
async fn single_rotation_replaces_secret() {
    let h = Harness::new(store_with(&["svc_a"]));

    let report = h.engine.rotate_single(&name("svc_a")).await;

    assert!(report.is_success(), "{:?}", report.error());
    let secret = report.secret.as_ref().unwrap();
    assert!(h.store.authenticates("svc_a", secret.expose()));
    assert!(!h.store.authenticates("svc_a", INITIAL));
    assert!(report.visited(RotationState::Verified));

    let history = h.history().await;
    assert_eq!(history.len(), 1);
    assert!(history[0].is_success());
    assert_eq!(history[0].rotation_type, RotationType::Single);
    assert!(!history[0].note.contains(secret.expose()));
    assert_eq!(h.store.open_sessions(), 0);
}

#[tokio::test]
async fn single_rotation_without_verification() {
    let h = Harness::new(store_with(&["svc_a"]));

    let report = h.engine.rotate_single_with(&name("svc_a"), false).await;

    assert!(report.is_success());
    assert!(report.visited(RotationState::SecretApplied));
    assert!(!report.visited(RotationState::Verified));
}

#[tokio::test]
async fn single_rotation_alter_failure_keeps_old_secret() {
    let h = Harness::new(store_with(&["svc_a"]));
    h.store.fail_on(StoreOp::Alter, FaultMode::Before, 1);

    let report = h.engine.rotate_single(&name("svc_a")).await;

    match report.error() {
        Some(RotationError::Backend { step, source }) => {
            assert_eq!(*step, RotationStep::Alter);
            assert_eq!(source.operation, StoreOp::Alter);
        }
        other => panic!("expected backend error, got {:?}", other),
    }
    assert!(report.secret.is_none());
    assert!(h.store.authenticates("svc_a", INITIAL));

    let history = h.history().await;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].failure, Some(FailureKind::BackendError));
    assert_eq!(history[0].step, Some(RotationStep::Alter));
    assert_eq!(h.store.open_sessions(), 0);
}

#[tokio::test]
async fn single_rotation_verification_failure_is_not_rolled_back() {
    let h = Harness::new(store_with(&["svc_a"]));
    h.store.refuse_logins(true);

    let report = h.engine.rotate_single(&name("svc_a")).await;

    assert!(matches!(report.error(), Some(RotationError::VerificationFailed { .. })));
    let secret = report.secret.as_ref().unwrap();
    assert!(h.store.authenticates("svc_a", secret.expose()));

    let history = h.history().await;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].failure, Some(FailureKind::VerificationFailed));
    assert_eq!(h.store.open_sessions(), 0);
}

#[tokio::test]
async fn dual_rotation_retires_old_principal() {
    let h = Harness::new(store_with(&["svc_b"]));

    let report = h.engine.rotate_dual(&name("svc_b"), Duration::ZERO).await;

    assert!(report.is_success(), "{:?}", report.error());
    assert_eq!(h.store.principal_names(), vec!["svc_b".to_string()]);

    let secret = report.secret.as_ref().unwrap();
    assert!(h.store.authenticates("svc_b", secret.expose()));
    assert!(!h.store.authenticates("svc_b", INITIAL));
    assert_eq!(h.store.principal("svc_b").unwrap().grants, app_grants());

    assert_eq!(
        report.states,
        vec![
            RotationState::Start,
            RotationState::ShadowCreated,
            RotationState::TransitionOpen,
            RotationState::TransitionVerified,
            RotationState::OldRevoked,
            RotationState::OldDropped,
            RotationState::OldRetired,
            RotationState::Recorded(rotor_types::Outcome::Success),
        ]
    );

    let history = h.history().await;
    assert_eq!(history.len(), 1);
    assert!(history[0].is_success());
    assert_eq!(history[0].rotation_type, RotationType::Dual);
    assert_eq!(h.store.open_sessions(), 0);
}

#[tokio::test]
async fn dual_rotation_reapplies_secret_cleared_by_rename() {
    let h = Harness::new(store_with(&["svc_b"]));
    h.store.rename_clears_secret(true);

    let report = h.engine.rotate_dual(&name("svc_b"), Duration::ZERO).await;

    assert!(report.is_success(), "{:?}", report.error());
    let secret = report.secret.as_ref().unwrap();
    assert!(h.store.authenticates("svc_b", secret.expose()));
    assert_eq!(h.store.open_sessions(), 0);
}

#[tokio::test]
async fn unusable_secret_after_rename_is_partial() {
    let h = Harness::new(store_with(&["svc_b"]));
    h.store.rename_clears_secret(true);
    h.store.fail_on(StoreOp::Alter, FaultMode::Before, 1);

    let report = h.engine.rotate_dual(&name("svc_b"), Duration::ZERO).await;

    match report.error() {
        Some(RotationError::PartialRotation { step, state, .. }) => {
            assert_eq!(*step, RotationStep::Rename);
            assert_eq!(*state, PartialState::Renamed);
        }
        other => panic!("expected partial rotation, got {:?}", other),
    }
    assert!(!report.visited(RotationState::OldRetired));
    assert_eq!(h.store.principal_names(), vec!["svc_b".to_string()]);
    assert_eq!(h.history().await[0].failure, Some(FailureKind::PartialRotation));

    // A single rotation gives the renamed principal a working secret
    let recovered = h.engine.rotate_single(&name("svc_b")).await;
    assert!(recovered.is_success(), "{:?}", recovered.error());
    assert!(h
        .store
        .authenticates("svc_b", recovered.secret.as_ref().unwrap().expose()));
}

#[tokio::test]
async fn dual_rotation_revoke_failure_is_partial_and_resumable() {
    let h = Harness::new(store_with(&["svc_b"]));
    h.store.fail_on(StoreOp::RevokeAll, FaultMode::After, 1);

    let report = h.engine.rotate_dual(&name("svc_b"), Duration::ZERO).await;

    match report.error() {
        Some(RotationError::PartialRotation { step, shadow, state, .. }) => {
            assert_eq!(*step, RotationStep::Revoke);
            assert_eq!(shadow, "svc_b_new");
            assert_eq!(*state, PartialState::RevokeIncomplete);
        }
        other => panic!("expected partial rotation, got {:?}", other),
    }
    assert_eq!(
        h.store.principal_names(),
        vec!["svc_b".to_string(), "svc_b_new".to_string()]
    );
    let secret = report.secret.clone().unwrap();
    assert_eq!(h.history().await[0].failure, Some(FailureKind::PartialRotation));

    let pending = h.engine.reconcile_scan().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].principal.as_str(), "svc_b");
    assert_eq!(pending[0].shadow.as_str(), "svc_b_new");
    assert!(pending[0].original_exists && pending[0].shadow_exists);
    assert_eq!(pending[0].state, PendingState::Partial(PartialState::OldRevoked));

    let resumed = h.engine.resume_dual(&name("svc_b")).await;
    assert!(resumed.is_success(), "{:?}", resumed.error());
    assert!(resumed.secret.is_none());
    assert_eq!(h.store.principal_names(), vec!["svc_b".to_string()]);
    assert!(h.store.authenticates("svc_b", secret.expose()));
    assert!(h.engine.reconcile_scan().await.unwrap().is_empty());

    assert_eq!(h.history().await.len(), 2);
    assert_eq!(h.store.open_sessions(), 0);
}

#[tokio::test]
async fn rerun_after_partial_rotation_requires_resume() {
    let h = Harness::new(store_with(&["svc_b"]));
    h.store.fail_on(StoreOp::RevokeAll, FaultMode::Before, 1);

    let first = h.engine.rotate_dual(&name("svc_b"), Duration::ZERO).await;
    assert!(first.error().map_or(false, |e| e.is_partial()));
    // Nothing was revoked, so only the audit record marks the rotation as partial
    assert!(!h.store.principal("svc_b").unwrap().is_revoked());

    let second = h.engine.rotate_dual(&name("svc_b"), Duration::ZERO).await;
    match second.error() {
        Some(RotationError::ResumeRequired { state, .. }) => {
            assert_eq!(*state, PartialState::RevokeIncomplete)
        }
        other => panic!("expected resume required, got {:?}", other),
    }
    assert!(h.store.authenticates("svc_b_new", first.secret.as_ref().unwrap().expose()));

    // The refusal record keeps the rotation marked as partial
    let third = h.engine.rotate_dual(&name("svc_b"), Duration::ZERO).await;
    assert!(matches!(third.error(), Some(RotationError::ResumeRequired { .. })));

    let resumed = h.engine.resume_dual(&name("svc_b")).await;
    assert!(resumed.is_success(), "{:?}", resumed.error());
    assert!(resumed.visited(RotationState::OldRevoked));
    assert_eq!(h.store.principal_names(), vec!["svc_b".to_string()]);

    let history = h.history().await;
    assert_eq!(history.len(), 4);
    assert_eq!(history[1].failure, Some(FailureKind::ResumeRequired));
}

#[tokio::test]
async fn failed_resume_keeps_rotation_partial() {
    let h = Harness::new(store_with(&["svc_b"]));
    h.store.fail_on(StoreOp::RevokeAll, FaultMode::Before, 1);

    let first = h.engine.rotate_dual(&name("svc_b"), Duration::ZERO).await;
    assert!(first.error().map_or(false, |e| e.is_partial()));
    let issued = first.secret.clone().unwrap();

    h.store.fail_on(StoreOp::Session, FaultMode::Before, 1);
    let resume = h.engine.resume_dual(&name("svc_b")).await;
    match resume.error() {
        Some(RotationError::Backend { step, .. }) => assert_eq!(*step, RotationStep::Inspect),
        other => panic!("expected backend error, got {:?}", other),
    }

    let pending = h.engine.reconcile_scan().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].state, PendingState::Partial(PartialState::RevokeIncomplete));

    let rerun = h.engine.rotate_dual(&name("svc_b"), Duration::ZERO).await;
    assert!(matches!(rerun.error(), Some(RotationError::ResumeRequired { .. })));
    assert!(h.store.authenticates("svc_b_new", issued.expose()));

    let resumed = h.engine.resume_dual(&name("svc_b")).await;
    assert!(resumed.is_success(), "{:?}", resumed.error());
    assert!(h.store.authenticates("svc_b", issued.expose()));
    assert_eq!(h.store.open_sessions(), 0);
}

#[tokio::test]
async fn resume_after_rename_failure() {
    let h = Harness::new(store_with(&["svc_b"]));
    h.store.fail_on(StoreOp::Rename, FaultMode::Before, 1);

    let report = h.engine.rotate_dual(&name("svc_b"), Duration::ZERO).await;
    match report.error() {
        Some(RotationError::PartialRotation { step, state, .. }) => {
            assert_eq!(*step, RotationStep::Rename);
            assert_eq!(*state, PartialState::OldDropped);
        }
        other => panic!("expected partial rotation, got {:?}", other),
    }
    assert_eq!(h.store.principal_names(), vec!["svc_b_new".to_string()]);

    let resumed = h.engine.resume_dual(&name("svc_b")).await;
    assert!(resumed.is_success(), "{:?}", resumed.error());
    assert!(!resumed.visited(RotationState::OldDropped));
    assert!(resumed.visited(RotationState::OldRetired));
    assert!(h
        .store
        .authenticates("svc_b", report.secret.as_ref().unwrap().expose()));
}

#[tokio::test]
async fn resume_without_partial_rotation_fails_cleanly() {
    let h = Harness::new(store_with(&["svc_b"]));

    let report = h.engine.resume_dual(&name("svc_b")).await;

    assert!(matches!(report.error(), Some(RotationError::NothingToResume { .. })));
    assert_eq!(h.history().await.len(), 1);
    assert_eq!(h.store.principal_names(), vec!["svc_b".to_string()]);
}

#[tokio::test]
async fn cancelled_transition_drops_shadow() {
    let h = Harness::new(store_with(&["svc_b"]));
    let control = RotationControl::new();
    control.cancel();

    let report = h
        .engine
        .rotate_dual_with(&name("svc_b"), Duration::from_secs(3600), &control)
        .await;

    assert!(matches!(report.error(), Some(RotationError::Cancelled { .. })));
    assert!(report.secret.is_none());
    assert_eq!(h.store.principal_names(), vec!["svc_b".to_string()]);
    assert!(h.store.authenticates("svc_b", INITIAL));
    assert_eq!(h.history().await[0].failure, Some(FailureKind::Cancelled));
    assert_eq!(h.store.open_sessions(), 0);
}

#[tokio::test]
async fn cancel_while_window_is_open() {
    let h = Harness::new(store_with(&["svc_b"]));
    let control = RotationControl::new();
    let mut states = control.subscribe();
    let svc_b = name("svc_b");

    let (report, _) = tokio::join!(
        h.engine
            .rotate_dual_with(&svc_b, Duration::from_secs(3600), &control),
        async {
            states
                .wait_for(|s| *s == RotationState::TransitionOpen)
                .await
                .unwrap();
            control.cancel();
        }
    );

    assert!(matches!(report.error(), Some(RotationError::Cancelled { .. })));
    assert_eq!(
        control.state(),
        RotationState::Recorded(rotor_types::Outcome::Failed)
    );
    assert_eq!(h.store.principal_names(), vec!["svc_b".to_string()]);
}

#[tokio::test]
async fn aborted_shadow_kept_without_rollback_is_replaced_next_time() {
    let settings = EngineSettings {
        rollback_shadow_on_abort: false,
        ..EngineSettings::default()
    };
    let h = Harness::with_settings(store_with(&["svc_b"]), settings);
    h.store.refuse_logins(true);

    let aborted = h.engine.rotate_dual(&name("svc_b"), Duration::ZERO).await;
    assert!(matches!(aborted.error(), Some(RotationError::VerificationFailed { .. })));
    assert_eq!(
        h.store.principal_names(),
        vec!["svc_b".to_string(), "svc_b_new".to_string()]
    );

    let pending = h.engine.reconcile_scan().await.unwrap();
    assert_eq!(pending[0].state, PendingState::StaleShadow);
    assert!(!pending[0].needs_resume());

    h.store.refuse_logins(false);
    let report = h.engine.rotate_dual(&name("svc_b"), Duration::ZERO).await;
    assert!(report.is_success(), "{:?}", report.error());
    assert_eq!(h.store.principal_names(), vec!["svc_b".to_string()]);
}

#[tokio::test]
async fn shadow_creation_failure_leaves_original_untouched() {
    let h = Harness::new(store_with(&["svc_b"]));
    h.store.fail_on(StoreOp::Create, FaultMode::Before, 1);

    let report = h.engine.rotate_dual(&name("svc_b"), Duration::ZERO).await;

    match report.error() {
        Some(RotationError::Backend { step, .. }) => assert_eq!(*step, RotationStep::CreateShadow),
        other => panic!("expected backend error, got {:?}", other),
    }
    assert_eq!(h.store.principal_names(), vec!["svc_b".to_string()]);
    assert!(h.store.authenticates("svc_b", INITIAL));
    assert_eq!(h.store.open_sessions(), 0);
}

#[tokio::test]
async fn dual_rotation_of_missing_principal_fails() {
    let h = Harness::new(store_with(&[]));

    let report = h.engine.rotate_dual(&name("ghost"), Duration::ZERO).await;

    match report.error() {
        Some(RotationError::Backend { step, .. }) => assert_eq!(*step, RotationStep::Inspect),
        other => panic!("expected backend error, got {:?}", other),
    }
    assert!(h.store.principal_names().is_empty());
    assert_eq!(h.history().await.len(), 1);
}

#[tokio::test]
async fn overlong_shadow_name_is_rejected_before_backend_calls() {
    let h = Harness::new(MemoryCredentialStore::new());
    let long = name(&"a".repeat(60));

    let report = h.engine.rotate_dual(&long, Duration::ZERO).await;

    assert!(matches!(report.error(), Some(RotationError::Validation(_))));
    assert_eq!(h.store.sessions_opened(), 0);
    assert_eq!(h.history().await.len(), 1);
}

#[tokio::test]
async fn rotations_of_different_principals_run_concurrently() {
    let h = Harness::new(store_with(&["svc_a", "svc_b"]));

    let svc_a = name("svc_a");
    let svc_b = name("svc_b");
    let (a, b) = tokio::join!(
        h.engine.rotate_single(&svc_a),
        h.engine.rotate_dual(&svc_b, Duration::from_millis(10)),
    );

    assert!(a.is_success() && b.is_success());
    assert_eq!(h.history().await.len(), 2);
    assert_eq!(h.store.open_sessions(), 0);
}

#[tokio::test]
async fn provision_creates_principal_with_grants() {
    let h = Harness::new(MemoryCredentialStore::new());

    let secret = h
        .engine
        .provision(&name("svc_c"), &app_grants())
        .await
        .unwrap();

    assert!(h.store.authenticates("svc_c", secret.expose()));
    assert_eq!(h.store.principal("svc_c").unwrap().grants, app_grants());
    assert!(h.history().await.is_empty());
}

#[tokio::test]
async fn expiry_schedule_and_scan() {
    let h = Harness::new(MemoryCredentialStore::new());
    let tracker = h.engine.expiry();
    let now = Utc::now();

    let first = tracker
        .schedule_at(&name("svc_a"), ChronoDuration::days(90), now)
        .await
        .unwrap();
    let second = tracker
        .schedule_at(&name("svc_a"), ChronoDuration::days(30), now)
        .await
        .unwrap();
    assert!(first.created && !second.created);
    assert_eq!(second.schedule.expires_at, now + ChronoDuration::days(90));

    tracker
        .schedule_at(&name("svc_soon"), ChronoDuration::days(3), now)
        .await
        .unwrap();
    tracker
        .schedule_at(&name("svc_later"), ChronoDuration::days(30), now)
        .await
        .unwrap();

    let due = tracker.scan_at(ChronoDuration::days(7), now).await.unwrap();
    let names: Vec<&str> = due.iter().map(|d| d.schedule.principal.as_str()).collect();
    assert_eq!(names, vec!["svc_soon"]);

    // Rotation never touches schedules
    h.store.insert_principal(&name("svc_soon"), INITIAL, app_grants());
    assert!(h.engine.rotate_single(&name("svc_soon")).await.is_success());
    assert_eq!(
        tracker.get(&name("svc_soon")).await.unwrap().unwrap().expires_at,
        now + ChronoDuration::days(3)
    );
}

mock! {
    pub FailingAudit {}

    #[async_trait]
    impl AuditStore for FailingAudit {
        async fn append(&self, record: &RotationRecord) -> rotor_types::Result<()>;
        async fn list(&self, order: HistoryOrder) -> rotor_types::Result<Vec<RotationRecord>>;
    }
}

#[tokio::test]
async fn audit_failure_does_not_change_rotation_outcome() {
    let store = store_with(&["svc_a"]);
    let mut audit = MockFailingAudit::new();
    audit
        .expect_append()
        .times(1)
        .returning(|_| Err(RotationError::Audit("ledger unavailable".to_string())));
    audit.expect_list().returning(|_| Ok(Vec::new()));

    let engine = RotationEngine::new(
        Arc::new(store.clone()),
        AuditLog::new(Arc::new(audit)),
        ExpiryTracker::new(Arc::new(MemoryExpiryStore::new())),
    );

    let report = engine.rotate_single(&name("svc_a")).await;

    assert!(report.is_success());
    assert!(matches!(report.audit_error(), Some(RotationError::Audit(_))));
    assert!(store.authenticates("svc_a", report.secret.as_ref().unwrap().expose()));
}
