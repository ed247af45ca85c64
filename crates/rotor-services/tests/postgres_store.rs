//! PostgreSQL credential store against a real server.
//!
//! Run with `cargo test -p rotor-services -- --ignored` on a host with Docker.

mod common;

use common::{test_database, unique_principal};
use rotor_engine::{
    AuditLog, ExpiryTracker, MemoryAuditStore, MemoryExpiryStore, RotationEngine, RotationState,
};
use rotor_types::{
    CredentialSession, CredentialStore, Grant, GrantTarget, Privilege, Secret, StoreOp,
};
use std::sync::Arc;
use std::time::Duration;

const INITIAL: &str = "InitialPass123!";

fn table_grant(table: &str) -> Grant {
    Grant::new(
        [Privilege::Select, Privilege::Insert, Privilege::Update, Privilege::Delete],
        GrantTarget::Table {
            schema: "public".to_string(),
            table: table.to_string(),
        },
    )
}

async fn session(store: &impl CredentialStore) -> Box<dyn CredentialSession> {
    store.session().await.expect("Failed to open session")
}

#[tokio::test]
#[ignore = "Requires Docker with PostgreSQL"]
async fn test_create_and_describe_principal() {
    let db = test_database().await;
    db.execute("CREATE TABLE orders (id BIGINT PRIMARY KEY)").await;
    let store = db.store().await;
    let mut session = session(&store).await;
    let name = unique_principal("svc_orders");

    session
        .create_principal(&name, &Secret::new(INITIAL), &Grant::application_defaults(&db.name, "public"))
        .await
        .unwrap();

    let principal = session.describe_principal(&name).await.unwrap().unwrap();
    assert!(principal
        .grants
        .contains(&Grant::new([Privilege::Connect], GrantTarget::Database(db.name.clone()))));
    assert!(principal
        .grants
        .contains(&Grant::new([Privilege::Usage], GrantTarget::Schema("public".to_string()))));
    assert!(principal.grants.contains(&table_grant("orders")));
    assert!(!principal.is_revoked());

    assert!(session.list_principals().await.unwrap().contains(&name));
    assert!(session.describe_principal(&unique_principal("svc_absent")).await.unwrap().is_none());
}

#[tokio::test]
#[ignore = "Requires Docker with PostgreSQL"]
async fn test_create_replaces_existing_principal() {
    let db = test_database().await;
    db.execute("CREATE TABLE orders (id BIGINT PRIMARY KEY)").await;
    let store = db.store().await;
    let mut session = session(&store).await;
    let name = unique_principal("svc_orders");

    session
        .create_principal(&name, &Secret::new(INITIAL), &Grant::application_defaults(&db.name, "public"))
        .await
        .unwrap();

    let connect_only = vec![Grant::new([Privilege::Connect], GrantTarget::Database(db.name.clone()))];
    session
        .create_principal(&name, &Secret::new("Replaced456!"), &connect_only)
        .await
        .unwrap();

    let principal = session.describe_principal(&name).await.unwrap().unwrap();
    assert_eq!(principal.grants, connect_only);
    assert!(!session.test_authenticate(&name, &Secret::new(INITIAL)).await.unwrap());
    assert!(session.test_authenticate(&name, &Secret::new("Replaced456!")).await.unwrap());
}

#[tokio::test]
#[ignore = "Requires Docker with PostgreSQL"]
async fn test_authenticate_rejections_are_not_errors() {
    let db = test_database().await;
    let store = db.store().await;
    let mut session = session(&store).await;
    let name = unique_principal("svc_auth");

    session.create_principal(&name, &Secret::new(INITIAL), &[]).await.unwrap();

    assert!(session.test_authenticate(&name, &Secret::new(INITIAL)).await.unwrap());
    assert!(!session.test_authenticate(&name, &Secret::new("wrong")).await.unwrap());
    assert!(!session
        .test_authenticate(&unique_principal("svc_absent"), &Secret::new(INITIAL))
        .await
        .unwrap());
}

#[tokio::test]
#[ignore = "Requires Docker with PostgreSQL"]
async fn test_revoke_all_strips_every_privilege() {
    let db = test_database().await;
    db.execute("CREATE TABLE orders (id BIGINT PRIMARY KEY); CREATE TABLE invoices (id BIGINT)")
        .await;
    let store = db.store().await;
    let mut session = session(&store).await;
    let name = unique_principal("svc_orders");

    session
        .create_principal(&name, &Secret::new(INITIAL), &Grant::application_defaults(&db.name, "public"))
        .await
        .unwrap();
    session.revoke_all(&name).await.unwrap();

    let principal = session.describe_principal(&name).await.unwrap().unwrap();
    assert!(principal.is_revoked(), "left with {:?}", principal.grants);

    let err = session.revoke_all(&unique_principal("svc_absent")).await.unwrap_err();
    assert_eq!(err.operation, StoreOp::RevokeAll);
}

#[tokio::test]
#[ignore = "Requires Docker with PostgreSQL"]
async fn test_rename_keeps_scram_secret() {
    let db = test_database().await;
    let store = db.store().await;
    let mut session = session(&store).await;
    let from = unique_principal("svc_shadow");
    let to = unique_principal("svc_orders");

    session.create_principal(&from, &Secret::new(INITIAL), &[]).await.unwrap();
    session.rename_principal(&from, &to).await.unwrap();

    assert!(!db.role_exists(&from).await);
    assert!(db.password_hash(&to).await.unwrap().starts_with("SCRAM-SHA-256$"));
    assert!(session.test_authenticate(&to, &Secret::new(INITIAL)).await.unwrap());
}

#[tokio::test]
#[ignore = "Requires Docker with PostgreSQL"]
async fn test_rename_clears_md5_secret() {
    let db = test_database().await;
    db.use_md5_passwords().await;
    let store = db.store().await;
    let mut session = session(&store).await;
    let from = unique_principal("svc_shadow");
    let to = unique_principal("svc_orders");

    session.create_principal(&from, &Secret::new(INITIAL), &[]).await.unwrap();
    assert!(db.password_hash(&from).await.unwrap().starts_with("md5"));

    session.rename_principal(&from, &to).await.unwrap();
    assert!(db.password_hash(&to).await.is_none());
    assert!(!session.test_authenticate(&to, &Secret::new(INITIAL)).await.unwrap());

    session.alter_secret(&to, &Secret::new(INITIAL)).await.unwrap();
    assert!(session.test_authenticate(&to, &Secret::new(INITIAL)).await.unwrap());
}

#[tokio::test]
#[ignore = "Requires Docker with PostgreSQL"]
async fn test_drop_principal_is_idempotent() {
    let db = test_database().await;
    let store = db.store().await;
    let mut session = session(&store).await;
    let name = unique_principal("svc_drop");

    session.create_principal(&name, &Secret::new(INITIAL), &[]).await.unwrap();
    session.drop_principal(&name).await.unwrap();
    session.drop_principal(&name).await.unwrap();
    assert!(!db.role_exists(&name).await);
}

async fn assert_dual_rotation_replaces_principal(md5: bool) {
    let db = test_database().await;
    if md5 {
        db.use_md5_passwords().await;
    }
    db.execute("CREATE TABLE orders (id BIGINT PRIMARY KEY)").await;
    let store = Arc::new(db.store().await);
    let engine = RotationEngine::new(
        store.clone(),
        AuditLog::new(Arc::new(MemoryAuditStore::new())),
        ExpiryTracker::new(Arc::new(MemoryExpiryStore::new())),
    );
    let name = unique_principal("svc_orders");
    let shadow = name.shadow(&engine.settings().shadow_suffix).unwrap();

    let old_secret = engine
        .provision(&name, &Grant::application_defaults(&db.name, "public"))
        .await
        .unwrap();
    let mut session = session(store.as_ref()).await;
    let before = session.describe_principal(&name).await.unwrap().unwrap();

    let report = engine.rotate_dual(&name, Duration::from_millis(10)).await;
    assert!(report.is_success(), "{:?}", report.error());
    assert!(report.visited(RotationState::OldRetired));
    let new_secret = report.secret.clone().unwrap();

    assert!(!db.role_exists(&shadow).await);
    assert!(session.test_authenticate(&name, &new_secret).await.unwrap());
    assert!(!session.test_authenticate(&name, &old_secret).await.unwrap());

    let after = session.describe_principal(&name).await.unwrap().unwrap();
    assert_eq!(after.grants, before.grants);
    // Other tests share the cluster, so only this principal is checked
    let pending = engine.reconcile_scan().await.unwrap();
    assert!(pending.iter().all(|p| p.principal != name));
}

#[tokio::test]
#[ignore = "Requires Docker with PostgreSQL"]
async fn test_dual_rotation_replaces_principal() {
    assert_dual_rotation_replaces_principal(false).await;
}

#[tokio::test]
#[ignore = "Requires Docker with PostgreSQL"]
async fn test_dual_rotation_replaces_principal_with_md5_hashes() {
    assert_dual_rotation_replaces_principal(true).await;
}
