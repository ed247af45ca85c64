//! PostgreSQL credential store.
//!
//! Principals are login roles. Sessions are pooled administrative
//! connections; a session goes back to the pool when dropped.
//!
//! Grants are read from the ACLs of the database, of schemas, and of
//! individual tables. Role memberships and default privileges are not
//! tracked.

use async_trait::async_trait;
use rotor_types::config::BackendConfig;
use rotor_types::{
    BackendError, BackendResult, CredentialSession, CredentialStore, Grant, GrantTarget,
    Principal, PrincipalName, Privilege, Secret, StoreOp,
};
use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgConnectOptions, PgConnection, PgPool, PgPoolOptions};
use sqlx::{Connection, Executor, Postgres};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

use crate::statement::AdminStatement;

/// SQLSTATEs meaning the credentials were rejected.
const INVALID_PASSWORD: &str = "28P01";
const INVALID_AUTHORIZATION: &str = "28000";
const INSUFFICIENT_PRIVILEGE: &str = "42501";

const ROLE_EXISTS: &str = "SELECT rolname::text FROM pg_roles WHERE rolname = $1";

const LOGIN_ROLES: &str = r#"
    SELECT rolname::text
    FROM pg_roles
    WHERE rolcanlogin AND rolname !~ '^pg_'
    ORDER BY rolname
"#;

const DATABASE_PRIVILEGES: &str = r#"
    SELECT acl.privilege_type::text
    FROM pg_database d
    CROSS JOIN LATERAL aclexplode(d.datacl) AS acl
    JOIN pg_roles r ON r.oid = acl.grantee
    WHERE r.rolname = $1 AND d.datname = $2
"#;

const SCHEMA_PRIVILEGES: &str = r#"
    SELECT n.nspname::text, acl.privilege_type::text
    FROM pg_namespace n
    CROSS JOIN LATERAL aclexplode(n.nspacl) AS acl
    JOIN pg_roles r ON r.oid = acl.grantee
    WHERE r.rolname = $1
"#;

const TABLE_PRIVILEGES: &str = r#"
    SELECT n.nspname::text, c.relname::text, acl.privilege_type::text
    FROM pg_class c
    JOIN pg_namespace n ON n.oid = c.relnamespace
    CROSS JOIN LATERAL aclexplode(c.relacl) AS acl
    JOIN pg_roles r ON r.oid = acl.grantee
    WHERE r.rolname = $1 AND c.relkind IN ('r', 'p', 'v', 'm', 'f')
"#;

fn backend_err(operation: StoreOp) -> impl FnOnce(sqlx::Error) -> BackendError {
    move |e| BackendError::new(operation, e.to_string())
}

/// Credential store backed by PostgreSQL login roles.
#[derive(Clone)]
pub struct PostgresCredentialStore {
    pool: PgPool,
    database: String,
}

impl PostgresCredentialStore {
    /// Wrap an existing pool.
    ///
    /// `database` is the database whose privileges are managed.
    pub fn new(pool: PgPool, database: impl Into<String>) -> Self {
        Self {
            pool,
            database: database.into(),
        }
    }

    /// Connect using backend configuration.
    pub async fn connect(config: &BackendConfig) -> BackendResult<Self> {
        let database = database_name(config)?;
        info!(url = %redacted_url(&config.url), %database, "Connecting to PostgreSQL");

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .connect(&config.url)
            .await
            .map_err(|e| {
                BackendError::new(StoreOp::Session, format!("Failed to connect to database: {}", e))
            })?;

        Ok(Self::new(pool, database))
    }

    /// Database whose privileges are managed.
    pub fn database(&self) -> &str {
        &self.database
    }
}

#[async_trait]
impl CredentialStore for PostgresCredentialStore {
    async fn session(&self) -> BackendResult<Box<dyn CredentialSession>> {
        let conn = self.pool.acquire().await.map_err(backend_err(StoreOp::Session))?;
        Ok(Box::new(PostgresSession {
            conn,
            connect_options: self.pool.connect_options(),
            database: self.database.clone(),
        }))
    }

    fn backend_type(&self) -> &'static str {
        "postgres"
    }
}

/// A pooled administrative connection.
pub struct PostgresSession {
    conn: PoolConnection<Postgres>,
    connect_options: Arc<PgConnectOptions>,
    database: String,
}

async fn execute(conn: &mut PgConnection, statement: AdminStatement<'_>) -> Result<(), sqlx::Error> {
    debug!(statement = %statement, "Executing");
    let sql = statement.render();
    // Unprepared, so the rendered secret never enters the statement cache
    conn.execute(sqlx::raw_sql(&sql)).await?;
    Ok(())
}

async fn role_exists(conn: &mut PgConnection, name: &PrincipalName) -> Result<bool, sqlx::Error> {
    let row: Option<(String,)> = sqlx::query_as(ROLE_EXISTS)
        .bind(name.as_str())
        .fetch_optional(conn)
        .await?;
    Ok(row.is_some())
}

async fn fetch_grants(
    conn: &mut PgConnection,
    name: &PrincipalName,
    database: &str,
) -> Result<Vec<Grant>, sqlx::Error> {
    let mut grants: BTreeMap<GrantTarget, BTreeSet<Privilege>> = BTreeMap::new();

    let rows: Vec<(String,)> = sqlx::query_as(DATABASE_PRIVILEGES)
        .bind(name.as_str())
        .bind(database)
        .fetch_all(&mut *conn)
        .await?;
    for (privilege,) in rows {
        add_privilege(&mut grants, GrantTarget::Database(database.to_string()), &privilege);
    }

    let rows: Vec<(String, String)> = sqlx::query_as(SCHEMA_PRIVILEGES)
        .bind(name.as_str())
        .fetch_all(&mut *conn)
        .await?;
    for (schema, privilege) in rows {
        add_privilege(&mut grants, GrantTarget::Schema(schema), &privilege);
    }

    let rows: Vec<(String, String, String)> = sqlx::query_as(TABLE_PRIVILEGES)
        .bind(name.as_str())
        .fetch_all(&mut *conn)
        .await?;
    for (schema, table, privilege) in rows {
        add_privilege(&mut grants, GrantTarget::Table { schema, table }, &privilege);
    }

    Ok(grants
        .into_iter()
        .map(|(target, privileges)| Grant { privileges, target })
        .collect())
}

fn add_privilege(
    grants: &mut BTreeMap<GrantTarget, BTreeSet<Privilege>>,
    target: GrantTarget,
    privilege: &str,
) {
    match privilege.parse::<Privilege>() {
        Ok(privilege) => {
            grants.entry(target).or_default().insert(privilege);
        }
        Err(_) => debug!(%target, privilege, "Ignoring untracked privilege"),
    }
}

/// Revoke every privilege `name` holds in `database`.
async fn revoke_grants(
    conn: &mut PgConnection,
    name: &PrincipalName,
    database: &str,
) -> Result<(), sqlx::Error> {
    let mut targets: BTreeSet<GrantTarget> = fetch_grants(&mut *conn, name, database)
        .await?
        .into_iter()
        .map(|g| g.target)
        .collect();
    targets.insert(GrantTarget::Database(database.to_string()));

    for target in &targets {
        execute(&mut *conn, AdminStatement::RevokeAll { target, from: name }).await?;
    }
    Ok(())
}

#[async_trait]
impl CredentialSession for PostgresSession {
    async fn describe_principal(&mut self, name: &PrincipalName) -> BackendResult<Option<Principal>> {
        let conn = &mut *self.conn;
        if !role_exists(&mut *conn, name).await.map_err(backend_err(StoreOp::Describe))? {
            return Ok(None);
        }

        let grants = fetch_grants(conn, name, &self.database)
            .await
            .map_err(backend_err(StoreOp::Describe))?;
        Ok(Some(Principal {
            name: name.clone(),
            grants,
        }))
    }

    async fn list_principals(&mut self) -> BackendResult<Vec<PrincipalName>> {
        let rows: Vec<(String,)> = sqlx::query_as(LOGIN_ROLES)
            .fetch_all(&mut *self.conn)
            .await
            .map_err(backend_err(StoreOp::List))?;

        // Roles outside the principal naming rules are not ours to manage
        Ok(rows
            .into_iter()
            .filter_map(|(name,)| PrincipalName::new(name).ok())
            .collect())
    }

    async fn create_principal(
        &mut self,
        name: &PrincipalName,
        secret: &Secret,
        grants: &[Grant],
    ) -> BackendResult<()> {
        let database = self.database.clone();
        let mut tx = self.conn.begin().await.map_err(backend_err(StoreOp::Create))?;

        let result: Result<(), sqlx::Error> = async {
            if role_exists(&mut tx, name).await? {
                revoke_grants(&mut tx, name, &database).await?;
                execute(&mut tx, AdminStatement::DropRoleIfExists(name)).await?;
            }
            execute(&mut tx, AdminStatement::CreateLoginRole { name, secret }).await?;
            for grant in grants {
                execute(&mut tx, AdminStatement::Grant { grant, to: name }).await?;
            }
            Ok(())
        }
        .await;

        result.map_err(backend_err(StoreOp::Create))?;
        tx.commit().await.map_err(backend_err(StoreOp::Create))
    }

    async fn alter_secret(&mut self, name: &PrincipalName, secret: &Secret) -> BackendResult<()> {
        execute(&mut self.conn, AdminStatement::SetPassword { name, secret })
            .await
            .map_err(backend_err(StoreOp::Alter))
    }

    async fn drop_principal(&mut self, name: &PrincipalName) -> BackendResult<()> {
        execute(&mut self.conn, AdminStatement::DropRoleIfExists(name))
            .await
            .map_err(backend_err(StoreOp::Drop))
    }

    async fn rename_principal(&mut self, from: &PrincipalName, to: &PrincipalName) -> BackendResult<()> {
        // MD5 password hashes are salted with the role name and are cleared
        // by a rename; SCRAM hashes survive it. The engine re-applies the
        // secret afterwards.
        execute(&mut self.conn, AdminStatement::RenameRole { from, to })
            .await
            .map_err(backend_err(StoreOp::Rename))
    }

    async fn revoke_all(&mut self, name: &PrincipalName) -> BackendResult<()> {
        let database = self.database.clone();
        let mut tx = self.conn.begin().await.map_err(backend_err(StoreOp::RevokeAll))?;

        if !role_exists(&mut tx, name).await.map_err(backend_err(StoreOp::RevokeAll))? {
            return Err(BackendError::new(
                StoreOp::RevokeAll,
                format!("role \"{}\" does not exist", name),
            ));
        }
        revoke_grants(&mut tx, name, &database)
            .await
            .map_err(backend_err(StoreOp::RevokeAll))?;

        tx.commit().await.map_err(backend_err(StoreOp::RevokeAll))
    }

    async fn test_authenticate(&mut self, name: &PrincipalName, secret: &Secret) -> BackendResult<bool> {
        let options = (*self.connect_options)
            .clone()
            .username(name.as_str())
            .password(secret.expose())
            .database(&self.database);

        match PgConnection::connect_with(&options).await {
            Ok(conn) => {
                if let Err(e) = conn.close().await {
                    debug!(principal = %name, error = %e, "Closing verification connection failed");
                }
                Ok(true)
            }
            Err(sqlx::Error::Database(db)) if is_rejection(db.code().as_deref()) => {
                debug!(principal = %name, code = ?db.code(), "Credentials rejected");
                Ok(false)
            }
            Err(e) => Err(BackendError::new(StoreOp::Authenticate, e.to_string())),
        }
    }
}

fn is_rejection(code: Option<&str>) -> bool {
    matches!(
        code,
        Some(INVALID_PASSWORD) | Some(INVALID_AUTHORIZATION) | Some(INSUFFICIENT_PRIVILEGE)
    )
}

/// Managed database: the configured name, else the URL path, else `postgres`.
fn database_name(config: &BackendConfig) -> BackendResult<String> {
    if let Some(database) = &config.database {
        return Ok(database.clone());
    }

    let url = Url::parse(&config.url)
        .map_err(|e| BackendError::new(StoreOp::Session, format!("Invalid backend URL: {}", e)))?;
    let path = url.path().trim_start_matches('/');
    if path.is_empty() {
        Ok("postgres".to_string())
    } else {
        Ok(path.to_string())
    }
}

fn redacted_url(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(mut url) => {
            if url.password().is_some() {
                let _ = url.set_password(Some("****"));
            }
            url.to_string()
        }
        Err(_) => "<invalid url>".to_string(),
    }
}
