//! Shared PostgreSQL container for the store integration tests.
//!
//! One container serves every test; each test gets its own database.
//! Roles are cluster-wide, so tests name their principals uniquely.

#![allow(dead_code)]

use rotor_services::PostgresCredentialStore;
use rotor_types::config::BackendConfig;
use rotor_types::PrincipalName;
use sqlx::{Connection, Executor, PgConnection};
use testcontainers::{runners::AsyncRunner, ContainerAsync, ImageExt};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;
use uuid::Uuid;

struct SharedPostgres {
    _container: ContainerAsync<Postgres>,
    admin_url: String,
    host: String,
    port: u16,
}

static POSTGRES: OnceCell<SharedPostgres> = OnceCell::const_new();

/// A throwaway database in the shared container, dropped with the value.
pub struct TestDatabase {
    pub url: String,
    pub name: String,
    admin_url: String,
}

impl TestDatabase {
    /// Credential store managing this database.
    pub async fn store(&self) -> PostgresCredentialStore {
        let config = BackendConfig {
            url: self.url.clone(),
            database: Some(self.name.clone()),
            max_connections: 4,
            ..BackendConfig::default()
        };
        PostgresCredentialStore::connect(&config)
            .await
            .expect("Failed to connect credential store")
    }

    /// Administrative connection to this database.
    pub async fn admin(&self) -> PgConnection {
        PgConnection::connect(&self.url)
            .await
            .expect("Failed to connect to test database")
    }

    /// Run a statement as the administrator.
    pub async fn execute(&self, sql: &str) {
        let mut conn = self.admin().await;
        sqlx::raw_sql(sql)
            .execute(&mut conn)
            .await
            .unwrap_or_else(|e| panic!("Failed to execute `{}`: {}", sql, e));
    }

    /// Hash passwords set in this database with MD5, as legacy clusters do.
    pub async fn use_md5_passwords(&self) {
        self.execute(&format!("ALTER DATABASE {} SET password_encryption = 'md5'", self.name))
            .await;
    }

    /// Stored password hash of a role, if it has one.
    pub async fn password_hash(&self, role: &PrincipalName) -> Option<String> {
        let mut conn = self.admin().await;
        let row: Option<(Option<String>,)> =
            sqlx::query_as("SELECT rolpassword::text FROM pg_authid WHERE rolname = $1")
                .bind(role.as_str())
                .fetch_optional(&mut conn)
                .await
                .expect("Failed to read pg_authid");
        row.and_then(|(hash,)| hash)
    }

    /// Whether a role exists in the cluster.
    pub async fn role_exists(&self, role: &PrincipalName) -> bool {
        let mut conn = self.admin().await;
        let row: Option<(String,)> = sqlx::query_as("SELECT rolname::text FROM pg_roles WHERE rolname = $1")
            .bind(role.as_str())
            .fetch_optional(&mut conn)
            .await
            .expect("Failed to read pg_roles");
        row.is_some()
    }
}

impl Drop for TestDatabase {
    fn drop(&mut self) {
        let name = self.name.clone();
        let admin_url = self.admin_url.clone();

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };

        handle.spawn(async move {
            let Ok(mut conn) = PgConnection::connect(&admin_url).await else {
                return;
            };

            let _ = sqlx::query(
                "SELECT pg_terminate_backend(pid) FROM pg_stat_activity WHERE datname = $1 AND pid <> pg_backend_pid()",
            )
            .bind(&name)
            .execute(&mut conn)
            .await;

            let _ = conn
                .execute(sqlx::raw_sql(&format!("DROP DATABASE IF EXISTS {}", name)))
                .await;
        });
    }
}

async fn shared_postgres() -> &'static SharedPostgres {
    POSTGRES
        .get_or_init(|| async {
            // md5 in pg_hba accepts both MD5 and SCRAM password hashes
            let container = Postgres::default()
                .with_tag("16-alpine")
                .with_env_var("POSTGRES_HOST_AUTH_METHOD", "md5")
                .start()
                .await
                .expect("Failed to start Postgres container");

            let host = container.get_host().await.expect("Failed to get host").to_string();
            let port = container
                .get_host_port_ipv4(5432)
                .await
                .expect("Failed to get port");

            let admin_url = format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            SharedPostgres {
                _container: container,
                admin_url,
                host,
                port,
            }
        })
        .await
}

/// Create a fresh database in the shared container.
pub async fn test_database() -> TestDatabase {
    let shared = shared_postgres().await;
    let name = format!("test_{}", Uuid::new_v4().simple());

    let mut conn = PgConnection::connect(&shared.admin_url)
        .await
        .expect("Failed to connect to postgres admin db");
    sqlx::raw_sql(&format!("CREATE DATABASE {}", name))
        .execute(&mut conn)
        .await
        .expect("Failed to create test database");

    TestDatabase {
        url: format!("postgres://postgres:postgres@{}:{}/{}", shared.host, shared.port, name),
        name,
        admin_url: shared.admin_url.clone(),
    }
}

/// A principal name no other test uses.
pub fn unique_principal(prefix: &str) -> PrincipalName {
    let suffix = Uuid::new_v4().simple().to_string();
    PrincipalName::new(format!("{}_{}", prefix, &suffix[..12])).expect("valid principal name")
}
