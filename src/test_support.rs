/// Shared fixtures for unit tests
use crate::{
    auth::Claims,
    config::*,
    context::AppContext,
    db::{self, DbPool},
};
use jsonwebtoken::{encode, EncodingKey, Header};
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use std::{
    path::PathBuf,
    str::FromStr,
    sync::atomic::{AtomicU32, Ordering},
};
use tempfile::TempDir;

pub const TEST_JWT_SECRET: &str = "test-secret-key-for-testing-only-0123456789";
pub const ADMIN_ID: &str = "admin-1";

pub fn test_config(db_path: PathBuf) -> ServerConfig {
    ServerConfig {
        service: ServiceConfig {
            hostname: "127.0.0.1".to_string(),
            port: 0,
            version: "test".to_string(),
        },
        storage: StorageConfig {
            backend: StorageBackend::Sqlite { path: db_path },
            max_connections: 8,
            acquire_timeout: 10,
        },
        authentication: AuthConfig {
            jwt_secret: TEST_JWT_SECRET.to_string(),
            jwt_audience: None,
            admin_ids: vec![ADMIN_ID.to_string()],
        },
        rate_limit: RateLimitSettings {
            enabled: false,
            requests_per_second: 1000,
            burst_size: 1000,
        },
        logging: LoggingConfig {
            level: "debug".to_string(),
            json: false,
        },
    }
}

/// File-backed SQLite pool with several connections, so concurrent
/// statements really contend. Keep the directory alive for the test.
pub async fn sqlite_pool() -> (TempDir, DbPool) {
    let dir = tempfile::tempdir().unwrap();
    let pool = db::create_sqlite_pool(&dir.path().join("meter.sqlite"), 8, 10)
        .await
        .unwrap();
    let pool = DbPool::Sqlite(pool);
    pool.run_migrations().await.unwrap();
    (dir, pool)
}

/// Migrated pool on a fresh schema of the server named by
/// `METER_TEST_POSTGRES_URL`, or `None` when the variable is unset.
pub async fn postgres_pool() -> Option<DbPool> {
    static SCHEMA_SEQ: AtomicU32 = AtomicU32::new(0);

    let url = std::env::var("METER_TEST_POSTGRES_URL").ok()?;
    let schema = format!(
        "meter_test_{}_{}",
        std::process::id(),
        SCHEMA_SEQ.fetch_add(1, Ordering::Relaxed)
    );

    let admin = PgPool::connect(&url).await.unwrap();
    sqlx::query(&format!("DROP SCHEMA IF EXISTS {} CASCADE", schema))
        .execute(&admin)
        .await
        .unwrap();
    sqlx::query(&format!("CREATE SCHEMA {}", schema))
        .execute(&admin)
        .await
        .unwrap();
    admin.close().await;

    let options = PgConnectOptions::from_str(&url)
        .unwrap()
        .options([("search_path", schema.as_str())]);
    let pool = PgPoolOptions::new()
        .max_connections(8)
        .connect_with(options)
        .await
        .unwrap();

    let pool = DbPool::Postgres(pool);
    pool.run_migrations().await.unwrap();
    Some(pool)
}

pub async fn test_context() -> (TempDir, AppContext) {
    let (dir, pool) = sqlite_pool().await;
    let config = test_config(dir.path().join("meter.sqlite"));
    (dir, AppContext::with_pool(config, pool))
}

/// Token as the identity provider would issue it
pub fn sign_token(sub: &str, scope: Option<&str>) -> String {
    let claims = Claims {
        sub: sub.to_string(),
        exp: (chrono::Utc::now().timestamp() + 3600) as usize,
        email: None,
        scope: scope.map(str::to_string),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(TEST_JWT_SECRET.as_bytes()),
    )
    .unwrap()
}
