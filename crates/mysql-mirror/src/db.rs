//! Connection pool construction and statement deadlines.

use std::future::Future;
use std::time::Duration;

use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions};
use tracing::info;

use crate::config::DatabaseConfig;
use crate::error::{Result, SyncError};

/// Per-endpoint pool limits.
const POOL_MAX_CONNECTIONS: u32 = 10;
const POOL_MIN_CONNECTIONS: u32 = 5;

/// Connection acquisition timeout.
const POOL_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);

/// Build a connection pool for one endpoint and verify it responds.
pub async fn connect(config: &DatabaseConfig, role: &str) -> Result<MySqlPool> {
    let options = MySqlConnectOptions::new()
        .host(&config.host)
        .port(config.port)
        .database(&config.database)
        .username(&config.user)
        .password(&config.password)
        .charset("utf8mb4");

    let pool = MySqlPoolOptions::new()
        .max_connections(POOL_MAX_CONNECTIONS)
        .min_connections(POOL_MIN_CONNECTIONS)
        .acquire_timeout(POOL_ACQUIRE_TIMEOUT)
        .connect_with(options)
        .await?;

    sqlx::query("SELECT 1").fetch_one(&pool).await?;

    info!(
        "Connected to {} database: {}:{}/{}",
        role, config.host, config.port, config.database
    );

    Ok(pool)
}

/// Quote a MySQL identifier.
pub(crate) fn quote_ident(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// Bound a database call by a wall-clock deadline.
pub(crate) async fn with_deadline<T, E, F>(operation: &str, limit: Duration, fut: F) -> Result<T>
where
    E: Into<SyncError>,
    F: Future<Output = std::result::Result<T, E>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result.map_err(Into::into),
        Err(_) => Err(SyncError::timeout(operation, limit)),
    }
}
