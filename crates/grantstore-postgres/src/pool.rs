//! Connection pool management.

use std::time::Duration;

use sqlx_core::pool::PoolOptions;
use sqlx_postgres::Postgres;
use tracing::{debug, info, instrument};

use crate::config::PostgresConfig;
use crate::{PgPool, StorageResult};

/// Creates a connection pool from the given configuration.
///
/// # Errors
///
/// Returns `StorageError::Database` if no connection can be established.
#[instrument(skip(config), fields(url = %mask_password(&config.url)))]
pub async fn create_pool(config: &PostgresConfig) -> StorageResult<PgPool> {
    info!(
        pool_size = config.pool_size,
        min_connections = ?config.min_connections,
        connect_timeout_ms = config.connect_timeout_ms,
        "Creating PostgreSQL connection pool"
    );

    let min_connections = config
        .min_connections
        .unwrap_or(config.pool_size / 4)
        .max(1);

    let mut options = PoolOptions::<Postgres>::new()
        .max_connections(config.pool_size)
        .min_connections(min_connections)
        .acquire_timeout(Duration::from_millis(config.connect_timeout_ms))
        .max_lifetime(Duration::from_secs(config.max_lifetime_secs.unwrap_or(1800)));

    if let Some(idle_timeout) = config.idle_timeout_ms {
        options = options.idle_timeout(Duration::from_millis(idle_timeout));
    }

    let pool = options.connect(&config.url).await?;
    debug!("PostgreSQL connection pool created");

    Ok(pool)
}

/// Returns whether the `authorization_grant` table exists.
///
/// Doubles as a round trip to the server, so a connection failure
/// surfaces here as an error rather than as `false`.
///
/// # Errors
///
/// Returns `StorageError::Database` if the query fails.
#[instrument(skip(pool))]
pub async fn schema_ready(pool: &PgPool) -> StorageResult<bool> {
    let ready = sqlx_core::query_scalar::query_scalar::<Postgres, bool>(
        "SELECT to_regclass('authorization_grant') IS NOT NULL",
    )
    .fetch_one(pool)
    .await?;
    debug!(ready, "Checked grant schema");
    Ok(ready)
}

/// Masks the password in a database URL for logging.
#[must_use]
pub fn mask_password(url: &str) -> String {
    if let Some(at_pos) = url.find('@')
        && let Some(colon_pos) = url[..at_pos].rfind(':')
    {
        let scheme_end = url.find("://").map(|p| p + 3).unwrap_or(0);
        if colon_pos > scheme_end {
            return format!("{}:****{}", &url[..colon_pos], &url[at_pos..]);
        }
    }
    url.to_string()
}
