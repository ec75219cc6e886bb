//! Embedded schema migrations.
//!
//! SQL files live in `migrations/` at the crate root and are compiled into
//! the binary, so no filesystem access is needed at deploy time. Applied
//! versions are tracked in `_sqlx_migrations`.

use std::borrow::Cow;

use sqlx_core::migrate::{Migration, MigrationType, Migrator};
use tracing::{info, instrument};

use crate::{PgPool, StorageError, StorageResult};

/// `(version, description, sql)`, oldest first. Append new migrations here.
macro_rules! embedded_migrations {
    () => {
        &[(
            20261017000001i64,
            "authorization_grant",
            include_str!("../../migrations/20261017000001_authorization_grant.sql"),
        )]
    };
}

fn build_migrations() -> Vec<Migration> {
    embedded_migrations!()
        .iter()
        .map(|(version, description, sql)| Migration {
            version: *version,
            description: Cow::Borrowed(description),
            migration_type: MigrationType::Simple,
            sql: Cow::Borrowed(sql),
            checksum: Cow::Borrowed(&[]),
            no_tx: false,
        })
        .collect()
}

/// Returns the versions of all embedded migrations.
#[must_use]
pub fn versions() -> Vec<i64> {
    embedded_migrations!().iter().map(|(v, _, _)| *v).collect()
}

/// Applies all pending migrations.
///
/// # Errors
///
/// Returns `StorageError::Migration` if a migration fails.
#[instrument(skip(pool))]
pub async fn run(pool: &PgPool) -> StorageResult<()> {
    let migrations = build_migrations();
    info!(count = migrations.len(), "Running grant store migrations");

    let migrator = Migrator {
        migrations: Cow::Owned(migrations),
        ignore_missing: false,
        locking: true,
        no_tx: false,
    };

    migrator
        .run(pool)
        .await
        .map_err(|e| StorageError::Migration(e.to_string()))?;

    info!("Grant store migrations completed");
    Ok(())
}
