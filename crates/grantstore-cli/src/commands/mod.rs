pub mod grants;
pub mod maintenance;

use anyhow::{Context, Result};
use grantstore_postgres::{PostgresGrantStorage, mask_password};

use crate::config::AppConfig;

/// Connects to the configured database, honouring `postgres.run_migrations`.
pub async fn connect(cfg: &AppConfig) -> Result<PostgresGrantStorage> {
    PostgresGrantStorage::connect(&cfg.postgres)
        .await
        .with_context(|| format!("cannot open {}", mask_password(&cfg.postgres.url)))
}
