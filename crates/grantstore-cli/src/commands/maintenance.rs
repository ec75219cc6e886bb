use std::sync::Arc;

use anyhow::Result;
use grantstore::{GrantStorage, GrantSweeper, SweepConfig};
use grantstore_postgres::{PostgresGrantStorage, mask_password};
use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;

use crate::cli::SweepArgs;
use crate::config::AppConfig;
use crate::output::print_success;

pub async fn migrate(storage: &PostgresGrantStorage) -> Result<()> {
    storage.migrate().await?;
    print_success("Schema is up to date");
    Ok(())
}

pub async fn status(storage: &PostgresGrantStorage, cfg: &AppConfig) -> Result<()> {
    let database = mask_password(&cfg.postgres.url);
    if !storage.health_check().await? {
        anyhow::bail!("{database} is reachable but has no grant table; run `grantstore migrate`");
    }

    let count = storage.count().await?;
    print_success(&format!("{database} is reachable and holds {count} grant(s)"));
    Ok(())
}

pub async fn sweep(
    storage: Arc<dyn GrantStorage>,
    config: SweepConfig,
    args: &SweepArgs,
) -> Result<()> {
    let deleted = match args.before {
        Some(cutoff) => storage.delete_by_access_token_expires_at_before(cutoff).await?,
        None => {
            GrantSweeper::new(storage, config)
                .sweep_once(OffsetDateTime::now_utc())
                .await?
        }
    };

    print_success(&format!("Deleted {deleted} expired grant(s)"));
    Ok(())
}

/// Runs the periodic sweeper until Ctrl-C.
pub async fn run(storage: Arc<dyn GrantStorage>, config: SweepConfig) -> Result<()> {
    if !config.enabled {
        anyhow::bail!("The expiry sweeper is disabled (store.sweep.enabled = false)");
    }

    let shutdown = CancellationToken::new();
    let sweeper = Arc::new(GrantSweeper::new(storage, config));
    let handle = sweeper.start(shutdown.clone());

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown requested");
    shutdown.cancel();
    handle.await?;

    Ok(())
}
