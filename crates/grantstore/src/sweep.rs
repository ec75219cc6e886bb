//! Expiry sweeper.
//!
//! Periodically deletes grants whose access token has expired, keeping the
//! grant table from growing without bound. The sweeper is constructed
//! explicitly with the storage it cleans; nothing looks it up implicitly.
//!
//! # Example
//!
//! ```ignore
//! use grantstore::{GrantSweeper, SweepConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! let sweeper = Arc::new(GrantSweeper::new(storage.clone(), SweepConfig::default()));
//! let shutdown = CancellationToken::new();
//! let handle = sweeper.start(shutdown.clone());
//! // ...
//! shutdown.cancel();
//! handle.await?;
//! ```

use std::sync::Arc;

use time::OffsetDateTime;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::GrantResult;
use crate::config::SweepConfig;
use crate::error::GrantStoreError;
use crate::storage::GrantStorage;

/// Drives [`GrantStorage::delete_by_access_token_expires_at_before`] on a schedule.
pub struct GrantSweeper {
    storage: Arc<dyn GrantStorage>,
    config: SweepConfig,
}

impl GrantSweeper {
    /// Creates a sweeper over `storage`.
    #[must_use]
    pub fn new(storage: Arc<dyn GrantStorage>, config: SweepConfig) -> Self {
        Self { storage, config }
    }

    /// Returns the sweep configuration.
    #[must_use]
    pub fn config(&self) -> &SweepConfig {
        &self.config
    }

    /// Cutoff for a sweep running at `now`: `now - grace`.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if `grace` reaches past the representable
    /// date range.
    pub fn cutoff_at(&self, now: OffsetDateTime) -> GrantResult<OffsetDateTime> {
        time::Duration::try_from(self.config.grace)
            .ok()
            .and_then(|grace| now.checked_sub(grace))
            .ok_or_else(|| {
                GrantStoreError::configuration(format!(
                    "sweep.grace of {:?} is out of range",
                    self.config.grace
                ))
            })
    }

    /// Runs a single sweep as of `now`.
    ///
    /// Returns the number of grants deleted.
    ///
    /// # Errors
    ///
    /// Returns the storage error, or `StorageUnavailable` if the sweep
    /// exceeds the configured timeout.
    #[instrument(skip(self))]
    pub async fn sweep_once(&self, now: OffsetDateTime) -> GrantResult<u64> {
        let cutoff = self.cutoff_at(now)?;

        let deleted = tokio::time::timeout(
            self.config.timeout,
            self.storage.delete_by_access_token_expires_at_before(cutoff),
        )
        .await
        .map_err(|_| {
            GrantStoreError::unavailable(format!(
                "expiry sweep timed out after {:?}",
                self.config.timeout
            ))
        })??;

        if deleted > 0 {
            tracing::info!(deleted, %cutoff, "Swept expired grants");
        }

        Ok(deleted)
    }

    /// Starts the periodic sweep on the tokio runtime.
    ///
    /// The first sweep runs immediately. Failed sweeps are logged and
    /// retried on the next tick. The task exits when `shutdown` is
    /// cancelled.
    pub fn start(self: Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.config.interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            tracing::info!(
                interval = ?self.config.interval,
                grace = ?self.config.grace,
                "Grant expiry sweeper started"
            );

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = interval.tick() => {}
                }

                match self.sweep_once(OffsetDateTime::now_utc()).await {
                    Ok(deleted) => {
                        tracing::debug!(deleted, "Grant expiry sweep completed");
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, retryable = e.is_retryable(), "Grant expiry sweep failed");
                    }
                }
            }

            tracing::info!("Grant expiry sweeper stopped");
        })
    }
}
