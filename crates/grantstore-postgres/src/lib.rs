//! PostgreSQL storage backend for grantstore.
//!
//! Grants live in a single `authorization_grant` table with one column
//! group per credential. Uniqueness of each credential value is enforced by
//! partial unique indexes, so a duplicate surfaces as a
//! [`GrantStoreError::Conflict`] naming the colliding kind.
//!
//! # Example
//!
//! ```ignore
//! use grantstore::GrantStorage;
//! use grantstore_postgres::{PostgresConfig, PostgresGrantStorage};
//!
//! let storage = PostgresGrantStorage::connect(&PostgresConfig::new("postgres://localhost/grants")).await?;
//! let grant = storage.find_by_access_token(token).await?;
//! ```

pub mod adapter;
pub mod config;
pub mod grant;
pub mod migrations;
pub mod pool;

use std::sync::Arc;

use grantstore::{GrantStoreError, TokenKind};
use sqlx_core::pool::Pool;
use sqlx_postgres::Postgres;

/// PostgreSQL connection pool type alias.
pub type PgPool = Pool<Postgres>;

pub use config::PostgresConfig;
pub use grant::{GrantRow, GrantRows};
pub use pool::{create_pool, mask_password};

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur in the PostgreSQL backend.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx_core::Error),

    /// A unique index rejected a credential value.
    #[error("Conflict on {kind}: {message}")]
    Conflict { kind: TokenKind, message: String },

    /// Serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored row does not form a valid grant.
    #[error("Corrupted row: {0}")]
    Corrupted(String),

    /// Invalid input data.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Schema migration failed.
    #[error("Migration error: {0}")]
    Migration(String),
}

impl StorageError {
    /// Create an `InvalidInput` error.
    #[must_use]
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Returns `true` if this is a `Conflict` error.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// Returns `true` if the database could not be reached.
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Database(
                sqlx_core::Error::PoolTimedOut
                    | sqlx_core::Error::PoolClosed
                    | sqlx_core::Error::Io(_)
                    | sqlx_core::Error::Tls(_)
                    | sqlx_core::Error::WorkerCrashed
            )
        )
    }

    /// Returns `true` if a row or column could not be decoded.
    #[must_use]
    pub fn is_decode_error(&self) -> bool {
        matches!(
            self,
            Self::Serialization(_)
                | Self::Corrupted(_)
                | Self::Database(
                    sqlx_core::Error::Decode(_)
                        | sqlx_core::Error::ColumnDecode { .. }
                        | sqlx_core::Error::ColumnNotFound(_)
                        | sqlx_core::Error::TypeNotFound { .. }
                )
        )
    }

    /// Returns `true` if this is a client error (4xx equivalent).
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Conflict { .. } | Self::InvalidInput(_))
    }

    /// Returns `true` if this is a server error (5xx equivalent).
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        !self.is_client_error()
    }
}

impl From<StorageError> for GrantStoreError {
    fn from(err: StorageError) -> Self {
        if err.is_decode_error() {
            return GrantStoreError::serialization(err.to_string());
        }
        match err {
            StorageError::Conflict { kind, message } => GrantStoreError::conflict(kind, message),
            StorageError::InvalidInput(message) => GrantStoreError::invalid_input(message),
            other => GrantStoreError::unavailable(other.to_string()),
        }
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

// =============================================================================
// PostgreSQL Grant Storage
// =============================================================================

/// PostgreSQL-backed grant storage.
///
/// Owns an `Arc<PgPool>` so it can be shared as `Arc<dyn GrantStorage>`.
/// The [`GrantStorage`](grantstore::GrantStorage) implementation lives in
/// [`adapter`].
#[derive(Debug, Clone)]
pub struct PostgresGrantStorage {
    pool: Arc<PgPool>,
}

impl PostgresGrantStorage {
    /// Create new storage with an existing connection pool.
    #[must_use]
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Creates a pool from `config` and, if enabled, applies migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, the connection
    /// fails, or a migration fails.
    pub async fn connect(config: &PostgresConfig) -> StorageResult<Self> {
        config.validate().map_err(StorageError::InvalidInput)?;

        let storage = Self::new(Arc::new(create_pool(config).await?));
        if config.run_migrations {
            storage.migrate().await?;
        }
        Ok(storage)
    }

    /// Checks that the database answers and the grant table exists.
    ///
    /// Returns `false` when the server is reachable but migrations have not
    /// been applied.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Database` if the server cannot be reached.
    pub async fn health_check(&self) -> StorageResult<bool> {
        pool::schema_ready(&self.pool).await
    }

    /// Applies pending schema migrations.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Migration` if a migration fails.
    pub async fn migrate(&self) -> StorageResult<()> {
        migrations::run(&self.pool).await
    }

    /// Get a reference to the connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Get a reference to the Arc-wrapped pool.
    #[must_use]
    pub fn pool_arc(&self) -> Arc<PgPool> {
        Arc::clone(&self.pool)
    }

    /// Get grant table operations.
    #[must_use]
    pub fn grants(&self) -> GrantRows<'_> {
        GrantRows::new(&self.pool)
    }
}

// =============================================================================
// Tests
// =============================================================================
