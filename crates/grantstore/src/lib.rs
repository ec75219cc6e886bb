//! # grantstore
//!
//! Storage engine for OAuth 2.0 authorization grants.
//!
//! A grant records one authorization transaction and the credentials bound
//! to it as the flow advances: the redirect `state`, the authorization code,
//! and the access and refresh tokens. This crate provides:
//!
//! - Lookup of a grant by any of those four values, each of which is unique
//! - Listing and bulk revocation by client + principal
//! - An atomic consume primitive for single-use authorization codes
//! - Expiry-based bulk eviction, and a scheduler that runs it
//! - A read-through cache with write-driven invalidation
//!
//! ## Modules
//!
//! - [`types`] - Grant, issued token and token-kind types
//! - [`storage`] - The [`GrantStorage`] trait and an in-memory backend
//! - [`cache`] - Caching decorator over any backend
//! - [`sweep`] - Periodic expiry sweeper
//! - [`binding`] - Policy for clearing superseded credentials
//! - [`config`] - Configuration types
//! - [`error`] - Error taxonomy
//!
//! A PostgreSQL backend lives in the `grantstore-postgres` crate.

pub mod binding;
pub mod cache;
pub mod config;
pub mod error;
pub mod storage;
pub mod sweep;
pub mod types;

pub use binding::TokenBindingPolicy;
pub use cache::{CacheStats, CachingGrantStorage};
pub use config::{CacheConfig, GrantStoreConfig, SweepConfig};
pub use error::{ErrorCategory, GrantStoreError};
pub use storage::{GrantStorage, InMemoryGrantStorage};
pub use sweep::GrantSweeper;
pub use types::{
    AuthorizationGrant, IssuedToken, TokenKind, generate_token, truncate_to_micros,
};

/// Type alias for grant store results.
pub type GrantResult<T> = Result<T, GrantStoreError>;

/// Prelude module for convenient imports.
///
/// ```ignore
/// use grantstore::prelude::*;
/// ```
pub mod prelude {
    pub use crate::GrantResult;
    pub use crate::binding::TokenBindingPolicy;
    pub use crate::cache::CachingGrantStorage;
    pub use crate::config::{CacheConfig, GrantStoreConfig, SweepConfig};
    pub use crate::error::GrantStoreError;
    pub use crate::storage::{GrantStorage, InMemoryGrantStorage};
    pub use crate::sweep::GrantSweeper;
    pub use crate::types::{AuthorizationGrant, IssuedToken, TokenKind};
}
