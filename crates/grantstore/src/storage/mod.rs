//! Storage trait and in-memory backend for authorization grants.
//!
//! # Implementations
//!
//! - [`InMemoryGrantStorage`] - process-local, for tests and single-node setups
//! - `grantstore-postgres` - PostgreSQL storage backend
//!
//! Any backend can be wrapped in
//! [`CachingGrantStorage`](crate::cache::CachingGrantStorage).

pub mod grant;
pub mod memory;

pub use grant::{GrantStorage, validate_grant};
pub use memory::InMemoryGrantStorage;
