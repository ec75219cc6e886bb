//! Authorization grant storage trait.
//!
//! This module defines the storage interface for authorization grants.
//!
//! # Implementation Notes
//!
//! Implementations must:
//!
//! - Enforce uniqueness of `state`, authorization code, access token and
//!   refresh token values at the storage layer (unique index or a check
//!   under the same lock/transaction as the write). Null values never collide.
//! - Serve lookups by each of those four keys plus `(registered_client_id,
//!   principal_name)` and support an efficient range delete on access-token
//!   expiry.
//! - Make [`GrantStorage::consume_authorization_code`] atomic.
//! - Never return a partially-written grant.
//!
//! # Security Considerations
//!
//! - Never log token values
//! - Treat [`GrantStoreError::StorageUnavailable`](crate::GrantStoreError)
//!   as a fail-closed condition, never as "token unknown"

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::GrantResult;
use crate::error::GrantStoreError;
use crate::types::{AuthorizationGrant, TokenKind};

/// Storage trait for authorization grants.
///
/// A grant is created when a flow begins and mutated in place with [`save`]
/// as the flow advances, so that lookups by any of its keys land on the same
/// record.
///
/// Lookups report absence as `Ok(None)`. Only infrastructure faults,
/// corrupted records and uniqueness violations are errors.
///
/// # Implementations
///
/// - [`InMemoryGrantStorage`](crate::storage::InMemoryGrantStorage)
/// - [`CachingGrantStorage`](crate::cache::CachingGrantStorage) (decorator)
/// - PostgreSQL (in `grantstore-postgres` crate)
///
/// [`save`]: GrantStorage::save
#[async_trait]
pub trait GrantStorage: Send + Sync {
    /// Inserts the grant, or replaces the stored grant with the same `id`.
    ///
    /// Returns the grant as stored, with `updated_at` set.
    ///
    /// # Errors
    ///
    /// - `InvalidInput` if `registered_client_id` or `principal_name` is empty
    /// - `Conflict` if a bound token value is already used by another grant
    /// - `StorageUnavailable` if the store cannot be reached
    async fn save(&self, grant: &AuthorizationGrant) -> GrantResult<AuthorizationGrant>;

    /// Finds a grant by its id.
    async fn find_by_id(&self, id: Uuid) -> GrantResult<Option<AuthorizationGrant>>;

    /// Finds a grant by the redirect-step `state`.
    async fn find_by_state(&self, state: &str) -> GrantResult<Option<AuthorizationGrant>>;

    /// Finds a grant by authorization code.
    ///
    /// This is a plain read: it returns the grant regardless of the code's
    /// expiry or consumed status. Code exchange must go through
    /// [`consume_authorization_code`](GrantStorage::consume_authorization_code)
    /// so that two concurrent exchanges cannot both succeed.
    async fn find_by_authorization_code(
        &self,
        code: &str,
    ) -> GrantResult<Option<AuthorizationGrant>>;

    /// Finds a grant by access token. This is the hottest path.
    async fn find_by_access_token(&self, token: &str) -> GrantResult<Option<AuthorizationGrant>>;

    /// Finds a grant by refresh token.
    async fn find_by_refresh_token(&self, token: &str) -> GrantResult<Option<AuthorizationGrant>>;

    /// Finds a grant by a token value of the given kind.
    ///
    /// When `kind` is `None`, each kind is tried in [`TokenKind::ALL`] order
    /// and the first match is returned.
    async fn find_by_token(
        &self,
        value: &str,
        kind: Option<TokenKind>,
    ) -> GrantResult<Option<AuthorizationGrant>> {
        let kinds: &[TokenKind] = match &kind {
            Some(kind) => std::slice::from_ref(kind),
            None => &TokenKind::ALL,
        };

        for kind in kinds {
            let found = match kind {
                TokenKind::State => self.find_by_state(value).await?,
                TokenKind::AuthorizationCode => self.find_by_authorization_code(value).await?,
                TokenKind::AccessToken => self.find_by_access_token(value).await?,
                TokenKind::RefreshToken => self.find_by_refresh_token(value).await?,
            };
            if found.is_some() {
                return Ok(found);
            }
        }

        Ok(None)
    }

    /// Lists all grants of a client for one principal.
    async fn find_all_by_registered_client_id_and_principal_name(
        &self,
        registered_client_id: &str,
        principal_name: &str,
    ) -> GrantResult<Vec<AuthorizationGrant>>;

    /// Atomically consumes an authorization code.
    ///
    /// Sets the code's `consumed_at` to `now` and returns the updated grant
    /// if, and only if, the code exists, has not been consumed, and is not
    /// expired at `now`. Otherwise returns `Ok(None)`. Of any number of
    /// concurrent calls for the same code, at most one returns `Some`.
    ///
    /// A conditional update is the usual way to get this:
    ///
    /// ```sql
    /// UPDATE authorization_grant
    /// SET authorization_code_consumed_at = $2
    /// WHERE authorization_code_value = $1
    ///   AND authorization_code_consumed_at IS NULL
    ///   AND (authorization_code_expires_at IS NULL OR authorization_code_expires_at > $2)
    /// RETURNING *
    /// ```
    async fn consume_authorization_code(
        &self,
        code: &str,
        now: OffsetDateTime,
    ) -> GrantResult<Option<AuthorizationGrant>>;

    /// Deletes a single grant. Returns whether a grant was removed.
    async fn delete_by_id(&self, id: Uuid) -> GrantResult<bool>;

    /// Deletes every grant matching both the client and the principal.
    ///
    /// Grants matching only one of the two are untouched. Deleting nothing
    /// is not an error. Returns the number of grants deleted.
    async fn delete_by_registered_client_id_and_principal_name(
        &self,
        registered_client_id: &str,
        principal_name: &str,
    ) -> GrantResult<u64>;

    /// Deletes every grant whose access token expired strictly before `cutoff`.
    ///
    /// Only the access-token expiry is consulted: a grant whose refresh
    /// token has expired but whose access token has not is kept, and grants
    /// without an access-token expiry are never deleted. Returns the number
    /// of grants deleted.
    async fn delete_by_access_token_expires_at_before(
        &self,
        cutoff: OffsetDateTime,
    ) -> GrantResult<u64>;

    /// Returns the number of stored grants.
    async fn count(&self) -> GrantResult<u64>;
}

/// Checks the non-null invariants a grant must satisfy before it is persisted.
///
/// # Errors
///
/// Returns `InvalidInput` naming the first empty field.
pub fn validate_grant(grant: &AuthorizationGrant) -> GrantResult<()> {
    if grant.registered_client_id.trim().is_empty() {
        return Err(GrantStoreError::invalid_input(
            "registered_client_id must not be empty",
        ));
    }
    if grant.principal_name.trim().is_empty() {
        return Err(GrantStoreError::invalid_input(
            "principal_name must not be empty",
        ));
    }
    for (kind, value) in grant.lookup_keys() {
        if value.is_empty() {
            return Err(GrantStoreError::invalid_input(format!(
                "{kind} must not be an empty string"
            )));
        }
    }
    Ok(())
}
