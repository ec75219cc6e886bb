//! In-memory grant storage.
//!
//! Keeps grants in a primary map plus the secondary indexes a database
//! backend would declare: one unique index per [`TokenKind`], a composite
//! `(registered_client_id, principal_name)` index, and an ordered
//! access-token expiry index for the sweep.
//!
//! All of it sits behind one `RwLock`. Every write, including the bulk
//! deletes, runs entirely under the write lock, so readers see either the
//! old or the new version of a grant and never a half-indexed one.

use std::collections::{BTreeSet, HashMap, HashSet};

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::GrantResult;
use crate::error::GrantStoreError;
use crate::storage::grant::{GrantStorage, validate_grant};
use crate::types::{AuthorizationGrant, TokenKind, truncate_to_micros};

type OwnerKey = (String, String);

/// Grants and their indexes.
#[derive(Default)]
struct GrantTable {
    grants: HashMap<Uuid, AuthorizationGrant>,

    /// Unique secondary indexes, one per token kind.
    by_token: [HashMap<String, Uuid>; 4],

    /// `(registered_client_id, principal_name)` -> grant ids.
    by_owner: HashMap<OwnerKey, HashSet<Uuid>>,

    /// `(access_token.expires_at, id)` for grants with an access-token expiry.
    by_access_expiry: BTreeSet<(OffsetDateTime, Uuid)>,
}

impl GrantTable {
    fn token_index(&self, kind: TokenKind) -> &HashMap<String, Uuid> {
        &self.by_token[kind as usize]
    }

    fn lookup(&self, kind: TokenKind, value: &str) -> Option<&AuthorizationGrant> {
        self.token_index(kind)
            .get(value)
            .and_then(|id| self.grants.get(id))
    }

    /// Returns the first key of `grant` already bound to a different grant.
    fn find_conflict(&self, grant: &AuthorizationGrant) -> Option<TokenKind> {
        grant.lookup_keys().find_map(|(kind, value)| {
            match self.token_index(kind).get(value) {
                Some(owner) if *owner != grant.id => Some(kind),
                _ => None,
            }
        })
    }

    fn insert(&mut self, grant: AuthorizationGrant) {
        for (kind, value) in grant.lookup_keys() {
            self.by_token[kind as usize].insert(value.to_string(), grant.id);
        }
        self.by_owner
            .entry((
                grant.registered_client_id.clone(),
                grant.principal_name.clone(),
            ))
            .or_default()
            .insert(grant.id);
        if let Some(expires_at) = grant.access_token_expires_at() {
            self.by_access_expiry.insert((expires_at, grant.id));
        }
        self.grants.insert(grant.id, grant);
    }

    fn remove(&mut self, id: Uuid) -> Option<AuthorizationGrant> {
        let grant = self.grants.remove(&id)?;

        for (kind, value) in grant.lookup_keys() {
            self.by_token[kind as usize].remove(value);
        }

        let owner = (
            grant.registered_client_id.clone(),
            grant.principal_name.clone(),
        );
        if let Some(ids) = self.by_owner.get_mut(&owner) {
            ids.remove(&id);
            if ids.is_empty() {
                self.by_owner.remove(&owner);
            }
        }

        if let Some(expires_at) = grant.access_token_expires_at() {
            self.by_access_expiry.remove(&(expires_at, id));
        }

        Some(grant)
    }
}

/// In-memory implementation of [`GrantStorage`].
///
/// Suitable for tests and single-process deployments. Data does not
/// survive a restart.
#[derive(Default)]
pub struct InMemoryGrantStorage {
    table: RwLock<GrantTable>,
}

impl InMemoryGrantStorage {
    /// Creates an empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    async fn find_by_kind(
        &self,
        kind: TokenKind,
        value: &str,
    ) -> GrantResult<Option<AuthorizationGrant>> {
        let table = self.table.read().await;
        Ok(table.lookup(kind, value).cloned())
    }
}

#[async_trait]
impl GrantStorage for InMemoryGrantStorage {
    async fn save(&self, grant: &AuthorizationGrant) -> GrantResult<AuthorizationGrant> {
        validate_grant(grant)?;

        let mut table = self.table.write().await;

        if let Some(kind) = table.find_conflict(grant) {
            tracing::debug!(grant_id = %grant.id, kind = %kind, "Rejected duplicate token value");
            return Err(GrantStoreError::conflict(
                kind,
                format!("value is already bound to another grant (saving {})", grant.id),
            ));
        }

        let mut stored = grant.clone();
        stored.updated_at = OffsetDateTime::now_utc();
        stored.truncate_timestamps();
        if let Some(previous) = table.remove(grant.id) {
            stored.created_at = previous.created_at;
            stored.retain_code_consumption(&previous);
        }
        table.insert(stored.clone());

        Ok(stored)
    }

    async fn find_by_id(&self, id: Uuid) -> GrantResult<Option<AuthorizationGrant>> {
        let table = self.table.read().await;
        Ok(table.grants.get(&id).cloned())
    }

    async fn find_by_state(&self, state: &str) -> GrantResult<Option<AuthorizationGrant>> {
        self.find_by_kind(TokenKind::State, state).await
    }

    async fn find_by_authorization_code(
        &self,
        code: &str,
    ) -> GrantResult<Option<AuthorizationGrant>> {
        self.find_by_kind(TokenKind::AuthorizationCode, code).await
    }

    async fn find_by_access_token(&self, token: &str) -> GrantResult<Option<AuthorizationGrant>> {
        self.find_by_kind(TokenKind::AccessToken, token).await
    }

    async fn find_by_refresh_token(&self, token: &str) -> GrantResult<Option<AuthorizationGrant>> {
        self.find_by_kind(TokenKind::RefreshToken, token).await
    }

    async fn find_all_by_registered_client_id_and_principal_name(
        &self,
        registered_client_id: &str,
        principal_name: &str,
    ) -> GrantResult<Vec<AuthorizationGrant>> {
        let table = self.table.read().await;
        let owner = (registered_client_id.to_string(), principal_name.to_string());

        let mut grants: Vec<AuthorizationGrant> = table
            .by_owner
            .get(&owner)
            .into_iter()
            .flatten()
            .filter_map(|id| table.grants.get(id).cloned())
            .collect();
        grants.sort_by_key(|g| g.created_at);

        Ok(grants)
    }

    async fn consume_authorization_code(
        &self,
        code: &str,
        now: OffsetDateTime,
    ) -> GrantResult<Option<AuthorizationGrant>> {
        let mut table = self.table.write().await;

        let Some(id) = table.token_index(TokenKind::AuthorizationCode).get(code).copied() else {
            return Ok(None);
        };
        let Some(grant) = table.grants.get_mut(&id) else {
            return Ok(None);
        };
        let Some(authorization_code) = grant.authorization_code.as_mut() else {
            return Ok(None);
        };

        if !authorization_code.is_active_at(now) {
            tracing::debug!(
                grant_id = %id,
                consumed = authorization_code.is_consumed(),
                "Authorization code is not exchangeable"
            );
            return Ok(None);
        }

        let now = truncate_to_micros(now);
        authorization_code.consumed_at = Some(now);
        grant.updated_at = now;

        Ok(Some(grant.clone()))
    }

    async fn delete_by_id(&self, id: Uuid) -> GrantResult<bool> {
        let mut table = self.table.write().await;
        Ok(table.remove(id).is_some())
    }

    async fn delete_by_registered_client_id_and_principal_name(
        &self,
        registered_client_id: &str,
        principal_name: &str,
    ) -> GrantResult<u64> {
        let mut table = self.table.write().await;
        let owner = (registered_client_id.to_string(), principal_name.to_string());

        let ids: Vec<Uuid> = table
            .by_owner
            .get(&owner)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default();

        let deleted = ids
            .into_iter()
            .filter(|id| table.remove(*id).is_some())
            .count() as u64;

        tracing::debug!(
            registered_client_id,
            principal_name,
            deleted,
            "Deleted grants for client and principal"
        );

        Ok(deleted)
    }

    async fn delete_by_access_token_expires_at_before(
        &self,
        cutoff: OffsetDateTime,
    ) -> GrantResult<u64> {
        let cutoff = truncate_to_micros(cutoff);
        let mut table = self.table.write().await;

        // (cutoff, nil) sorts before every entry expiring exactly at cutoff.
        let ids: Vec<Uuid> = table
            .by_access_expiry
            .range(..(cutoff, Uuid::nil()))
            .map(|(_, id)| *id)
            .collect();

        let deleted = ids
            .into_iter()
            .filter(|id| table.remove(*id).is_some())
            .count() as u64;

        if deleted > 0 {
            tracing::debug!(deleted, %cutoff, "Deleted grants with expired access tokens");
        }

        Ok(deleted)
    }

    async fn count(&self) -> GrantResult<u64> {
        let table = self.table.read().await;
        Ok(table.grants.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::TokenBindingPolicy;
    use crate::types::IssuedToken;
    use time::Duration;

    fn grant(client: &str, principal: &str) -> AuthorizationGrant {
        AuthorizationGrant::new(client, principal, "authorization_code")
    }

    fn with_access(mut grant: AuthorizationGrant, value: &str, expires_at: OffsetDateTime) -> AuthorizationGrant {
        grant.bind_tokens(
            IssuedToken::new(value, expires_at - Duration::hours(1)).expiring_at(expires_at),
            None,
            &TokenBindingPolicy::default(),
        );
        grant
    }

    #[tokio::test]
    async fn test_save_and_find_by_id() {
        let storage = InMemoryGrantStorage::new();
        let g = grant("client1", "alice").with_state("abc");

        let stored = storage.save(&g).await.unwrap();
        assert_eq!(stored.id, g.id);

        let found = storage.find_by_id(g.id).await.unwrap().unwrap();
        assert_eq!(found.state.as_deref(), Some("abc"));
        assert!(storage.find_by_id(Uuid::new_v4()).await.unwrap().is_none());
        assert_eq!(storage.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_update_reindexes() {
        let storage = InMemoryGrantStorage::new();
        let mut g = grant("client1", "alice").with_state("abc");
        storage.save(&g).await.unwrap();

        g.state = Some("xyz".to_string());
        storage.save(&g).await.unwrap();

        assert!(storage.find_by_state("abc").await.unwrap().is_none());
        assert_eq!(storage.find_by_state("xyz").await.unwrap().unwrap().id, g.id);
        assert_eq!(storage.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_update_preserves_created_at() {
        let storage = InMemoryGrantStorage::new();
        let g = grant("client1", "alice").with_state("abc");
        let first = storage.save(&g).await.unwrap();

        let mut changed = g.clone();
        changed.created_at = OffsetDateTime::UNIX_EPOCH;
        let second = storage.save(&changed).await.unwrap();
        assert_eq!(second.created_at, first.created_at);
    }

    #[tokio::test]
    async fn test_same_value_different_kind_does_not_conflict() {
        let storage = InMemoryGrantStorage::new();
        storage
            .save(&grant("client1", "alice").with_state("shared"))
            .await
            .unwrap();

        let other = with_access(
            grant("client1", "bob"),
            "shared",
            OffsetDateTime::now_utc() + Duration::hours(1),
        );
        assert!(storage.save(&other).await.is_ok());
    }

    #[tokio::test]
    async fn test_conflict_leaves_existing_grant_untouched() {
        let storage = InMemoryGrantStorage::new();
        let first = grant("client1", "alice").with_state("abc");
        storage.save(&first).await.unwrap();

        let second = grant("client2", "bob").with_state("abc");
        let err = storage.save(&second).await.unwrap_err();
        assert_eq!(err.conflict_kind(), Some(TokenKind::State));

        assert_eq!(storage.find_by_state("abc").await.unwrap().unwrap().id, first.id);
        assert!(storage.find_by_id(second.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_stale_save_does_not_reopen_consumed_code() {
        let storage = InMemoryGrantStorage::new();
        let now = OffsetDateTime::now_utc();
        let mut g = grant("client1", "alice").with_state("abc");
        g.bind_authorization_code(
            IssuedToken::new("code1", now).expiring_at(now + Duration::minutes(10)),
            &TokenBindingPolicy::default(),
        );
        storage.save(&g).await.unwrap();

        let stale = storage.find_by_state("abc").await.unwrap().unwrap();
        assert!(storage.consume_authorization_code("code1", now).await.unwrap().is_some());

        let stale = stale.with_attributes(serde_json::json!({"scope": "openid"}));
        let saved = storage.save(&stale).await.unwrap();
        assert!(saved.authorization_code.unwrap().is_consumed());
        assert!(storage.consume_authorization_code("code1", now).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_truncates_to_micros() {
        let storage = InMemoryGrantStorage::new();
        let expires_at = time::macros::datetime!(2026-10-17 12:00:00.123_456_789 UTC);
        let g = with_access(grant("client1", "alice"), "tok1", expires_at);

        let saved = storage.save(&g).await.unwrap();
        assert_eq!(
            saved.access_token_expires_at(),
            Some(time::macros::datetime!(2026-10-17 12:00:00.123_456 UTC))
        );
        assert_eq!(storage.find_by_id(g.id).await.unwrap(), Some(saved));

        // A cutoff equal to the unrounded expiry is not strictly after it.
        assert_eq!(
            storage
                .delete_by_access_token_expires_at_before(expires_at)
                .await
                .unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn test_consume_rejects_expired_and_consumed() {
        let storage = InMemoryGrantStorage::new();
        let now = OffsetDateTime::now_utc();
        let mut g = grant("client1", "alice");
        g.bind_authorization_code(
            IssuedToken::new("code1", now).expiring_at(now + Duration::minutes(10)),
            &TokenBindingPolicy::default(),
        );
        storage.save(&g).await.unwrap();

        assert!(
            storage
                .consume_authorization_code("code1", now + Duration::minutes(11))
                .await
                .unwrap()
                .is_none()
        );

        let consumed = storage
            .consume_authorization_code("code1", now)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            consumed.authorization_code.unwrap().consumed_at,
            Some(truncate_to_micros(now))
        );

        assert!(storage.consume_authorization_code("code1", now).await.unwrap().is_none());
        assert!(storage.consume_authorization_code("nope", now).await.unwrap().is_none());

        // The plain lookup still sees the consumed code.
        let found = storage.find_by_authorization_code("code1").await.unwrap().unwrap();
        assert!(found.authorization_code.unwrap().is_consumed());
    }

    #[tokio::test]
    async fn test_delete_by_id_is_idempotent() {
        let storage = InMemoryGrantStorage::new();
        let g = grant("client1", "alice").with_state("abc");
        storage.save(&g).await.unwrap();

        assert!(storage.delete_by_id(g.id).await.unwrap());
        assert!(!storage.delete_by_id(g.id).await.unwrap());
        assert!(storage.find_by_state("abc").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sweep_skips_grants_without_access_expiry() {
        let storage = InMemoryGrantStorage::new();
        let now = OffsetDateTime::now_utc();

        storage.save(&grant("client1", "alice").with_state("s1")).await.unwrap();
        let mut no_expiry = grant("client1", "bob");
        no_expiry.access_token = Some(IssuedToken::new("tok", now - Duration::days(30)));
        storage.save(&no_expiry).await.unwrap();

        let deleted = storage
            .delete_by_access_token_expires_at_before(now + Duration::days(365))
            .await
            .unwrap();
        assert_eq!(deleted, 0);
        assert_eq!(storage.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_sweep_uses_latest_access_expiry_after_rotation() {
        let storage = InMemoryGrantStorage::new();
        let now = OffsetDateTime::now_utc();

        let mut g = with_access(grant("client1", "alice"), "tok1", now - Duration::minutes(5));
        storage.save(&g).await.unwrap();

        g = with_access(g, "tok2", now + Duration::hours(1));
        storage.save(&g).await.unwrap();

        assert_eq!(storage.delete_by_access_token_expires_at_before(now).await.unwrap(), 0);
        assert!(storage.find_by_access_token("tok1").await.unwrap().is_none());
        assert!(storage.find_by_access_token("tok2").await.unwrap().is_some());
    }
}
