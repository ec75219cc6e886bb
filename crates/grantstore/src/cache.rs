//! Read-through grant cache.
//!
//! [`CachingGrantStorage`] wraps any [`GrantStorage`] and serves repeated
//! state, access-token and refresh-token lookups from memory. Token
//! validation on a resource server hits the same access token many times,
//! so this is where the cache pays off.
//!
//! ## Cache Keys
//!
//! Entries are keyed by `(TokenKind, value)`. A hit stores the grant under
//! every cacheable key it has, so a later lookup by another key of the same
//! grant is a hit too. Authorization-code lookups and misses are never
//! cached.
//!
//! ## Invalidation
//!
//! Every write through the decorator drops all cached entries of the
//! affected grants, whichever key they were cached under, before it
//! returns. A monotonically increasing epoch is bumped on each
//! invalidation; a read that started before the bump does not keep what it
//! inserted, so a slow read can never resurrect a revoked grant.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::GrantResult;
use crate::config::CacheConfig;
use crate::storage::GrantStorage;
use crate::types::{AuthorizationGrant, TokenKind};

type CacheKey = (TokenKind, String);

/// Cached grant with expiration time.
struct CachedEntry {
    grant: Arc<AuthorizationGrant>,
    expires_at: Instant,
}

/// Cache statistics for monitoring.
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    /// Number of entries currently in the cache.
    pub size: usize,
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses.
    pub misses: u64,
    /// Number of entries evicted due to TTL expiration.
    pub evictions: u64,
    /// Number of invalidations caused by writes.
    pub invalidations: u64,
}

impl CacheStats {
    /// Calculate hit rate as a percentage.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}

/// Caching decorator over a [`GrantStorage`].
pub struct CachingGrantStorage {
    inner: Arc<dyn GrantStorage>,
    entries: DashMap<CacheKey, CachedEntry>,
    ttl: Duration,
    max_entries: usize,
    epoch: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    invalidations: AtomicU64,
}

impl CachingGrantStorage {
    /// Wraps `inner` with a cache of the given TTL and size bound.
    pub fn new(inner: Arc<dyn GrantStorage>, ttl: Duration, max_entries: usize) -> Self {
        Self {
            inner,
            entries: DashMap::new(),
            ttl,
            max_entries,
            epoch: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            invalidations: AtomicU64::new(0),
        }
    }

    /// Wraps `inner` according to `config`.
    ///
    /// Returns `inner` unchanged when the cache is disabled.
    pub fn from_config(inner: Arc<dyn GrantStorage>, config: &CacheConfig) -> Arc<dyn GrantStorage> {
        if config.enabled {
            Arc::new(Self::new(inner, config.ttl, config.max_entries))
        } else {
            inner
        }
    }

    /// Returns `true` if lookups of `kind` are served from the cache.
    fn is_cacheable(kind: TokenKind) -> bool {
        !matches!(kind, TokenKind::AuthorizationCode)
    }

    /// Get statistics for monitoring.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            size: self.entries.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
        }
    }

    /// Remove expired entries. Returns the number of entries removed.
    pub fn cleanup_expired(&self) -> usize {
        let now = Instant::now();
        let mut removed = 0;

        self.entries.retain(|_, entry| {
            if entry.expires_at <= now {
                removed += 1;
                false
            } else {
                true
            }
        });

        if removed > 0 {
            self.evictions.fetch_add(removed as u64, Ordering::Relaxed);
        }

        removed
    }

    /// Drop every cached entry.
    pub fn clear(&self) {
        self.epoch.fetch_add(1, Ordering::AcqRel);
        self.entries.clear();
    }

    fn get_cached(&self, key: &CacheKey) -> Option<AuthorizationGrant> {
        if let Some(entry) = self.entries.get(key) {
            if entry.expires_at > Instant::now() {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Some(entry.grant.as_ref().clone());
            }
            // Release the shard lock before removing.
            drop(entry);
            self.entries.remove(key);
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    fn has_room_for(&self, keys: usize) -> bool {
        self.entries.len() + keys <= self.max_entries
    }

    /// Cache `grant` under its cacheable keys unless an invalidation
    /// happened since `epoch` was read.
    fn insert_if_current(&self, epoch: u64, grant: &AuthorizationGrant) {
        let keys: Vec<CacheKey> = grant
            .lookup_keys()
            .filter(|(kind, _)| Self::is_cacheable(*kind))
            .map(|(kind, value)| (kind, value.to_string()))
            .collect();

        if !self.has_room_for(keys.len()) {
            self.cleanup_expired();
            if !self.has_room_for(keys.len()) {
                tracing::trace!("Grant cache full, skipping insert");
                return;
            }
        }

        let shared = Arc::new(grant.clone());
        let expires_at = Instant::now() + self.ttl;

        for key in &keys {
            self.entries.insert(
                key.clone(),
                CachedEntry {
                    grant: Arc::clone(&shared),
                    expires_at,
                },
            );
        }

        if self.epoch.load(Ordering::Acquire) != epoch {
            for key in &keys {
                self.entries
                    .remove_if(key, |_, entry| Arc::ptr_eq(&entry.grant, &shared));
            }
        }
    }

    async fn cached_lookup(
        &self,
        kind: TokenKind,
        value: &str,
    ) -> GrantResult<Option<AuthorizationGrant>> {
        let key = (kind, value.to_string());
        if let Some(grant) = self.get_cached(&key) {
            tracing::trace!(kind = %kind, "Grant cache hit");
            return Ok(Some(grant));
        }

        let epoch = self.epoch.load(Ordering::Acquire);
        let found = match kind {
            TokenKind::State => self.inner.find_by_state(value).await?,
            TokenKind::AuthorizationCode => self.inner.find_by_authorization_code(value).await?,
            TokenKind::AccessToken => self.inner.find_by_access_token(value).await?,
            TokenKind::RefreshToken => self.inner.find_by_refresh_token(value).await?,
        };

        if let Some(grant) = &found {
            self.insert_if_current(epoch, grant);
        }

        Ok(found)
    }

    /// Drop every entry matching `predicate`.
    fn invalidate_where(&self, predicate: impl Fn(&AuthorizationGrant) -> bool) {
        self.epoch.fetch_add(1, Ordering::AcqRel);
        let mut removed = 0u64;
        self.entries.retain(|_, entry| {
            if predicate(entry.grant.as_ref()) {
                removed += 1;
                false
            } else {
                true
            }
        });
        if removed > 0 {
            self.invalidations.fetch_add(removed, Ordering::Relaxed);
        }
    }

    fn invalidate_grant(&self, id: Uuid) {
        self.invalidate_where(|grant| grant.id == id);
    }
}

#[async_trait]
impl GrantStorage for CachingGrantStorage {
    async fn save(&self, grant: &AuthorizationGrant) -> GrantResult<AuthorizationGrant> {
        let result = self.inner.save(grant).await;
        // Invalidate even on failure: the backend may have applied the write
        // before reporting an error.
        self.invalidate_grant(grant.id);
        result
    }

    async fn find_by_id(&self, id: Uuid) -> GrantResult<Option<AuthorizationGrant>> {
        self.inner.find_by_id(id).await
    }

    async fn find_by_state(&self, state: &str) -> GrantResult<Option<AuthorizationGrant>> {
        self.cached_lookup(TokenKind::State, state).await
    }

    async fn find_by_authorization_code(
        &self,
        code: &str,
    ) -> GrantResult<Option<AuthorizationGrant>> {
        self.inner.find_by_authorization_code(code).await
    }

    async fn find_by_access_token(&self, token: &str) -> GrantResult<Option<AuthorizationGrant>> {
        self.cached_lookup(TokenKind::AccessToken, token).await
    }

    async fn find_by_refresh_token(&self, token: &str) -> GrantResult<Option<AuthorizationGrant>> {
        self.cached_lookup(TokenKind::RefreshToken, token).await
    }

    async fn find_all_by_registered_client_id_and_principal_name(
        &self,
        registered_client_id: &str,
        principal_name: &str,
    ) -> GrantResult<Vec<AuthorizationGrant>> {
        self.inner
            .find_all_by_registered_client_id_and_principal_name(registered_client_id, principal_name)
            .await
    }

    async fn consume_authorization_code(
        &self,
        code: &str,
        now: OffsetDateTime,
    ) -> GrantResult<Option<AuthorizationGrant>> {
        let consumed = self.inner.consume_authorization_code(code, now).await?;
        if let Some(grant) = &consumed {
            self.invalidate_grant(grant.id);
        }
        Ok(consumed)
    }

    async fn delete_by_id(&self, id: Uuid) -> GrantResult<bool> {
        let result = self.inner.delete_by_id(id).await;
        self.invalidate_grant(id);
        result
    }

    async fn delete_by_registered_client_id_and_principal_name(
        &self,
        registered_client_id: &str,
        principal_name: &str,
    ) -> GrantResult<u64> {
        let result = self
            .inner
            .delete_by_registered_client_id_and_principal_name(registered_client_id, principal_name)
            .await;
        self.invalidate_where(|grant| grant.belongs_to(registered_client_id, principal_name));
        result
    }

    async fn delete_by_access_token_expires_at_before(
        &self,
        cutoff: OffsetDateTime,
    ) -> GrantResult<u64> {
        let result = self.inner.delete_by_access_token_expires_at_before(cutoff).await;
        self.invalidate_where(|grant| grant.is_swept_by(cutoff));
        result
    }

    async fn count(&self) -> GrantResult<u64> {
        self.inner.count().await
    }
}
