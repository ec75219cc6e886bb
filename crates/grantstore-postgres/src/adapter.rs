//! [`GrantStorage`] implementation for [`PostgresGrantStorage`].
//!
//! Each call borrows the pool through [`GrantRows`](crate::GrantRows) and
//! maps backend errors into [`GrantStoreError`].

use async_trait::async_trait;
use grantstore::storage::validate_grant;
use grantstore::{AuthorizationGrant, GrantResult, GrantStorage, GrantStoreError, TokenKind};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::PostgresGrantStorage;

#[async_trait]
impl GrantStorage for PostgresGrantStorage {
    async fn save(&self, grant: &AuthorizationGrant) -> GrantResult<AuthorizationGrant> {
        validate_grant(grant)?;
        self.grants()
            .upsert(grant)
            .await
            .map_err(GrantStoreError::from)
    }

    async fn find_by_id(&self, id: Uuid) -> GrantResult<Option<AuthorizationGrant>> {
        Ok(self.grants().find_by_id(id).await?)
    }

    async fn find_by_state(&self, state: &str) -> GrantResult<Option<AuthorizationGrant>> {
        Ok(self.grants().find_by_token(TokenKind::State, state).await?)
    }

    async fn find_by_authorization_code(
        &self,
        code: &str,
    ) -> GrantResult<Option<AuthorizationGrant>> {
        Ok(self
            .grants()
            .find_by_token(TokenKind::AuthorizationCode, code)
            .await?)
    }

    async fn find_by_access_token(&self, token: &str) -> GrantResult<Option<AuthorizationGrant>> {
        Ok(self
            .grants()
            .find_by_token(TokenKind::AccessToken, token)
            .await?)
    }

    async fn find_by_refresh_token(&self, token: &str) -> GrantResult<Option<AuthorizationGrant>> {
        Ok(self
            .grants()
            .find_by_token(TokenKind::RefreshToken, token)
            .await?)
    }

    async fn find_all_by_registered_client_id_and_principal_name(
        &self,
        registered_client_id: &str,
        principal_name: &str,
    ) -> GrantResult<Vec<AuthorizationGrant>> {
        Ok(self
            .grants()
            .find_by_owner(registered_client_id, principal_name)
            .await?)
    }

    async fn consume_authorization_code(
        &self,
        code: &str,
        now: OffsetDateTime,
    ) -> GrantResult<Option<AuthorizationGrant>> {
        Ok(self.grants().consume_code(code, now).await?)
    }

    async fn delete_by_id(&self, id: Uuid) -> GrantResult<bool> {
        Ok(self.grants().delete_by_id(id).await?)
    }

    async fn delete_by_registered_client_id_and_principal_name(
        &self,
        registered_client_id: &str,
        principal_name: &str,
    ) -> GrantResult<u64> {
        let deleted = self
            .grants()
            .delete_by_owner(registered_client_id, principal_name)
            .await?;

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
        Ok(self.grants().delete_expired(cutoff).await?)
    }

    async fn count(&self) -> GrantResult<u64> {
        Ok(self.grants().count().await?)
    }
}
