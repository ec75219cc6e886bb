//! Authorization grant table access.
//!
//! One statement per operation against the `authorization_grant` table.
//! Credential values are never logged.

use grantstore::{AuthorizationGrant, IssuedToken, TokenKind, truncate_to_micros};
use sqlx_core::from_row::FromRow;
use sqlx_core::query::query;
use sqlx_core::query_as::query_as;
use sqlx_core::query_scalar::query_scalar;
use sqlx_core::row::Row;
use sqlx_postgres::{PgRow, Postgres};
use time::OffsetDateTime;
use tracing::instrument;
use uuid::Uuid;

use crate::{PgPool, StorageError, StorageResult};

/// Partial unique indexes and the credential each one guards.
pub const UNIQUE_INDEXES: [(&str, TokenKind); 4] = [
    ("authorization_grant_state_key", TokenKind::State),
    ("authorization_grant_code_key", TokenKind::AuthorizationCode),
    ("authorization_grant_access_token_key", TokenKind::AccessToken),
    ("authorization_grant_refresh_token_key", TokenKind::RefreshToken),
];

macro_rules! grant_columns {
    () => {
        "id, registered_client_id, principal_name, authorization_grant_type, state, \
         authorization_code_value, authorization_code_issued_at, \
         authorization_code_expires_at, authorization_code_consumed_at, \
         access_token_value, access_token_issued_at, access_token_expires_at, \
         refresh_token_value, refresh_token_issued_at, refresh_token_expires_at, \
         attributes, created_at, updated_at"
    };
}

// =============================================================================
// Row Type
// =============================================================================

/// Grant record as stored, one column per field.
#[derive(Debug, Clone)]
pub struct GrantRow {
    pub id: Uuid,
    pub registered_client_id: String,
    pub principal_name: String,
    pub authorization_grant_type: String,
    pub state: Option<String>,
    pub authorization_code_value: Option<String>,
    pub authorization_code_issued_at: Option<OffsetDateTime>,
    pub authorization_code_expires_at: Option<OffsetDateTime>,
    pub authorization_code_consumed_at: Option<OffsetDateTime>,
    pub access_token_value: Option<String>,
    pub access_token_issued_at: Option<OffsetDateTime>,
    pub access_token_expires_at: Option<OffsetDateTime>,
    pub refresh_token_value: Option<String>,
    pub refresh_token_issued_at: Option<OffsetDateTime>,
    pub refresh_token_expires_at: Option<OffsetDateTime>,
    pub attributes: serde_json::Value,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl<'r> FromRow<'r, PgRow> for GrantRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx_core::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            registered_client_id: row.try_get("registered_client_id")?,
            principal_name: row.try_get("principal_name")?,
            authorization_grant_type: row.try_get("authorization_grant_type")?,
            state: row.try_get("state")?,
            authorization_code_value: row.try_get("authorization_code_value")?,
            authorization_code_issued_at: row.try_get("authorization_code_issued_at")?,
            authorization_code_expires_at: row.try_get("authorization_code_expires_at")?,
            authorization_code_consumed_at: row.try_get("authorization_code_consumed_at")?,
            access_token_value: row.try_get("access_token_value")?,
            access_token_issued_at: row.try_get("access_token_issued_at")?,
            access_token_expires_at: row.try_get("access_token_expires_at")?,
            refresh_token_value: row.try_get("refresh_token_value")?,
            refresh_token_issued_at: row.try_get("refresh_token_issued_at")?,
            refresh_token_expires_at: row.try_get("refresh_token_expires_at")?,
            attributes: row.try_get("attributes")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

fn issued_token(
    kind: TokenKind,
    value: Option<String>,
    issued_at: Option<OffsetDateTime>,
    expires_at: Option<OffsetDateTime>,
    consumed_at: Option<OffsetDateTime>,
) -> StorageResult<Option<IssuedToken>> {
    match (value, issued_at) {
        (None, _) => Ok(None),
        (Some(value), Some(issued_at)) => Ok(Some(IssuedToken {
            value,
            issued_at,
            expires_at,
            consumed_at,
        })),
        (Some(_), None) => Err(StorageError::Corrupted(format!(
            "{kind} is present without issued_at"
        ))),
    }
}

impl GrantRow {
    /// Reassembles the domain grant.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Corrupted` if a credential value has no
    /// issue time.
    pub fn into_grant(self) -> StorageResult<AuthorizationGrant> {
        Ok(AuthorizationGrant {
            id: self.id,
            registered_client_id: self.registered_client_id,
            principal_name: self.principal_name,
            authorization_grant_type: self.authorization_grant_type,
            state: self.state,
            authorization_code: issued_token(
                TokenKind::AuthorizationCode,
                self.authorization_code_value,
                self.authorization_code_issued_at,
                self.authorization_code_expires_at,
                self.authorization_code_consumed_at,
            )?,
            access_token: issued_token(
                TokenKind::AccessToken,
                self.access_token_value,
                self.access_token_issued_at,
                self.access_token_expires_at,
                None,
            )?,
            refresh_token: issued_token(
                TokenKind::RefreshToken,
                self.refresh_token_value,
                self.refresh_token_issued_at,
                self.refresh_token_expires_at,
                None,
            )?,
            attributes: self.attributes,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

fn into_grant(row: Option<GrantRow>) -> StorageResult<Option<AuthorizationGrant>> {
    row.map(GrantRow::into_grant).transpose()
}

/// Maps a write failure, turning constraint violations into domain errors.
fn map_write_error(e: sqlx_core::Error, grant_id: Uuid) -> StorageError {
    if let sqlx_core::Error::Database(ref db_err) = e {
        if db_err.is_unique_violation()
            && let Some((_, kind)) = UNIQUE_INDEXES
                .iter()
                .find(|(name, _)| db_err.constraint() == Some(*name))
        {
            return StorageError::Conflict {
                kind: *kind,
                message: format!("value is already bound to another grant (saving {grant_id})"),
            };
        }
        if db_err.is_check_violation() {
            return StorageError::invalid_input(format!(
                "grant {grant_id} violates {}",
                db_err.constraint().unwrap_or("a check constraint")
            ));
        }
    }
    StorageError::from(e)
}

// =============================================================================
// Grant Rows
// =============================================================================

/// Grant table operations over a borrowed pool.
pub struct GrantRows<'a> {
    pool: &'a PgPool,
}

impl<'a> GrantRows<'a> {
    #[must_use]
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Inserts the grant, or overwrites the row with the same id.
    ///
    /// `created_at` of an existing row is kept; `updated_at` is set to now.
    /// A consumed authorization code stays consumed while the row keeps the
    /// same code value. Timestamps are stored at microsecond precision.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` if a credential value belongs to another grant.
    #[instrument(skip_all, fields(grant_id = %grant.id))]
    pub async fn upsert(&self, grant: &AuthorizationGrant) -> StorageResult<AuthorizationGrant> {
        let mut grant = grant.clone();
        grant.truncate_timestamps();
        let grant = &grant;

        let code = grant.authorization_code.as_ref();
        let access = grant.access_token.as_ref();
        let refresh = grant.refresh_token.as_ref();

        let row: GrantRow = query_as::<Postgres, GrantRow>(concat!(
            "INSERT INTO authorization_grant (",
            grant_columns!(),
            ") VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
            ON CONFLICT (id) DO UPDATE SET
                registered_client_id = EXCLUDED.registered_client_id,
                principal_name = EXCLUDED.principal_name,
                authorization_grant_type = EXCLUDED.authorization_grant_type,
                state = EXCLUDED.state,
                authorization_code_value = EXCLUDED.authorization_code_value,
                authorization_code_issued_at = EXCLUDED.authorization_code_issued_at,
                authorization_code_expires_at = EXCLUDED.authorization_code_expires_at,
                authorization_code_consumed_at = CASE
                    WHEN authorization_grant.authorization_code_value = EXCLUDED.authorization_code_value
                    THEN COALESCE(
                        authorization_grant.authorization_code_consumed_at,
                        EXCLUDED.authorization_code_consumed_at
                    )
                    ELSE EXCLUDED.authorization_code_consumed_at
                END,
                access_token_value = EXCLUDED.access_token_value,
                access_token_issued_at = EXCLUDED.access_token_issued_at,
                access_token_expires_at = EXCLUDED.access_token_expires_at,
                refresh_token_value = EXCLUDED.refresh_token_value,
                refresh_token_issued_at = EXCLUDED.refresh_token_issued_at,
                refresh_token_expires_at = EXCLUDED.refresh_token_expires_at,
                attributes = EXCLUDED.attributes,
                updated_at = EXCLUDED.updated_at
            RETURNING ",
            grant_columns!()
        ))
        .bind(grant.id)
        .bind(&grant.registered_client_id)
        .bind(&grant.principal_name)
        .bind(&grant.authorization_grant_type)
        .bind(grant.state.as_deref())
        .bind(code.map(|t| t.value.as_str()))
        .bind(code.map(|t| t.issued_at))
        .bind(code.and_then(|t| t.expires_at))
        .bind(code.and_then(|t| t.consumed_at))
        .bind(access.map(|t| t.value.as_str()))
        .bind(access.map(|t| t.issued_at))
        .bind(access.and_then(|t| t.expires_at))
        .bind(refresh.map(|t| t.value.as_str()))
        .bind(refresh.map(|t| t.issued_at))
        .bind(refresh.and_then(|t| t.expires_at))
        .bind(&grant.attributes)
        .bind(grant.created_at)
        .bind(truncate_to_micros(OffsetDateTime::now_utc()))
        .fetch_one(self.pool)
        .await
        .map_err(|e| map_write_error(e, grant.id))?;

        row.into_grant()
    }

    /// Finds a grant by id.
    pub async fn find_by_id(&self, id: Uuid) -> StorageResult<Option<AuthorizationGrant>> {
        let row = query_as::<Postgres, GrantRow>(concat!(
            "SELECT ",
            grant_columns!(),
            " FROM authorization_grant WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        into_grant(row)
    }

    /// Finds a grant by a credential value of the given kind.
    #[instrument(skip(self, value))]
    pub async fn find_by_token(
        &self,
        kind: TokenKind,
        value: &str,
    ) -> StorageResult<Option<AuthorizationGrant>> {
        let sql = match kind {
            TokenKind::State => concat!(
                "SELECT ",
                grant_columns!(),
                " FROM authorization_grant WHERE state = $1"
            ),
            TokenKind::AuthorizationCode => concat!(
                "SELECT ",
                grant_columns!(),
                " FROM authorization_grant WHERE authorization_code_value = $1"
            ),
            TokenKind::AccessToken => concat!(
                "SELECT ",
                grant_columns!(),
                " FROM authorization_grant WHERE access_token_value = $1"
            ),
            TokenKind::RefreshToken => concat!(
                "SELECT ",
                grant_columns!(),
                " FROM authorization_grant WHERE refresh_token_value = $1"
            ),
        };

        let row = query_as::<Postgres, GrantRow>(sql)
            .bind(value)
            .fetch_optional(self.pool)
            .await?;

        into_grant(row)
    }

    /// Lists a client's grants for one principal, oldest first.
    pub async fn find_by_owner(
        &self,
        registered_client_id: &str,
        principal_name: &str,
    ) -> StorageResult<Vec<AuthorizationGrant>> {
        let rows = query_as::<Postgres, GrantRow>(concat!(
            "SELECT ",
            grant_columns!(),
            " FROM authorization_grant
              WHERE registered_client_id = $1 AND principal_name = $2
              ORDER BY created_at"
        ))
        .bind(registered_client_id)
        .bind(principal_name)
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(GrantRow::into_grant).collect()
    }

    /// Marks an authorization code consumed if it is still exchangeable at `now`.
    ///
    /// The conditional update makes concurrent exchanges race on the row
    /// lock; only the first one sees `consumed_at IS NULL`.
    #[instrument(skip(self, code))]
    pub async fn consume_code(
        &self,
        code: &str,
        now: OffsetDateTime,
    ) -> StorageResult<Option<AuthorizationGrant>> {
        let row = query_as::<Postgres, GrantRow>(concat!(
            "UPDATE authorization_grant
             SET authorization_code_consumed_at = $2,
                 updated_at = $2
             WHERE authorization_code_value = $1
               AND authorization_code_consumed_at IS NULL
               AND (authorization_code_expires_at IS NULL OR authorization_code_expires_at > $2)
             RETURNING ",
            grant_columns!()
        ))
        .bind(code)
        .bind(truncate_to_micros(now))
        .fetch_optional(self.pool)
        .await?;

        into_grant(row)
    }

    /// Deletes a grant by id.
    pub async fn delete_by_id(&self, id: Uuid) -> StorageResult<bool> {
        let result = query("DELETE FROM authorization_grant WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Deletes every grant of a client for one principal.
    #[instrument(skip(self))]
    pub async fn delete_by_owner(
        &self,
        registered_client_id: &str,
        principal_name: &str,
    ) -> StorageResult<u64> {
        let result = query(
            r#"
            DELETE FROM authorization_grant
            WHERE registered_client_id = $1 AND principal_name = $2
            "#,
        )
        .bind(registered_client_id)
        .bind(principal_name)
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Deletes grants whose access token expired strictly before `cutoff`.
    #[instrument(skip(self))]
    pub async fn delete_expired(&self, cutoff: OffsetDateTime) -> StorageResult<u64> {
        let result = query(
            r#"
            DELETE FROM authorization_grant
            WHERE access_token_expires_at < $1
            "#,
        )
        .bind(truncate_to_micros(cutoff))
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Counts stored grants.
    pub async fn count(&self) -> StorageResult<u64> {
        let count = query_scalar::<Postgres, i64>("SELECT COUNT(*) FROM authorization_grant")
            .fetch_one(self.pool)
            .await?;

        Ok(u64::try_from(count).unwrap_or_default())
    }
}
