//! Authorization grant domain type.
//!
//! A grant is the single persisted record of one OAuth 2.0 authorization
//! transaction. Its token fields are bound progressively as the flow
//! advances (state, then authorization code, then access and refresh
//! tokens), and every one of them resolves back to the same record.
//!
//! # Security
//!
//! - Token values are secrets; never log them
//! - Each token value is unique per [`TokenKind`] across all live grants
//! - Authorization codes are single-use and must be consumed atomically

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::binding::TokenBindingPolicy;

/// Identifies one of the four secondary lookup keys of a grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    /// Anti-CSRF correlation value of the redirect step.
    State,
    /// Short-lived, single-use authorization code.
    AuthorizationCode,
    /// Bearer access token.
    AccessToken,
    /// Long-lived refresh token.
    RefreshToken,
}

impl TokenKind {
    /// All kinds, in the order used by untyped lookups.
    pub const ALL: [TokenKind; 4] = [
        TokenKind::State,
        TokenKind::AuthorizationCode,
        TokenKind::AccessToken,
        TokenKind::RefreshToken,
    ];

    /// Returns the snake_case name of this kind.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::State => "state",
            Self::AuthorizationCode => "authorization_code",
            Self::AccessToken => "access_token",
            Self::RefreshToken => "refresh_token",
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TokenKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "state" => Ok(Self::State),
            "authorization_code" | "code" => Ok(Self::AuthorizationCode),
            "access_token" | "access" => Ok(Self::AccessToken),
            "refresh_token" | "refresh" => Ok(Self::RefreshToken),
            other => Err(format!("unknown token kind: {other}")),
        }
    }
}

/// A credential bound to a grant, with its lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedToken {
    /// Opaque token value. Compared by equality only.
    pub value: String,

    /// When the token was issued.
    #[serde(with = "time::serde::rfc3339")]
    pub issued_at: OffsetDateTime,

    /// When the token expires (None = no expiration).
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "time::serde::rfc3339::option"
    )]
    pub expires_at: Option<OffsetDateTime>,

    /// When the token was consumed. Only authorization codes are consumed.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "time::serde::rfc3339::option"
    )]
    pub consumed_at: Option<OffsetDateTime>,
}

impl IssuedToken {
    /// Creates a token issued at `issued_at` with no expiry.
    #[must_use]
    pub fn new(value: impl Into<String>, issued_at: OffsetDateTime) -> Self {
        Self {
            value: value.into(),
            issued_at,
            expires_at: None,
            consumed_at: None,
        }
    }

    /// Sets the expiry.
    #[must_use]
    pub fn expiring_at(mut self, expires_at: OffsetDateTime) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Returns `true` if the token is expired at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        self.expires_at.map(|exp| now >= exp).unwrap_or(false)
    }

    /// Returns `true` if the token has been consumed.
    #[must_use]
    pub fn is_consumed(&self) -> bool {
        self.consumed_at.is_some()
    }

    /// Returns `true` if the token is neither expired at `now` nor consumed.
    #[must_use]
    pub fn is_active_at(&self, now: OffsetDateTime) -> bool {
        !self.is_expired_at(now) && !self.is_consumed()
    }

    fn truncate_timestamps(&mut self) {
        self.issued_at = truncate_to_micros(self.issued_at);
        self.expires_at = self.expires_at.map(truncate_to_micros);
        self.consumed_at = self.consumed_at.map(truncate_to_micros);
    }
}

/// Rounds `at` down to whole microseconds.
///
/// Backends store timestamps at microsecond precision, so every timestamp
/// is truncated on write and a saved grant compares equal to what is read
/// back.
#[must_use]
pub fn truncate_to_micros(at: OffsetDateTime) -> OffsetDateTime {
    let nanos = at.nanosecond();
    at.replace_nanosecond(nanos - nanos % 1_000).unwrap_or(at)
}

/// Persisted record of one OAuth 2.0 authorization transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationGrant {
    /// Unique identifier, assigned at creation.
    pub id: Uuid,

    /// Client this grant belongs to.
    pub registered_client_id: String,

    /// Authenticated subject (user or service).
    pub principal_name: String,

    /// OAuth 2.0 grant type, e.g. `authorization_code`.
    pub authorization_grant_type: String,

    /// Redirect-step correlation value. Present while a code exchange is pending.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization_code: Option<IssuedToken>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<IssuedToken>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<IssuedToken>,

    /// Opaque metadata (scopes, extension attributes). Passed through unchanged.
    #[serde(default)]
    pub attributes: serde_json::Value,

    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,

    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl AuthorizationGrant {
    /// Creates a new grant for a client and principal with a fresh id.
    #[must_use]
    pub fn new(
        registered_client_id: impl Into<String>,
        principal_name: impl Into<String>,
        authorization_grant_type: impl Into<String>,
    ) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id: Uuid::new_v4(),
            registered_client_id: registered_client_id.into(),
            principal_name: principal_name.into(),
            authorization_grant_type: authorization_grant_type.into(),
            state: None,
            authorization_code: None,
            access_token: None,
            refresh_token: None,
            attributes: serde_json::Value::Null,
            created_at: now,
            updated_at: now,
        }
    }

    /// Sets the redirect-step state.
    #[must_use]
    pub fn with_state(mut self, state: impl Into<String>) -> Self {
        self.state = Some(state.into());
        self
    }

    /// Sets the opaque metadata blob.
    #[must_use]
    pub fn with_attributes(mut self, attributes: serde_json::Value) -> Self {
        self.attributes = attributes;
        self
    }

    /// Binds an authorization code, clearing `state` if the policy says so.
    pub fn bind_authorization_code(&mut self, code: IssuedToken, policy: &TokenBindingPolicy) {
        if policy.clear_state_on_code {
            self.state = None;
        }
        self.authorization_code = Some(code);
    }

    /// Binds an access token and optional refresh token.
    ///
    /// Earlier fields are cleared according to `policy`. A `None` refresh
    /// token leaves any existing refresh token in place, which is what a
    /// refresh without rotation needs.
    pub fn bind_tokens(
        &mut self,
        access_token: IssuedToken,
        refresh_token: Option<IssuedToken>,
        policy: &TokenBindingPolicy,
    ) {
        if policy.clear_state_on_token {
            self.state = None;
        }
        if policy.clear_code_on_token {
            self.authorization_code = None;
        }
        self.access_token = Some(access_token);
        if let Some(refresh) = refresh_token {
            self.refresh_token = Some(refresh);
        }
    }

    /// Returns the value bound for `kind`, if any.
    #[must_use]
    pub fn token_value(&self, kind: TokenKind) -> Option<&str> {
        match kind {
            TokenKind::State => self.state.as_deref(),
            TokenKind::AuthorizationCode => self.authorization_code.as_ref().map(|t| t.value.as_str()),
            TokenKind::AccessToken => self.access_token.as_ref().map(|t| t.value.as_str()),
            TokenKind::RefreshToken => self.refresh_token.as_ref().map(|t| t.value.as_str()),
        }
    }

    /// Returns every bound secondary key of this grant.
    pub fn lookup_keys(&self) -> impl Iterator<Item = (TokenKind, &str)> {
        TokenKind::ALL
            .into_iter()
            .filter_map(|kind| self.token_value(kind).map(|value| (kind, value)))
    }

    /// Access-token expiry, the only timestamp the expiry sweep looks at.
    #[must_use]
    pub fn access_token_expires_at(&self) -> Option<OffsetDateTime> {
        self.access_token.as_ref().and_then(|t| t.expires_at)
    }

    /// Returns `true` if the sweep with `cutoff` would remove this grant.
    #[must_use]
    pub fn is_swept_by(&self, cutoff: OffsetDateTime) -> bool {
        self.access_token_expires_at()
            .map(|exp| exp < cutoff)
            .unwrap_or(false)
    }

    /// Truncates every timestamp to microsecond precision.
    pub fn truncate_timestamps(&mut self) {
        for token in [
            self.authorization_code.as_mut(),
            self.access_token.as_mut(),
            self.refresh_token.as_mut(),
        ]
        .into_iter()
        .flatten()
        {
            token.truncate_timestamps();
        }
        self.created_at = truncate_to_micros(self.created_at);
        self.updated_at = truncate_to_micros(self.updated_at);
    }

    /// Keeps the consumption mark of `previous` when both carry the same
    /// authorization code.
    ///
    /// A consumed code never becomes exchangeable again through a save of
    /// a copy read before the exchange.
    pub fn retain_code_consumption(&mut self, previous: &AuthorizationGrant) {
        if let (Some(code), Some(before)) = (
            self.authorization_code.as_mut(),
            previous.authorization_code.as_ref(),
        ) && code.value == before.value
        {
            code.consumed_at = before.consumed_at.or(code.consumed_at);
        }
    }

    /// Returns `true` if the grant belongs to the client and principal.
    #[must_use]
    pub fn belongs_to(&self, registered_client_id: &str, principal_name: &str) -> bool {
        self.registered_client_id == registered_client_id && self.principal_name == principal_name
    }
}

/// Generate a cryptographically secure random token value.
///
/// Returns a 256-bit random value encoded as base64url (43 characters).
/// Use it to regenerate a value after a uniqueness conflict.
#[must_use]
pub fn generate_token() -> String {
    use base64::Engine;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;

    let mut bytes = [0u8; 32];
    rand::Rng::fill(&mut rand::thread_rng(), &mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
