//! Grant store error types.
//!
//! A lookup miss is never an error: the storage trait reports absence with
//! `Option`/empty `Vec`. Everything here is something the caller must act
//! on, either by retrying with a fresh token value (`Conflict`) or by failing
//! closed (`StorageUnavailable`, `Serialization`).

use std::fmt;

use crate::types::TokenKind;

/// Errors returned by grant storage operations.
#[derive(Debug, thiserror::Error)]
pub enum GrantStoreError {
    /// A write would bind a token value already used by another grant.
    #[error("Conflict on {kind}: {message}")]
    Conflict {
        /// The secondary key that collided.
        kind: TokenKind,
        /// Description of the conflict. Never contains the token value.
        message: String,
    },

    /// The backing store could not be reached or timed out.
    #[error("Storage unavailable: {message}")]
    StorageUnavailable {
        /// Description of the failure.
        message: String,
    },

    /// A stored grant could not be decoded.
    #[error("Serialization error: {message}")]
    Serialization {
        /// Description of the decode failure.
        message: String,
    },

    /// A write violated a non-null invariant of the grant.
    #[error("Invalid input: {message}")]
    InvalidInput {
        /// Description of the invalid field.
        message: String,
    },

    /// The store configuration is invalid.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the configuration error.
        message: String,
    },
}

impl GrantStoreError {
    /// Creates a new `Conflict` error.
    #[must_use]
    pub fn conflict(kind: TokenKind, message: impl Into<String>) -> Self {
        Self::Conflict {
            kind,
            message: message.into(),
        }
    }

    /// Creates a new `StorageUnavailable` error.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::StorageUnavailable {
            message: message.into(),
        }
    }

    /// Creates a new `Serialization` error.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidInput` error.
    #[must_use]
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Creates a new `Configuration` error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Returns `true` if this is a uniqueness conflict.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// Returns the colliding key kind for a conflict.
    #[must_use]
    pub fn conflict_kind(&self) -> Option<TokenKind> {
        match self {
            Self::Conflict { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Returns `true` if the operation may succeed when retried unchanged.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StorageUnavailable { .. })
    }

    /// Returns `true` if the caller supplied something the store rejects.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Conflict { .. } | Self::InvalidInput { .. })
    }

    /// Returns `true` if the failure is in the store or its configuration.
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        matches!(
            self,
            Self::StorageUnavailable { .. }
                | Self::Serialization { .. }
                | Self::Configuration { .. }
        )
    }

    /// Returns the error category.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Conflict { .. } => ErrorCategory::Conflict,
            Self::StorageUnavailable { .. } => ErrorCategory::Infrastructure,
            Self::Serialization { .. } => ErrorCategory::Corruption,
            Self::InvalidInput { .. } => ErrorCategory::Validation,
            Self::Configuration { .. } => ErrorCategory::Configuration,
        }
    }
}

/// Broad classification of grant store errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Duplicate secondary key.
    Conflict,
    /// Backing store unreachable.
    Infrastructure,
    /// Stored data could not be decoded.
    Corruption,
    /// Invalid write.
    Validation,
    /// Invalid configuration.
    Configuration,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Conflict => write!(f, "conflict"),
            Self::Infrastructure => write!(f, "infrastructure"),
            Self::Corruption => write!(f, "corruption"),
            Self::Validation => write!(f, "validation"),
            Self::Configuration => write!(f, "configuration"),
        }
    }
}

impl From<serde_json::Error> for GrantStoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(err.to_string())
    }
}
