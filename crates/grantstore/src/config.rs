//! Grant store configuration.
//!
//! Configuration types for the read-through cache, the expiry sweeper and
//! the token binding policy.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::binding::TokenBindingPolicy;
use crate::error::GrantStoreError;

/// Root grant store configuration.
///
/// # Example (TOML)
///
/// ```toml
/// [cache]
/// enabled = true
/// ttl = "30s"
///
/// [sweep]
/// interval = "15m"
/// grace = "1h"
///
/// [binding]
/// clear_state_on_code = true
/// ```
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct GrantStoreConfig {
    /// Read-through cache configuration.
    pub cache: CacheConfig,

    /// Expiry sweeper configuration.
    pub sweep: SweepConfig,

    /// Which earlier fields are cleared as a grant progresses.
    pub binding: TokenBindingPolicy,
}

impl GrantStoreConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns a `Configuration` error describing the first invalid field.
    pub fn validate(&self) -> Result<(), GrantStoreError> {
        self.cache.validate()?;
        self.sweep.validate()
    }
}

/// Read-through cache configuration.
///
/// Only state, access token and refresh token lookups are cached.
/// Authorization-code lookups always hit storage.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Enable the cache.
    pub enabled: bool,

    /// How long a cached grant may be served before it is re-read.
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,

    /// Upper bound on cached entries. Inserts beyond it are skipped.
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl: Duration::from_secs(60),
            max_entries: 10_000,
        }
    }
}

impl CacheConfig {
    fn validate(&self) -> Result<(), GrantStoreError> {
        if self.enabled && self.ttl.is_zero() {
            return Err(GrantStoreError::configuration("cache.ttl must be non-zero"));
        }
        if self.enabled && self.max_entries == 0 {
            return Err(GrantStoreError::configuration(
                "cache.max_entries must be greater than zero",
            ));
        }
        Ok(())
    }
}

/// Expiry sweeper configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SweepConfig {
    /// Run the periodic sweep.
    pub enabled: bool,

    /// Time between sweeps.
    #[serde(with = "humantime_serde")]
    pub interval: Duration,

    /// Upper bound on a single sweep.
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    /// How long after access-token expiry a grant is kept.
    /// The sweep cutoff is `now - grace`.
    #[serde(with = "humantime_serde")]
    pub grace: Duration,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: Duration::from_secs(15 * 60),
            timeout: Duration::from_secs(30),
            grace: Duration::ZERO,
        }
    }
}

impl SweepConfig {
    fn validate(&self) -> Result<(), GrantStoreError> {
        if self.enabled && self.interval.is_zero() {
            return Err(GrantStoreError::configuration(
                "sweep.interval must be non-zero",
            ));
        }
        if self.timeout.is_zero() {
            return Err(GrantStoreError::configuration("sweep.timeout must be non-zero"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = GrantStoreConfig::default();
        assert!(config.cache.enabled);
        assert_eq!(config.cache.ttl, Duration::from_secs(60));
        assert_eq!(config.sweep.interval, Duration::from_secs(900));
        assert_eq!(config.sweep.grace, Duration::ZERO);
        assert_eq!(config.binding, TokenBindingPolicy::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_toml() {
        let config: GrantStoreConfig = toml::from_str(
            r#"
            [cache]
            ttl = "30s"
            max_entries = 500

            [sweep]
            interval = "5m"
            grace = "1h"

            [binding]
            clear_state_on_code = true
            "#,
        )
        .unwrap();

        assert_eq!(config.cache.ttl, Duration::from_secs(30));
        assert_eq!(config.cache.max_entries, 500);
        assert_eq!(config.sweep.interval, Duration::from_secs(300));
        assert_eq!(config.sweep.grace, Duration::from_secs(3600));
        assert_eq!(config.sweep.timeout, Duration::from_secs(30));
        assert!(config.binding.clear_state_on_code);
        assert!(!config.binding.clear_code_on_token);
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let mut config = GrantStoreConfig::default();
        config.sweep.interval = Duration::ZERO;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("sweep.interval"));

        config.sweep.enabled = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_ttl() {
        let mut config = GrantStoreConfig::default();
        config.cache.ttl = Duration::ZERO;
        assert!(config.validate().is_err());
    }
}
