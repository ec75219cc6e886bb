//! Token binding policy.
//!
//! Decides whether earlier credentials of a grant are cleared when later
//! ones are bound. Keeping them allows audit and replay detection; clearing
//! them shrinks the lookup surface of a finished flow. The store itself
//! never clears anything, it persists whatever the caller binds.

use serde::{Deserialize, Serialize};

/// Which earlier fields to clear as a grant progresses.
///
/// # Example (TOML)
///
/// ```toml
/// [binding]
/// clear_state_on_code = true
/// clear_code_on_token = true
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct TokenBindingPolicy {
    /// Clear `state` when an authorization code is bound.
    pub clear_state_on_code: bool,

    /// Clear `state` when an access token is bound.
    pub clear_state_on_token: bool,

    /// Clear the authorization code when an access token is bound.
    pub clear_code_on_token: bool,
}

impl TokenBindingPolicy {
    /// Policy that clears every earlier field as soon as it is superseded.
    #[must_use]
    pub fn strict() -> Self {
        Self {
            clear_state_on_code: true,
            clear_state_on_token: true,
            clear_code_on_token: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_keeps_everything() {
        let policy = TokenBindingPolicy::default();
        assert!(!policy.clear_state_on_code);
        assert!(!policy.clear_state_on_token);
        assert!(!policy.clear_code_on_token);
    }

    #[test]
    fn test_partial_toml() {
        let policy: TokenBindingPolicy = toml::from_str("clear_code_on_token = true").unwrap();
        assert!(policy.clear_code_on_token);
        assert!(!policy.clear_state_on_code);
        assert_ne!(policy, TokenBindingPolicy::strict());
    }
}
