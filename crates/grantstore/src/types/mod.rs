//! Domain types shared by the storage backends.
//!
//! - [`AuthorizationGrant`] - one OAuth 2.0 authorization transaction
//! - [`IssuedToken`] - a bound credential with its lifetime
//! - [`TokenKind`] - names one of the four secondary lookup keys

pub mod grant;

pub use grant::{AuthorizationGrant, IssuedToken, TokenKind, generate_token, truncate_to_micros};
