//! Authentication module.
//!
//! Resolves inbound credentials (API keys and JWT bearer tokens) to tenants.

// Panics in authentication code can lead to security vulnerabilities.
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]

mod cache;
mod resolver;
mod token;

pub use cache::{CachedEntry, CredentialCache};
pub use resolver::CredentialResolver;
pub use token::{issue_token, TokenClaims, TokenError, TokenParts, TokenVerifier};
