//! Error types for the tenancy core.
//!
//! This module provides a unified error type [`AccessError`] for credential
//! resolution, quota enforcement and tenant-isolated storage, along with a
//! convenient [`Result`] type alias.
//!
//! # Error Categories
//!
//! - **Authentication**: missing credentials, unknown API keys, malformed or
//!   expired tokens
//! - **Tenancy**: a verified token that names an unknown tenant
//! - **Quota**: rate-limit exhaustion carrying a retry-after duration
//! - **Storage**: failures bubbled up unchanged from the tenant registry or
//!   the backing store
//! - **Configuration**: invalid settings or unreadable config files
//!
//! # Example
//!
//! ```rust
//! use strata_tenancy::error::AccessError;
//! use std::time::Duration;
//!
//! let err = AccessError::RateLimited {
//!     tenant_id: "acme".into(),
//!     operation: "query".into(),
//!     retry_after: Duration::from_millis(1500),
//! };
//! assert_eq!(err.status_code(), 429);
//! assert_eq!(err.retry_after(), Some(Duration::from_millis(1500)));
//! ```

use crate::auth::TokenError;
use std::io;
use std::time::Duration;
use thiserror::Error;

/// Main error type for tenancy operations.
#[derive(Error, Debug)]
pub enum AccessError {
    // Authentication errors
    #[error("Authorization required")]
    Unauthorized,

    #[error("Invalid credential")]
    InvalidCredential,

    #[error("Invalid token: {0}")]
    InvalidToken(TokenError),

    #[error("Token expired at {expired_at}")]
    TokenExpired { expired_at: u64 },

    // Tenancy errors
    #[error("Tenant not found: {0}")]
    TenantNotFound(String),

    // Quota errors
    #[error("Rate limited: tenant {tenant_id} exhausted {operation} quota, retry after {:.3}s", retry_after.as_secs_f64())]
    RateLimited {
        tenant_id: String,
        operation: String,
        retry_after: Duration,
    },

    // Storage errors
    #[error("Storage error: {0}")]
    Storage(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration: {field}: {reason}")]
    InvalidConfig { field: String, reason: String },

    // External errors
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl AccessError {
    /// HTTP status code a transport layer should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            AccessError::Unauthorized
            | AccessError::InvalidCredential
            | AccessError::InvalidToken(_)
            | AccessError::TokenExpired { .. } => 401,
            AccessError::TenantNotFound(_) => 404,
            AccessError::RateLimited { .. } => 429,
            AccessError::Config(_) | AccessError::InvalidConfig { .. } => 400,
            AccessError::Storage(_) | AccessError::Io(_) | AccessError::Serialization(_) => 500,
        }
    }

    /// Get retry-after duration if rate limited.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            AccessError::RateLimited { retry_after, .. } => Some(*retry_after),
            _ => None,
        }
    }

    /// Check if error is retryable.
    ///
    /// Retry and backoff are owned by the caller; nothing in this crate
    /// retries internally.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AccessError::RateLimited { .. } | AccessError::Storage(_) | AccessError::Io(_)
        )
    }

    /// Check if error is an authentication failure.
    pub fn is_auth_failure(&self) -> bool {
        self.status_code() == 401
    }
}

impl From<TokenError> for AccessError {
    fn from(e: TokenError) -> Self {
        match e {
            TokenError::Expired { expired_at } => AccessError::TokenExpired { expired_at },
            other => AccessError::InvalidToken(other),
        }
    }
}

impl From<serde_json::Error> for AccessError {
    fn from(e: serde_json::Error) -> Self {
        AccessError::Serialization(e.to_string())
    }
}

/// Result type alias for tenancy operations.
pub type Result<T> = std::result::Result<T, AccessError>;
