//! Credential resolution.
//!
//! Turns an `Authorization` header into a [`TenantContext`]. Accepted forms:
//!
//! | Header | Treated as |
//! |--------|------------|
//! | `Bearer <jwt>` | JWT carrying a `tenant_id` claim |
//! | `ApiKey <key>` | API key |
//! | anything else | the whole value is an API key |
//!
//! Successful resolutions are cached by the raw credential string, so a
//! tenant with several live credentials has several entries.

use super::cache::CredentialCache;
use super::token::{TokenParts, TokenVerifier};
use crate::config::ResolverConfig;
use crate::error::{AccessError, Result};
use crate::multitenancy::{TenantContext, TenantStorage};
use crate::observability;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const BEARER_PREFIX: &str = "Bearer ";
const API_KEY_PREFIX: &str = "ApiKey ";

/// Resolves credentials to tenants through the registry, with caching.
pub struct CredentialResolver {
    storage: Arc<dyn TenantStorage>,
    verifier: TokenVerifier,
    cache: Mutex<CredentialCache>,
}

impl CredentialResolver {
    /// Create a resolver backed by a tenant registry.
    pub fn new(storage: Arc<dyn TenantStorage>, config: &ResolverConfig) -> Self {
        let verifier = TokenVerifier::new(config.jwt_secret.clone())
            .with_algorithm_enforcement(config.enforce_algorithm);
        Self {
            storage,
            verifier,
            cache: Mutex::new(CredentialCache::new(config.cache_ttl, config.max_cache_size)),
        }
    }

    /// Resolve the tenant behind an `Authorization` header value.
    pub async fn resolve(&self, auth_header: Option<&str>) -> Result<TenantContext> {
        let header = match auth_header {
            Some(header) => header,
            None => {
                observability::record_credential_rejection("missing");
                return Err(AccessError::Unauthorized);
            }
        };

        if let Some(token) = header.strip_prefix(BEARER_PREFIX) {
            self.resolve_by_bearer_token(token).await
        } else if let Some(key) = header.strip_prefix(API_KEY_PREFIX) {
            self.resolve_by_api_key(key).await
        } else {
            self.resolve_by_api_key(header).await
        }
    }

    /// Resolve an API key.
    pub async fn resolve_by_api_key(&self, key: &str) -> Result<TenantContext> {
        if let Some(context) = self.cached(key) {
            return Ok(context);
        }

        let context = match self.storage.find_by_api_key(key).await? {
            Some(context) => context,
            None => {
                warn!("Rejected unknown API key");
                observability::record_credential_rejection("unknown_api_key");
                return Err(AccessError::InvalidCredential);
            }
        };

        self.remember(key, &context, None);
        Ok(context)
    }

    /// Resolve a JWT bearer token.
    pub async fn resolve_by_bearer_token(&self, token: &str) -> Result<TenantContext> {
        let parts = TokenParts::split(token).map_err(|e| reject(e.into()))?;

        if let Some(context) = self.cached(token) {
            return Ok(context);
        }

        let claims = self.verifier.verify(&parts).map_err(|e| reject(e.into()))?;
        let tenant_id = claims.tenant_id.as_deref().unwrap_or_default();

        let context = match self.storage.find(tenant_id).await? {
            Some(context) => context,
            None => {
                warn!(tenant_id, "Token names an unknown tenant");
                observability::record_credential_rejection("unknown_tenant");
                return Err(AccessError::TenantNotFound(tenant_id.to_string()));
            }
        };

        self.remember(token, &context, claims.remaining_validity());
        Ok(context)
    }

    /// Drop every cached credential resolved to `tenant_id`.
    pub fn invalidate(&self, tenant_id: &str) -> usize {
        let mut cache = self.cache.lock();
        let removed = cache.invalidate_tenant(tenant_id);
        observability::set_cache_entries(cache.len());
        if removed > 0 {
            info!(tenant_id, removed, "Invalidated cached credentials");
        }
        removed
    }

    /// Empty the cache.
    pub fn clear(&self) {
        self.cache.lock().clear();
        observability::set_cache_entries(0);
    }

    /// Drop expired entries. Intended to be called periodically.
    pub fn prune_expired(&self) -> usize {
        let mut cache = self.cache.lock();
        let removed = cache.prune_expired();
        observability::set_cache_entries(cache.len());
        if removed > 0 {
            debug!(removed, "Pruned expired credentials");
        }
        removed
    }

    /// Number of cached credentials.
    pub fn cache_count(&self) -> usize {
        self.cache.lock().len()
    }

    /// Whether a credential currently has a cache entry. Does not count as
    /// an access.
    pub fn is_cached(&self, credential: &str) -> bool {
        self.cache.lock().contains(credential)
    }

    /// Whether JWT signatures are checked.
    pub fn verifies_signatures(&self) -> bool {
        self.verifier.verifies_signatures()
    }

    fn cached(&self, credential: &str) -> Option<TenantContext> {
        let hit = self.cache.lock().get(credential);
        observability::record_cache_lookup(hit.is_some());
        if let Some(context) = &hit {
            debug!(tenant_id = %context.tenant_id(), "Credential cache hit");
        }
        hit
    }

    fn remember(&self, credential: &str, context: &TenantContext, ttl_cap: Option<Duration>) {
        let mut cache = self.cache.lock();
        cache.insert(credential, context.clone(), ttl_cap);
        observability::set_cache_entries(cache.len());
    }
}

fn reject(err: AccessError) -> AccessError {
    let reason = match &err {
        AccessError::TokenExpired { .. } => "expired_token",
        _ => "invalid_token",
    };
    warn!(reason, error = %err, "Rejected bearer token");
    observability::record_credential_rejection(reason);
    err
}
