//! Credential resolution integration tests
//!
//! Exercises header parsing, JWT validation and the TTL/LRU cache through the
//! public resolver API with a real (in-memory) tenant registry.

#[allow(dead_code)]
mod common;

use common::*;
use std::sync::Arc;
use std::time::Duration;
use strata_tenancy::auth::{issue_token, CredentialResolver, TokenClaims, TokenError};
use strata_tenancy::config::ResolverConfig;
use strata_tenancy::error::AccessError;
use strata_tenancy::multitenancy::{InMemoryTenantStorage, TenantTier};

fn tamper_signature(token: &str) -> String {
    let (signed, signature) = token.rsplit_once('.').unwrap();
    let mut chars: Vec<char> = signature.chars().collect();
    chars[0] = if chars[0] == 'A' { 'B' } else { 'A' };
    format!("{}.{}", signed, chars.into_iter().collect::<String>())
}

// =============================================================================
// Cache TTL
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_cache_hit_within_ttl_and_miss_after() {
    let registry = tenant_registry();
    let resolver = CredentialResolver::new(
        registry.clone(),
        &ResolverConfig::new(Duration::from_secs(300), 100),
    );

    resolver.resolve(Some("sk-acme")).await.unwrap();
    assert_eq!(registry.lookup_count(), 1);

    tokio::time::advance(Duration::from_secs(299)).await;
    resolver.resolve(Some("sk-acme")).await.unwrap();
    assert_eq!(registry.lookup_count(), 1, "served from cache at t0+299s");

    tokio::time::advance(Duration::from_secs(2)).await;
    resolver.resolve(Some("sk-acme")).await.unwrap();
    assert_eq!(registry.lookup_count(), 2, "registry consulted again at t0+301s");
}

#[tokio::test(start_paused = true)]
async fn test_cache_hit_does_not_extend_ttl() {
    let registry = tenant_registry();
    let resolver = CredentialResolver::new(
        registry.clone(),
        &ResolverConfig::new(Duration::from_secs(10), 100),
    );

    resolver.resolve(Some("sk-acme")).await.unwrap();
    tokio::time::advance(Duration::from_secs(9)).await;
    resolver.resolve(Some("sk-acme")).await.unwrap();
    tokio::time::advance(Duration::from_secs(2)).await;
    resolver.resolve(Some("sk-acme")).await.unwrap();

    assert_eq!(registry.lookup_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_oversized_ttl_resolves_without_panicking() {
    let registry = tenant_registry();
    let config = ResolverConfig {
        cache_ttl: Duration::MAX,
        ..resolver_config()
    };
    let resolver = CredentialResolver::new(registry.clone(), &config);

    resolver.resolve(Some("sk-acme")).await.unwrap();
    resolver.resolve(Some("sk-acme")).await.unwrap();
    assert_eq!(registry.lookup_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_jwt_cache_entry_expires_with_token() {
    let registry = tenant_registry();
    let resolver = CredentialResolver::new(registry.clone(), &resolver_config());

    let claims = TokenClaims::new("acme").expires_in(Duration::from_secs(120));
    let token = issue_token(&claims, SECRET).unwrap();
    resolver.resolve_by_bearer_token(&token).await.unwrap();
    assert!(resolver.is_cached(&token));

    // Wall-clock expiry is checked on re-verification; the cache entry itself
    // must not outlive the token's remaining validity.
    tokio::time::advance(Duration::from_secs(121)).await;
    assert!(resolver.prune_expired() >= 1);
    assert!(!resolver.is_cached(&token));
}

// =============================================================================
// LRU sweep
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_lru_sweep_bounds_cache() {
    const MAX: usize = 100;
    let registry = Arc::new(InMemoryTenantStorage::new());
    registry.insert(tenant("acme", TenantTier::Free));
    for i in 0..MAX + 50 {
        registry.add_api_key(format!("key-{}", i), "acme");
    }

    let resolver = CredentialResolver::new(
        registry.clone(),
        &ResolverConfig::new(Duration::from_secs(300), MAX),
    );

    for i in 0..MAX + 50 {
        resolver.resolve_by_api_key(&format!("key-{}", i)).await.unwrap();
        assert!(resolver.cache_count() <= MAX);
    }

    for i in 0..50 {
        assert!(!resolver.is_cached(&format!("key-{}", i)), "key-{} should be evicted", i);
    }
    for i in 50..MAX + 50 {
        assert!(resolver.is_cached(&format!("key-{}", i)), "key-{} should be cached", i);
    }
}

#[tokio::test(start_paused = true)]
async fn test_lru_sweep_spares_recently_used() {
    let registry = Arc::new(InMemoryTenantStorage::new());
    registry.insert(tenant("acme", TenantTier::Free));
    for i in 0..11 {
        registry.add_api_key(format!("key-{}", i), "acme");
    }
    let resolver = CredentialResolver::new(
        registry,
        &ResolverConfig::new(Duration::from_secs(300), 10),
    );

    for i in 0..10 {
        resolver.resolve_by_api_key(&format!("key-{}", i)).await.unwrap();
        tokio::time::advance(Duration::from_millis(10)).await;
    }
    // Touch the oldest entry so it is no longer least recently used
    resolver.resolve_by_api_key("key-0").await.unwrap();
    resolver.resolve_by_api_key("key-10").await.unwrap();

    assert!(resolver.is_cached("key-0"));
    assert!(!resolver.is_cached("key-1"));
    assert_eq!(resolver.cache_count(), 10);
}

// =============================================================================
// JWT validation
// =============================================================================

#[tokio::test]
async fn test_tampered_signature_is_invalid_token() {
    let resolver = CredentialResolver::new(tenant_registry(), &resolver_config());
    let token = tamper_signature(&token_for("acme"));

    let err = resolver
        .resolve(Some(&format!("Bearer {}", token)))
        .await
        .unwrap_err();
    assert!(matches!(err, AccessError::InvalidToken(TokenError::InvalidSignature)));
    assert_eq!(resolver.cache_count(), 0);
}

#[tokio::test]
async fn test_expired_token() {
    let resolver = CredentialResolver::new(tenant_registry(), &resolver_config());
    let claims = TokenClaims::new("acme").expires_at(1_000_000);
    let token = issue_token(&claims, SECRET).unwrap();

    let err = resolver.resolve_by_bearer_token(&token).await.unwrap_err();
    assert!(matches!(err, AccessError::TokenExpired { expired_at: 1_000_000 }));
}

#[tokio::test]
async fn test_missing_tenant_claim() {
    let resolver = CredentialResolver::new(tenant_registry(), &resolver_config());
    let claims = TokenClaims {
        sub: Some("user-1".to_string()),
        ..Default::default()
    };
    let token = issue_token(&claims, SECRET).unwrap();

    let err = resolver.resolve_by_bearer_token(&token).await.unwrap_err();
    assert!(matches!(
        err,
        AccessError::InvalidToken(TokenError::MissingClaim("tenant_id"))
    ));
}

#[tokio::test]
async fn test_wrong_secret_rejected() {
    let resolver = CredentialResolver::new(tenant_registry(), &resolver_config());
    let token = issue_token(
        &TokenClaims::new("acme"),
        "some-other-secret-that-is-long-enough",
    )
    .unwrap();

    assert!(matches!(
        resolver.resolve_by_bearer_token(&token).await,
        Err(AccessError::InvalidToken(TokenError::InvalidSignature))
    ));
}

#[tokio::test]
async fn test_without_secret_signature_is_not_checked() {
    let resolver = CredentialResolver::new(tenant_registry(), &ResolverConfig::default());
    assert!(!resolver.verifies_signatures());

    let token = tamper_signature(&token_for("globex"));
    let ctx = resolver.resolve_by_bearer_token(&token).await.unwrap();
    assert_eq!(ctx.tenant_id(), "globex");
}

// =============================================================================
// Registry failures
// =============================================================================

#[tokio::test]
async fn test_registry_failure_propagates_and_is_not_cached() {
    let inner = InMemoryTenantStorage::new();
    inner.insert(tenant("acme", TenantTier::Pro));
    inner.add_api_key("sk-acme", "acme");
    let registry = Arc::new(FlakyRegistry::new(inner));
    let resolver = CredentialResolver::new(registry.clone(), &resolver_config());

    let err = resolver.resolve(Some("sk-acme")).await.unwrap_err();
    assert!(matches!(err, AccessError::Storage(_)));
    assert!(err.is_retryable());
    assert_eq!(resolver.cache_count(), 0);

    registry.set_failing(false);
    let ctx = resolver.resolve(Some("sk-acme")).await.unwrap();
    assert_eq!(ctx.tier(), TenantTier::Pro);
    assert_eq!(resolver.cache_count(), 1);
}

#[tokio::test]
async fn test_concurrent_resolution() {
    let registry = tenant_registry();
    let resolver = Arc::new(CredentialResolver::new(registry, &resolver_config()));

    let mut handles = Vec::new();
    for i in 0..32 {
        let resolver = resolver.clone();
        handles.push(tokio::spawn(async move {
            let header = if i % 2 == 0 { "sk-acme" } else { "ApiKey sk-globex" };
            resolver.resolve(Some(header)).await.unwrap()
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(resolver.cache_count(), 2);
}
