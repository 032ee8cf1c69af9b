//! Common test utilities for integration tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use strata_tenancy::auth::{issue_token, TokenClaims};
use strata_tenancy::config::ResolverConfig;
use strata_tenancy::error::{AccessError, Result};
use strata_tenancy::multitenancy::{
    InMemoryTenantStorage, TenantConfiguration, TenantContext, TenantStorage, TenantTier,
};
use strata_tenancy::store::{Filter, GenericStore, ScoredItem, StoreItem};

/// Signing secret shared by test tokens.
pub const SECRET: &str = "integration-test-secret-at-least-32-bytes";

/// Registry with `acme` (pro, key `sk-acme`) and `globex` (free, key `sk-globex`).
pub fn tenant_registry() -> Arc<InMemoryTenantStorage> {
    let storage = Arc::new(InMemoryTenantStorage::new());
    storage.insert(tenant("acme", TenantTier::Pro));
    storage.insert(tenant("globex", TenantTier::Free));
    storage.add_api_key("sk-acme", "acme");
    storage.add_api_key("sk-globex", "globex");
    storage
}

pub fn tenant(id: &str, tier: TenantTier) -> TenantContext {
    TenantContext::with_tier_defaults(id, tier).expect("valid tenant id")
}

/// Tenant with explicit query and document limits.
pub fn tenant_with_limits(id: &str, queries_per_minute: u32, documents_per_day: u32) -> TenantContext {
    let config = TenantConfiguration {
        queries_per_minute,
        documents_per_day,
        ..TenantConfiguration::for_tier(TenantTier::Free)
    };
    TenantContext::new(id, TenantTier::Free, config).expect("valid tenant id")
}

pub fn resolver_config() -> ResolverConfig {
    ResolverConfig::default().with_jwt_secret(SECRET)
}

/// A signed token for `tenant_id`.
pub fn token_for(tenant_id: &str) -> String {
    issue_token(&TokenClaims::new(tenant_id), SECRET).expect("token issued")
}

/// Registry whose lookups fail until told otherwise.
#[derive(Default)]
pub struct FlakyRegistry {
    pub inner: InMemoryTenantStorage,
    pub failing: AtomicBool,
}

impl FlakyRegistry {
    pub fn new(inner: InMemoryTenantStorage) -> Self {
        Self {
            inner,
            failing: AtomicBool::new(true),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            Err(AccessError::Storage("registry unavailable".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl TenantStorage for FlakyRegistry {
    async fn find_by_api_key(&self, key: &str) -> Result<Option<TenantContext>> {
        self.check()?;
        self.inner.find_by_api_key(key).await
    }

    async fn find(&self, tenant_id: &str) -> Result<Option<TenantContext>> {
        self.check()?;
        self.inner.find(tenant_id).await
    }
}

/// Store wrapper recording the filters and calls it receives.
pub struct RecordingStore<S> {
    pub inner: S,
    pub filters: Mutex<Vec<Option<Filter>>>,
    pub clear_calls: AtomicUsize,
}

impl<S: GenericStore> RecordingStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            filters: Mutex::new(Vec::new()),
            clear_calls: AtomicUsize::new(0),
        }
    }

    pub fn last_filter(&self) -> Option<Filter> {
        self.filters.lock().last().cloned().flatten()
    }
}

#[async_trait]
impl<S: GenericStore> GenericStore for RecordingStore<S> {
    async fn add(&self, items: Vec<StoreItem>, vectors: Vec<Vec<f32>>) -> Result<()> {
        self.inner.add(items, vectors).await
    }

    async fn search(
        &self,
        query: &[f32],
        limit: usize,
        filter: Option<&Filter>,
    ) -> Result<Vec<ScoredItem>> {
        self.filters.lock().push(filter.cloned());
        self.inner.search(query, limit, filter).await
    }

    async fn delete(&self, ids: &[String]) -> Result<()> {
        self.inner.delete(ids).await
    }

    async fn delete_matching(&self, filter: &Filter) -> Result<()> {
        self.filters.lock().push(Some(filter.clone()));
        self.inner.delete_matching(filter).await
    }

    async fn count(&self) -> Result<usize> {
        self.inner.count().await
    }

    async fn clear(&self) -> Result<()> {
        self.clear_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.clear().await
    }

    fn backend_name(&self) -> &'static str {
        "recording"
    }
}

/// Store whose every call fails.
pub struct BrokenStore;

#[async_trait]
impl GenericStore for BrokenStore {
    async fn add(&self, _items: Vec<StoreItem>, _vectors: Vec<Vec<f32>>) -> Result<()> {
        Err(AccessError::Storage("backend down".to_string()))
    }

    async fn search(
        &self,
        _query: &[f32],
        _limit: usize,
        _filter: Option<&Filter>,
    ) -> Result<Vec<ScoredItem>> {
        Err(AccessError::Storage("backend down".to_string()))
    }

    async fn delete(&self, _ids: &[String]) -> Result<()> {
        Err(AccessError::Storage("backend down".to_string()))
    }

    async fn delete_matching(&self, _filter: &Filter) -> Result<()> {
        Err(AccessError::Storage("backend down".to_string()))
    }

    async fn count(&self) -> Result<usize> {
        Err(AccessError::Storage("backend down".to_string()))
    }

    async fn clear(&self) -> Result<()> {
        Err(AccessError::Storage("backend down".to_string()))
    }

    fn backend_name(&self) -> &'static str {
        "broken"
    }
}
