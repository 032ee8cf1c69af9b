// Tenant tiers, per-tenant configuration and the tenant registry seam

use super::context::TenantContext;
use crate::error::Result;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info};

/// Tenant tier/plan
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TenantTier {
    /// Free tier with limited quotas
    #[default]
    Free,
    /// Paid tier
    Pro,
    /// Enterprise tier with negotiated quotas
    Enterprise,
}

impl TenantTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            TenantTier::Free => "free",
            TenantTier::Pro => "pro",
            TenantTier::Enterprise => "enterprise",
        }
    }
}

impl std::fmt::Display for TenantTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TenantTier {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "free" => Ok(TenantTier::Free),
            "pro" => Ok(TenantTier::Pro),
            "enterprise" => Ok(TenantTier::Enterprise),
            other => Err(format!("unknown tenant tier: {}", other)),
        }
    }
}

/// Per-tenant quota and storage configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantConfiguration {
    /// Query/retrieve requests allowed per minute
    pub queries_per_minute: u32,
    /// Documents that may be ingested per day
    pub documents_per_day: u32,
    /// Maximum concurrent WebSocket sessions
    pub max_concurrent_websockets: u32,
    /// Prefix used to namespace stored ids; empty means "use the tenant id"
    #[serde(default)]
    pub index_prefix: String,
}

impl Default for TenantConfiguration {
    fn default() -> Self {
        Self::for_tier(TenantTier::Free)
    }
}

impl TenantConfiguration {
    /// Default configuration for a tier
    pub fn for_tier(tier: TenantTier) -> Self {
        match tier {
            TenantTier::Free => Self {
                queries_per_minute: 60,
                documents_per_day: 1_000,
                max_concurrent_websockets: 5,
                index_prefix: String::new(),
            },
            TenantTier::Pro => Self {
                queries_per_minute: 600,
                documents_per_day: 10_000,
                max_concurrent_websockets: 50,
                index_prefix: String::new(),
            },
            TenantTier::Enterprise => Self {
                queries_per_minute: 6_000,
                documents_per_day: 100_000,
                max_concurrent_websockets: 500,
                index_prefix: String::new(),
            },
        }
    }

    /// Sets the index prefix
    pub fn with_index_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.index_prefix = prefix.into();
        self
    }

    /// Prefix to namespace stored ids with, falling back to the tenant id
    pub fn effective_index_prefix<'a>(&'a self, tenant_id: &'a str) -> &'a str {
        if self.index_prefix.is_empty() {
            tenant_id
        } else {
            &self.index_prefix
        }
    }
}

/// Lookup interface onto the external tenant registry.
///
/// Errors are propagated unchanged to the caller of the resolver.
#[async_trait]
pub trait TenantStorage: Send + Sync {
    /// Find the tenant owning an API key
    async fn find_by_api_key(&self, key: &str) -> Result<Option<TenantContext>>;

    /// Find a tenant by id
    async fn find(&self, tenant_id: &str) -> Result<Option<TenantContext>>;
}

/// In-process tenant registry.
///
/// Useful for tests, single-node deployments and as a reference for
/// database-backed implementations.
#[derive(Debug, Default)]
pub struct InMemoryTenantStorage {
    tenants: RwLock<HashMap<String, TenantContext>>,
    api_keys: RwLock<HashMap<String, String>>,
    lookups: AtomicU64,
}

impl InMemoryTenantStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers or replaces a tenant
    pub fn insert(&self, context: TenantContext) {
        info!(tenant_id = %context.tenant_id(), tier = %context.tier(), "Registered tenant");
        self.tenants
            .write()
            .insert(context.tenant_id().to_string(), context);
    }

    /// Removes a tenant and every API key pointing at it
    pub fn remove(&self, tenant_id: &str) -> Option<TenantContext> {
        self.api_keys.write().retain(|_, owner| owner != tenant_id);
        self.tenants.write().remove(tenant_id)
    }

    /// Issues an API key for a tenant
    pub fn add_api_key(&self, key: impl Into<String>, tenant_id: impl Into<String>) {
        self.api_keys.write().insert(key.into(), tenant_id.into());
    }

    /// Revokes an API key
    pub fn revoke_api_key(&self, key: &str) -> bool {
        self.api_keys.write().remove(key).is_some()
    }

    /// Replaces a tenant's configuration, keeping its id and tier
    pub fn update_config(&self, tenant_id: &str, config: TenantConfiguration) -> bool {
        let mut tenants = self.tenants.write();
        match tenants.get_mut(tenant_id) {
            Some(context) => {
                *context = context.with_config(config);
                true
            }
            None => false,
        }
    }

    /// Number of lookups served (both by key and by id)
    pub fn lookup_count(&self) -> u64 {
        self.lookups.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.tenants.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tenants.read().is_empty()
    }
}

#[async_trait]
impl TenantStorage for InMemoryTenantStorage {
    async fn find_by_api_key(&self, key: &str) -> Result<Option<TenantContext>> {
        self.lookups.fetch_add(1, Ordering::Relaxed);
        let tenant_id = match self.api_keys.read().get(key) {
            Some(id) => id.clone(),
            None => {
                debug!("API key not registered");
                return Ok(None);
            }
        };
        Ok(self.tenants.read().get(&tenant_id).cloned())
    }

    async fn find(&self, tenant_id: &str) -> Result<Option<TenantContext>> {
        self.lookups.fetch_add(1, Ordering::Relaxed);
        Ok(self.tenants.read().get(tenant_id).cloned())
    }
}
