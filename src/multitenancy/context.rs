// Resolved tenant identity handed to every downstream component

use super::tenant::{TenantConfiguration, TenantTier};
use crate::error::{AccessError, Result};
use serde::{Deserialize, Serialize};

/// Tenant context for a request.
///
/// Produced by the tenant registry, cached by the credential resolver and
/// read-only for everyone else. The tenant id cannot change once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawTenantContext")]
pub struct TenantContext {
    tenant_id: String,
    tier: TenantTier,
    config: TenantConfiguration,
}

/// Unvalidated wire form, checked through [`TenantContext::new`].
#[derive(Deserialize)]
struct RawTenantContext {
    tenant_id: String,
    tier: TenantTier,
    config: TenantConfiguration,
}

impl TryFrom<RawTenantContext> for TenantContext {
    type Error = AccessError;

    fn try_from(raw: RawTenantContext) -> Result<Self> {
        Self::new(raw.tenant_id, raw.tier, raw.config)
    }
}

impl TenantContext {
    /// Creates a new tenant context.
    ///
    /// Returns an error if the tenant id is empty.
    pub fn new(
        tenant_id: impl Into<String>,
        tier: TenantTier,
        config: TenantConfiguration,
    ) -> Result<Self> {
        let tenant_id = tenant_id.into();
        if tenant_id.trim().is_empty() {
            return Err(AccessError::InvalidConfig {
                field: "tenant_id".to_string(),
                reason: "Tenant ID cannot be empty".to_string(),
            });
        }
        Ok(Self {
            tenant_id,
            tier,
            config,
        })
    }

    /// Creates a context using the tier's default configuration
    pub fn with_tier_defaults(tenant_id: impl Into<String>, tier: TenantTier) -> Result<Self> {
        Self::new(tenant_id, tier, TenantConfiguration::for_tier(tier))
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    pub fn tier(&self) -> TenantTier {
        self.tier
    }

    pub fn config(&self) -> &TenantConfiguration {
        &self.config
    }

    /// Prefix used to namespace this tenant's stored ids
    pub fn index_prefix(&self) -> &str {
        self.config.effective_index_prefix(&self.tenant_id)
    }

    /// Returns a copy carrying a new configuration; the id is preserved
    pub fn with_config(&self, config: TenantConfiguration) -> Self {
        Self {
            tenant_id: self.tenant_id.clone(),
            tier: self.tier,
            config,
        }
    }
}
