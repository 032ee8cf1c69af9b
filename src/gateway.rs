//! Request-path composition of resolution, quota and isolation.
//!
//! A request handler typically does:
//!
//! ```rust,ignore
//! let auth = gateway.authorize(headers.get("authorization"), Operation::Query).await?;
//! let store = gateway.store_for(&auth.context);
//! let hits = store.search(&query, 10, None).await?;
//! gateway.complete(&auth);
//! ```
//!
//! Usage is only recorded by [`AccessGateway::complete`], so a request that
//! fails after authorization costs no quota.

use crate::auth::CredentialResolver;
use crate::config::TenancyConfig;
use crate::error::Result;
use crate::multitenancy::{IsolatedStore, TenantConfiguration, TenantContext, TenantStorage};
use crate::ratelimit::{LimitInfo, Operation, QuotaLimiter};
use crate::store::GenericStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// A request admitted by [`AccessGateway::authorize`].
#[derive(Debug, Clone)]
pub struct Authorization {
    /// Tenant the credential resolved to.
    pub context: TenantContext,
    /// Operation that was checked.
    pub operation: Operation,
    /// Quota state at admission time.
    pub limit: LimitInfo,
}

/// Front door for tenant requests.
pub struct AccessGateway {
    resolver: CredentialResolver,
    limiter: QuotaLimiter,
    store: Arc<dyn GenericStore>,
    count_cap: usize,
    prune_interval: Duration,
}

impl AccessGateway {
    /// Build a gateway over a tenant registry and a shared backing store.
    pub fn new(
        storage: Arc<dyn TenantStorage>,
        store: Arc<dyn GenericStore>,
        config: &TenancyConfig,
    ) -> Self {
        info!(
            backend = store.backend_name(),
            cache_ttl = ?config.resolver.cache_ttl,
            max_cache_size = config.resolver.max_cache_size,
            "Creating access gateway"
        );
        Self {
            resolver: CredentialResolver::new(storage, &config.resolver),
            limiter: QuotaLimiter::new(&config.quota),
            store,
            count_cap: config.isolation.count_cap,
            prune_interval: config.resolver.prune_interval,
        }
    }

    /// Resolve the credential and check quota for `operation`.
    ///
    /// The resolved tenant's configuration is adopted by the limiter without
    /// refilling its buckets. When it replaces a different one, the
    /// tenant's cached credentials are dropped so every credential picks up
    /// the registry's current configuration on its next resolution.
    pub async fn authorize(
        &self,
        auth_header: Option<&str>,
        operation: Operation,
    ) -> Result<Authorization> {
        let context = self.resolver.resolve(auth_header).await?;
        let tenant_id = context.tenant_id();

        if self.limiter.adopt_tenant_config(tenant_id, context.config()) {
            let dropped = self.resolver.invalidate(tenant_id);
            debug!(tenant_id, dropped, "Tenant configuration changed");
        }

        self.limiter.check_limit(tenant_id, operation)?;
        let limit = self.limiter.get_limit_info(tenant_id, operation);
        debug!(tenant_id, operation = %operation, remaining = limit.remaining, "Authorized");

        Ok(Authorization {
            context,
            operation,
            limit,
        })
    }

    /// Record usage for a request that went ahead.
    pub fn complete(&self, authorization: &Authorization) {
        self.limiter
            .record_usage(authorization.context.tenant_id(), authorization.operation);
    }

    /// The shared store scoped to `context`.
    pub fn store_for(&self, context: &TenantContext) -> IsolatedStore {
        IsolatedStore::new(self.store.clone(), context).with_count_cap(self.count_cap)
    }

    /// Apply new limits to a tenant.
    ///
    /// Resets the tenant's buckets and drops its cached credentials. The
    /// registry itself is owned by the caller and must be updated there too.
    pub fn update_tenant_config(&self, tenant_id: &str, config: TenantConfiguration) -> usize {
        self.limiter.set_tenant_config(tenant_id, config);
        self.resolver.invalidate(tenant_id)
    }

    pub fn resolver(&self) -> &CredentialResolver {
        &self.resolver
    }

    pub fn limiter(&self) -> &QuotaLimiter {
        &self.limiter
    }

    /// One maintenance pass: prune expired credentials and idle buckets.
    pub fn run_maintenance(&self) -> (usize, usize) {
        let credentials = self.resolver.prune_expired();
        let buckets = self.limiter.prune_idle(self.prune_interval);
        (credentials, buckets)
    }

    /// Run [`run_maintenance`](Self::run_maintenance) every `prune_interval`
    /// until the returned handle is aborted.
    pub fn spawn_maintenance(self: &Arc<Self>) -> JoinHandle<()> {
        let gateway = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(gateway.prune_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let (credentials, buckets) = gateway.run_maintenance();
                if credentials + buckets > 0 {
                    debug!(credentials, buckets, "Maintenance pass");
                }
            }
        })
    }
}

impl std::fmt::Debug for AccessGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessGateway")
            .field("backend", &self.store.backend_name())
            .field("cached_credentials", &self.resolver.cache_count())
            .field("active_buckets", &self.limiter.active_bucket_count())
            .finish()
    }
}
