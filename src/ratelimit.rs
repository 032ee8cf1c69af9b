//! Per-tenant quota enforcement.
//!
//! Every `(tenant, operation)` pair owns a token bucket whose capacity and
//! refill rate are derived from the tenant's [`TenantConfiguration`]:
//!
//! | Operation | Capacity | Refill (tokens/s) |
//! |-----------|----------|-------------------|
//! | `query`, `retrieve` | `queries_per_minute` | `queries_per_minute / 60` |
//! | `ingest` | `documents_per_day / 24` | `documents_per_day / 86400` |
//! | `websocket` | `max_concurrent_websockets` | `max_concurrent_websockets / 10` |
//! | `batch_embed` | `queries_per_minute / 2` | `queries_per_minute / 120` |
//!
//! Buckets are created lazily and full. Checking is non-consuming: callers
//! run [`QuotaLimiter::check_limit`] before an operation and
//! [`QuotaLimiter::record_usage`] once it actually went ahead, so failed
//! downstream work does not cost quota.
//!
//! # Example
//!
//! ```rust
//! use strata_tenancy::ratelimit::{Operation, QuotaLimiter};
//!
//! let limiter = QuotaLimiter::default();
//! if limiter.check_limit("acme", Operation::Query).is_ok() {
//!     // ... run the query ...
//!     limiter.record_usage("acme", Operation::Query);
//! }
//! ```

use crate::config::QuotaConfig;
use crate::error::{AccessError, Result};
use crate::multitenancy::TenantConfiguration;
use crate::observability;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

/// Upper bound on any reported retry-after.
pub const MAX_RETRY_AFTER: Duration = Duration::from_secs(86_400);

/// Kind of rate-limited operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Query,
    Retrieve,
    Ingest,
    #[serde(rename = "websocket")]
    WebSocket,
    BatchEmbed,
}

impl Operation {
    /// All operation kinds.
    pub const ALL: [Operation; 5] = [
        Operation::Query,
        Operation::Retrieve,
        Operation::Ingest,
        Operation::WebSocket,
        Operation::BatchEmbed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Query => "query",
            Operation::Retrieve => "retrieve",
            Operation::Ingest => "ingest",
            Operation::WebSocket => "websocket",
            Operation::BatchEmbed => "batch_embed",
        }
    }

    /// Bucket shape for this operation under `config`.
    pub fn limits(&self, config: &TenantConfiguration) -> BucketLimits {
        let qpm = f64::from(config.queries_per_minute);
        let per_day = f64::from(config.documents_per_day);
        let sockets = f64::from(config.max_concurrent_websockets);

        match self {
            Operation::Query | Operation::Retrieve => BucketLimits::new(qpm, qpm / 60.0),
            // One hour of burst
            Operation::Ingest => BucketLimits::new(per_day / 24.0, per_day / 86_400.0),
            Operation::WebSocket => BucketLimits::new(sockets, sockets / 10.0),
            Operation::BatchEmbed => BucketLimits::new(qpm / 2.0, qpm / 120.0),
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = AccessError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "query" => Ok(Operation::Query),
            "retrieve" => Ok(Operation::Retrieve),
            "ingest" => Ok(Operation::Ingest),
            "websocket" | "web_socket" => Ok(Operation::WebSocket),
            "batch_embed" | "batchembed" | "batch-embed" => Ok(Operation::BatchEmbed),
            other => Err(AccessError::InvalidConfig {
                field: "operation".to_string(),
                reason: format!("unknown operation '{}'", other),
            }),
        }
    }
}

/// Capacity and refill rate of one bucket.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BucketLimits {
    /// Maximum tokens.
    pub capacity: f64,
    /// Tokens added per second.
    pub refill_rate: f64,
}

impl BucketLimits {
    pub fn new(capacity: f64, refill_rate: f64) -> Self {
        Self {
            capacity: capacity.max(0.0),
            refill_rate: refill_rate.max(0.0),
        }
    }
}

/// Token bucket with fractional tokens.
#[derive(Debug, Clone)]
pub struct TokenBucket {
    tokens: f64,
    limits: BucketLimits,
    last_refill: Instant,
    last_used: Instant,
}

impl TokenBucket {
    /// Create a full bucket.
    pub fn new(limits: BucketLimits, now: Instant) -> Self {
        Self {
            tokens: limits.capacity,
            limits,
            last_refill: now,
            last_used: now,
        }
    }

    /// Add tokens for the time elapsed since the last refill.
    pub fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.limits.refill_rate).min(self.limits.capacity);
        self.last_refill = now;
    }

    /// Refill, then report how long until a whole token is available.
    ///
    /// `None` means a token is available now.
    pub fn check(&mut self, now: Instant) -> Option<Duration> {
        self.refill(now);
        self.last_used = now;
        if self.tokens >= 1.0 {
            None
        } else {
            Some(retry_after(self.tokens, self.limits.refill_rate))
        }
    }

    /// Refill, then take one token, never going below zero.
    pub fn consume(&mut self, now: Instant) {
        self.refill(now);
        self.last_used = now;
        self.tokens = (self.tokens - 1.0).max(0.0);
    }

    /// Switch to new limits without refunding spent tokens.
    ///
    /// Elapsed time is credited at the old rate first; the level is then
    /// clamped to the new capacity, so it never rises.
    pub fn set_limits(&mut self, limits: BucketLimits, now: Instant) {
        self.refill(now);
        self.limits = limits;
        self.tokens = self.tokens.min(limits.capacity);
    }

    pub fn tokens(&self) -> f64 {
        self.tokens
    }

    pub fn limits(&self) -> BucketLimits {
        self.limits
    }

    fn is_full(&self) -> bool {
        self.tokens >= self.limits.capacity
    }
}

fn retry_after(tokens: f64, refill_rate: f64) -> Duration {
    if refill_rate <= 0.0 {
        return MAX_RETRY_AFTER;
    }
    let secs = (1.0 - tokens) / refill_rate;
    if !secs.is_finite() || secs >= MAX_RETRY_AFTER.as_secs_f64() {
        MAX_RETRY_AFTER
    } else {
        Duration::from_secs_f64(secs.max(0.0))
    }
}

/// Identity of one bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct BucketKey {
    tenant_id: String,
    operation: Operation,
}

impl BucketKey {
    fn new(tenant_id: &str, operation: Operation) -> Self {
        Self {
            tenant_id: tenant_id.to_string(),
            operation,
        }
    }
}

/// Snapshot of a bucket for rate-limit headers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LimitInfo {
    /// Whole tokens left.
    pub remaining: u64,
    /// Bucket capacity.
    pub capacity: f64,
    /// Tokens added per second.
    pub refill_rate_per_second: f64,
}

#[derive(Debug)]
struct LimiterState {
    buckets: HashMap<BucketKey, TokenBucket>,
    configs: HashMap<String, TenantConfiguration>,
    default_config: TenantConfiguration,
}

impl LimiterState {
    fn limits_for(&self, tenant_id: &str, operation: Operation) -> BucketLimits {
        let config = self.configs.get(tenant_id).unwrap_or(&self.default_config);
        operation.limits(config)
    }

    fn bucket(&mut self, tenant_id: &str, operation: Operation, now: Instant) -> &mut TokenBucket {
        let limits = self.limits_for(tenant_id, operation);
        self.buckets
            .entry(BucketKey::new(tenant_id, operation))
            .or_insert_with(|| TokenBucket::new(limits, now))
    }

    fn remove_tenant(&mut self, tenant_id: &str) -> usize {
        let before = self.buckets.len();
        self.buckets.retain(|key, _| key.tenant_id != tenant_id);
        before - self.buckets.len()
    }
}

/// Token-bucket quota limiter keyed by `(tenant, operation)`.
///
/// All bucket state sits behind one mutex, so refill-then-check and
/// refill-then-consume are atomic with respect to concurrent callers.
#[derive(Debug)]
pub struct QuotaLimiter {
    state: Mutex<LimiterState>,
}

impl Default for QuotaLimiter {
    fn default() -> Self {
        Self::new(&QuotaConfig::default())
    }
}

impl QuotaLimiter {
    /// Create a limiter; tenants without a registered configuration use
    /// `config.default_tenant`.
    pub fn new(config: &QuotaConfig) -> Self {
        Self {
            state: Mutex::new(LimiterState {
                buckets: HashMap::new(),
                configs: HashMap::new(),
                default_config: config.default_tenant.clone(),
            }),
        }
    }

    /// Fail with [`AccessError::RateLimited`] if no whole token is available.
    ///
    /// Does not consume.
    pub fn check_limit(&self, tenant_id: &str, operation: Operation) -> Result<()> {
        let now = Instant::now();
        let mut state = self.state.lock();
        let verdict = state.bucket(tenant_id, operation, now).check(now);
        observability::set_active_buckets(state.buckets.len());
        drop(state);

        match verdict {
            None => Ok(()),
            Some(retry_after) => Err(rate_limited(tenant_id, operation, retry_after)),
        }
    }

    /// Consume one token. Safe to call without a prior check.
    pub fn record_usage(&self, tenant_id: &str, operation: Operation) {
        let now = Instant::now();
        let mut state = self.state.lock();
        state.bucket(tenant_id, operation, now).consume(now);
        observability::set_active_buckets(state.buckets.len());
        drop(state);

        observability::record_usage(operation.as_str());
    }

    /// Check and consume in one atomic step.
    pub fn try_acquire(&self, tenant_id: &str, operation: Operation) -> Result<()> {
        let now = Instant::now();
        let mut state = self.state.lock();
        let bucket = state.bucket(tenant_id, operation, now);
        let verdict = bucket.check(now);
        if verdict.is_none() {
            bucket.consume(now);
        }
        observability::set_active_buckets(state.buckets.len());
        drop(state);

        match verdict {
            None => {
                observability::record_usage(operation.as_str());
                Ok(())
            }
            Some(retry_after) => Err(rate_limited(tenant_id, operation, retry_after)),
        }
    }

    /// Whole tokens left, or full capacity when the bucket does not exist yet.
    pub fn get_remaining_quota(&self, tenant_id: &str, operation: Operation) -> u64 {
        self.get_limit_info(tenant_id, operation).remaining
    }

    /// Remaining tokens together with the bucket shape.
    pub fn get_limit_info(&self, tenant_id: &str, operation: Operation) -> LimitInfo {
        let now = Instant::now();
        let mut state = self.state.lock();
        let configured = state.limits_for(tenant_id, operation);
        let (tokens, limits) = match state.buckets.get_mut(&BucketKey::new(tenant_id, operation)) {
            Some(bucket) => {
                bucket.refill(now);
                (bucket.tokens(), bucket.limits())
            }
            None => (configured.capacity, configured),
        };

        LimitInfo {
            remaining: tokens.floor() as u64,
            capacity: limits.capacity,
            refill_rate_per_second: limits.refill_rate,
        }
    }

    /// Drop every bucket of a tenant. Idempotent.
    pub fn reset_limits(&self, tenant_id: &str) -> usize {
        let mut state = self.state.lock();
        let removed = state.remove_tenant(tenant_id);
        observability::set_active_buckets(state.buckets.len());
        if removed > 0 {
            debug!(tenant_id, removed, "Reset tenant quota buckets");
        }
        removed
    }

    /// Drop every bucket of every tenant.
    pub fn reset_all(&self) {
        let mut state = self.state.lock();
        state.buckets.clear();
        observability::set_active_buckets(0);
        info!("Reset all quota buckets");
    }

    /// Register limits for a tenant; its existing buckets are dropped so the
    /// new limits apply immediately.
    pub fn set_tenant_config(&self, tenant_id: &str, config: TenantConfiguration) {
        let mut state = self.state.lock();
        state.configs.insert(tenant_id.to_string(), config);
        let removed = state.remove_tenant(tenant_id);
        observability::set_active_buckets(state.buckets.len());
        info!(tenant_id, removed, "Updated tenant quota configuration");
    }

    /// Apply a tenant's configuration, keeping the token levels of its live
    /// buckets.
    ///
    /// Returns `true` only when a different registered configuration was
    /// replaced. Unlike [`set_tenant_config`](Self::set_tenant_config)
    /// nothing is refilled, so repeatedly switching between configurations
    /// cannot admit more than the largest capacity involved.
    pub fn adopt_tenant_config(&self, tenant_id: &str, config: &TenantConfiguration) -> bool {
        let now = Instant::now();
        let mut state = self.state.lock();
        let replaced = match state.configs.get(tenant_id) {
            Some(current) if current == config => return false,
            Some(_) => true,
            None => false,
        };
        state.configs.insert(tenant_id.to_string(), config.clone());
        for (key, bucket) in state.buckets.iter_mut() {
            if key.tenant_id == tenant_id {
                bucket.set_limits(key.operation.limits(config), now);
            }
        }
        if replaced {
            info!(tenant_id, "Adopted changed tenant quota configuration");
        }
        replaced
    }

    /// Fall back to the default limits for a tenant.
    pub fn remove_tenant_config(&self, tenant_id: &str) -> Option<TenantConfiguration> {
        let mut state = self.state.lock();
        let previous = state.configs.remove(tenant_id);
        if previous.is_some() {
            state.remove_tenant(tenant_id);
            observability::set_active_buckets(state.buckets.len());
        }
        previous
    }

    /// Limits in effect for a tenant.
    pub fn tenant_config(&self, tenant_id: &str) -> TenantConfiguration {
        let state = self.state.lock();
        state
            .configs
            .get(tenant_id)
            .unwrap_or(&state.default_config)
            .clone()
    }

    /// Remove buckets that are full and unused for at least `idle`.
    ///
    /// A full bucket behaves exactly like a missing one, so nothing is lost.
    pub fn prune_idle(&self, idle: Duration) -> usize {
        let now = Instant::now();
        let mut state = self.state.lock();
        let before = state.buckets.len();
        state.buckets.retain(|_, bucket| {
            bucket.refill(now);
            !(bucket.is_full() && now.saturating_duration_since(bucket.last_used) >= idle)
        });
        let removed = before - state.buckets.len();
        observability::set_active_buckets(state.buckets.len());
        if removed > 0 {
            debug!(removed, "Pruned idle quota buckets");
        }
        removed
    }

    /// Number of live buckets.
    pub fn active_bucket_count(&self) -> usize {
        self.state.lock().buckets.len()
    }
}

fn rate_limited(tenant_id: &str, operation: Operation, retry_after: Duration) -> AccessError {
    debug!(tenant_id, operation = %operation, ?retry_after, "Rate limited");
    observability::record_rate_limited(operation.as_str());
    AccessError::RateLimited {
        tenant_id: tenant_id.to_string(),
        operation: operation.as_str().to_string(),
        retry_after,
    }
}
