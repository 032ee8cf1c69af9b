//! Strata tenancy - multi-tenant access control for a shared retrieval service.
//!
//! Three independent components sit on the request path of every tenant
//! call:
//!
//! - **Credential resolution** ([`auth::CredentialResolver`]): turns an
//!   `Authorization` header (API key or HS256 JWT) into a
//!   [`TenantContext`](multitenancy::TenantContext), with a TTL cache in
//!   front of the tenant registry.
//! - **Quota enforcement** ([`ratelimit::QuotaLimiter`]): a token bucket per
//!   `(tenant, operation)`, sized from the tenant's configuration.
//! - **Store isolation** ([`multitenancy::IsolatedStore`]): a decorator that
//!   scopes any [`store::GenericStore`] to one tenant.
//!
//! [`gateway::AccessGateway`] composes the three for a request handler.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      AccessGateway                          │
//! ├───────────────────┬───────────────────┬─────────────────────┤
//! │ CredentialResolver│   QuotaLimiter    │   IsolatedStore     │
//! │  TTL + LRU cache  │ (tenant, op) →    │ prefix + tag +      │
//! │  JWT / API key    │   token bucket    │ filter on every op  │
//! ├───────────────────┴───────────────────┼─────────────────────┤
//! │        TenantStorage (registry)       │ GenericStore        │
//! └───────────────────────────────────────┴─────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use strata_tenancy::config::TenancyConfig;
//! use strata_tenancy::gateway::AccessGateway;
//! use strata_tenancy::multitenancy::{InMemoryTenantStorage, TenantContext, TenantTier};
//! use strata_tenancy::ratelimit::Operation;
//! use strata_tenancy::store::InMemoryStore;
//!
//! #[tokio::main]
//! async fn main() -> strata_tenancy::Result<()> {
//!     let tenants = Arc::new(InMemoryTenantStorage::new());
//!     tenants.insert(TenantContext::with_tier_defaults("acme", TenantTier::Pro)?);
//!     tenants.add_api_key("sk-acme", "acme");
//!
//!     let gateway = AccessGateway::new(
//!         tenants,
//!         Arc::new(InMemoryStore::new()),
//!         &TenancyConfig::development(),
//!     );
//!
//!     let auth = gateway.authorize(Some("ApiKey sk-acme"), Operation::Query).await?;
//!     let _store = gateway.store_for(&auth.context);
//!     gateway.complete(&auth);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;

pub mod auth;
pub mod gateway;
pub mod multitenancy;
pub mod ratelimit;
pub mod store;

pub mod cli;
pub mod observability;

pub use error::{AccessError, Result};
pub use gateway::{AccessGateway, Authorization};
pub use multitenancy::{IsolatedStore, TenantConfiguration, TenantContext, TenantTier};
pub use ratelimit::{Operation, QuotaLimiter};
