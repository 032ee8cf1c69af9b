//! Multi-tenancy support
//!
//! Provides the tenant data model and tenant isolation:
//! - Tenant tiers and per-tenant quota configuration
//! - The read-only tenant context produced by credential resolution
//! - The tenant registry lookup interface
//! - Transparent per-tenant scoping of a shared store

pub mod context;
pub mod isolation;
pub mod tenant;

pub use context::TenantContext;
pub use isolation::{
    IsolatedStore, ORIGINAL_DOCUMENT_ID_FIELD, ORIGINAL_ID_FIELD, TENANT_TAG_FIELD,
};
pub use tenant::{InMemoryTenantStorage, TenantConfiguration, TenantStorage, TenantTier};
