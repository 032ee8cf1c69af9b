//! Observability module for the tenancy core.
//!
//! Provides logging initialization and the metrics emitted by credential
//! resolution and quota enforcement. Metrics go through the `metrics`
//! facade and are no-ops until a recorder is installed.

use crate::config::ObservabilityConfig;
use crate::error::{AccessError, Result};
use metrics::{counter, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use ::tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize logging, and metrics when enabled.
///
/// Returns the Prometheus handle when a recorder was installed.
pub fn init(config: &ObservabilityConfig) -> Result<Option<PrometheusHandle>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber
            .with(fmt::layer().json())
            .try_init()
            .map_err(|e| AccessError::Config(format!("Failed to init logging: {}", e)))?;
    } else {
        subscriber
            .with(fmt::layer())
            .try_init()
            .map_err(|e| AccessError::Config(format!("Failed to init logging: {}", e)))?;
    }

    let handle = if config.metrics_enabled {
        Some(install_prometheus_recorder()?)
    } else {
        None
    };

    info!(metrics = config.metrics_enabled, "Observability initialized");
    Ok(handle)
}

/// Install a global Prometheus recorder and register the tenancy metrics.
///
/// The caller decides how to expose [`PrometheusHandle::render`].
pub fn install_prometheus_recorder() -> Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| AccessError::Config(format!("Failed to install metrics recorder: {}", e)))?;

    register_metrics();
    Ok(handle)
}

/// Register standard metrics.
fn register_metrics() {
    // Credential metrics
    counter!("tenancy_credential_cache_hits_total").absolute(0);
    counter!("tenancy_credential_cache_misses_total").absolute(0);
    gauge!("tenancy_cache_entries").set(0.0);

    // Quota metrics
    gauge!("tenancy_active_buckets").set(0.0);
}

/// Record a credential cache lookup.
pub fn record_cache_lookup(hit: bool) {
    if hit {
        counter!("tenancy_credential_cache_hits_total").increment(1);
    } else {
        counter!("tenancy_credential_cache_misses_total").increment(1);
    }
}

/// Record a rejected credential.
pub fn record_credential_rejection(reason: &'static str) {
    counter!("tenancy_credential_rejections_total", "reason" => reason).increment(1);
}

/// Update the credential cache size.
pub fn set_cache_entries(entries: usize) {
    gauge!("tenancy_cache_entries").set(entries as f64);
}

/// Record a request refused by the quota limiter.
pub fn record_rate_limited(operation: &'static str) {
    counter!("tenancy_rate_limited_total", "operation" => operation).increment(1);
}

/// Record consumed quota.
pub fn record_usage(operation: &'static str) {
    counter!("tenancy_usage_recorded_total", "operation" => operation).increment(1);
}

/// Update the number of live token buckets.
pub fn set_active_buckets(buckets: usize) {
    gauge!("tenancy_active_buckets").set(buckets as f64);
}
