//! Configuration module for the tenancy core.

use crate::error::{AccessError, Result};
use crate::multitenancy::isolation::DEFAULT_COUNT_CAP;
use crate::multitenancy::TenantConfiguration;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Environment variable overriding [`ResolverConfig::jwt_secret`].
pub const JWT_SECRET_ENV: &str = "TENANCY_JWT_SECRET";

/// Longest accepted cache TTL and prune interval (one year).
pub const MAX_INTERVAL: Duration = Duration::from_secs(365 * 24 * 3600);

/// Main configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TenancyConfig {
    /// Credential resolution and caching.
    #[serde(default)]
    pub resolver: ResolverConfig,
    /// Quota defaults.
    #[serde(default)]
    pub quota: QuotaConfig,
    /// Store isolation.
    #[serde(default)]
    pub isolation: IsolationConfig,
    /// Observability configuration.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl TenancyConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            AccessError::Config(format!("Failed to read config file: {}", e))
        })?;

        let config: Self = serde_json::from_str(&content).map_err(|e| {
            AccessError::Config(format!("Failed to parse config: {}", e))
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<()> {
        if self.resolver.cache_ttl.is_zero() {
            return Err(AccessError::InvalidConfig {
                field: "resolver.cache_ttl".to_string(),
                reason: "Cache TTL must be non-zero".to_string(),
            });
        }

        if self.resolver.cache_ttl > MAX_INTERVAL {
            return Err(AccessError::InvalidConfig {
                field: "resolver.cache_ttl".to_string(),
                reason: format!("Cache TTL must not exceed {:?}", MAX_INTERVAL),
            });
        }

        if self.resolver.max_cache_size == 0 {
            return Err(AccessError::InvalidConfig {
                field: "resolver.max_cache_size".to_string(),
                reason: "Cache size must be non-zero".to_string(),
            });
        }

        if self.resolver.prune_interval.is_zero() {
            return Err(AccessError::InvalidConfig {
                field: "resolver.prune_interval".to_string(),
                reason: "Prune interval must be non-zero".to_string(),
            });
        }

        if self.resolver.prune_interval > MAX_INTERVAL {
            return Err(AccessError::InvalidConfig {
                field: "resolver.prune_interval".to_string(),
                reason: format!("Prune interval must not exceed {:?}", MAX_INTERVAL),
            });
        }

        if self.isolation.count_cap == 0 {
            return Err(AccessError::InvalidConfig {
                field: "isolation.count_cap".to_string(),
                reason: "Count cap must be non-zero".to_string(),
            });
        }

        Ok(())
    }

    /// Apply environment overrides.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(secret) = std::env::var(JWT_SECRET_ENV) {
            if !secret.is_empty() {
                self.resolver.jwt_secret = Some(secret);
            }
        }
        self
    }

    /// Create a minimal development configuration.
    ///
    /// Short TTLs, a small cache and debug logging. Signatures are not
    /// verified unless a secret is supplied.
    pub fn development() -> Self {
        Self {
            resolver: ResolverConfig {
                cache_ttl: Duration::from_secs(30),
                max_cache_size: 1_000,
                jwt_secret: None,
                enforce_algorithm: false,
                prune_interval: Duration::from_secs(10),
            },
            quota: QuotaConfig::default(),
            isolation: IsolationConfig::default(),
            observability: ObservabilityConfig {
                log_level: "debug".to_string(),
                json_logs: false,
                metrics_enabled: false,
            },
        }
    }
}

/// Credential resolver configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// How long a resolved credential is served from cache.
    #[serde(with = "humantime_serde", default = "default_cache_ttl")]
    pub cache_ttl: Duration,
    /// Cache size that triggers an LRU sweep.
    #[serde(default = "default_max_cache_size")]
    pub max_cache_size: usize,
    /// HMAC-SHA256 secret for JWT signatures; `None` disables verification.
    #[serde(default)]
    pub jwt_secret: Option<String>,
    /// Reject tokens whose header does not declare HS256.
    #[serde(default)]
    pub enforce_algorithm: bool,
    /// How often background maintenance prunes expired entries.
    #[serde(with = "humantime_serde", default = "default_prune_interval")]
    pub prune_interval: Duration,
}

fn default_cache_ttl() -> Duration {
    Duration::from_secs(300)
}

fn default_max_cache_size() -> usize {
    10_000
}

fn default_prune_interval() -> Duration {
    Duration::from_secs(60)
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            cache_ttl: default_cache_ttl(),
            max_cache_size: default_max_cache_size(),
            jwt_secret: None,
            enforce_algorithm: false,
            prune_interval: default_prune_interval(),
        }
    }
}

impl ResolverConfig {
    /// Create a resolver configuration, clamping the cache size to at least
    /// one entry and the TTL to at least one second.
    pub fn new(cache_ttl: Duration, max_cache_size: usize) -> Self {
        Self {
            cache_ttl: cache_ttl.clamp(Duration::from_secs(1), MAX_INTERVAL),
            max_cache_size: max_cache_size.max(1),
            ..Default::default()
        }
    }

    /// Set the JWT signing secret.
    pub fn with_jwt_secret(mut self, secret: impl Into<String>) -> Self {
        self.jwt_secret = Some(secret.into());
        self
    }

    /// Reject tokens not declaring HS256.
    pub fn with_algorithm_enforcement(mut self, enforce: bool) -> Self {
        self.enforce_algorithm = enforce;
        self
    }
}

impl std::fmt::Debug for ResolverConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolverConfig")
            .field("cache_ttl", &self.cache_ttl)
            .field("max_cache_size", &self.max_cache_size)
            .field("jwt_secret", &self.jwt_secret.as_ref().map(|_| "<redacted>"))
            .field("enforce_algorithm", &self.enforce_algorithm)
            .field("prune_interval", &self.prune_interval)
            .finish()
    }
}

/// Quota configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuotaConfig {
    /// Limits applied to tenants with no registered configuration.
    #[serde(default)]
    pub default_tenant: TenantConfiguration,
}

/// Store isolation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IsolationConfig {
    /// Result cap used to approximate per-tenant item counts.
    pub count_cap: usize,
}

impl Default for IsolationConfig {
    fn default() -> Self {
        Self {
            count_cap: DEFAULT_COUNT_CAP,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level.
    pub log_level: String,
    /// Enable JSON logging.
    pub json_logs: bool,
    /// Install a Prometheus metrics recorder.
    pub metrics_enabled: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: true,
        }
    }
}

/// Serde helper for Duration using humantime format.
pub mod humantime_serde {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("{}ms", duration.as_millis()))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_duration(&s).map_err(serde::de::Error::custom)
    }

    /// Parse `"250ms"`, `"30s"`, `"5m"`, `"1h"` or bare milliseconds.
    pub fn parse_duration(s: &str) -> Result<Duration, String> {
        let s = s.trim();
        if let Some(ms) = s.strip_suffix("ms") {
            ms.parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|e| e.to_string())
        } else if let Some(s_val) = s.strip_suffix('s') {
            s_val
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|e| e.to_string())
        } else if let Some(m) = s.strip_suffix('m') {
            scaled(m, 60)
        } else if let Some(h) = s.strip_suffix('h') {
            scaled(h, 3600)
        } else {
            s.parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|e| e.to_string())
        }
    }

    fn scaled(value: &str, secs_per_unit: u64) -> Result<Duration, String> {
        let value = value.parse::<u64>().map_err(|e| e.to_string())?;
        value
            .checked_mul(secs_per_unit)
            .map(Duration::from_secs)
            .ok_or_else(|| format!("duration '{}' is out of range", value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = TenancyConfig::default();
        assert_eq!(config.resolver.cache_ttl, Duration::from_secs(300));
        assert_eq!(config.resolver.max_cache_size, 10_000);
        assert_eq!(config.isolation.count_cap, 100_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_development_config() {
        let config = TenancyConfig::development();
        assert_eq!(config.observability.log_level, "debug");
        assert!(config.resolver.jwt_secret.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_resolver_config_clamps() {
        let config = ResolverConfig::new(Duration::ZERO, 0);
        assert_eq!(config.max_cache_size, 1);
        assert_eq!(config.cache_ttl, Duration::from_secs(1));
    }

    #[test]
    fn test_validate_rejects_huge_intervals() {
        let mut config = TenancyConfig::default();
        config.resolver.cache_ttl = humantime_serde::parse_duration("18446744073709551615s").unwrap();
        assert!(matches!(
            config.validate(),
            Err(AccessError::InvalidConfig { field, .. }) if field == "resolver.cache_ttl"
        ));

        let mut config = TenancyConfig::default();
        config.resolver.prune_interval = MAX_INTERVAL + Duration::from_secs(1);
        assert!(config.validate().is_err());

        assert_eq!(
            ResolverConfig::new(Duration::MAX, 10).cache_ttl,
            MAX_INTERVAL
        );
    }

    #[test]
    fn test_parse_duration_overflow() {
        use humantime_serde::parse_duration;
        assert!(parse_duration("18446744073709551615m").is_err());
        assert!(parse_duration("18446744073709551615h").is_err());
        assert_eq!(parse_duration("8760h").unwrap(), MAX_INTERVAL);
    }

    #[test]
    fn test_validate_rejects_zero_cap() {
        let mut config = TenancyConfig::default();
        config.isolation.count_cap = 0;
        assert!(matches!(
            config.validate(),
            Err(AccessError::InvalidConfig { field, .. }) if field == "isolation.count_cap"
        ));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "resolver": {{ "cache_ttl": "5m", "max_cache_size": 50, "jwt_secret": "s3cret" }},
                "quota": {{ "default_tenant": {{
                    "queries_per_minute": 10,
                    "documents_per_day": 240,
                    "max_concurrent_websockets": 2
                }} }}
            }}"#
        )
        .unwrap();

        let config = TenancyConfig::from_file(file.path()).unwrap();
        assert_eq!(config.resolver.cache_ttl, Duration::from_secs(300));
        assert_eq!(config.resolver.max_cache_size, 50);
        assert_eq!(config.resolver.prune_interval, Duration::from_secs(60));
        assert_eq!(config.quota.default_tenant.queries_per_minute, 10);
        assert_eq!(config.quota.default_tenant.index_prefix, "");
        assert_eq!(config.isolation.count_cap, DEFAULT_COUNT_CAP);
    }

    #[test]
    fn test_from_file_invalid_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert!(matches!(
            TenancyConfig::from_file(file.path()),
            Err(AccessError::Config(_))
        ));
    }

    #[test]
    fn test_debug_redacts_secret() {
        let config = ResolverConfig::default().with_jwt_secret("hunter2-hunter2");
        assert!(!format!("{:?}", config).contains("hunter2"));
    }

    #[test]
    fn test_parse_duration() {
        use humantime_serde::parse_duration;
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse_duration("1500").unwrap(), Duration::from_millis(1500));
        assert!(parse_duration("soon").is_err());
    }
}
