//! Credential cache.
//!
//! Maps raw credential strings (API keys or full JWTs) to resolved tenant
//! contexts. Entries expire after a TTL; once the cache grows past its limit
//! the least-recently-accessed tenth is swept out in one pass.
//!
//! The cache is not synchronized on its own; [`CredentialResolver`] owns it
//! behind a single lock.
//!
//! [`CredentialResolver`]: super::CredentialResolver

use crate::config::MAX_INTERVAL;
use crate::multitenancy::TenantContext;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

/// Cache entry with metadata.
#[derive(Debug, Clone)]
pub struct CachedEntry {
    /// The resolved tenant.
    pub context: TenantContext,
    /// When this entry stops being served.
    pub expires_at: Instant,
    /// Last time this entry was served or inserted.
    pub last_accessed: Instant,
    /// Access sequence number, breaks ties between equal timestamps.
    access_seq: u64,
}

impl CachedEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// TTL + LRU cache of resolved credentials.
#[derive(Debug)]
pub struct CredentialCache {
    entries: HashMap<String, CachedEntry>,
    ttl: Duration,
    max_size: usize,
    access_seq: u64,
}

impl CredentialCache {
    /// Create a cache. `max_size` is clamped to at least one entry.
    pub fn new(ttl: Duration, max_size: usize) -> Self {
        Self {
            entries: HashMap::new(),
            ttl,
            max_size: max_size.max(1),
            access_seq: 0,
        }
    }

    /// Look up a credential, refreshing its access time on a hit.
    ///
    /// An expired entry is dropped and reported as a miss.
    pub fn get(&mut self, credential: &str) -> Option<TenantContext> {
        let now = Instant::now();
        let expired = match self.entries.get(credential) {
            Some(entry) => entry.is_expired(now),
            None => return None,
        };
        if expired {
            self.entries.remove(credential);
            return None;
        }

        self.access_seq += 1;
        let seq = self.access_seq;
        self.entries.get_mut(credential).map(|entry| {
            entry.last_accessed = now;
            entry.access_seq = seq;
            entry.context.clone()
        })
    }

    /// Insert a resolved credential and run the eviction sweep.
    ///
    /// `ttl_cap` shortens the entry's lifetime below the configured TTL, for
    /// example to a token's remaining validity. Returns the number of
    /// entries evicted.
    pub fn insert(
        &mut self,
        credential: impl Into<String>,
        context: TenantContext,
        ttl_cap: Option<Duration>,
    ) -> usize {
        let now = Instant::now();
        let ttl = match ttl_cap {
            Some(cap) => cap.min(self.ttl),
            None => self.ttl,
        };
        self.access_seq += 1;
        self.entries.insert(
            credential.into(),
            CachedEntry {
                context,
                expires_at: now.checked_add(ttl).unwrap_or(now + MAX_INTERVAL),
                last_accessed: now,
                access_seq: self.access_seq,
            },
        );
        self.evict()
    }

    /// Remove the oldest ~10% once the size limit is exceeded.
    fn evict(&mut self) -> usize {
        if self.entries.len() <= self.max_size {
            return 0;
        }

        let sweep = (self.max_size / 10).max(1);
        let mut by_age: Vec<(Instant, u64, String)> = self
            .entries
            .iter()
            .map(|(key, entry)| (entry.last_accessed, entry.access_seq, key.clone()))
            .collect();
        by_age.sort_unstable();

        for (_, _, key) in by_age.into_iter().take(sweep) {
            self.entries.remove(&key);
        }
        tracing::debug!(evicted = sweep, remaining = self.entries.len(), "Credential cache sweep");
        sweep
    }

    /// Remove every entry resolved to `tenant_id`.
    pub fn invalidate_tenant(&mut self, tenant_id: &str) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| entry.context.tenant_id() != tenant_id);
        before - self.entries.len()
    }

    /// Remove every entry whose TTL has passed.
    pub fn prune_expired(&mut self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        before - self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn contains(&self, credential: &str) -> bool {
        self.entries.contains_key(credential)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }
}
