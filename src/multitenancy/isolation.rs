// Tenant isolation over a shared store

use super::context::TenantContext;
use crate::error::Result;
use crate::store::{Filter, GenericStore, MetadataValue, ScoredItem, StoreItem};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

/// Metadata field tagging every stored item with its owning tenant.
pub const TENANT_TAG_FIELD: &str = "_tenant_id";

/// Metadata field preserving the document id as the tenant wrote it.
pub const ORIGINAL_DOCUMENT_ID_FIELD: &str = "_original_document_id";

/// Metadata field preserving the item id as the tenant wrote it.
pub const ORIGINAL_ID_FIELD: &str = "_original_id";

/// Default result cap used to approximate a tenant's item count.
pub const DEFAULT_COUNT_CAP: usize = 100_000;

/// Store decorator scoping every read and write to one tenant.
///
/// Writes prefix ids with `"{prefix}_"` and tag items with the tenant id;
/// reads are filtered by that tag and restored, so callers never see the
/// bookkeeping. Several tenants can share one underlying store.
///
/// Prefixed ids are not unique across tenants (`a` + `b_c` and `a_b` + `c`
/// both give `a_b_c`), so deletes select by tenant tag and original id
/// rather than by stored id.
#[derive(Clone)]
pub struct IsolatedStore {
    inner: Arc<dyn GenericStore>,
    tenant_id: String,
    id_prefix: String,
    count_cap: usize,
}

impl std::fmt::Debug for IsolatedStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IsolatedStore")
            .field("backend", &self.inner.backend_name())
            .field("tenant_id", &self.tenant_id)
            .field("id_prefix", &self.id_prefix)
            .field("count_cap", &self.count_cap)
            .finish()
    }
}

impl IsolatedStore {
    /// Scope `inner` to the given tenant.
    ///
    /// The prefix comes from the tenant's `index_prefix`, or its id when
    /// that is empty.
    pub fn new(inner: Arc<dyn GenericStore>, tenant: &TenantContext) -> Self {
        Self {
            inner,
            tenant_id: tenant.tenant_id().to_string(),
            id_prefix: tenant.index_prefix().to_string(),
            count_cap: DEFAULT_COUNT_CAP,
        }
    }

    /// Override the cap used by [`count`](GenericStore::count).
    pub fn with_count_cap(mut self, cap: usize) -> Self {
        self.count_cap = cap.max(1);
        self
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    pub fn id_prefix(&self) -> &str {
        &self.id_prefix
    }

    /// Predicate selecting this tenant's items.
    pub fn tenant_filter(&self) -> Filter {
        Filter::equals(TENANT_TAG_FIELD, self.tenant_id.as_str())
    }

    fn scoped(&self, filter: Option<&Filter>) -> Filter {
        match filter {
            Some(filter) => self.tenant_filter().and(filter.clone()),
            None => self.tenant_filter(),
        }
    }

    fn prefixed(&self, id: &str) -> String {
        format!("{}_{}", self.id_prefix, id)
    }

    fn strip_prefix<'a>(&self, id: &'a str) -> &'a str {
        id.strip_prefix(self.id_prefix.as_str())
            .and_then(|rest| rest.strip_prefix('_'))
            .unwrap_or(id)
    }

    /// Apply the isolation envelope to an item about to be written.
    pub fn isolate(&self, mut item: StoreItem) -> StoreItem {
        item.metadata.insert(
            TENANT_TAG_FIELD.to_string(),
            MetadataValue::String(self.tenant_id.clone()),
        );
        item.metadata.insert(
            ORIGINAL_DOCUMENT_ID_FIELD.to_string(),
            MetadataValue::String(item.document_id.clone()),
        );
        item.metadata.insert(
            ORIGINAL_ID_FIELD.to_string(),
            MetadataValue::String(item.id.clone()),
        );
        item.id = self.prefixed(&item.id);
        item.document_id = self.prefixed(&item.document_id);
        item
    }

    /// Remove the isolation envelope from an item read back.
    ///
    /// A no-op for items that were never isolated.
    pub fn restore(&self, mut item: StoreItem) -> StoreItem {
        item.metadata.remove(TENANT_TAG_FIELD);
        item.document_id = match item.metadata.remove(ORIGINAL_DOCUMENT_ID_FIELD) {
            Some(MetadataValue::String(original)) => original,
            _ => self.strip_prefix(&item.document_id).to_string(),
        };
        item.id = match item.metadata.remove(ORIGINAL_ID_FIELD) {
            Some(MetadataValue::String(original)) => original,
            _ => self.strip_prefix(&item.id).to_string(),
        };
        item
    }
}

#[async_trait]
impl GenericStore for IsolatedStore {
    async fn add(&self, items: Vec<StoreItem>, vectors: Vec<Vec<f32>>) -> Result<()> {
        let items: Vec<StoreItem> = items.into_iter().map(|item| self.isolate(item)).collect();
        debug!(tenant_id = %self.tenant_id, count = items.len(), "Writing isolated items");
        self.inner.add(items, vectors).await
    }

    async fn search(
        &self,
        query: &[f32],
        limit: usize,
        filter: Option<&Filter>,
    ) -> Result<Vec<ScoredItem>> {
        let scoped = self.scoped(filter);
        let results = self.inner.search(query, limit, Some(&scoped)).await?;
        Ok(results
            .into_iter()
            .map(|hit| ScoredItem {
                item: self.restore(hit.item),
                score: hit.score,
            })
            .collect())
    }

    /// Delete this tenant's items with the given ids; unknown ids are
    /// ignored.
    async fn delete(&self, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let ids = ids.iter().cloned().map(MetadataValue::String).collect();
        let selection = self
            .tenant_filter()
            .and(Filter::In(ORIGINAL_ID_FIELD.to_string(), ids));
        self.inner.delete_matching(&selection).await
    }

    async fn delete_matching(&self, filter: &Filter) -> Result<()> {
        self.inner.delete_matching(&self.scoped(Some(filter))).await
    }

    /// Approximate count: the number of hits of a tenant-scoped search capped
    /// at `count_cap`. Undercounts tenants holding more items than the cap.
    async fn count(&self) -> Result<usize> {
        let hits = self
            .inner
            .search(&[], self.count_cap, Some(&self.tenant_filter()))
            .await?
            .len();
        if hits >= self.count_cap {
            warn!(
                tenant_id = %self.tenant_id,
                cap = self.count_cap,
                "Tenant item count reached the cap, reported count is a lower bound"
            );
        }
        Ok(hits)
    }

    /// Delete this tenant's items only; the shared store is never cleared.
    async fn clear(&self) -> Result<()> {
        self.inner.delete_matching(&self.tenant_filter()).await
    }

    fn backend_name(&self) -> &'static str {
        self.inner.backend_name()
    }
}
