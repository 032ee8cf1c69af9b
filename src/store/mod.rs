//! Generic store seam.
//!
//! [`GenericStore`] is the minimal CRUD + similarity-search contract a
//! backing store must satisfy to sit behind [`IsolatedStore`]. Concrete
//! engines (SQL with vector extensions, embedded databases, the bundled
//! [`InMemoryStore`]) are chosen at construction time.
//!
//! [`IsolatedStore`]: crate::multitenancy::IsolatedStore

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub mod filter;
pub mod memory;

pub use filter::{Filter, MetadataValue};
pub use memory::InMemoryStore;

/// A stored chunk of a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreItem {
    /// Item (chunk) id
    pub id: String,
    /// Id of the document this item belongs to
    pub document_id: String,
    /// Text content
    #[serde(default)]
    pub content: String,
    /// Arbitrary metadata, matched by [`Filter`]s
    #[serde(default)]
    pub metadata: HashMap<String, MetadataValue>,
}

impl StoreItem {
    pub fn new(
        id: impl Into<String>,
        document_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            document_id: document_id.into(),
            content: content.into(),
            metadata: HashMap::new(),
        }
    }

    /// Sets a metadata field
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// A search hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredItem {
    pub item: StoreItem,
    /// Similarity score, higher is closer
    pub score: f32,
}

/// Minimal store contract.
///
/// An empty query vector asks for unranked matches of `filter`.
#[async_trait]
pub trait GenericStore: Send + Sync {
    /// Insert or replace items; `vectors[i]` is the embedding of `items[i]`.
    async fn add(&self, items: Vec<StoreItem>, vectors: Vec<Vec<f32>>) -> Result<()>;

    /// Up to `limit` items matching `filter`, best first.
    async fn search(
        &self,
        query: &[f32],
        limit: usize,
        filter: Option<&Filter>,
    ) -> Result<Vec<ScoredItem>>;

    /// Delete by id. Unknown ids are ignored.
    async fn delete(&self, ids: &[String]) -> Result<()>;

    /// Delete every item matching `filter`.
    async fn delete_matching(&self, filter: &Filter) -> Result<()>;

    /// Total number of items.
    async fn count(&self) -> Result<usize>;

    /// Remove everything.
    async fn clear(&self) -> Result<()>;

    fn backend_name(&self) -> &'static str;
}
