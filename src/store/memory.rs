//! In-memory store with brute-force cosine search.

use super::{Filter, GenericStore, ScoredItem, StoreItem};
use crate::error::{AccessError, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::cmp::Ordering;
use std::collections::HashMap;

#[derive(Debug, Clone)]
struct Entry {
    item: StoreItem,
    vector: Vec<f32>,
}

/// Flat, process-local [`GenericStore`].
#[derive(Debug, Default)]
pub struct InMemoryStore {
    entries: RwLock<HashMap<String, Entry>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw item by id, bypassing any scoping. Useful for inspecting what a
    /// wrapper actually wrote.
    pub fn get_raw(&self, id: &str) -> Option<StoreItem> {
        self.entries.read().get(id).map(|e| e.item.clone())
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[async_trait]
impl GenericStore for InMemoryStore {
    async fn add(&self, items: Vec<StoreItem>, vectors: Vec<Vec<f32>>) -> Result<()> {
        if items.len() != vectors.len() {
            return Err(AccessError::Storage(format!(
                "Got {} items but {} vectors",
                items.len(),
                vectors.len()
            )));
        }

        let mut entries = self.entries.write();
        for (item, vector) in items.into_iter().zip(vectors) {
            entries.insert(item.id.clone(), Entry { item, vector });
        }
        Ok(())
    }

    async fn search(
        &self,
        query: &[f32],
        limit: usize,
        filter: Option<&Filter>,
    ) -> Result<Vec<ScoredItem>> {
        let entries = self.entries.read();
        let mut results: Vec<ScoredItem> = entries
            .values()
            .filter(|e| filter.map_or(true, |f| f.matches(&e.item.metadata)))
            .map(|e| ScoredItem {
                item: e.item.clone(),
                score: cosine_similarity(query, &e.vector),
            })
            .collect();

        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.item.id.cmp(&b.item.id))
        });
        results.truncate(limit);
        Ok(results)
    }

    async fn delete(&self, ids: &[String]) -> Result<()> {
        let mut entries = self.entries.write();
        for id in ids {
            entries.remove(id);
        }
        Ok(())
    }

    async fn delete_matching(&self, filter: &Filter) -> Result<()> {
        self.entries
            .write()
            .retain(|_, e| !filter.matches(&e.item.metadata));
        Ok(())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.len())
    }

    async fn clear(&self) -> Result<()> {
        self.entries.write().clear();
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

/// Cosine similarity; zero for empty, zero-norm or mismatched vectors.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}
