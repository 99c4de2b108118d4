/// In-memory vector index
///
/// Records live in a `HashMap` per collection behind a `tokio::sync::RwLock`.
/// Search is a brute-force cosine scan. Nothing survives a restart.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{PipelineError, Result};
use crate::store::{cosine_similarity, ScoredRecord, VectorIndex, VectorRecord};

#[derive(Debug)]
struct Collection {
    dimensions: usize,
    records: HashMap<Uuid, VectorRecord>,
}

#[derive(Debug, Default)]
pub struct MemoryIndex {
    collections: RwLock<HashMap<String, Collection>>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

fn missing(collection: &str) -> PipelineError {
    PipelineError::Store(format!("collection '{}' does not exist", collection))
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    async fn ensure_collection(&self, collection: &str, dimensions: usize) -> Result<()> {
        let mut collections = self.collections.write().await;
        let existing = collections
            .entry(collection.to_string())
            .or_insert_with(|| Collection {
                dimensions,
                records: HashMap::new(),
            });
        if existing.dimensions != dimensions {
            return Err(PipelineError::Store(format!(
                "collection '{}' has {} dimensions, expected {}",
                collection, existing.dimensions, dimensions
            )));
        }
        Ok(())
    }

    async fn insert(&self, collection: &str, records: Vec<VectorRecord>) -> Result<()> {
        let mut collections = self.collections.write().await;
        let store = collections.get_mut(collection).ok_or_else(|| missing(collection))?;

        if let Some(bad) = records.iter().find(|r| r.embedding.len() != store.dimensions) {
            return Err(PipelineError::Store(format!(
                "vector of {} dimensions does not fit collection of {}",
                bad.embedding.len(),
                store.dimensions
            )));
        }

        for record in records {
            store.records.insert(record.id, record);
        }
        Ok(())
    }

    async fn delete(&self, collection: &str, ids: &[Uuid]) -> Result<bool> {
        let mut collections = self.collections.write().await;
        let store = collections.get_mut(collection).ok_or_else(|| missing(collection))?;
        for id in ids {
            store.records.remove(id);
        }
        Ok(true)
    }

    async fn search(&self, collection: &str, query: &[f32], limit: usize) -> Result<Vec<ScoredRecord>> {
        let collections = self.collections.read().await;
        let store = collections.get(collection).ok_or_else(|| missing(collection))?;

        let mut scored: Vec<ScoredRecord> = store
            .records
            .values()
            .map(|record| ScoredRecord {
                score: cosine_similarity(&record.embedding, query),
                record: record.clone(),
            })
            .collect();

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);
        Ok(scored)
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        let collections = self.collections.read().await;
        let store = collections.get(collection).ok_or_else(|| missing(collection))?;
        Ok(store.records.len())
    }
}
