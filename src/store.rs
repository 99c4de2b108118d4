/// Vector store adapter
///
/// [`VectorStore`] owns one named collection, embeds chunks through its
/// [`Embedder`] and delegates persistence to a [`VectorIndex`] backend
/// (PostgreSQL + pgvector in production, [`MemoryIndex`] for local runs
/// and tests). All backends use cosine similarity.
///
/// [`MemoryIndex`]: crate::memory::MemoryIndex

use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

use crate::document::Chunk;
use crate::embedding::Embedder;
use crate::error::{PipelineError, Result};
use crate::retriever::{Retriever, SearchType};

/// An (identifier, embedding, chunk) triple as persisted in the index
#[derive(Debug, Clone, PartialEq)]
pub struct VectorRecord {
    pub id: Uuid,
    pub embedding: Vec<f32>,
    pub chunk: Chunk,
}

/// A search hit; `score` is cosine similarity (higher is closer)
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredRecord {
    pub record: VectorRecord,
    pub score: f32,
}

/// Storage backend for vector records
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Create the collection if needed; an existing collection is not an error
    async fn ensure_collection(&self, collection: &str, dimensions: usize) -> Result<()>;

    async fn insert(&self, collection: &str, records: Vec<VectorRecord>) -> Result<()>;

    /// Delete the given ids; `Ok(false)` when the backend did not accept the delete
    async fn delete(&self, collection: &str, ids: &[Uuid]) -> Result<bool>;

    /// The `limit` records closest to `query`, best first
    async fn search(&self, collection: &str, query: &[f32], limit: usize) -> Result<Vec<ScoredRecord>>;

    async fn count(&self, collection: &str) -> Result<usize>;
}

pub struct VectorStore {
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn Embedder>,
    collection: String,
}

impl VectorStore {
    /// Open `collection`, creating it with the embedder's dimensionality
    pub async fn open(
        index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn Embedder>,
        collection: impl Into<String>,
    ) -> Result<Self> {
        let collection = collection.into();
        index.ensure_collection(&collection, embedder.dimensions()).await?;
        log::info!(
            "Vector collection '{}' ready ({} dimensions, cosine)",
            collection,
            embedder.dimensions()
        );
        Ok(Self {
            index,
            embedder,
            collection,
        })
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Embed and insert `chunks` under `ids` as one batch
    pub async fn insert_batch(&self, ids: &[Uuid], chunks: &[Chunk]) -> Result<()> {
        if ids.len() != chunks.len() {
            return Err(PipelineError::Store(format!(
                "{} ids for {} chunks",
                ids.len(),
                chunks.len()
            )));
        }
        if chunks.is_empty() {
            return Ok(());
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let embeddings = self.embedder.embed_documents(&texts).await?;
        if embeddings.len() != chunks.len() {
            return Err(PipelineError::Embedding(format!(
                "expected {} embeddings, got {}",
                chunks.len(),
                embeddings.len()
            )));
        }

        let records = ids
            .iter()
            .zip(chunks)
            .zip(embeddings)
            .map(|((id, chunk), embedding)| VectorRecord {
                id: *id,
                embedding,
                chunk: chunk.clone(),
            })
            .collect();

        self.index.insert(&self.collection, records).await?;
        log::info!("Inserted {} chunks into '{}'", ids.len(), self.collection);
        Ok(())
    }

    /// Delete exactly `ids`; an empty id list is reported as a failed delete
    pub async fn delete_batch(&self, ids: &[Uuid]) -> Result<bool> {
        if ids.is_empty() {
            return Ok(false);
        }
        let deleted = self.index.delete(&self.collection, ids).await?;
        log::info!(
            "Delete of {} ids from '{}' {}",
            ids.len(),
            self.collection,
            if deleted { "accepted" } else { "rejected" }
        );
        Ok(deleted)
    }

    /// Embed `query` and return the `limit` closest records with the query vector
    pub async fn search(&self, query: &str, limit: usize) -> Result<(Vec<f32>, Vec<ScoredRecord>)> {
        let query_vector = self.embedder.embed_query(query).await?;
        let hits = self.index.search(&self.collection, &query_vector, limit).await?;
        Ok((query_vector, hits))
    }

    pub async fn count(&self) -> Result<usize> {
        self.index.count(&self.collection).await
    }

    pub fn retriever(self: &Arc<Self>, search_type: SearchType, k: usize) -> Retriever {
        Retriever::new(Arc::clone(self), search_type, k)
    }
}

/// Cosine similarity; 0.0 when either vector has zero magnitude
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}
