/// Retrieval over the vector store
///
/// Three strategies: plain similarity, similarity with a score cut-off, and
/// maximal marginal relevance (MMR), which re-ranks `fetch_k` candidates to
/// trade relevance against redundancy among the returned chunks.

use std::sync::Arc;

use crate::document::Chunk;
use crate::error::{PipelineError, Result};
use crate::store::{cosine_similarity, ScoredRecord, VectorStore};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SearchType {
    Similarity,
    /// `lambda` = 1.0 is pure relevance, 0.0 is pure diversity
    Mmr { fetch_k: usize, lambda: f32 },
    SimilarityScoreThreshold { threshold: f32 },
}

#[derive(Clone)]
pub struct Retriever {
    store: Arc<VectorStore>,
    search_type: SearchType,
    k: usize,
}

impl Retriever {
    pub fn new(store: Arc<VectorStore>, search_type: SearchType, k: usize) -> Self {
        Self { store, search_type, k }
    }

    /// The most relevant chunks for `query`, at most `k`
    pub async fn retrieve(&self, query: &str) -> Result<Vec<Chunk>> {
        if query.trim().is_empty() {
            return Err(PipelineError::EmptyQuery);
        }

        let chunks: Vec<Chunk> = match self.search_type {
            SearchType::Similarity => {
                let (_, hits) = self.store.search(query, self.k).await?;
                hits.into_iter().map(|hit| hit.record.chunk).collect()
            }
            SearchType::SimilarityScoreThreshold { threshold } => {
                let (_, hits) = self.store.search(query, self.k).await?;
                hits.into_iter()
                    .filter(|hit| hit.score >= threshold)
                    .map(|hit| hit.record.chunk)
                    .collect()
            }
            SearchType::Mmr { fetch_k, lambda } => {
                let (query_vector, candidates) = self.store.search(query, fetch_k.max(self.k)).await?;
                maximal_marginal_relevance(&query_vector, &candidates, self.k, lambda)
                    .into_iter()
                    .map(|idx| candidates[idx].record.chunk.clone())
                    .collect()
            }
        };

        log::debug!("Retrieved {} chunks ({:?})", chunks.len(), self.search_type);
        Ok(chunks)
    }
}

/// Indices of up to `k` candidates chosen by MMR, in selection order
///
/// The first pick is the candidate most similar to the query; each next pick
/// maximizes `lambda * sim(query, c) - (1 - lambda) * max(sim(c, selected))`.
pub fn maximal_marginal_relevance(
    query: &[f32],
    candidates: &[ScoredRecord],
    k: usize,
    lambda: f32,
) -> Vec<usize> {
    if candidates.is_empty() || k == 0 {
        return Vec::new();
    }

    let relevance: Vec<f32> = candidates
        .iter()
        .map(|c| cosine_similarity(query, &c.record.embedding))
        .collect();

    let mut selected: Vec<usize> = Vec::with_capacity(k.min(candidates.len()));
    // Highest similarity to any already selected candidate
    let mut redundancy = vec![f32::NEG_INFINITY; candidates.len()];

    while selected.len() < k.min(candidates.len()) {
        let mut best: Option<(usize, f32)> = None;
        for idx in 0..candidates.len() {
            if selected.contains(&idx) {
                continue;
            }
            let penalty = if selected.is_empty() { 0.0 } else { redundancy[idx] };
            let score = lambda * relevance[idx] - (1.0 - lambda) * penalty;
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((idx, score));
            }
        }

        let Some((pick, _)) = best else { break };
        selected.push(pick);

        for idx in 0..candidates.len() {
            let sim = cosine_similarity(&candidates[pick].record.embedding, &candidates[idx].record.embedding);
            if sim > redundancy[idx] {
                redundancy[idx] = sim;
            }
        }
    }

    selected
}
