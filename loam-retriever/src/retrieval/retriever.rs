//! Hybrid retrieval: exhaustive vector scoring fused with lexical search,
//! de-duplicated, capped per document, diversified, optionally re-ranked.
//!
//! ## Pipeline
//!
//! ```text
//! query ─┬→ vector candidates (dot product + recency) ─┐
//!        │                                             ├→ RRF fusion
//!        └→ lexical candidates (FTS5, filtered)  ──────┘      │
//!                                              per-document cap
//!                                                      │
//!                                          MMR diversification (optional)
//!                                                      │
//!                                            re-ranker (optional)
//! ```
//!
//! Fusion is rank-based: each list contributes `weight / (1 + rank)` per
//! candidate, summed by chunk id, so the two signals never need to share a
//! numeric scale and agreement between them is rewarded. Both candidate
//! paths see the same [`ChunkFilter`], so filtered-out chunks cannot leak in
//! through either side.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, warn};

use crate::storage::{ChunkFilter, ChunkRecord, Store};

/// Tuning knobs for the retrieval pipeline.
#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    /// Results returned to the caller.
    pub final_k: usize,
    /// Vector candidates entering fusion.
    pub vector_top_k: usize,
    /// Lexical candidates entering fusion.
    pub lexical_top_k: usize,
    /// Fusion weight of the vector list.
    pub vector_weight: f32,
    /// Fusion weight of the lexical list.
    pub lexical_weight: f32,
    pub enable_lexical: bool,
    /// Max chunks any single document contributes; zero disables the cap.
    pub per_document_cap: usize,
    pub mmr_enabled: bool,
    /// Relevance/diversity trade-off: 1.0 is pure relevance.
    pub mmr_lambda: f32,
    /// Candidate pool MMR selects from.
    pub mmr_pool: usize,
    /// Weight of the recency term; zero disables it.
    pub recency_boost: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            final_k: 8,
            vector_top_k: 40,
            lexical_top_k: 40,
            vector_weight: 1.0,
            lexical_weight: 1.0,
            enable_lexical: true,
            per_document_cap: 2,
            mmr_enabled: true,
            mmr_lambda: 0.7,
            mmr_pool: 24,
            recency_boost: 0.0,
        }
    }
}

impl RetrievalConfig {
    pub fn with_final_k(mut self, k: usize) -> Self {
        self.final_k = k;
        self
    }

    pub fn with_vector_top_k(mut self, k: usize) -> Self {
        self.vector_top_k = k;
        self
    }

    pub fn with_lexical_top_k(mut self, k: usize) -> Self {
        self.lexical_top_k = k;
        self
    }

    pub fn with_weights(mut self, vector: f32, lexical: f32) -> Self {
        self.vector_weight = vector;
        self.lexical_weight = lexical;
        self
    }

    pub fn with_lexical_enabled(mut self, enabled: bool) -> Self {
        self.enable_lexical = enabled;
        self
    }

    pub fn with_per_document_cap(mut self, cap: usize) -> Self {
        self.per_document_cap = cap;
        self
    }

    pub fn with_mmr(mut self, enabled: bool, lambda: f32, pool: usize) -> Self {
        self.mmr_enabled = enabled;
        self.mmr_lambda = lambda;
        self.mmr_pool = pool;
        self
    }

    pub fn with_recency_boost(mut self, boost: f32) -> Self {
        self.recency_boost = boost;
        self
    }
}

/// A retrieved chunk with its pipeline score (similarity before fusion,
/// fused score after).
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: ChunkRecord,
    pub score: f32,
}

/// External re-ranker over the final short-list.
///
/// Returns chunk ids in the preferred order. Ids it does not mention keep
/// their fused order after the mentioned ones; a failing response degrades
/// to the pre-rerank order.
#[async_trait]
pub trait Reranker: Send + Sync {
    async fn rerank(&self, query: &str, candidates: &[ScoredChunk]) -> Result<Vec<String>>;
}

/// The hybrid retriever. Read-only over the store; any number of retrieval
/// calls may run concurrently.
pub struct Retriever {
    store: Arc<dyn Store>,
    config: RetrievalConfig,
    reranker: Option<Arc<dyn Reranker>>,
}

impl Retriever {
    pub fn new(store: Arc<dyn Store>, config: RetrievalConfig) -> Self {
        Self {
            store,
            config,
            reranker: None,
        }
    }

    pub fn with_reranker(mut self, reranker: Arc<dyn Reranker>) -> Self {
        self.reranker = Some(reranker);
        self
    }

    /// Run the full retrieval pipeline for one query.
    pub async fn retrieve(
        &self,
        query_text: &str,
        query_vector: &[f32],
        filter: &ChunkFilter,
    ) -> Result<Vec<ScoredChunk>> {
        let vector = self.vector_candidates(query_vector, filter).await?;
        let lexical = if self.config.enable_lexical {
            self.store
                .lexical_search(query_text, self.config.lexical_top_k, filter)
                .await?
        } else {
            Vec::new()
        };
        debug!(
            vector_candidates = vector.len(),
            lexical_candidates = lexical.len(),
            "collected candidates"
        );

        let lexical: Vec<ScoredChunk> = lexical
            .into_iter()
            .map(|hit| ScoredChunk {
                chunk: hit.chunk,
                score: hit.score,
            })
            .collect();

        let fused = self.fuse(vector, lexical);
        let capped = self.apply_document_cap(fused);

        let mut results = if self.config.mmr_enabled && capped.len() > self.config.final_k {
            let pool_len = capped
                .len()
                .min(self.config.mmr_pool.max(self.config.final_k));
            let mut pool = capped;
            pool.truncate(pool_len);
            mmr_select(pool, self.config.final_k, self.config.mmr_lambda)
        } else {
            let mut results = capped;
            results.truncate(self.config.final_k);
            results
        };

        if let Some(reranker) = &self.reranker {
            if !results.is_empty() {
                results = self.apply_reranker(reranker, query_text, results).await;
            }
        }

        Ok(results)
    }

    /// Score every stored chunk that passes the filter against the query
    /// vector, exhaustively. Chunks without an embedding never score.
    async fn vector_candidates(
        &self,
        query_vector: &[f32],
        filter: &ChunkFilter,
    ) -> Result<Vec<ScoredChunk>> {
        let now = chrono::Utc::now().timestamp();
        let mut scored = Vec::new();
        for chunk in self.store.list_all_chunks().await? {
            if !filter.matches(&chunk) {
                continue;
            }
            let Some(embedding) = chunk.embedding.as_ref() else {
                continue;
            };
            let mut score = dot_f16_f32(embedding, query_vector);
            if self.config.recency_boost > 0.0 && chunk.mtime > 0 {
                let age_days = ((now - chunk.mtime).max(0) as f32) / 86_400.0;
                score += self.config.recency_boost / (1.0 + age_days);
            }
            scored.push(ScoredChunk { chunk, score });
        }
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        scored.truncate(self.config.vector_top_k);
        Ok(scored)
    }

    /// Reciprocal-rank fusion of the two candidate lists. A chunk appearing
    /// in both sums both contributions; ties keep first-appearance order
    /// (vector list first).
    fn fuse(&self, vector: Vec<ScoredChunk>, lexical: Vec<ScoredChunk>) -> Vec<ScoredChunk> {
        let mut order: Vec<String> = Vec::new();
        let mut by_id: HashMap<String, ScoredChunk> = HashMap::new();

        let mut add = |list: Vec<ScoredChunk>, weight: f32| {
            for (rank, candidate) in list.into_iter().enumerate() {
                let contribution = weight / (1.0 + rank as f32);
                match by_id.get_mut(&candidate.chunk.id) {
                    Some(existing) => existing.score += contribution,
                    None => {
                        let id = candidate.chunk.id.clone();
                        order.push(id.clone());
                        by_id.insert(
                            id,
                            ScoredChunk {
                                chunk: candidate.chunk,
                                score: contribution,
                            },
                        );
                    }
                }
            }
        };
        add(vector, self.config.vector_weight);
        add(lexical, self.config.lexical_weight);

        let mut fused: Vec<ScoredChunk> = order
            .iter()
            .filter_map(|id| by_id.remove(id))
            .collect();
        fused.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        fused
    }

    /// Drop candidates once their document has used up its quota,
    /// preserving fused order.
    fn apply_document_cap(&self, fused: Vec<ScoredChunk>) -> Vec<ScoredChunk> {
        if self.config.per_document_cap == 0 {
            return fused;
        }
        let mut counts: HashMap<String, usize> = HashMap::new();
        fused
            .into_iter()
            .filter(|candidate| {
                let count = counts.entry(candidate.chunk.path.clone()).or_insert(0);
                *count += 1;
                *count <= self.config.per_document_cap
            })
            .collect()
    }

    async fn apply_reranker(
        &self,
        reranker: &Arc<dyn Reranker>,
        query_text: &str,
        results: Vec<ScoredChunk>,
    ) -> Vec<ScoredChunk> {
        match reranker.rerank(query_text, &results).await {
            Ok(ids) => {
                let mut slots: Vec<Option<ScoredChunk>> = results.into_iter().map(Some).collect();
                let index: HashMap<String, usize> = slots
                    .iter()
                    .enumerate()
                    .map(|(i, slot)| (slot.as_ref().unwrap().chunk.id.clone(), i))
                    .collect();
                let mut reordered = Vec::with_capacity(slots.len());
                for id in ids {
                    if let Some(&slot) = index.get(&id) {
                        if let Some(candidate) = slots[slot].take() {
                            reordered.push(candidate);
                        }
                    }
                }
                // Ids the re-ranker did not mention keep their fused order.
                for slot in &mut slots {
                    if let Some(candidate) = slot.take() {
                        reordered.push(candidate);
                    }
                }
                reordered
            }
            Err(err) => {
                warn!("re-ranker failed, keeping fused order: {err:#}");
                results
            }
        }
    }
}

/// Greedy Maximal Marginal Relevance selection over a candidate pool.
/// Ties favor the earlier pool index.
fn mmr_select(pool: Vec<ScoredChunk>, k: usize, lambda: f32) -> Vec<ScoredChunk> {
    let mut selected: Vec<ScoredChunk> = Vec::with_capacity(k);
    let mut remaining = pool;
    while selected.len() < k && !remaining.is_empty() {
        let mut best_index = 0;
        let mut best_value = f32::NEG_INFINITY;
        for (i, candidate) in remaining.iter().enumerate() {
            let max_similarity = selected
                .iter()
                .map(|s| embedding_similarity(&candidate.chunk, &s.chunk))
                .fold(0.0f32, f32::max);
            let value = lambda * candidate.score - (1.0 - lambda) * max_similarity;
            if value > best_value {
                best_value = value;
                best_index = i;
            }
        }
        selected.push(remaining.remove(best_index));
    }
    selected
}

/// Dot product of two stored embeddings; zero when either is missing.
fn embedding_similarity(a: &ChunkRecord, b: &ChunkRecord) -> f32 {
    match (a.embedding.as_ref(), b.embedding.as_ref()) {
        (Some(a), Some(b)) => a
            .iter()
            .zip(b.iter())
            .map(|(x, y)| f32::from(*x) * f32::from(*y))
            .sum(),
        _ => 0.0,
    }
}

/// Dot product of a stored f16 embedding with an f32 query vector. With both
/// sides unit-normalized this is cosine similarity.
fn dot_f16_f32(embedding: &[half::f16], query: &[f32]) -> f32 {
    embedding
        .iter()
        .zip(query.iter())
        .map(|(x, y)| f32::from(*x) * y)
        .sum()
}
