//! Retriever: turns a query (and, for vector search, its embedding) into a
//! ranked, diversity-pruned [`RetrievalResult`].
//!
//! Three strategies are supported: vector-only, lexical-only, and hybrid
//! (a weighted linear combination of both, merged by chunk id). Hybrid is
//! the default whenever both indexes are available. This replaces the
//! teacher's reciprocal-rank-fusion merge (see `examples/zircote-rlm/src/
//! agent/orchestrator.rs::search_with_fallback`) with an explicit weighted
//! sum, which is easier to reason about and to tune per deployment.

use std::collections::HashMap;
use std::sync::Arc;

use crate::core::{ComponentScores, RetrievalResult, ScoredChunk, StrategyTag};
use crate::embedding::cosine_similarity;
use crate::error::{Result, RetrievalError};
use crate::storage::{ChunkFilter, Storage, StoragePool};

/// Default number of vector-search candidates to pull before hybrid merge
/// and post-processing (2x `k_final`, per the widening rule).
const fn widen(k_final: usize) -> usize {
    k_final.saturating_mul(2)
}

/// Tunable parameters for a single retrieval call.
#[derive(Debug, Clone)]
pub struct RetrieverConfig {
    /// Which strategy to prefer. [`RetrievalStrategy::Hybrid`] degrades to
    /// lexical-only if no vector index/embedding is available.
    pub strategy: RetrievalStrategy,
    /// Number of chunks to return after post-processing.
    pub k_final: usize,
    /// Minimum quality score a chunk must have to survive the quality
    /// filter.
    pub min_quality: f32,
    /// Cosine-similarity ceiling for the diversity pruning pass: a
    /// candidate is dropped if it is at least this similar to any
    /// already-accepted chunk.
    pub diversity_threshold: f32,
    /// Vector-score weight in the hybrid merge.
    pub vector_weight: f32,
    /// Lexical-score weight in the hybrid merge.
    pub lexical_weight: f32,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            strategy: RetrievalStrategy::Hybrid,
            k_final: 5,
            min_quality: crate::core::chunk::DEFAULT_MIN_QUALITY,
            diversity_threshold: 0.92,
            vector_weight: 0.7,
            lexical_weight: 0.3,
        }
    }
}

/// The retrieval strategy requested for a call. [`Self::Hybrid`] is the
/// default whenever both a query embedding and a lexical index are
/// available.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrievalStrategy {
    /// Vector (embedding cosine-similarity) search only.
    Vector,
    /// Lexical (BM25-style full-text) search only.
    Lexical,
    /// Weighted combination of both.
    Hybrid,
}

/// Retrieves and post-processes chunks for a single query against a
/// [`Storage`] backend.
pub struct Retriever<S: Storage> {
    pool: StoragePool<S>,
}

impl<S: Storage + 'static> Retriever<S> {
    /// Wraps a storage pool for retrieval.
    #[must_use]
    pub const fn new(pool: StoragePool<S>) -> Self {
        Self { pool }
    }

    /// Retrieves chunks for `query_text`, using `query_vec` for the vector
    /// side of hybrid/vector-only search. Pass `query_vec: None` to force
    /// lexical-only behavior regardless of `config.strategy`.
    ///
    /// Runs the underlying storage calls on a blocking-pool thread since
    /// the synchronous `Storage` backends (e.g. SQLite) should not run
    /// directly on the async executor; when both a vector and a lexical
    /// sub-search are needed, they run concurrently and are joined before
    /// merging (see §5 of the accompanying design notes).
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError::NoIndex`] if the requested strategy needs
    /// an index that is unavailable (e.g. vector-only with no embedding
    /// and no fallback), or propagates the underlying storage error.
    pub async fn retrieve(
        &self,
        query_text: &str,
        query_vec: Option<&[f32]>,
        filter: ChunkFilter,
        config: &RetrieverConfig,
    ) -> Result<RetrievalResult> {
        let vector_available = query_vec.is_some();

        let effective_strategy = match config.strategy {
            RetrievalStrategy::Vector if !vector_available => {
                return Err(RetrievalError::NoIndex.into());
            }
            RetrievalStrategy::Hybrid if !vector_available => RetrievalStrategy::Lexical,
            other => other,
        };

        let merged = match effective_strategy {
            RetrievalStrategy::Vector => {
                let rows = self
                    .search_vector(query_vec.expect("checked above"), widen(config.k_final), filter)
                    .await?;
                Self::tag_rows(rows, StrategyTag::Vector)
            }
            RetrievalStrategy::Lexical => {
                let rows = self
                    .search_lexical(query_text, widen(config.k_final), filter)
                    .await?;
                Self::tag_rows(rows, StrategyTag::Lexical)
            }
            RetrievalStrategy::Hybrid => {
                let k = widen(config.k_final);
                let query_vec = query_vec.expect("checked above").to_vec();
                let query_text = query_text.to_string();
                let pool_vector = self.pool.clone();
                let pool_lexical = self.pool.clone();
                let filter_vector = filter.clone();
                let filter_lexical = filter;

                let (vector_rows, lexical_rows) = tokio::join!(
                    tokio::task::spawn_blocking(move || {
                        pool_vector.with_storage(|s| s.search_vector(&query_vec, k, &filter_vector))
                    }),
                    tokio::task::spawn_blocking(move || {
                        pool_lexical.with_storage(|s| s.search_lexical(&query_text, k, &filter_lexical))
                    }),
                );

                let vector_rows = vector_rows.map_err(|e| {
                    crate::error::Error::Internal { message: format!("vector search task panicked: {e}") }
                })??;
                let lexical_rows = lexical_rows.map_err(|e| {
                    crate::error::Error::Internal { message: format!("lexical search task panicked: {e}") }
                })??;

                Self::merge_hybrid(vector_rows, lexical_rows, config)
            }
        };

        let degraded = config.strategy == RetrievalStrategy::Hybrid && !vector_available;
        let strategy_used = if degraded { StrategyTag::Lexical } else { effective_strategy_tag(effective_strategy) };

        let pre_truncation_count = merged.len();
        let post_processed = post_process(merged, config);

        Ok(RetrievalResult {
            chunks: post_processed,
            strategy_used,
            pre_truncation_count,
            degraded,
        })
    }

    async fn search_vector(
        &self,
        query_vec: &[f32],
        k: usize,
        filter: ChunkFilter,
    ) -> Result<Vec<crate::storage::ScoredRow>> {
        let query_vec = query_vec.to_vec();
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || pool.with_storage(|s| s.search_vector(&query_vec, k, &filter)))
            .await
            .map_err(|e| crate::error::Error::Internal { message: format!("vector search task panicked: {e}") })?
    }

    async fn search_lexical(
        &self,
        query_text: &str,
        k: usize,
        filter: ChunkFilter,
    ) -> Result<Vec<crate::storage::ScoredRow>> {
        let query_text = query_text.to_string();
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || pool.with_storage(|s| s.search_lexical(&query_text, k, &filter)))
            .await
            .map_err(|e| crate::error::Error::Internal { message: format!("lexical search task panicked: {e}") })?
    }

    fn tag_rows(rows: Vec<crate::storage::ScoredRow>, strategy: StrategyTag) -> Vec<ScoredChunk> {
        rows.into_iter()
            .map(|row| ScoredChunk {
                score: row.score,
                rank: 0,
                strategy,
                component_scores: match strategy {
                    StrategyTag::Vector => ComponentScores {
                        vector: Some(row.score),
                        lexical: None,
                    },
                    StrategyTag::Lexical => ComponentScores {
                        vector: None,
                        lexical: Some(row.score),
                    },
                    StrategyTag::Hybrid => ComponentScores::default(),
                },
                chunk: row.chunk,
            })
            .collect()
    }

    fn merge_hybrid(
        vector_rows: Vec<crate::storage::ScoredRow>,
        lexical_rows: Vec<crate::storage::ScoredRow>,
        config: &RetrieverConfig,
    ) -> Vec<ScoredChunk> {
        let mut by_id: HashMap<i64, (crate::core::Chunk, ComponentScores)> = HashMap::new();

        for row in vector_rows {
            let Some(id) = row.chunk.id else { continue };
            let entry = by_id.entry(id).or_insert_with(|| (row.chunk.clone(), ComponentScores::default()));
            entry.1.vector = Some(row.score);
        }
        for row in lexical_rows {
            let Some(id) = row.chunk.id else { continue };
            let entry = by_id.entry(id).or_insert_with(|| (row.chunk.clone(), ComponentScores::default()));
            entry.1.lexical = Some(row.score);
        }

        by_id
            .into_values()
            .map(|(chunk, component_scores)| {
                let s_v = component_scores.vector.unwrap_or(0.0);
                let s_l = component_scores.lexical.unwrap_or(0.0);
                let score = config.vector_weight.mul_add(s_v, config.lexical_weight * s_l);
                ScoredChunk {
                    chunk,
                    score,
                    rank: 0,
                    strategy: StrategyTag::Hybrid,
                    component_scores,
                }
            })
            .collect()
    }
}

const fn effective_strategy_tag(strategy: RetrievalStrategy) -> StrategyTag {
    match strategy {
        RetrievalStrategy::Vector => StrategyTag::Vector,
        RetrievalStrategy::Lexical => StrategyTag::Lexical,
        RetrievalStrategy::Hybrid => StrategyTag::Hybrid,
    }
}

/// Applies the fixed post-processing pipeline: quality filter, diversity
/// pruning, truncation to `k_final`, then assigns 1-based ranks.
fn post_process(mut candidates: Vec<ScoredChunk>, config: &RetrieverConfig) -> Vec<ScoredChunk> {
    candidates.retain(|c| c.chunk.quality_score >= config.min_quality);

    candidates.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.chunk.quality_score.partial_cmp(&a.chunk.quality_score).unwrap_or(std::cmp::Ordering::Equal))
            .then_with(|| a.chunk.chunk_index.cmp(&b.chunk.chunk_index))
    });

    let pruned = diversity_prune(candidates, config.diversity_threshold);

    let mut truncated: Vec<ScoredChunk> = pruned.into_iter().take(config.k_final).collect();
    for (i, scored) in truncated.iter_mut().enumerate() {
        scored.rank = i + 1;
    }
    truncated
}

/// Greedy diversity pruning: walk candidates in score order, accepting a
/// candidate only if its cosine similarity to every already-accepted
/// candidate is below `threshold`. A candidate with no embedding is
/// treated as similarity 0 to everything (always passes).
fn diversity_prune(candidates: Vec<ScoredChunk>, threshold: f32) -> Vec<ScoredChunk> {
    let mut accepted: Vec<ScoredChunk> = Vec::new();

    for candidate in candidates {
        let similar_to_accepted = accepted.iter().any(|a| {
            match (&candidate.chunk.embedding, &a.chunk.embedding) {
                (Some(ce), Some(ae)) => cosine_similarity(ce, ae) >= threshold,
                _ => false,
            }
        });

        if !similar_to_accepted {
            accepted.push(candidate);
        }
    }

    accepted
}

/// Convenience alias used by the orchestrator to avoid naming the concrete
/// storage type at every call site.
pub type ArcRetriever<S> = Arc<Retriever<S>>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Chunk;
    use crate::storage::SqliteStorage;
    use std::time::Duration;

    fn pool() -> StoragePool<SqliteStorage> {
        let mut storage = SqliteStorage::in_memory().expect("in-memory storage");
        storage.init().expect("init");
        StoragePool::new(storage, Duration::from_secs(1))
    }

    fn chunk_with_embedding(source_id: i64, idx: usize, content: &str, quality: f32, embedding: Vec<f32>) -> Chunk {
        Chunk::new(source_id, idx, content.to_string())
            .with_quality_score(quality)
            .with_embedding(embedding)
    }

    #[tokio::test]
    async fn test_vector_strategy_requires_embedding() {
        let p = pool();
        let retriever = Retriever::new(p);
        let config = RetrieverConfig {
            strategy: RetrievalStrategy::Vector,
            ..RetrieverConfig::default()
        };
        let result = retriever.retrieve("fund", None, ChunkFilter::none(), &config).await;
        assert!(matches!(
            result,
            Err(crate::error::Error::Retrieval(RetrievalError::NoIndex))
        ));
    }

    #[tokio::test]
    async fn test_hybrid_degrades_to_lexical_without_vector() {
        use crate::core::Source;

        let p = pool();
        let row_id = p.with_storage(|s| {
            let mut source = Source::new("guide.md".to_string(), b"Fund Creation Guide");
            source.mark_completed();
            let source_row = s.upsert_source(&source)?;
            let chunk =
                Chunk::new(source_row, 0, "To create a fund submit form FC-1".to_string()).with_quality_score(0.8);
            s.upsert(&chunk)
        });
        assert!(row_id.is_ok());

        let retriever = Retriever::new(p);
        let config = RetrieverConfig::default();
        let result = retriever
            .retrieve("fund", None, ChunkFilter::none(), &config)
            .await
            .expect("retrieve");
        assert!(result.degraded);
        assert_eq!(result.strategy_used, StrategyTag::Lexical);
    }

    #[test]
    fn test_diversity_prune_keeps_one_of_near_duplicates() {
        let embedding = vec![1.0, 0.0, 0.0];
        let candidates = (0..5)
            .map(|i| ScoredChunk {
                chunk: chunk_with_embedding(1, i, "dup", 0.8, embedding.clone()),
                score: 0.9 - (i as f32) * 0.01,
                rank: 0,
                strategy: StrategyTag::Vector,
                component_scores: ComponentScores::default(),
            })
            .collect::<Vec<_>>();

        let pruned = diversity_prune(candidates, 0.92);
        assert_eq!(pruned.len(), 1);
    }

    #[test]
    fn test_diversity_prune_treats_missing_embedding_as_dissimilar() {
        let candidates = vec![
            ScoredChunk {
                chunk: Chunk::new(1, 0, "a".to_string()).with_quality_score(0.8),
                score: 0.9,
                rank: 0,
                strategy: StrategyTag::Lexical,
                component_scores: ComponentScores::default(),
            },
            ScoredChunk {
                chunk: Chunk::new(1, 1, "b".to_string()).with_quality_score(0.8),
                score: 0.8,
                rank: 0,
                strategy: StrategyTag::Lexical,
                component_scores: ComponentScores::default(),
            },
        ];
        let pruned = diversity_prune(candidates, 0.92);
        assert_eq!(pruned.len(), 2);
    }

    #[test]
    fn test_post_process_ordering_tiebreak() {
        let candidates = vec![
            ScoredChunk {
                chunk: Chunk::new(1, 2, "a".to_string()).with_quality_score(0.5),
                score: 0.9,
                rank: 0,
                strategy: StrategyTag::Lexical,
                component_scores: ComponentScores::default(),
            },
            ScoredChunk {
                chunk: Chunk::new(1, 1, "b".to_string()).with_quality_score(0.9),
                score: 0.9,
                rank: 0,
                strategy: StrategyTag::Lexical,
                component_scores: ComponentScores::default(),
            },
            ScoredChunk {
                chunk: Chunk::new(1, 0, "c".to_string()).with_quality_score(0.9),
                score: 0.9,
                rank: 0,
                strategy: StrategyTag::Lexical,
                component_scores: ComponentScores::default(),
            },
        ];
        let config = RetrieverConfig::default();
        let processed = post_process(candidates, &config);
        assert_eq!(processed[0].chunk.chunk_index, 0);
        assert_eq!(processed[1].chunk.chunk_index, 1);
        assert_eq!(processed[2].chunk.chunk_index, 2);
    }

    #[test]
    fn test_quality_filter_drops_low_quality() {
        let candidates = vec![ScoredChunk {
            chunk: Chunk::new(1, 0, "a".to_string()).with_quality_score(0.1),
            score: 0.9,
            rank: 0,
            strategy: StrategyTag::Lexical,
            component_scores: ComponentScores::default(),
        }];
        let config = RetrieverConfig {
            min_quality: 0.3,
            ..RetrieverConfig::default()
        };
        let processed = post_process(candidates, &config);
        assert!(processed.is_empty());
    }
}
