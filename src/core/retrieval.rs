//! Retrieval result types shared by the retriever and the rest of the
//! orchestrator pipeline.

use serde::{Deserialize, Serialize};

use super::Chunk;

/// Which retrieval strategy produced a [`ScoredChunk`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyTag {
    /// Vector-only search.
    Vector,
    /// Lexical-only (BM25) search.
    Lexical,
    /// Weighted combination of vector and lexical.
    Hybrid,
}

impl std::fmt::Display for StrategyTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Vector => "vector",
            Self::Lexical => "lexical",
            Self::Hybrid => "hybrid",
        };
        f.write_str(s)
    }
}

/// Per-strategy component scores contributing to a [`ScoredChunk`]'s final
/// score, kept for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ComponentScores {
    /// Vector-search similarity, normalized to `[0, 1]`, if the chunk was a
    /// vector-search hit.
    pub vector: Option<f32>,
    /// Lexical-search score, normalized to `[0, 1]`, if the chunk was a
    /// lexical-search hit.
    pub lexical: Option<f32>,
}

/// A single chunk returned by the retriever, with its final rank and score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredChunk {
    /// The retrieved chunk.
    pub chunk: Chunk,
    /// Final score in `[0, 1]`, descending order within a [`RetrievalResult`].
    pub score: f32,
    /// 1-based rank within the result.
    pub rank: usize,
    /// Which strategy produced this entry.
    pub strategy: StrategyTag,
    /// Per-strategy component scores, for diagnostics.
    pub component_scores: ComponentScores,
}

/// The ranked output of a single retrieval call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    /// Ranked, post-processed chunks (quality-filtered, diversity-pruned,
    /// truncated to `k_final`).
    pub chunks: Vec<ScoredChunk>,
    /// Strategy actually used (may differ from the requested one if the
    /// retriever degraded, e.g. hybrid -> lexical when the vector index is
    /// unavailable).
    pub strategy_used: StrategyTag,
    /// Length of the merged, pre-truncation scored list, for diagnostics.
    pub pre_truncation_count: usize,
    /// Set when the vector index was unavailable and retrieval degraded.
    pub degraded: bool,
}

impl RetrievalResult {
    /// An empty result tagged with the strategy that was requested.
    #[must_use]
    pub const fn empty(strategy_used: StrategyTag) -> Self {
        Self {
            chunks: Vec::new(),
            strategy_used,
            pre_truncation_count: 0,
            degraded: false,
        }
    }

    /// Whether this result has no candidate chunks at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Chunk;

    fn sample_chunk(id: i64) -> Chunk {
        Chunk::new(id, 0, "sample content".to_string())
    }

    #[test]
    fn test_empty_result() {
        let result = RetrievalResult::empty(StrategyTag::Hybrid);
        assert!(result.is_empty());
        assert_eq!(result.strategy_used, StrategyTag::Hybrid);
    }

    #[test]
    fn test_scored_chunk_ordering_fields() {
        let scored = ScoredChunk {
            chunk: sample_chunk(1),
            score: 0.9,
            rank: 1,
            strategy: StrategyTag::Hybrid,
            component_scores: ComponentScores {
                vector: Some(0.95),
                lexical: Some(0.8),
            },
        };
        assert_eq!(scored.rank, 1);
        assert!(scored.component_scores.vector.is_some());
    }

    #[test]
    fn test_strategy_display() {
        assert_eq!(StrategyTag::Vector.to_string(), "vector");
        assert_eq!(StrategyTag::Hybrid.to_string(), "hybrid");
    }
}
