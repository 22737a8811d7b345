//! Runtime configuration for the RAG orchestrator and API layer.
//!
//! Loaded once at startup from compiled-in defaults, an optional TOML file,
//! and environment variables (`FUND_RAG_` prefix, `__` as the nesting
//! separator), using the same three-tier precedence as the teacher's
//! `agent::prompt::PromptSet::load` resolution. The resulting [`RagConfig`]
//! is then held behind an [`arc_swap::ArcSwap`] so `PUT /admin/rag/config`
//! can swap in a new snapshot without taking any request-path lock.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Environment variable prefix recognized by the `config` crate's
/// environment source.
pub const ENV_PREFIX: &str = "FUND_RAG";

/// Vector store parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorConfig {
    /// Embedding dimensionality every stored chunk and query vector must
    /// match.
    pub dimension: usize,
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            dimension: crate::embedding::DEFAULT_DIMENSIONS,
        }
    }
}

/// Embedding generation parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Model identifier, used for cache keys and logging.
    pub model: String,
    /// Embedding cache capacity (entries).
    pub cache_capacity: usize,
    /// Maximum retry attempts for transient embedder failures.
    pub max_retries: u32,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: "all-MiniLM-L6-v2".to_string(),
            cache_capacity: 10_000,
            max_retries: 3,
        }
    }
}

/// Retrieval strategy and post-processing parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Maximum chunks returned after post-processing (`k_final`).
    pub max_chunks: usize,
    /// Cosine-similarity ceiling for diversity pruning.
    pub diversity_threshold: f32,
    /// Whether hybrid (vector + lexical) search is attempted before
    /// falling back to lexical-only.
    pub enable_hybrid_search: bool,
    /// Vector-score weight in the hybrid merge.
    pub vector_weight: f32,
    /// Lexical-score weight in the hybrid merge.
    pub lexical_weight: f32,
    /// Minimum quality score a chunk must have to survive the quality
    /// filter.
    pub min_quality: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        let defaults = crate::retriever::RetrieverConfig::default();
        Self {
            max_chunks: defaults.k_final,
            diversity_threshold: defaults.diversity_threshold,
            enable_hybrid_search: true,
            vector_weight: defaults.vector_weight,
            lexical_weight: defaults.lexical_weight,
            min_quality: defaults.min_quality,
        }
    }
}

/// Response generation parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResponseConfig {
    /// Maximum tokens the completion client is asked to generate.
    pub max_tokens: u32,
    /// Sampling temperature passed to the completion client.
    pub temperature: f32,
    /// Overall confidence below which the orchestrator always applies a
    /// fallback, independent of detected issues.
    pub confidence_threshold: f32,
    /// Whether citation extraction/validation runs at all; disabling this
    /// still returns a response, but `citations` is always empty and the
    /// content sub-score's citation terms are held at their neutral value.
    pub enable_citation_validation: bool,
    /// Completion model fallback list, first entry tried first.
    pub models: Vec<String>,
}

impl Default for ResponseConfig {
    fn default() -> Self {
        Self {
            max_tokens: 800,
            temperature: 0.2,
            confidence_threshold: 0.2,
            enable_citation_validation: true,
            models: crate::completion::CompletionClientConfig::default().models,
        }
    }
}

/// Confidence-level classification thresholds, mirrored from
/// [`crate::confidence::LevelThresholds`] so the config layer can own the
/// admin-editable copy while the scorer stays config-agnostic.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfidenceConfig {
    /// `overall >= high_threshold` -> high.
    pub high_threshold: f32,
    /// `overall >= medium_threshold` -> medium.
    pub medium_threshold: f32,
    /// `overall >= low_threshold` -> low.
    pub low_threshold: f32,
    /// Floor below which a fallback is always applied.
    pub minimum_threshold: f32,
}

impl Default for ConfidenceConfig {
    fn default() -> Self {
        let defaults = crate::confidence::LevelThresholds::default();
        Self {
            high_threshold: defaults.high,
            medium_threshold: defaults.medium,
            low_threshold: defaults.low,
            minimum_threshold: defaults.minimum,
        }
    }
}

impl ConfidenceConfig {
    /// Converts to the scorer's threshold type.
    #[must_use]
    pub const fn as_level_thresholds(&self) -> crate::confidence::LevelThresholds {
        crate::confidence::LevelThresholds {
            high: self.high_threshold,
            medium: self.medium_threshold,
            low: self.low_threshold,
            minimum: self.minimum_threshold,
        }
    }
}

/// Prompt assembly parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptConfig {
    /// Most-recent conversation turns included before truncation.
    pub history_turns: usize,
    /// Token budget the assembled prompt must fit within.
    pub max_prompt_tokens: usize,
}

impl Default for PromptConfig {
    fn default() -> Self {
        let defaults = crate::prompt::AssemblerConfig::default();
        Self {
            history_turns: defaults.history_turns,
            max_prompt_tokens: defaults.max_prompt_tokens,
        }
    }
}

/// Conversation retention and locking parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationConfig {
    /// Maximum turns retained per session before the oldest are dropped.
    pub retention: usize,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            retention: crate::core::conversation::DEFAULT_RETENTION,
        }
    }
}

/// The full, admin-editable RAG runtime configuration.
///
/// Validated with [`RagConfig::validate`] before being accepted, whether
/// at startup or via `PUT /admin/rag/config`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RagConfig {
    /// Vector store parameters.
    pub vector: VectorConfig,
    /// Embedding generation parameters.
    pub embedding: EmbeddingConfig,
    /// Retrieval strategy parameters.
    pub retrieval: RetrievalConfig,
    /// Response generation parameters.
    pub response: ResponseConfig,
    /// Confidence classification thresholds.
    pub confidence: ConfidenceConfig,
    /// Prompt assembly parameters.
    pub prompt: PromptConfig,
    /// Conversation retention parameters.
    pub conversation: ConversationConfig,
}

impl RagConfig {
    /// Loads configuration layered as compiled-in defaults, then an
    /// optional TOML file at `path` (if it exists), then environment
    /// variables prefixed `FUND_RAG__` (double underscore separates
    /// nesting, e.g. `FUND_RAG__RETRIEVAL__MAX_CHUNKS=8`).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the file contains invalid TOML, an
    /// environment override cannot be coerced to its field's type, or the
    /// merged configuration fails [`Self::validate`].
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let defaults = Self::default();

        let mut builder = config::Config::builder().add_source(
            config::Config::try_from(&defaults).map_err(|e| Error::Config {
                message: format!("failed to seed config defaults: {e}"),
            })?,
        );

        if let Some(path) = path
            && path.exists()
        {
            builder = builder.add_source(config::File::from(path.to_path_buf()));
        }

        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );

        let merged = builder.build().map_err(|e| Error::Config {
            message: format!("failed to load configuration: {e}"),
        })?;

        let config: Self = merged.try_deserialize().map_err(|e| Error::Config {
            message: format!("failed to parse configuration: {e}"),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Validates cross-field invariants that serde's per-field defaults
    /// cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if any threshold or weight is out of its
    /// documented range, or the confidence thresholds are not in
    /// `minimum <= low <= medium <= high` order.
    pub fn validate(&self) -> Result<()> {
        let c = &self.confidence;
        if !(c.minimum <= c.low_threshold && c.low_threshold <= c.medium_threshold && c.medium_threshold <= c.high_threshold) {
            return Err(Error::Config {
                message: "confidence thresholds must satisfy minimum <= low <= medium <= high".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&c.high_threshold) {
            return Err(Error::Config {
                message: "confidence.high_threshold must be in [0, 1]".to_string(),
            });
        }

        let r = &self.retrieval;
        if r.max_chunks == 0 {
            return Err(Error::Config {
                message: "retrieval.max_chunks must be > 0".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&r.diversity_threshold) {
            return Err(Error::Config {
                message: "retrieval.diversity_threshold must be in [0, 1]".to_string(),
            });
        }
        if r.vector_weight < 0.0 || r.lexical_weight < 0.0 || (r.vector_weight + r.lexical_weight) <= 0.0 {
            return Err(Error::Config {
                message: "retrieval weights must be non-negative and sum to a positive value".to_string(),
            });
        }

        if self.vector.dimension == 0 {
            return Err(Error::Config {
                message: "vector.dimension must be > 0".to_string(),
            });
        }
        if self.response.models.is_empty() {
            return Err(Error::Config {
                message: "response.models must name at least one completion model".to_string(),
            });
        }

        Ok(())
    }

    /// The retrieval sub-config as the [`crate::retriever::RetrieverConfig`]
    /// the retriever expects.
    #[must_use]
    pub fn retriever_config(&self) -> crate::retriever::RetrieverConfig {
        crate::retriever::RetrieverConfig {
            strategy: if self.retrieval.enable_hybrid_search {
                crate::retriever::RetrievalStrategy::Hybrid
            } else {
                crate::retriever::RetrievalStrategy::Lexical
            },
            k_final: self.retrieval.max_chunks,
            min_quality: self.retrieval.min_quality,
            diversity_threshold: self.retrieval.diversity_threshold,
            vector_weight: self.retrieval.vector_weight,
            lexical_weight: self.retrieval.lexical_weight,
        }
    }

    /// The prompt sub-config as the [`crate::prompt::AssemblerConfig`] the
    /// assembler expects.
    #[must_use]
    pub const fn assembler_config(&self) -> crate::prompt::AssemblerConfig {
        crate::prompt::AssemblerConfig {
            history_turns: self.prompt.history_turns,
            max_prompt_tokens: self.prompt.max_prompt_tokens,
        }
    }
}
