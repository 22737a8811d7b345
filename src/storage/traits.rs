//! Storage trait definitions.
//!
//! Defines the interface for persistent storage backends, enabling
//! pluggable storage implementations for chunks, sources, conversations
//! and feedback.

use crate::core::{Chunk, Conversation, ContentType, Source, Turn};
use crate::error::Result;
use serde::Serialize;

/// Conjunctive filter applied to both vector and lexical chunk search.
#[derive(Debug, Clone, Default)]
pub struct ChunkFilter {
    /// Restrict results to these source IDs, if non-empty.
    pub source_ids: Vec<String>,
    /// Restrict results to these content types, if non-empty.
    pub content_types: Vec<ContentType>,
    /// Drop chunks below this quality score.
    pub min_quality: Option<f32>,
}

impl ChunkFilter {
    /// A filter that matches every chunk.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Whether this filter has no restrictions at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.source_ids.is_empty() && self.content_types.is_empty() && self.min_quality.is_none()
    }
}

/// A chunk paired with its similarity/relevance score in `[0, 1]`.
#[derive(Debug, Clone)]
pub struct ScoredRow {
    /// The matched chunk.
    pub chunk: Chunk,
    /// Score normalized into `[0, 1]`.
    pub score: f32,
}

/// Trait for the chunk/source/conversation/feedback persistence layer.
///
/// Implementations handle storage of RAG state: source documents, their
/// chunks and embeddings, conversation turn logs, and user feedback.
/// Operations that touch multiple rows are expected to be transactional
/// where the data model requires it (upsert, cascading delete).
pub trait Storage: Send + Sync {
    /// Initializes storage (creates schema, runs migrations).
    ///
    /// Should be idempotent - safe to call multiple times.
    ///
    /// # Errors
    ///
    /// Returns an error if schema creation or migration fails.
    fn init(&mut self) -> Result<()>;

    /// Checks if storage is initialized.
    ///
    /// # Errors
    ///
    /// Returns an error if the check cannot be performed.
    fn is_initialized(&self) -> Result<bool>;

    /// Resets all stored state.
    ///
    /// Deletes all data but preserves the schema.
    ///
    /// # Errors
    ///
    /// Returns an error if deletion fails.
    fn reset(&mut self) -> Result<()>;

    // ==================== Source Operations ====================

    /// Inserts or updates a source document's metadata.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails or the content-hash/version
    /// uniqueness constraint is violated.
    fn upsert_source(&mut self, source: &Source) -> Result<i64>;

    /// Retrieves a source by its logical `source_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn get_source(&self, source_id: &str) -> Result<Option<Source>>;

    /// Lists all known sources.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn list_sources(&self) -> Result<Vec<Source>>;

    /// Deletes a source and cascades to its chunks.
    ///
    /// # Errors
    ///
    /// Returns an error if deletion fails.
    fn delete_source(&mut self, source_id: &str) -> Result<()>;

    // ==================== Chunk Store Operations ====================

    /// Writes or replaces a chunk, including its embedding if present.
    /// `chunk.source_id` must reference an existing source row.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::StorageError::DimensionMismatch`] if the
    /// chunk carries an embedding whose length does not match the
    /// store's configured dimensionality, or a database error otherwise.
    fn upsert(&mut self, chunk: &Chunk) -> Result<i64>;

    /// Deletes all chunks belonging to `source_id`, transactionally with
    /// the source row itself.
    ///
    /// # Errors
    ///
    /// Returns an error if deletion fails.
    fn delete_by_source(&mut self, source_id: &str) -> Result<()>;

    /// Top-k chunks by cosine similarity to `query_vec`, subject to
    /// `filter`. Scores are normalized from `[-1, 1]` to `[0, 1]` via
    /// `(s + 1) / 2`.
    ///
    /// # Errors
    ///
    /// Returns an error if the scan fails.
    fn search_vector(&self, query_vec: &[f32], k: usize, filter: &ChunkFilter) -> Result<Vec<ScoredRow>>;

    /// Top-k chunks by BM25-style ranking over the lexical field, subject
    /// to `filter`. Scores are rescaled into `[0, 1]` by dividing by the
    /// maximum score in the result set (0 if the result set is empty).
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn search_lexical(&self, query_text: &str, k: usize, filter: &ChunkFilter) -> Result<Vec<ScoredRow>>;

    /// Batch-fetches chunks by ID, preserving the order of `ids`. IDs with
    /// no matching row are omitted from the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn get_by_ids(&self, ids: &[i64]) -> Result<Vec<Chunk>>;

    // ==================== Conversation Operations ====================

    /// Appends a turn to a session's conversation log, creating the
    /// conversation row if it does not yet exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn append_turn(&mut self, session_id: &str, turn: &Turn) -> Result<()>;

    /// Deletes all but the `keep_last` most recent turns of a session's
    /// conversation log, oldest first. A no-op if the session has
    /// `keep_last` turns or fewer.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn truncate_conversation(&mut self, session_id: &str, keep_last: usize) -> Result<()>;

    /// Loads a session's conversation, or `None` if the session is
    /// unknown.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn load_conversation(&self, session_id: &str) -> Result<Option<Conversation>>;

    /// Deletes a session's conversation history.
    ///
    /// # Errors
    ///
    /// Returns an error if deletion fails.
    fn delete_conversation(&mut self, session_id: &str) -> Result<()>;

    // ==================== Feedback Operations ====================

    /// Records feedback for a single assistant message. Fails if
    /// feedback for the same `(session_id, message_id)` pair already
    /// exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the uniqueness constraint is violated or the
    /// write otherwise fails.
    fn record_feedback(&mut self, feedback: &FeedbackRecord) -> Result<i64>;

    // ==================== Utility Operations ====================

    /// Gets storage statistics.
    ///
    /// # Errors
    ///
    /// Returns an error if statistics cannot be gathered.
    fn stats(&self) -> Result<StorageStats>;
}

/// A unit of user feedback on a single assistant turn.
#[derive(Debug, Clone, Serialize)]
pub struct FeedbackRecord {
    /// Session the feedback belongs to.
    pub session_id: String,
    /// Identifier of the assistant message being rated.
    pub message_id: String,
    /// Star-style rating, typically 1-5.
    pub rating: i64,
    /// Optional free-text comment.
    pub feedback_text: Option<String>,
    /// Optional structured complaint categories, JSON-encoded.
    pub categories: Option<String>,
    /// Optional recorded confidence/quality score at answer time.
    pub quality_score: Option<f32>,
}

/// Storage statistics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StorageStats {
    /// Number of sources stored.
    pub source_count: usize,
    /// Total number of chunks across all sources.
    pub chunk_count: usize,
    /// Number of chunks with an indexed embedding.
    pub embedded_chunk_count: usize,
    /// Number of active conversations.
    pub conversation_count: usize,
    /// Schema version.
    pub schema_version: u32,
    /// Database file size in bytes (if applicable).
    pub db_size: Option<u64>,
}

/// Trait for accelerated approximate-nearest-neighbor search (feature-gated).
///
/// A real deployment can swap in an HNSW-backed implementation behind this
/// trait without changing [`Storage::search_vector`]'s contract; the default
/// `SqliteStorage` implementation always uses a brute-force cosine scan.
#[cfg(feature = "usearch-hnsw")]
pub trait VectorIndex: Send + Sync {
    /// Indexes a chunk's embedding for accelerated search.
    ///
    /// # Errors
    ///
    /// Returns an error if indexing fails.
    fn index_chunk(&mut self, chunk_id: i64, embedding: &[f32]) -> Result<()>;

    /// Performs approximate nearest-neighbor search.
    ///
    /// Returns chunk IDs and similarity scores.
    ///
    /// # Errors
    ///
    /// Returns an error if the search fails.
    fn search_similar(&self, query_embedding: &[f32], limit: usize) -> Result<Vec<(i64, f32)>>;

    /// Removes a chunk from the index.
    ///
    /// # Errors
    ///
    /// Returns an error if removal fails.
    fn remove_index(&mut self, chunk_id: i64) -> Result<()>;
}
