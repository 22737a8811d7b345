//! Chunking for the ingestion pipeline.
//!
//! Ingestion is not part of the query-time RAG core; this module exists to
//! produce [`crate::core::Chunk`]s that satisfy the Chunk Store's
//! invariants (token/quality bounds, content-type tagging, heading/section
//! tracking) so the retriever has something to search over. A single
//! [`FixedChunker`] strategy covers that need; per-language/semantic
//! chunking strategies are not implemented, matching the scoped-down
//! ingestion side of this crate.

pub mod fixed;
pub mod traits;

pub use fixed::FixedChunker;
pub use traits::{ChunkMetadata as ChunkerMetadata, Chunker};

/// Default chunk size in characters (~750 tokens at 4 chars/token).
pub const DEFAULT_CHUNK_SIZE: usize = 3_000;

/// Default overlap size in characters (for context continuity).
pub const DEFAULT_OVERLAP: usize = 500;

/// Maximum allowed chunk size (50k chars, ~12.5k tokens).
pub const MAX_CHUNK_SIZE: usize = 50_000;

/// Creates the default chunker.
#[must_use]
pub const fn default_chunker() -> FixedChunker {
    FixedChunker::new()
}

/// Creates a chunker by name.
///
/// # Errors
///
/// Returns [`crate::error::ChunkingError::UnknownStrategy`] if the strategy
/// name is not recognized.
pub fn create_chunker(name: &str) -> crate::error::Result<Box<dyn Chunker>> {
    match name.to_lowercase().as_str() {
        "fixed" => Ok(Box::new(FixedChunker::new())),
        _ => Err(crate::error::ChunkingError::UnknownStrategy {
            name: name.to_string(),
        }
        .into()),
    }
}

/// Lists available chunking strategy names.
#[must_use]
pub fn available_strategies() -> Vec<&'static str> {
    vec!["fixed"]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_chunker() {
        let chunker = default_chunker();
        assert_eq!(chunker.name(), "fixed");
    }

    #[test]
    fn test_create_chunker_fixed() {
        let chunker = create_chunker("fixed").unwrap();
        assert_eq!(chunker.name(), "fixed");
    }

    #[test]
    fn test_create_chunker_unknown() {
        let result = create_chunker("unknown");
        assert!(result.is_err());
    }

    #[test]
    fn test_create_chunker_case_insensitive() {
        let chunker = create_chunker("FIXED").unwrap();
        assert_eq!(chunker.name(), "fixed");
    }

    #[test]
    fn test_available_strategies() {
        let strategies = available_strategies();
        assert_eq!(strategies, vec!["fixed"]);
    }
}
