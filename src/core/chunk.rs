//! Chunk representation.
//!
//! A [`Chunk`] is an indexed passage produced by the ingestion pipeline from a
//! [`Source`](super::Source). Chunks are immutable once created; updates to a
//! source delete and re-create its chunks rather than mutating them in place.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Default minimum token count for a retrievable chunk.
pub const DEFAULT_MIN_TOKENS: usize = 100;
/// Default maximum token count for a retrievable chunk.
pub const DEFAULT_MAX_TOKENS: usize = 600;
/// Default minimum quality score for a retrievable chunk.
pub const DEFAULT_MIN_QUALITY: f32 = 0.3;

/// Coarse classification of chunk content, used by the retriever's
/// content-type filter and by prompt assembly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    /// Ordinary prose.
    Text,
    /// Tabular data, rendered as Markdown-ish rows.
    Table,
    /// A bulleted or numbered list.
    List,
    /// A code block or configuration snippet.
    Code,
    /// A glossary-style term definition.
    Definition,
    /// A step-by-step procedure.
    Procedure,
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Text => "text",
            Self::Table => "table",
            Self::List => "list",
            Self::Code => "code",
            Self::Definition => "definition",
            Self::Procedure => "procedure",
        };
        f.write_str(s)
    }
}

/// An indexed passage belonging to a [`Source`](super::Source).
///
/// # Examples
///
/// ```
/// use fund_rag::core::{Chunk, ContentType};
///
/// let chunk = Chunk::new(1, 0, "To create a fund, submit form FC-1.".to_string());
/// assert_eq!(chunk.chunk_index, 0);
/// assert_eq!(chunk.content_type, ContentType::Text);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Unique identifier (assigned by storage layer).
    pub id: Option<i64>,

    /// ID of the source this chunk belongs to.
    pub source_id: i64,

    /// Dense, 0-based index within the source.
    pub chunk_index: usize,

    /// Nearest enclosing heading, if any.
    pub heading: Option<String>,

    /// Nearest enclosing subheading, if any.
    pub subheading: Option<String>,

    /// Page number in the source document, if known.
    pub page_number: Option<u32>,

    /// Ordered sequence of heading titles from document root to this chunk.
    pub section_path: Vec<String>,

    /// Chunk content (UTF-8 text).
    pub content: String,

    /// Coarse content classification.
    pub content_type: ContentType,

    /// Estimated token count (`ceil(character_count / 4)` unless a precise
    /// tokenizer is configured upstream).
    pub token_count: usize,

    /// Character count of `content`.
    pub character_count: usize,

    /// Word count of `content`.
    pub word_count: usize,

    /// Quality score in `[0, 1]` assigned by the chunking pipeline.
    pub quality_score: f32,

    /// Embedding vector of dimension `D`, if this chunk has been embedded.
    pub embedding: Option<Vec<f32>>,

    /// Tokenized form of `content` used for full-text search.
    pub lexical_field: String,

    /// Free-form metadata.
    pub metadata: HashMap<String, String>,
}

impl Chunk {
    /// Creates a new chunk with derived character/word/token counts and a
    /// lexical field, defaulting `content_type` to [`ContentType::Text`].
    #[must_use]
    pub fn new(source_id: i64, chunk_index: usize, content: String) -> Self {
        let character_count = content.chars().count();
        let word_count = content.split_whitespace().count();
        let token_count = character_count.div_ceil(4);
        let lexical_field = content.to_lowercase();

        Self {
            id: None,
            source_id,
            chunk_index,
            heading: None,
            subheading: None,
            page_number: None,
            section_path: Vec::new(),
            content,
            content_type: ContentType::Text,
            token_count,
            character_count,
            word_count,
            quality_score: 1.0,
            embedding: None,
            lexical_field,
            metadata: HashMap::new(),
        }
    }

    /// Sets the content type, returning `self` for chaining.
    #[must_use]
    pub const fn with_content_type(mut self, content_type: ContentType) -> Self {
        self.content_type = content_type;
        self
    }

    /// Sets heading/subheading/section-path, returning `self` for chaining.
    #[must_use]
    pub fn with_headings(
        mut self,
        heading: Option<String>,
        subheading: Option<String>,
        section_path: Vec<String>,
    ) -> Self {
        self.heading = heading;
        self.subheading = subheading;
        self.section_path = section_path;
        self
    }

    /// Sets the page number, returning `self` for chaining.
    #[must_use]
    pub const fn with_page_number(mut self, page_number: u32) -> Self {
        self.page_number = Some(page_number);
        self
    }

    /// Sets the quality score, clamped to `[0, 1]`, returning `self` for chaining.
    #[must_use]
    pub fn with_quality_score(mut self, quality_score: f32) -> Self {
        self.quality_score = quality_score.clamp(0.0, 1.0);
        self
    }

    /// Attaches an embedding vector, returning `self` for chaining.
    #[must_use]
    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    /// Whether this chunk satisfies the token-count and quality-score
    /// invariants required for it to be retrievable.
    #[must_use]
    pub fn is_retrievable(&self, min_tokens: usize, max_tokens: usize, min_quality: f32) -> bool {
        self.token_count >= min_tokens
            && self.token_count <= max_tokens
            && self.quality_score >= min_quality
    }

    /// Whether this chunk's embedding (if present) has exactly `dimensions`
    /// components.
    #[must_use]
    pub fn embedding_matches_dimension(&self, dimensions: usize) -> bool {
        self.embedding
            .as_ref()
            .is_none_or(|v| v.len() == dimensions)
    }

    /// The display title used in citations: the deepest section-path entry,
    /// falling back to `heading`, then a generic placeholder.
    #[must_use]
    pub fn display_title(&self) -> &str {
        self.section_path
            .last()
            .map_or_else(|| self.heading.as_deref().unwrap_or("untitled"), String::as_str)
    }
}

/// Returns the current Unix timestamp in seconds.
#[allow(clippy::cast_possible_wrap, dead_code)]
fn current_timestamp() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
