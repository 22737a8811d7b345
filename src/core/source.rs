//! Source document representation.
//!
//! A [`Source`] is a logical document admitted into the corpus. Sources move
//! through an ingestion pipeline (`pending` -> `processing` -> `completed` or
//! `failed`); only `completed` sources contribute chunks to retrieval.

use serde::{Deserialize, Serialize};

/// Processing status of a [`Source`] as it moves through ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    /// Queued for ingestion, not yet started.
    Pending,
    /// Chunking/embedding is in progress.
    Processing,
    /// Fully ingested; eligible for retrieval.
    Completed,
    /// Ingestion failed; excluded from retrieval.
    Failed,
}

impl ProcessingStatus {
    /// Whether a source in this status contributes chunks to retrieval.
    #[must_use]
    pub const fn is_retrievable(self) -> bool {
        matches!(self, Self::Completed)
    }
}

impl std::fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// A logical document in the corpus.
///
/// # Examples
///
/// ```
/// use fund_rag::core::Source;
///
/// let source = Source::new("fund-creation-guide.pdf".to_string(), b"hello");
/// assert_eq!(source.filename, "fund-creation-guide.pdf");
/// assert!(!source.content_hash.is_empty());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    /// Unique identifier (assigned by storage layer).
    pub id: Option<i64>,
    /// Opaque source identifier stable across versions.
    pub source_id: String,
    /// Original filename.
    pub filename: String,
    /// Human-readable title.
    pub title: String,
    /// Author, if known.
    pub author: Option<String>,
    /// Document version.
    pub version: u32,
    /// SHA-256 hash of the source bytes, hex-encoded.
    pub content_hash: String,
    /// Document type (e.g. "pdf", "docx", "markdown").
    pub document_type: String,
    /// Ingestion status.
    pub status: ProcessingStatus,
    /// Unix timestamp when the source was created.
    pub created_at: i64,
    /// Unix timestamp when the source was last updated.
    pub updated_at: i64,
}

impl Source {
    /// Creates a new pending source, deriving `source_id` and `content_hash`
    /// from the filename and byte content respectively.
    #[must_use]
    pub fn new(filename: String, content: &[u8]) -> Self {
        let now = current_timestamp();
        let content_hash = sha256_hex(content);
        let title = filename
            .rsplit_once('.')
            .map_or_else(|| filename.clone(), |(stem, _)| stem.to_string());
        Self {
            id: None,
            source_id: content_hash.clone(),
            filename,
            title,
            author: None,
            version: 1,
            content_hash,
            document_type: String::from("unknown"),
            status: ProcessingStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    /// Sets the document type, returning `self` for chaining.
    #[must_use]
    pub fn with_document_type(mut self, document_type: impl Into<String>) -> Self {
        self.document_type = document_type.into();
        self
    }

    /// Sets the title, returning `self` for chaining.
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Marks the source as `processing`, touching `updated_at`.
    pub fn mark_processing(&mut self) {
        self.status = ProcessingStatus::Processing;
        self.touch();
    }

    /// Marks the source as `completed`, touching `updated_at`.
    pub fn mark_completed(&mut self) {
        self.status = ProcessingStatus::Completed;
        self.touch();
    }

    /// Marks the source as `failed`, touching `updated_at`.
    pub fn mark_failed(&mut self) {
        self.status = ProcessingStatus::Failed;
        self.touch();
    }

    fn touch(&mut self) {
        self.updated_at = current_timestamp();
    }
}

/// Computes the hex-encoded SHA-256 digest of `bytes`.
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    digest.iter().fold(String::with_capacity(64), |mut acc, b| {
        use std::fmt::Write;
        let _ = write!(acc, "{b:02x}");
        acc
    })
}

#[allow(clippy::cast_possible_wrap)]
fn current_timestamp() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_source_defaults() {
        let source = Source::new("guide.pdf".to_string(), b"content");
        assert_eq!(source.filename, "guide.pdf");
        assert_eq!(source.title, "guide");
        assert_eq!(source.status, ProcessingStatus::Pending);
        assert_eq!(source.version, 1);
        assert_eq!(source.content_hash.len(), 64);
    }

    #[test]
    fn test_content_hash_deterministic() {
        let a = Source::new("a.pdf".to_string(), b"same bytes");
        let b = Source::new("b.pdf".to_string(), b"same bytes");
        assert_eq!(a.content_hash, b.content_hash);
    }

    #[test]
    fn test_content_hash_differs_on_content() {
        let a = Source::new("a.pdf".to_string(), b"one");
        let b = Source::new("a.pdf".to_string(), b"two");
        assert_ne!(a.content_hash, b.content_hash);
    }

    #[test]
    fn test_status_transitions() {
        let mut source = Source::new("a.pdf".to_string(), b"x");
        assert!(!source.status.is_retrievable());

        source.mark_processing();
        assert_eq!(source.status, ProcessingStatus::Processing);
        assert!(!source.status.is_retrievable());

        source.mark_completed();
        assert_eq!(source.status, ProcessingStatus::Completed);
        assert!(source.status.is_retrievable());
    }

    #[test]
    fn test_mark_failed() {
        let mut source = Source::new("a.pdf".to_string(), b"x");
        source.mark_failed();
        assert_eq!(source.status, ProcessingStatus::Failed);
        assert!(!source.status.is_retrievable());
    }

    #[test]
    fn test_builder_methods() {
        let source = Source::new("a.pdf".to_string(), b"x")
            .with_document_type("pdf")
            .with_title("Fund Creation Guide");
        assert_eq!(source.document_type, "pdf");
        assert_eq!(source.title, "Fund Creation Guide");
    }

    #[test]
    fn test_display_status() {
        assert_eq!(ProcessingStatus::Pending.to_string(), "pending");
        assert_eq!(ProcessingStatus::Completed.to_string(), "completed");
    }
}
