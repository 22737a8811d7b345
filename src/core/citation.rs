//! Citation record types shared by the extractor and validator.

use serde::{Deserialize, Serialize};

/// Why a citation failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidReason {
    /// No retrieved chunk's title matches `source`.
    UnknownSource,
    /// The source matched but the cited page does not.
    WrongPage,
    /// A `[chunk n]` back-reference outside `1..=retrieved.len()`.
    OutOfRange,
}

impl std::fmt::Display for InvalidReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::UnknownSource => "unknown_source",
            Self::WrongPage => "wrong_page",
            Self::OutOfRange => "out_of_range",
        };
        f.write_str(s)
    }
}

/// A parsed citation marker, either `(source, p.N)` or a `[chunk n]`
/// back-reference, after validation against the retrieved chunk set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    /// Source title as written in the marker (or the resolved chunk's title
    /// for `[chunk n]` references).
    pub source: String,
    /// Cited page number, if present in the marker.
    pub page: Option<u32>,
    /// Whether this citation resolved against the retrieved set.
    pub valid: bool,
    /// Chunk id this citation resolved to, if valid.
    pub matched_chunk_id: Option<i64>,
    /// Reason validation failed, if `valid` is `false`.
    pub invalid_reason: Option<InvalidReason>,
}

impl Citation {
    /// Constructs a valid citation resolved to `matched_chunk_id`.
    #[must_use]
    pub const fn valid(source: String, page: Option<u32>, matched_chunk_id: i64) -> Self {
        Self {
            source,
            page,
            valid: true,
            matched_chunk_id: Some(matched_chunk_id),
            invalid_reason: None,
        }
    }

    /// Constructs an invalid citation with the given reason.
    #[must_use]
    pub const fn invalid(source: String, page: Option<u32>, reason: InvalidReason) -> Self {
        Self {
            source,
            page,
            valid: false,
            matched_chunk_id: None,
            invalid_reason: Some(reason),
        }
    }
}

/// Aggregate result of extracting and validating all citation markers in a
/// generated response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CitationReport {
    /// Total number of citation markers found, valid or not.
    pub total_found: usize,
    /// Markers that resolved against the retrieved set.
    pub valid: Vec<Citation>,
    /// Markers that did not resolve.
    pub invalid: Vec<Citation>,
}

impl CitationReport {
    /// `valid.len() / max(1, total_found)`.
    #[must_use]
    pub fn citation_coverage(&self) -> f32 {
        #[allow(clippy::cast_precision_loss)]
        let coverage = self.valid.len() as f32 / (self.total_found.max(1) as f32);
        coverage
    }

    /// All citations, valid and invalid, in discovery order is not
    /// preserved here; callers needing order should consult the extractor's
    /// raw output. This accessor is for validation-agnostic consumers (e.g.
    /// display formatting) that just need every parsed marker.
    #[must_use]
    pub fn all(&self) -> Vec<&Citation> {
        self.valid.iter().chain(self.invalid.iter()).collect()
    }
}
