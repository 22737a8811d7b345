//! Citation Extractor/Validator: parses citation markers out of a
//! generated response and checks each one against the chunk set that was
//! actually used to produce that response.
//!
//! Two marker grammars are recognized: `(source[, p. page])` and
//! `[chunk n]` back-references. Validation matches `source` against each
//! retrieved chunk's [`Chunk::display_title`], case-insensitively and with
//! whitespace collapsed, since the generated text will rarely reproduce a
//! title's exact capitalization or spacing.

use regex::Regex;
use std::sync::LazyLock;

use crate::core::{Citation, CitationReport, InvalidReason, ScoredChunk};

static SOURCE_PAGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\(([^,()]+?)(?:,\s*p\.?\s*(\d+))?\)").expect("valid citation regex")
});

static CHUNK_REF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[chunk\s+(\d+)\]").expect("valid chunk-ref regex")
});

fn normalize(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

/// Extracts and validates every citation marker in `response_text` against
/// `retrieved`, the ranked chunk list that was actually used to assemble
/// the prompt for this response.
#[must_use]
pub fn extract_and_validate(response_text: &str, retrieved: &[ScoredChunk]) -> CitationReport {
    let mut report = CitationReport::default();

    for capture in SOURCE_PAGE_RE.captures_iter(response_text) {
        report.total_found += 1;
        let source = capture.get(1).map_or("", |m| m.as_str()).trim().to_string();
        let page = capture.get(2).and_then(|m| m.as_str().parse::<u32>().ok());

        let normalized_source = normalize(&source);
        let matched = retrieved
            .iter()
            .find(|scored| normalize(scored.chunk.display_title()) == normalized_source);

        match matched {
            None => {
                report.invalid.push(Citation::invalid(source, page, InvalidReason::UnknownSource));
            }
            Some(scored) => match (page, scored.chunk.page_number) {
                (Some(cited), Some(actual)) if cited != actual => {
                    report.invalid.push(Citation::invalid(source, page, InvalidReason::WrongPage));
                }
                _ => {
                    let id = scored.chunk.id.unwrap_or_default();
                    report.valid.push(Citation::valid(source, page, id));
                }
            },
        }
    }

    for capture in CHUNK_REF_RE.captures_iter(response_text) {
        report.total_found += 1;
        let Some(n) = capture.get(1).and_then(|m| m.as_str().parse::<usize>().ok()) else {
            continue;
        };

        match retrieved.iter().find(|scored| scored.rank == n) {
            Some(scored) if n >= 1 && n <= retrieved.len() => {
                let id = scored.chunk.id.unwrap_or_default();
                report
                    .valid
                    .push(Citation::valid(scored.chunk.display_title().to_string(), scored.chunk.page_number, id));
            }
            _ => {
                report.invalid.push(Citation::invalid(format!("chunk {n}"), None, InvalidReason::OutOfRange));
            }
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Chunk, ComponentScores, StrategyTag};

    fn scored(rank: usize, title: &str, page: Option<u32>, id: i64) -> ScoredChunk {
        let mut chunk = Chunk::new(1, rank - 1, "content".to_string())
            .with_headings(None, None, vec![title.to_string()]);
        chunk.id = Some(id);
        if let Some(p) = page {
            chunk = chunk.with_page_number(p);
        }
        ScoredChunk {
            chunk,
            score: 0.9,
            rank,
            strategy: StrategyTag::Hybrid,
            component_scores: ComponentScores::default(),
        }
    }

    #[test]
    fn test_valid_source_and_page() {
        let retrieved = vec![scored(1, "Fund Creation Guide", Some(3), 10)];
        let report = extract_and_validate("Submit form FC-1 (Fund Creation Guide, p. 3).", &retrieved);
        assert_eq!(report.total_found, 1);
        assert_eq!(report.valid.len(), 1);
        assert_eq!(report.valid[0].matched_chunk_id, Some(10));
    }

    #[test]
    fn test_unknown_source_invalid() {
        let retrieved = vec![scored(1, "Fund Creation Guide", Some(3), 10)];
        let report = extract_and_validate("Per (Unknown Guide, p.7) this is the rule.", &retrieved);
        assert_eq!(report.total_found, 1);
        assert_eq!(report.invalid.len(), 1);
        assert_eq!(report.invalid[0].invalid_reason, Some(InvalidReason::UnknownSource));
        assert_eq!(report.citation_coverage(), 0.0);
    }

    #[test]
    fn test_wrong_page_invalid() {
        let retrieved = vec![scored(1, "Fund Creation Guide", Some(3), 10)];
        let report = extract_and_validate("(Fund Creation Guide, p. 9)", &retrieved);
        assert_eq!(report.invalid.len(), 1);
        assert_eq!(report.invalid[0].invalid_reason, Some(InvalidReason::WrongPage));
    }

    #[test]
    fn test_case_and_whitespace_insensitive_match() {
        let retrieved = vec![scored(1, "Fund Creation Guide", None, 10)];
        let report = extract_and_validate("(fund   CREATION guide)", &retrieved);
        assert_eq!(report.valid.len(), 1);
    }

    #[test]
    fn test_chunk_reference_in_range() {
        let retrieved = vec![scored(1, "Guide", None, 10), scored(2, "Other", None, 11)];
        let report = extract_and_validate("As shown in [chunk 2].", &retrieved);
        assert_eq!(report.valid.len(), 1);
        assert_eq!(report.valid[0].matched_chunk_id, Some(11));
    }

    #[test]
    fn test_chunk_reference_out_of_range() {
        let retrieved = vec![scored(1, "Guide", None, 10)];
        let report = extract_and_validate("See [chunk 5].", &retrieved);
        assert_eq!(report.invalid.len(), 1);
        assert_eq!(report.invalid[0].invalid_reason, Some(InvalidReason::OutOfRange));
    }

    #[test]
    fn test_no_markers_found() {
        let report = extract_and_validate("No citations here.", &[]);
        assert_eq!(report.total_found, 0);
        assert!(report.valid.is_empty());
        assert!(report.invalid.is_empty());
    }
}
