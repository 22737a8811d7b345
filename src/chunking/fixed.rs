//! Fixed-size chunking strategy.
//!
//! Provides simple character-based chunking with configurable size and
//! overlap, heading/section-path tracking from Markdown-style headers, and a
//! coarse content-type classifier. Respects UTF-8 character boundaries to
//! avoid splitting multi-byte characters.

use crate::chunking::traits::{ChunkMetadata, Chunker};
use crate::chunking::{DEFAULT_CHUNK_SIZE, DEFAULT_OVERLAP, MAX_CHUNK_SIZE};
use crate::core::{Chunk, ContentType};
use crate::error::{ChunkingError, Result};

/// Fixed-size chunker that splits text at character boundaries.
///
/// This is the chunking strategy used across the ingestion pipeline,
/// splitting text into fixed-size segments with optional overlap while
/// tracking the nearest enclosing Markdown heading and classifying each
/// chunk's content type.
///
/// # Examples
///
/// ```
/// use fund_rag::chunking::{Chunker, FixedChunker};
///
/// let chunker = FixedChunker::with_size(400);
/// let text = "Hello, world! ".repeat(40);
/// let chunks = chunker.chunk(1, &text, None).unwrap();
/// for chunk in &chunks {
///     assert!(chunk.character_count <= 400 + 40);
/// }
/// ```
#[derive(Debug, Clone)]
pub struct FixedChunker {
    /// Target chunk size in characters.
    chunk_size: usize,
    /// Overlap between consecutive chunks.
    overlap: usize,
    /// Whether to align chunks to line boundaries.
    line_aware: bool,
}

impl Default for FixedChunker {
    fn default() -> Self {
        Self::new()
    }
}

impl FixedChunker {
    /// Creates a new fixed chunker with default settings.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_OVERLAP,
            line_aware: true,
        }
    }

    /// Creates a fixed chunker with custom chunk size and no overlap.
    #[must_use]
    pub const fn with_size(chunk_size: usize) -> Self {
        Self {
            chunk_size,
            overlap: 0,
            line_aware: true,
        }
    }

    /// Creates a fixed chunker with custom size and overlap.
    #[must_use]
    pub const fn with_size_and_overlap(chunk_size: usize, overlap: usize) -> Self {
        Self {
            chunk_size,
            overlap,
            line_aware: true,
        }
    }

    /// Sets whether to align chunks to line boundaries.
    #[must_use]
    pub const fn line_aware(mut self, enabled: bool) -> Self {
        self.line_aware = enabled;
        self
    }

    /// Finds a valid chunk boundary respecting UTF-8 and optionally lines.
    fn find_boundary(&self, text: &str, target_pos: usize) -> usize {
        let mut pos = target_pos.min(text.len());

        while !text.is_char_boundary(pos) && pos > 0 {
            pos -= 1;
        }

        if self.line_aware && pos > 0 {
            let search_start = pos.saturating_sub(self.chunk_size / 10);
            if let Some(newline_offset) = text[search_start..pos].rfind('\n') {
                let newline_pos = search_start + newline_offset + 1;
                if newline_pos > search_start {
                    return newline_pos;
                }
            }
        }

        pos
    }
}

/// Tracks the nearest-enclosing Markdown heading (`#`/`##`) as chunking
/// walks through a document, producing the `heading`/`subheading` pair and
/// full `section_path` attached to each chunk.
#[derive(Debug, Clone, Default)]
struct HeadingTracker {
    path: Vec<(usize, String)>,
}

impl HeadingTracker {
    fn observe(&mut self, segment: &str) {
        for line in segment.lines() {
            let trimmed = line.trim_start();
            let level = trimmed.chars().take_while(|c| *c == '#').count();
            if level == 0 || level > 6 {
                continue;
            }
            let title = trimmed[level..].trim().to_string();
            if title.is_empty() {
                continue;
            }
            self.path.retain(|(l, _)| *l < level);
            self.path.push((level, title));
        }
    }

    fn heading(&self) -> Option<String> {
        self.path.first().map(|(_, title)| title.clone())
    }

    fn subheading(&self) -> Option<String> {
        if self.path.len() >= 2 {
            self.path.last().map(|(_, title)| title.clone())
        } else {
            None
        }
    }

    fn section_path(&self) -> Vec<String> {
        self.path.iter().map(|(_, title)| title.clone()).collect()
    }
}

/// Classifies a chunk's content into a coarse [`ContentType`] using cheap
/// line-shape heuristics (no NLP): a majority of pipe-delimited lines reads
/// as a table, a majority of bulleted/numbered lines as a list or procedure,
/// fenced/indented blocks as code, and a leading `term: definition` line as
/// a definition. Defaults to [`ContentType::Text`].
fn classify_content(content: &str) -> ContentType {
    let lines: Vec<&str> = content.lines().filter(|l| !l.trim().is_empty()).collect();
    if lines.is_empty() {
        return ContentType::Text;
    }

    let table_lines = lines.iter().filter(|l| l.trim_start().starts_with('|')).count();
    if table_lines * 2 >= lines.len() {
        return ContentType::Table;
    }

    let fenced = content.trim_start().starts_with("```")
        || lines.iter().filter(|l| l.starts_with("    ") || l.starts_with('\t')).count() * 2
            >= lines.len();
    if fenced {
        return ContentType::Code;
    }

    let numbered_lines = lines
        .iter()
        .filter(|l| {
            let t = l.trim_start();
            t.chars()
                .next()
                .is_some_and(|c| c.is_ascii_digit())
                && (t.contains(". ") || t.contains(") "))
        })
        .count();
    if numbered_lines * 2 >= lines.len() && numbered_lines >= 2 {
        return ContentType::Procedure;
    }

    let bulleted_lines = lines
        .iter()
        .filter(|l| {
            let t = l.trim_start();
            t.starts_with("- ") || t.starts_with("* ") || t.starts_with("+ ")
        })
        .count();
    if bulleted_lines * 2 >= lines.len() && bulleted_lines >= 2 {
        return ContentType::List;
    }

    if lines.len() == 1 && lines[0].contains(':') && lines[0].len() < 200 {
        return ContentType::Definition;
    }

    ContentType::Text
}

/// Assigns a heuristic quality score in `[0, 1]`: content with very few
/// words, heavy non-alphanumeric noise, or no sentence-ending punctuation
/// scores lower, as such chunks tend to be boilerplate or extraction noise.
fn quality_score(content: &str, word_count: usize) -> f32 {
    if word_count == 0 {
        return 0.0;
    }

    let alnum_ratio = {
        let total = content.chars().count().max(1);
        let alnum = content.chars().filter(|c| c.is_alphanumeric() || c.is_whitespace()).count();
        alnum as f32 / total as f32
    };

    let has_terminal_punctuation = content.trim_end().ends_with(['.', '!', '?', ':']);
    let length_factor = (word_count as f32 / 20.0).min(1.0);

    let mut score = 0.4 * alnum_ratio + 0.3 * length_factor + 0.3;
    if !has_terminal_punctuation {
        score -= 0.15;
    }
    score.clamp(0.0, 1.0)
}

impl Chunker for FixedChunker {
    fn chunk(
        &self,
        source_row_id: i64,
        text: &str,
        metadata: Option<&ChunkMetadata>,
    ) -> Result<Vec<Chunk>> {
        let (chunk_size, overlap) = metadata.map_or((self.chunk_size, self.overlap), |meta| {
            (meta.chunk_size, meta.overlap)
        });

        if chunk_size == 0 {
            return Err(ChunkingError::InvalidConfig {
                reason: "chunk_size must be > 0".to_string(),
            }
            .into());
        }
        if chunk_size > MAX_CHUNK_SIZE {
            return Err(ChunkingError::ChunkTooLarge {
                size: chunk_size,
                max: MAX_CHUNK_SIZE,
            }
            .into());
        }
        if overlap >= chunk_size {
            return Err(ChunkingError::OverlapTooLarge {
                overlap,
                size: chunk_size,
            }
            .into());
        }

        if text.is_empty() {
            return Ok(vec![]);
        }

        let mut tracker = HeadingTracker::default();
        let mut segments = Vec::new();
        let mut start = 0;

        if text.len() <= chunk_size {
            segments.push((0, text.len()));
        } else {
            while start < text.len() {
                let target_end = (start + chunk_size).min(text.len());
                let end = if target_end >= text.len() {
                    text.len()
                } else {
                    self.find_boundary(text, target_end)
                };
                let end = if end <= start {
                    (start + chunk_size).min(text.len())
                } else {
                    end
                };

                segments.push((start, end));

                if let Some(meta) = metadata {
                    if meta.max_chunks > 0 && segments.len() >= meta.max_chunks {
                        break;
                    }
                }

                if end >= text.len() {
                    break;
                }

                start = if overlap > 0 {
                    end.saturating_sub(overlap)
                } else {
                    end
                };
                if start <= segments.last().map_or(0, |(s, _)| *s) {
                    start = end;
                }
            }
        }

        let mut chunks = Vec::with_capacity(segments.len());
        for (index, (start, end)) in segments.into_iter().enumerate() {
            let content = text[start..end].to_string();
            tracker.observe(&content);
            let content_type = classify_content(&content);
            let word_count = content.split_whitespace().count();
            let quality = quality_score(&content, word_count);

            let chunk = Chunk::new(source_row_id, index, content)
                .with_content_type(content_type)
                .with_headings(tracker.heading(), tracker.subheading(), tracker.section_path())
                .with_quality_score(quality);

            chunks.push(chunk);
        }

        Ok(chunks)
    }

    fn name(&self) -> &'static str {
        "fixed"
    }

    fn description(&self) -> &'static str {
        "Fixed-size chunking with heading tracking and content-type classification"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_chunker_empty_text() {
        let chunker = FixedChunker::with_size(100);
        let chunks = chunker.chunk(1, "", None).unwrap();
        assert!(chunks.is_empty());
    }

    #[test]
    fn test_fixed_chunker_small_text() {
        let chunker = FixedChunker::with_size(100);
        let text = "Hello, world!";
        let chunks = chunker.chunk(1, text, None).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, text);
        assert_eq!(chunks[0].source_id, 1);
    }

    #[test]
    fn test_fixed_chunker_multiple_chunks() {
        let chunker = FixedChunker::with_size(10).line_aware(false);
        let text = "0123456789ABCDEFGHIJ";
        let chunks = chunker.chunk(1, text, None).unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].chunk_index, 0);
        assert_eq!(chunks[1].chunk_index, 1);
    }

    #[test]
    fn test_fixed_chunker_with_overlap() {
        let chunker = FixedChunker::with_size_and_overlap(10, 3).line_aware(false);
        let text = "0123456789ABCDEFGHIJ";
        let chunks = chunker.chunk(1, text, None).unwrap();
        assert!(chunks.len() >= 2);
    }

    #[test]
    fn test_fixed_chunker_unicode() {
        let chunker = FixedChunker::with_size(5).line_aware(false);
        let text = "Hello世界Test";
        let chunks = chunker.chunk(1, text, None).unwrap();
        for chunk in &chunks {
            assert!(chunk.content.is_char_boundary(0));
        }
    }

    #[test]
    fn test_fixed_chunker_invalid_config() {
        let chunker = FixedChunker::with_size(0);
        let result = chunker.chunk(1, "test", None);
        assert!(result.is_err());
    }

    #[test]
    fn test_fixed_chunker_overlap_too_large() {
        let chunker = FixedChunker::with_size_and_overlap(10, 10);
        let result = chunker.chunk(1, "test content here", None);
        assert!(result.is_err());
    }

    #[test]
    fn test_fixed_chunker_max_chunks() {
        let chunker = FixedChunker::with_size(5).line_aware(false);
        let text = "0123456789ABCDEFGHIJ";
        let meta = ChunkMetadata::with_size(5).max_chunks(2);
        let chunks = chunker.chunk(1, text, Some(&meta)).unwrap();
        assert_eq!(chunks.len(), 2);
    }

    #[test]
    fn test_heading_tracking() {
        let chunker = FixedChunker::with_size(10_000);
        let text = "# Fund Creation\n\nTo create a fund, submit form FC-1.\n\n## Required Documents\n\nYou need a prospectus.";
        let chunks = chunker.chunk(1, text, None).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].heading.as_deref(), Some("Fund Creation"));
        assert_eq!(chunks[0].subheading.as_deref(), Some("Required Documents"));
    }

    #[test]
    fn test_classify_content_table() {
        let table = "| A | B |\n| --- | --- |\n| 1 | 2 |";
        assert_eq!(classify_content(table), ContentType::Table);
    }

    #[test]
    fn test_classify_content_procedure() {
        let steps = "1. Submit form FC-1.\n2. Attach prospectus.\n3. Pay filing fee.";
        assert_eq!(classify_content(steps), ContentType::Procedure);
    }

    #[test]
    fn test_classify_content_list() {
        let list = "- apples\n- oranges\n- pears";
        assert_eq!(classify_content(list), ContentType::List);
    }

    #[test]
    fn test_classify_content_default_text() {
        let prose = "This is ordinary prose describing the fund creation process in detail.";
        assert_eq!(classify_content(prose), ContentType::Text);
    }

    #[test]
    fn test_quality_score_empty_is_zero() {
        assert_eq!(quality_score("", 0), 0.0);
    }

    #[test]
    fn test_quality_score_well_formed_is_high() {
        let content = "This is a well formed sentence with enough words to score highly.";
        let score = quality_score(content, content.split_whitespace().count());
        assert!(score > 0.5);
    }
}
