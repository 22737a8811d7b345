//! Query Analyzer: turns a raw user query into a structured
//! [`QueryAnalysis`] used by the Retriever, Prompt Assembler and Confidence
//! Manager.
//!
//! The analyzer is pure: the same `(query, word lists)` pair always
//! produces the same [`QueryAnalysis`], and it never makes an external
//! call (P7). The domain gazetteer and stop-word list are loaded at
//! startup rather than hard-coded, following the teacher's
//! `agent::prompt::PromptSet::load` resolution order: an explicit
//! directory, then an environment variable, then the compiled-in default.

use std::path::{Path, PathBuf};

use crate::core::query_analysis::{Complexity, Intent, QueryAnalysis};
use crate::error::{IoError, Result};

/// Compiled-in default gazetteer, used when no override directory is given
/// or the override directory lacks a `gazetteer.txt`.
pub const DEFAULT_GAZETTEER: &str = include_str!("../../data/gazetteer.txt");

/// Compiled-in default stop-word list.
pub const DEFAULT_STOPWORDS: &str = include_str!("../../data/stopwords.txt");

/// Environment variable naming a directory that may override the compiled
/// defaults for `gazetteer.txt` and/or `stopwords.txt`.
pub const DATA_DIR_ENV: &str = "FUND_RAG_DATA_DIR";

/// Closed set of interrogative words that mark a query as question-form.
const QUESTION_WORDS: &[&str] = &[
    "who", "what", "when", "where", "why", "how", "which", "can", "does", "is", "are",
];

/// The gazetteer and stop-word list the analyzer runs against, parsed once
/// at startup.
#[derive(Debug, Clone, Default)]
pub struct WordLists {
    /// Gazetteer entries, tokenized and sorted longest-first (by token
    /// count) so longest-match extraction is a simple linear scan.
    gazetteer: Vec<Vec<String>>,
    /// Stop words, lowercased.
    stopwords: std::collections::HashSet<String>,
}

impl WordLists {
    /// Loads the gazetteer and stop-word list, preferring `explicit_dir`,
    /// falling back to the `FUND_RAG_DATA_DIR` environment variable, then
    /// the compiled-in defaults. Per file: if neither override location
    /// has the file, the compiled default is used.
    ///
    /// # Errors
    ///
    /// Returns an error if an override file exists but cannot be read.
    pub fn load(explicit_dir: Option<&Path>) -> Result<Self> {
        let gazetteer_text = Self::resolve_file(explicit_dir, "gazetteer.txt", DEFAULT_GAZETTEER)?;
        let stopwords_text = Self::resolve_file(explicit_dir, "stopwords.txt", DEFAULT_STOPWORDS)?;
        Ok(Self::parse(&gazetteer_text, &stopwords_text))
    }

    /// Parses the compiled-in defaults directly, skipping any filesystem
    /// lookup. Used by tests and as the zero-configuration path.
    #[must_use]
    pub fn defaults() -> Self {
        Self::parse(DEFAULT_GAZETTEER, DEFAULT_STOPWORDS)
    }

    fn resolve_file(explicit_dir: Option<&Path>, filename: &str, default: &str) -> Result<String> {
        if let Some(dir) = explicit_dir {
            let path = dir.join(filename);
            if path.exists() {
                return std::fs::read_to_string(&path).map_err(|e| {
                    IoError::ReadFailed {
                        path: path.display().to_string(),
                        reason: e.to_string(),
                    }
                    .into()
                });
            }
        }

        if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
            let path = PathBuf::from(dir).join(filename);
            if path.exists() {
                return std::fs::read_to_string(&path).map_err(|e| {
                    IoError::ReadFailed {
                        path: path.display().to_string(),
                        reason: e.to_string(),
                    }
                    .into()
                });
            }
        }

        Ok(default.to_string())
    }

    fn parse(gazetteer_text: &str, stopwords_text: &str) -> Self {
        let mut gazetteer: Vec<Vec<String>> = gazetteer_text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(|line| line.split_whitespace().map(str::to_lowercase).collect::<Vec<_>>())
            .filter(|tokens| !tokens.is_empty())
            .collect();
        // Longest entries first so extraction prefers the most specific match.
        gazetteer.sort_by(|a, b| b.len().cmp(&a.len()));

        let stopwords = stopwords_text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(str::to_lowercase)
            .collect();

        Self { gazetteer, stopwords }
    }
}

/// Splits `text` on whitespace and punctuation, lowercasing each token and
/// dropping empty fragments.
fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

/// Extracts gazetteer entities from `tokens` by greedy longest-match,
/// scanning left to right.
fn extract_entities(tokens: &[String], lists: &WordLists) -> Vec<String> {
    let mut entities = Vec::new();
    let mut i = 0;
    while i < tokens.len() {
        let matched = lists
            .gazetteer
            .iter()
            .find(|entry| tokens[i..].starts_with(entry.as_slice()));

        if let Some(entry) = matched {
            entities.push(entry.join(" "));
            i += entry.len();
        } else {
            i += 1;
        }
    }
    entities
}

/// Extracts domain keywords: tokens that survive stop-word removal and are
/// either present in the gazetteer's vocabulary or appear at least twice in
/// `tokens`.
fn extract_keywords(tokens: &[String], lists: &WordLists) -> Vec<String> {
    let mut counts = std::collections::HashMap::new();
    for token in tokens {
        *counts.entry(token.as_str()).or_insert(0_usize) += 1;
    }

    let gazetteer_vocab: std::collections::HashSet<&str> = lists
        .gazetteer
        .iter()
        .flat_map(|entry| entry.iter().map(String::as_str))
        .collect();

    let mut seen = std::collections::HashSet::new();
    let mut keywords = Vec::new();
    for token in tokens {
        if lists.stopwords.contains(token) {
            continue;
        }
        let qualifies = gazetteer_vocab.contains(token.as_str()) || counts[token.as_str()] >= 2;
        if qualifies && seen.insert(token.clone()) {
            keywords.push(token.clone());
        }
    }
    keywords
}

/// First matching rule from the fixed priority order: definition,
/// procedure, comparison, troubleshooting, general.
fn classify_intent(normalized_query: &str) -> Intent {
    const DEFINITION: &[&str] = &["what is", "what are", "define", "definition of", "meaning of"];
    const PROCEDURE: &[&str] = &["how do i", "how to", "how can i", "steps to", "process for"];
    const COMPARISON: &[&str] = &["difference between", "compare", " vs ", " versus "];
    const TROUBLESHOOTING: &[&str] = &[
        "why does",
        "why is",
        "why are",
        "error",
        "fail",
        "not working",
        "troubleshoot",
        "problem with",
        "issue with",
    ];

    let padded = format!(" {normalized_query} ");

    if DEFINITION.iter().any(|p| padded.contains(p)) {
        Intent::Definition
    } else if PROCEDURE.iter().any(|p| padded.contains(p)) {
        Intent::Procedure
    } else if COMPARISON.iter().any(|p| padded.contains(p)) {
        Intent::Comparison
    } else if TROUBLESHOOTING.iter().any(|p| padded.contains(p)) {
        Intent::Troubleshooting
    } else {
        Intent::General
    }
}

/// Analyzes `query` into a structured [`QueryAnalysis`], per §4.3: pure,
/// deterministic, no external calls.
#[must_use]
pub fn analyze(query: &str, lists: &WordLists) -> QueryAnalysis {
    let normalized_query = query.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
    let tokens = tokenize(query);
    let word_count = normalized_query.split_whitespace().count();

    let is_question = tokens
        .first()
        .is_some_and(|first| QUESTION_WORDS.contains(&first.as_str()));

    let entities = extract_entities(&tokens, lists);
    let keywords = extract_keywords(&tokens, lists);
    let intent = classify_intent(&normalized_query);
    let complexity = Complexity::from_word_count(word_count);

    QueryAnalysis {
        original_query: query.to_string(),
        normalized_query,
        tokens,
        entities,
        keywords,
        is_question,
        intent,
        complexity,
        word_count,
    }
}
