//! Structured result of analyzing a user query.
//!
//! [`QueryAnalysis`] is a transient, per-request record produced by the
//! query analyzer (see `crate::query`). It carries no behavior of its own;
//! all extraction logic lives in the analyzer so this type stays a pure
//! data record, matching the "Query Analysis" entry of the data model.

use serde::{Deserialize, Serialize};

/// Coarse complexity bucket derived from word count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    /// Word count <= 8.
    Simple,
    /// Word count <= 16.
    Moderate,
    /// Word count > 16.
    Complex,
}

impl Complexity {
    /// Derives complexity from a word count using the spec's fixed bucket
    /// boundaries (<=8 simple, <=16 moderate, else complex).
    #[must_use]
    pub const fn from_word_count(word_count: usize) -> Self {
        if word_count <= 8 {
            Self::Simple
        } else if word_count <= 16 {
            Self::Moderate
        } else {
            Self::Complex
        }
    }

    /// The penalty factor this complexity contributes to the confidence
    /// manager's context sub-score.
    #[must_use]
    pub const fn penalty(self) -> f32 {
        match self {
            Self::Simple => 1.0,
            Self::Moderate => 0.8,
            Self::Complex => 0.5,
        }
    }
}

/// Query intent, determined by the first matching rule in a fixed priority
/// order: definition, procedure, comparison, troubleshooting, general.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    /// "what is X", "define X".
    Definition,
    /// "how do I X", "steps to X".
    Procedure,
    /// "X vs Y", "difference between".
    Comparison,
    /// "why does X fail", "error when X".
    Troubleshooting,
    /// No specific intent pattern matched.
    General,
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Definition => "definition",
            Self::Procedure => "procedure",
            Self::Comparison => "comparison",
            Self::Troubleshooting => "troubleshooting",
            Self::General => "general",
        };
        f.write_str(s)
    }
}

/// Structured view of a user query, produced by the query analyzer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryAnalysis {
    /// The query exactly as submitted.
    pub original_query: String,
    /// Lowercased, whitespace-normalized query.
    pub normalized_query: String,
    /// Tokens after splitting on whitespace/punctuation.
    pub tokens: Vec<String>,
    /// Gazetteer entities matched by longest-match.
    pub entities: Vec<String>,
    /// Domain keywords retained after stop-word removal.
    pub keywords: Vec<String>,
    /// Whether the query opens with an interrogative word.
    pub is_question: bool,
    /// Detected intent class.
    pub intent: Intent,
    /// Complexity bucket.
    pub complexity: Complexity,
    /// Word count of `normalized_query`.
    pub word_count: usize,
}

impl QueryAnalysis {
    /// A combined clarity signal used by the confidence manager's context
    /// sub-score: question-form (+0.3), intent present (+0.2), entity
    /// present (+0.3), word-count in `[4, 20]` (+0.2).
    #[must_use]
    pub fn query_clarity(&self) -> f32 {
        let mut score = 0.0;
        if self.is_question {
            score += 0.3;
        }
        if !matches!(self.intent, Intent::General) {
            score += 0.2;
        }
        if !self.entities.is_empty() {
            score += 0.3;
        }
        if (4..=20).contains(&self.word_count) {
            score += 0.2;
        }
        score
    }

    /// `min((matched_entities + matched_keywords) / 5, 1)`.
    #[must_use]
    pub fn domain_relevance(&self) -> f32 {
        let matched = (self.entities.len() + self.keywords.len()) as f32;
        (matched / 5.0).min(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_complexity_buckets() {
        assert_eq!(Complexity::from_word_count(3), Complexity::Simple);
        assert_eq!(Complexity::from_word_count(8), Complexity::Simple);
        assert_eq!(Complexity::from_word_count(9), Complexity::Moderate);
        assert_eq!(Complexity::from_word_count(16), Complexity::Moderate);
        assert_eq!(Complexity::from_word_count(17), Complexity::Complex);
    }

    #[test]
    fn test_complexity_penalty() {
        assert_eq!(Complexity::Simple.penalty(), 1.0);
        assert_eq!(Complexity::Moderate.penalty(), 0.8);
        assert_eq!(Complexity::Complex.penalty(), 0.5);
    }

    fn sample_analysis(is_question: bool, intent: Intent, entities: usize, word_count: usize) -> QueryAnalysis {
        QueryAnalysis {
            original_query: "How do I create a fund?".to_string(),
            normalized_query: "how do i create a fund".to_string(),
            tokens: vec!["how".into(), "do".into(), "i".into(), "create".into(), "a".into(), "fund".into()],
            entities: (0..entities).map(|i| format!("entity{i}")).collect(),
            keywords: vec!["fund".to_string()],
            is_question,
            intent,
            complexity: Complexity::from_word_count(word_count),
            word_count,
        }
    }

    #[test]
    fn test_query_clarity_full() {
        let analysis = sample_analysis(true, Intent::Procedure, 1, 6);
        assert!((analysis.query_clarity() - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_query_clarity_minimal() {
        let analysis = sample_analysis(false, Intent::General, 0, 30);
        assert_eq!(analysis.query_clarity(), 0.0);
    }

    #[test]
    fn test_domain_relevance_caps_at_one() {
        let analysis = sample_analysis(true, Intent::Procedure, 10, 6);
        assert_eq!(analysis.domain_relevance(), 1.0);
    }

    #[test]
    fn test_intent_display() {
        assert_eq!(Intent::Definition.to_string(), "definition");
        assert_eq!(Intent::General.to_string(), "general");
    }
}
