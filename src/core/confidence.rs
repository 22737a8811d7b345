//! Confidence assessment record types.
//!
//! Computation lives in `crate::confidence`; this module holds the pure data
//! shapes so the Orchestrator, Confidence Manager and API layer share one
//! definition.

use serde::{Deserialize, Serialize};

/// Qualitative confidence level, derived from `overall` via configured
/// thresholds (`high >= 0.8`, `medium >= 0.6`, `low >= 0.4`, else `very_low`
/// by default).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceLevel {
    /// Below the `low` threshold.
    VeryLow,
    /// At or above `low`, below `medium`.
    Low,
    /// At or above `medium`, below `high`.
    Medium,
    /// At or above `high`.
    High,
}

impl std::fmt::Display for ConfidenceLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::VeryLow => "very_low",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        };
        f.write_str(s)
    }
}

/// A typed issue detected by the confidence manager, in the fixed fallback
/// priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Issue {
    /// Retrieval returned zero chunks.
    NoRelevantSources,
    /// `retrieval` sub-score below threshold.
    LowRetrievalConfidence,
    /// `citation_accuracy` or `citation_presence` below threshold.
    PoorCitationQuality,
    /// `query_clarity` below threshold.
    QueryAmbiguity,
    /// The completion call failed terminally.
    GenerationError,
}

impl Issue {
    /// The fixed priority order fallback selection uses to pick the
    /// governing issue when more than one is detected.
    pub const PRIORITY: [Self; 5] = [
        Self::NoRelevantSources,
        Self::LowRetrievalConfidence,
        Self::PoorCitationQuality,
        Self::QueryAmbiguity,
        Self::GenerationError,
    ];
}

impl std::fmt::Display for Issue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::NoRelevantSources => "no_relevant_sources",
            Self::LowRetrievalConfidence => "low_retrieval_confidence",
            Self::PoorCitationQuality => "poor_citation_quality",
            Self::QueryAmbiguity => "query_ambiguity",
            Self::GenerationError => "generation_error",
        };
        f.write_str(s)
    }
}

/// The four weighted sub-scores the overall confidence is derived from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SubScores {
    /// 0.4*top_similarity + 0.3*mean_similarity_of_top_k +
    /// 0.2*mean_quality_of_top_k + 0.1*source_diversity.
    pub retrieval: f32,
    /// 0.3*citation_presence + 0.3*citation_accuracy +
    /// 0.2*response_completeness + 0.2*coherence.
    pub content: f32,
    /// 0.4*query_clarity + 0.3*domain_relevance +
    /// 0.2*complexity_penalty + 0.1*conversation_context.
    pub context: f32,
    /// 0.4*model_confidence + 0.3*finish_reason_score +
    /// 0.2*length_score + 0.1*token_utilization.
    pub generation: f32,
}

/// A named reliability metric surfaced alongside the overall score (e.g.
/// `"top_similarity=0.91"`), used for diagnostics and the API's
/// `quality_indicators` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReliabilityMetric {
    /// Metric name.
    pub name: String,
    /// Metric value.
    pub value: f32,
}

/// The full output of the confidence manager for a single response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceAssessment {
    /// The four weighted sub-scores.
    pub sub_scores: SubScores,
    /// `0.35*retrieval + 0.30*content + 0.20*context + 0.15*generation`.
    pub overall: f32,
    /// Qualitative level derived from `overall`.
    pub level: ConfidenceLevel,
    /// Detected issues, in the order they were found (not necessarily
    /// priority order; see [`Issue::PRIORITY`] for fallback selection).
    pub issues: Vec<Issue>,
    /// Reliability metrics for diagnostics/display.
    pub reliability_metrics: Vec<ReliabilityMetric>,
}

impl ConfidenceAssessment {
    /// The highest-priority issue present in `issues`, per
    /// [`Issue::PRIORITY`], if any.
    #[must_use]
    pub fn governing_issue(&self) -> Option<Issue> {
        Issue::PRIORITY
            .into_iter()
            .find(|candidate| self.issues.contains(candidate))
    }
}

impl Default for ConfidenceLevel {
    fn default() -> Self {
        Self::VeryLow
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confidence_level_ordering() {
        assert!(ConfidenceLevel::High > ConfidenceLevel::Medium);
        assert!(ConfidenceLevel::Medium > ConfidenceLevel::Low);
        assert!(ConfidenceLevel::Low > ConfidenceLevel::VeryLow);
    }

    #[test]
    fn test_governing_issue_priority() {
        let assessment = ConfidenceAssessment {
            issues: vec![Issue::QueryAmbiguity, Issue::NoRelevantSources],
            ..Default::default()
        };
        assert_eq!(assessment.governing_issue(), Some(Issue::NoRelevantSources));
    }

    #[test]
    fn test_governing_issue_none() {
        let assessment = ConfidenceAssessment::default();
        assert_eq!(assessment.governing_issue(), None);
    }

    #[test]
    fn test_issue_display() {
        assert_eq!(Issue::NoRelevantSources.to_string(), "no_relevant_sources");
        assert_eq!(Issue::GenerationError.to_string(), "generation_error");
    }

    #[test]
    fn test_confidence_level_display() {
        assert_eq!(ConfidenceLevel::High.to_string(), "high");
        assert_eq!(ConfidenceLevel::VeryLow.to_string(), "very_low");
    }
}
