//! Confidence Manager: computes the four weighted sub-scores and overall
//! confidence for a single response, classifies issues, and selects a
//! fallback response when the assessment warrants one.
//!
//! Grounded in `examples/other_examples/.../rag-orchestrator.rs`'s
//! `calculate_confidence`/low-confidence-disclaimer pattern, generalized
//! into the exact documented sub-score formulas.

use crate::core::{
    Citation, CitationReport, Complexity, ConfidenceAssessment, ConfidenceLevel, Issue,
    QueryAnalysis, ReliabilityMetric, ScoredChunk, SubScores,
};
use crate::completion::FinishReason;

/// Configured thresholds for qualitative level classification.
#[derive(Debug, Clone, Copy)]
pub struct LevelThresholds {
    /// `overall >= high` -> [`ConfidenceLevel::High`].
    pub high: f32,
    /// `overall >= medium` -> [`ConfidenceLevel::Medium`].
    pub medium: f32,
    /// `overall >= low` -> [`ConfidenceLevel::Low`].
    pub low: f32,
    /// Below `low`, and the floor below which the orchestrator always
    /// applies a fallback regardless of detected issues.
    pub minimum: f32,
}

impl Default for LevelThresholds {
    fn default() -> Self {
        Self {
            high: 0.8,
            medium: 0.6,
            low: 0.4,
            minimum: 0.2,
        }
    }
}

/// Inputs needed to compute the retrieval sub-score.
#[derive(Debug, Clone)]
pub struct RetrievalInputs<'a> {
    /// Post-processed retrieved chunks, in rank order.
    pub chunks: &'a [ScoredChunk],
}

impl RetrievalInputs<'_> {
    /// `0.4*top_similarity + 0.3*mean_similarity_of_top_k +
    /// 0.2*mean_quality_of_top_k + 0.1*source_diversity`, where
    /// `source_diversity = min(unique_sources/3, 1)`.
    #[must_use]
    pub fn score(&self) -> f32 {
        if self.chunks.is_empty() {
            return 0.0;
        }

        let top_similarity = self.chunks.first().map_or(0.0, |c| c.score);
        let mean_similarity = mean(self.chunks.iter().map(|c| c.score));
        let mean_quality = mean(self.chunks.iter().map(|c| c.chunk.quality_score));

        let unique_sources: std::collections::HashSet<i64> =
            self.chunks.iter().map(|c| c.chunk.source_id).collect();
        #[allow(clippy::cast_precision_loss)]
        let source_diversity = (unique_sources.len() as f32 / 3.0).min(1.0);

        0.4f32.mul_add(
            top_similarity,
            0.3f32.mul_add(mean_similarity, 0.2f32.mul_add(mean_quality, 0.1 * source_diversity)),
        )
    }
}

fn mean(values: impl Iterator<Item = f32> + Clone) -> f32 {
    let count = values.clone().count();
    if count == 0 {
        return 0.0;
    }
    #[allow(clippy::cast_precision_loss)]
    let total: f32 = values.sum();
    total / count as f32
}

/// Inputs needed to compute the content sub-score.
#[derive(Debug, Clone)]
pub struct ContentInputs<'a> {
    /// Citation report for the generated response.
    pub citations: &'a CitationReport,
    /// Number of chunks retrieved and offered to the model (`top_k`).
    pub top_k: usize,
    /// Word count of the generated response.
    pub response_word_count: usize,
    /// Coherence estimate in `[0, 1]` (see [`coherence`]).
    pub coherence: f32,
}

impl ContentInputs<'_> {
    /// `0.3*citation_presence + 0.3*citation_accuracy +
    /// 0.2*response_completeness + 0.2*coherence`.
    #[must_use]
    pub fn score(&self) -> f32 {
        let citation_presence = citation_presence(self.citations, self.top_k);
        let citation_accuracy = citation_accuracy(self.citations);
        #[allow(clippy::cast_precision_loss)]
        let response_completeness = (self.response_word_count as f32 / 40.0).min(1.0);

        0.3f32.mul_add(
            citation_presence,
            0.3f32.mul_add(citation_accuracy, 0.2f32.mul_add(response_completeness, 0.2 * self.coherence)),
        )
    }
}

/// `min(valid_citations / expected, 1)` with `expected = ceil(top_k / 2)`.
#[must_use]
pub fn citation_presence(citations: &CitationReport, top_k: usize) -> f32 {
    let expected = top_k.div_ceil(2).max(1);
    #[allow(clippy::cast_precision_loss)]
    let presence = citations.valid.len() as f32 / expected as f32;
    presence.min(1.0)
}

/// Fraction of found citations that validated successfully.
#[must_use]
pub fn citation_accuracy(citations: &CitationReport) -> f32 {
    if citations.total_found == 0 {
        return 1.0;
    }
    #[allow(clippy::cast_precision_loss)]
    let accuracy = citations.valid.len() as f32 / citations.total_found as f32;
    accuracy
}

/// Bounded `[0, 1]` coherence estimate: rewards multi-sentence structure
/// and discourse markers, penalizes extreme token repetition (any single
/// token making up more than 25% of all tokens).
#[must_use]
pub fn coherence(text: &str) -> f32 {
    const DISCOURSE_MARKERS: &[&str] = &[
        "first", "second", "third", "finally", "therefore", "however", "moreover", "additionally", "consequently",
    ];

    let sentence_count = text.split(['.', '!', '?']).filter(|s| !s.trim().is_empty()).count();
    let tokens: Vec<String> = text.split_whitespace().map(|t| t.to_lowercase()).collect();

    let mut score: f32 = 0.5;
    if sentence_count > 1 {
        score += 0.25;
    }

    let lower = text.to_lowercase();
    if DISCOURSE_MARKERS.iter().any(|m| lower.contains(m)) {
        score += 0.25;
    }

    if !tokens.is_empty() {
        let mut counts = std::collections::HashMap::new();
        for token in &tokens {
            *counts.entry(token.as_str()).or_insert(0_usize) += 1;
        }
        #[allow(clippy::cast_precision_loss)]
        let max_fraction = counts.values().copied().max().unwrap_or(0) as f32 / tokens.len() as f32;
        if max_fraction > 0.25 {
            score -= 0.3;
        }
    }

    score.clamp(0.0, 1.0)
}

/// Inputs needed to compute the context sub-score.
#[derive(Debug, Clone)]
pub struct ContextInputs<'a> {
    /// The analyzed query.
    pub analysis: &'a QueryAnalysis,
    /// Whether the conversation has prior turns.
    pub has_prior_turns: bool,
}

impl ContextInputs<'_> {
    /// `0.4*query_clarity + 0.3*domain_relevance +
    /// 0.2*complexity_penalty + 0.1*conversation_context`.
    #[must_use]
    pub fn score(&self) -> f32 {
        let query_clarity = self.analysis.query_clarity();
        let domain_relevance = self.analysis.domain_relevance();
        let complexity_penalty = self.analysis.complexity.penalty();
        let conversation_context = if self.has_prior_turns { 0.8 } else { 0.5 };

        0.4f32.mul_add(
            query_clarity,
            0.3f32.mul_add(domain_relevance, 0.2f32.mul_add(complexity_penalty, 0.1 * conversation_context)),
        )
    }
}

/// A per-model base confidence constant used by the generation sub-score.
/// Unknown models fall back to a conservative default.
#[must_use]
pub fn model_confidence(model: &str) -> f32 {
    match model {
        "gpt-4o" | "gpt-4-turbo" => 0.95,
        "gpt-4o-mini" => 0.85,
        "gpt-3.5-turbo" => 0.7,
        _ => 0.6,
    }
}

/// Inputs needed to compute the generation sub-score.
#[derive(Debug, Clone)]
pub struct GenerationInputs<'a> {
    /// Model that produced the response.
    pub model: &'a str,
    /// Why generation stopped.
    pub finish_reason: FinishReason,
    /// Word count of the generated response.
    pub word_count: usize,
    /// Tokens actually used, relative to the request's token budget.
    pub tokens_used: u32,
    /// The request's token budget (`max_tokens`).
    pub max_tokens: u32,
}

impl GenerationInputs<'_> {
    /// `0.4*model_confidence + 0.3*finish_reason_score +
    /// 0.2*length_score + 0.1*token_utilization`.
    #[must_use]
    pub fn score(&self) -> f32 {
        let model_conf = model_confidence(self.model);
        let finish_score = self.finish_reason.score();
        let length_score = if (30..=400).contains(&self.word_count) { 1.0 } else { 0.7 };
        #[allow(clippy::cast_precision_loss)]
        let token_utilization = if self.max_tokens == 0 {
            0.0
        } else {
            (f32::from(u16::try_from(self.tokens_used).unwrap_or(u16::MAX))
                / f32::from(u16::try_from(self.max_tokens).unwrap_or(u16::MAX)))
            .min(1.0)
        };

        0.4f32.mul_add(
            model_conf,
            0.3f32.mul_add(finish_score, 0.2f32.mul_add(length_score, 0.1 * token_utilization)),
        )
    }
}

/// Derives a qualitative level from `overall` using `thresholds`.
#[must_use]
pub fn classify_level(overall: f32, thresholds: &LevelThresholds) -> ConfidenceLevel {
    if overall >= thresholds.high {
        ConfidenceLevel::High
    } else if overall >= thresholds.medium {
        ConfidenceLevel::Medium
    } else if overall >= thresholds.low {
        ConfidenceLevel::Low
    } else {
        ConfidenceLevel::VeryLow
    }
}

/// Detects issues against tuned thresholds: `low_retrieval_confidence`
/// when `retrieval < 0.4`; `poor_citation_quality` when
/// `citation_accuracy < 0.7` or `citation_presence < 0.3`;
/// `query_ambiguity` when `query_clarity < 0.4`; `no_relevant_sources`
/// when retrieval returned zero chunks.
#[must_use]
pub fn detect_issues(
    sub_scores: &SubScores,
    retrieval: &RetrievalInputs<'_>,
    content: &ContentInputs<'_>,
    context_analysis: &QueryAnalysis,
) -> Vec<Issue> {
    let mut issues = Vec::new();

    if retrieval.chunks.is_empty() {
        issues.push(Issue::NoRelevantSources);
    }
    if sub_scores.retrieval < 0.4 {
        issues.push(Issue::LowRetrievalConfidence);
    }
    let accuracy = citation_accuracy(content.citations);
    let presence = citation_presence(content.citations, content.top_k);
    if accuracy < 0.7 || presence < 0.3 {
        issues.push(Issue::PoorCitationQuality);
    }
    if context_analysis.query_clarity() < 0.4 {
        issues.push(Issue::QueryAmbiguity);
    }

    issues
}

/// Computes the full confidence assessment for a response.
#[must_use]
pub fn assess(
    retrieval: &RetrievalInputs<'_>,
    content: &ContentInputs<'_>,
    context: &ContextInputs<'_>,
    generation: &GenerationInputs<'_>,
    thresholds: &LevelThresholds,
) -> ConfidenceAssessment {
    let sub_scores = SubScores {
        retrieval: retrieval.score(),
        content: content.score(),
        context: context.score(),
        generation: generation.score(),
    };

    let overall = 0.35f32.mul_add(
        sub_scores.retrieval,
        0.30f32.mul_add(sub_scores.content, 0.20f32.mul_add(sub_scores.context, 0.15 * sub_scores.generation)),
    );

    let level = classify_level(overall, thresholds);
    let issues = detect_issues(&sub_scores, retrieval, content, context.analysis);

    let reliability_metrics = vec![
        ReliabilityMetric {
            name: "top_similarity".to_string(),
            value: retrieval.chunks.first().map_or(0.0, |c| c.score),
        },
        ReliabilityMetric {
            name: "citation_coverage".to_string(),
            value: content.citations.citation_coverage(),
        },
        ReliabilityMetric {
            name: "query_clarity".to_string(),
            value: context.analysis.query_clarity(),
        },
    ];

    ConfidenceAssessment {
        sub_scores,
        overall,
        level,
        issues,
        reliability_metrics,
    }
}

/// A canned fallback response, selected when the assessment's overall
/// score is below `thresholds.minimum` or a governing issue is present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackResponse {
    /// Replacement message text.
    pub message: String,
    /// Stable strategy tag, mirrors the governing [`Issue`] (or
    /// `system_error` for an unrecognized one).
    pub strategy: String,
    /// Clarification suggestions, if applicable (e.g. for
    /// `query_ambiguity`).
    pub suggestions: Vec<String>,
}

/// Selects a fallback response for `issue`, parameterized by the original
/// query and (when useful) the original generated response.
#[must_use]
pub fn fallback_for(issue: Issue, original_query: &str) -> FallbackResponse {
    match issue {
        Issue::NoRelevantSources => FallbackResponse {
            message: format!(
                "I couldn't find specific information about \"{original_query}\" in the available documents. \
                 Could you rephrase your question or provide more detail?"
            ),
            strategy: Issue::NoRelevantSources.to_string(),
            suggestions: Vec::new(),
        },
        Issue::LowRetrievalConfidence => FallbackResponse {
            message: "I found some related material, but I'm not confident it fully answers your question. \
                       Please verify this against the source documents."
                .to_string(),
            strategy: Issue::LowRetrievalConfidence.to_string(),
            suggestions: Vec::new(),
        },
        Issue::PoorCitationQuality => FallbackResponse {
            message: "I was unable to confidently tie my answer back to the source documents. \
                       Please treat this response with caution."
                .to_string(),
            strategy: Issue::PoorCitationQuality.to_string(),
            suggestions: Vec::new(),
        },
        Issue::QueryAmbiguity => FallbackResponse {
            message: format!("Your question (\"{original_query}\") could be interpreted a few different ways."),
            strategy: Issue::QueryAmbiguity.to_string(),
            suggestions: vec![
                "Could you specify which fund or document you mean?".to_string(),
                "Are you asking about the process, a definition, or a comparison?".to_string(),
            ],
        },
        Issue::GenerationError => FallbackResponse {
            message: "I ran into a problem generating a response. Please try again.".to_string(),
            strategy: Issue::GenerationError.to_string(),
            suggestions: Vec::new(),
        },
    }
}

/// The generic fallback used when an unrecognized issue tag is
/// encountered, at the fixed confidence floor of 0.1.
#[must_use]
pub fn system_error_fallback() -> FallbackResponse {
    FallbackResponse {
        message: "Something went wrong while preparing this response. Please try again.".to_string(),
        strategy: "system_error".to_string(),
        suggestions: Vec::new(),
    }
}

/// Caps a fallback's confidence at `min(original, 0.3)`, per P6.
#[must_use]
pub fn fallback_confidence(original: f32) -> f32 {
    original.min(0.3)
}

/// Placeholder used for API/documentation cross-references; not otherwise
/// constructed here, since citation construction is owned by
/// `crate::citation`.
#[allow(dead_code)]
type _CitationRef = Citation;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ComponentScores, Intent, StrategyTag};

    fn chunk_scored(source_id: i64, score: f32, quality: f32) -> ScoredChunk {
        let chunk = crate::core::Chunk::new(source_id, 0, "content".to_string()).with_quality_score(quality);
        ScoredChunk {
            chunk,
            score,
            rank: 1,
            strategy: StrategyTag::Hybrid,
            component_scores: ComponentScores::default(),
        }
    }

    fn sample_analysis() -> QueryAnalysis {
        QueryAnalysis {
            original_query: "How do I create a fund?".to_string(),
            normalized_query: "how do i create a fund?".to_string(),
            tokens: vec!["how".to_string(), "do".to_string(), "i".to_string(), "create".to_string(), "a".to_string(), "fund".to_string()],
            entities: vec!["fund creation".to_string()],
            keywords: vec!["fund".to_string(), "create".to_string()],
            is_question: true,
            intent: Intent::Procedure,
            complexity: Complexity::Simple,
            word_count: 6,
        }
    }

    #[test]
    fn test_retrieval_score_empty_is_zero() {
        let inputs = RetrievalInputs { chunks: &[] };
        assert_eq!(inputs.score(), 0.0);
    }

    #[test]
    fn test_retrieval_score_high_similarity() {
        let chunks = vec![chunk_scored(1, 0.95, 0.8), chunk_scored(2, 0.9, 0.8)];
        let inputs = RetrievalInputs { chunks: &chunks };
        assert!(inputs.score() > 0.6);
    }

    #[test]
    fn test_citation_presence_and_accuracy() {
        let mut report = CitationReport {
            total_found: 2,
            ..Default::default()
        };
        report.valid.push(Citation::valid("Guide".to_string(), None, 1));
        assert_eq!(citation_accuracy(&report), 0.5);
        assert_eq!(citation_presence(&report, 4), 0.5);
    }

    #[test]
    fn test_coherence_penalizes_repetition() {
        let repetitive = "fund fund fund fund fund fund fund fund.";
        let natural = "First, submit the form. Therefore, the fund is created.";
        assert!(coherence(natural) > coherence(repetitive));
    }

    #[test]
    fn test_context_score_uses_query_clarity() {
        let analysis = sample_analysis();
        let inputs = ContextInputs {
            analysis: &analysis,
            has_prior_turns: false,
        };
        assert!(inputs.score() > 0.0);
    }

    #[test]
    fn test_classify_level_thresholds() {
        let thresholds = LevelThresholds::default();
        assert_eq!(classify_level(0.85, &thresholds), ConfidenceLevel::High);
        assert_eq!(classify_level(0.65, &thresholds), ConfidenceLevel::Medium);
        assert_eq!(classify_level(0.45, &thresholds), ConfidenceLevel::Low);
        assert_eq!(classify_level(0.1, &thresholds), ConfidenceLevel::VeryLow);
    }

    #[test]
    fn test_detect_no_relevant_sources() {
        let retrieval = RetrievalInputs { chunks: &[] };
        let report = CitationReport::default();
        let content = ContentInputs {
            citations: &report,
            top_k: 5,
            response_word_count: 10,
            coherence: 0.5,
        };
        let analysis = sample_analysis();
        let sub_scores = SubScores::default();
        let issues = detect_issues(&sub_scores, &retrieval, &content, &analysis);
        assert!(issues.contains(&Issue::NoRelevantSources));
    }

    #[test]
    fn test_fallback_confidence_capped() {
        assert_eq!(fallback_confidence(0.9), 0.3);
        assert_eq!(fallback_confidence(0.1), 0.1);
    }

    #[test]
    fn test_fallback_for_no_relevant_sources_mentions_query() {
        let fallback = fallback_for(Issue::NoRelevantSources, "Weather in Tokyo?");
        assert!(fallback.message.contains("Weather in Tokyo?"));
        assert_eq!(fallback.strategy, "no_relevant_sources");
    }

    #[test]
    fn test_full_assessment_high_confidence_scenario() {
        let chunks = vec![chunk_scored(1, 0.9, 0.8), chunk_scored(2, 0.85, 0.8), chunk_scored(3, 0.8, 0.8)];
        let retrieval = RetrievalInputs { chunks: &chunks };

        let mut report = CitationReport {
            total_found: 1,
            ..Default::default()
        };
        report.valid.push(Citation::valid("Fund Creation Guide".to_string(), None, 1));
        let content = ContentInputs {
            citations: &report,
            top_k: 3,
            response_word_count: 40,
            coherence: coherence("First, submit form FC-1. Therefore your fund is created."),
        };

        let analysis = sample_analysis();
        let context = ContextInputs {
            analysis: &analysis,
            has_prior_turns: false,
        };

        let generation = GenerationInputs {
            model: "gpt-4o-mini",
            finish_reason: FinishReason::Stop,
            word_count: 40,
            tokens_used: 200,
            max_tokens: 800,
        };

        let assessment = assess(&retrieval, &content, &context, &generation, &LevelThresholds::default());
        assert!(assessment.overall >= 0.6);
        assert!(matches!(assessment.level, ConfidenceLevel::Medium | ConfidenceLevel::High));
    }
}
