//! RAG Orchestrator: the single entry point that turns a user query plus
//! an optional session id into a grounded, cited, confidence-scored
//! answer.
//!
//! Grounded in `examples/other_examples/.../rag-orchestrator.rs`'s
//! `DocumentRagPipeline::generate` state machine (classify -> retrieve ->
//! assemble -> generate -> persist, with an explicit early-return
//! `no_context_result` for empty retrieval), generalized with citation
//! validation, confidence scoring, and fallback selection per the
//! documented ten-step flow. Each step is numbered below to mirror that
//! shape.

use std::sync::Arc;
use std::time::Instant;

use arc_swap::ArcSwap;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex as AsyncMutex;

use crate::citation;
use crate::completion::{CompletionClient, CompletionOptions};
use crate::config::RagConfig;
use crate::confidence::{self, ContentInputs, ContextInputs, GenerationInputs, RetrievalInputs};
use crate::core::{
    Citation, ConfidenceLevel, Conversation, ReliabilityMetric, Role, ScoredChunk, StrategyTag,
    Turn,
};
use crate::embedding::Embedder;
use crate::error::{Error, InputError, Result};
use crate::prompt::{self, PromptTemplate};
use crate::query::{self, WordLists};
use crate::retriever::Retriever;
use crate::storage::{ChunkFilter, Storage};

/// Per-call overrides; fields left `None` fall back to the active
/// [`RagConfig`] snapshot.
#[derive(Debug, Clone, Default)]
pub struct AnswerOptions {
    /// Caps the number of retrieved chunks for this call.
    pub max_results: Option<usize>,
    /// Caps generated tokens for this call.
    pub max_tokens: Option<u32>,
    /// Overrides sampling temperature for this call.
    pub temperature: Option<f32>,
    /// Overrides the completion model for this call.
    pub model: Option<String>,
}

/// A single request to the orchestrator.
#[derive(Debug, Clone)]
pub struct AnswerRequest {
    /// The raw user question.
    pub query: String,
    /// Conversation session id; a new session is created if absent or
    /// unknown.
    pub session_id: Option<String>,
    /// Whether to consult the knowledge base at all. When `false`, the
    /// retrieval step is skipped entirely and the completion call runs
    /// with no retrieved context, matching a general-knowledge request.
    pub use_knowledge_base: bool,
    /// Per-call overrides.
    pub options: AnswerOptions,
}

/// A deduplicated, relevance-sorted reference to a source document cited
/// or retrieved in the course of answering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRef {
    /// Display title (see [`crate::core::Chunk::display_title`]).
    pub title: String,
    /// Page number, if known.
    pub page: Option<u32>,
}

/// A retrieved chunk surfaced to the caller for transparency/debugging.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunkRef {
    /// Chunk id.
    pub id: i64,
    /// Final retrieval score.
    pub score: f32,
    /// Display title.
    pub title: String,
}

/// Diagnostic metadata about how a response was produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseMetadata {
    /// Strategy the retriever actually used.
    pub retrieval_strategy: StrategyTag,
    /// Model that produced the generated text.
    pub model: String,
    /// Tokens consumed by the completion call.
    pub tokens_used: u32,
    /// Present (and `true`) only when a fallback response replaced the
    /// model's original output.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_applied: Option<bool>,
}

/// The orchestrator's full response to an [`AnswerRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RagResponse {
    /// The answer text (generated, or a canned fallback).
    pub message: String,
    /// The session this turn was recorded under.
    pub session_id: String,
    /// Whether retrieval was consulted at all.
    pub used_knowledge_base: bool,
    /// Overall confidence in `[0, 1]`.
    pub confidence: f32,
    /// Qualitative confidence level.
    pub confidence_level: ConfidenceLevel,
    /// Validated citations found in the (pre-fallback) generated text.
    pub citations: Vec<Citation>,
    /// Deduplicated, relevance-sorted source references.
    pub sources: Vec<SourceRef>,
    /// The chunks retrieval surfaced, in rank order.
    pub retrieved_chunks: Vec<RetrievedChunkRef>,
    /// Named reliability metrics for display/diagnostics.
    pub quality_indicators: Vec<ReliabilityMetric>,
    /// Wall-clock time spent producing this response.
    pub processing_time_ms: u64,
    /// Generation/retrieval diagnostics.
    pub metadata: ResponseMetadata,
}

/// Wires the Query Analyzer, Retriever, Prompt Assembler, Completion
/// Client, Citation Extractor and Confidence Manager into a single
/// `answer` call, with per-session serialization and conversation
/// persistence.
pub struct RagOrchestrator<S: Storage + 'static, E: Embedder, C: CompletionClient> {
    config: Arc<ArcSwap<RagConfig>>,
    storage: crate::storage::StoragePool<S>,
    retriever: Retriever<S>,
    embedder: Arc<E>,
    completion: Arc<C>,
    prompt_template: PromptTemplate,
    word_lists: WordLists,
    session_locks: DashMap<String, Arc<AsyncMutex<()>>>,
}

impl<S, E, C> RagOrchestrator<S, E, C>
where
    S: Storage + 'static,
    E: Embedder + 'static,
    C: CompletionClient + 'static,
{
    /// Builds an orchestrator over the given storage pool, embedder,
    /// completion client, and shared config handle.
    #[must_use]
    pub fn new(
        config: Arc<ArcSwap<RagConfig>>,
        storage: crate::storage::StoragePool<S>,
        embedder: Arc<E>,
        completion: Arc<C>,
        prompt_template: PromptTemplate,
        word_lists: WordLists,
    ) -> Self {
        let retriever = Retriever::new(storage.clone());
        Self {
            config,
            storage,
            retriever,
            embedder,
            completion,
            prompt_template,
            word_lists,
            session_locks: DashMap::new(),
        }
    }

    fn session_lock(&self, session_id: &str) -> Arc<AsyncMutex<()>> {
        self.session_locks
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Answers `request`, end to end.
    ///
    /// Step order: (1) validate the query and resolve/create the session;
    /// (2) analyze the query; (3) retrieve, unless knowledge-base use is
    /// disabled; (4) assemble the prompt from retrieved chunks and recent
    /// history; (5) call the completion client; (6) extract and validate
    /// citations; (7) score confidence; (8) apply a fallback if the
    /// assessment warrants one; (9) persist the turn pair; (10) return
    /// the response. Steps 2-8 run under a per-session lock so concurrent
    /// requests against the same session never interleave their
    /// conversation writes (P-SESSION).
    ///
    /// # Errors
    ///
    /// Returns [`InputError::InvalidQuery`] for an empty query, or
    /// propagates retrieval/completion/storage errors that survive their
    /// own internal retry budgets.
    pub async fn answer(&self, request: AnswerRequest) -> Result<RagResponse> {
        let started = Instant::now();

        let trimmed = request.query.trim();
        if trimmed.is_empty() {
            return Err(InputError::InvalidQuery {
                reason: "query must not be empty".to_string(),
            }
            .into());
        }

        let session_id = request.session_id.unwrap_or_else(new_session_id);
        let lock = self.session_lock(&session_id);
        let _guard = lock.lock().await;

        let config = self.config.load_full();

        let conversation = self.load_conversation(&session_id).await?;
        let has_prior_turns = conversation.as_ref().is_some_and(|c| !c.is_empty());

        let analysis = query::analyze(trimmed, &self.word_lists);

        let retrieval = if request.use_knowledge_base {
            let query_vec = self.embed_query(trimmed).await?;
            let mut retriever_config = config.retriever_config();
            if let Some(max_results) = request.options.max_results {
                retriever_config.k_final = max_results;
            }
            self.retriever
                .retrieve(trimmed, Some(&query_vec), ChunkFilter::none(), &retriever_config)
                .await?
        } else {
            crate::core::RetrievalResult::empty(StrategyTag::Hybrid)
        };

        let thresholds = config.confidence.as_level_thresholds();

        // Knowledge-base mode with zero retrieved chunks never reaches the
        // Completion Client: no prompt is worth assembling, and no useful
        // answer can be generated from nothing, so skip straight to the
        // fallback (step 8).
        if request.use_knowledge_base && retrieval.chunks.is_empty() {
            let fallback = confidence::fallback_for(crate::core::Issue::NoRelevantSources, trimmed);
            let mut assessment = confidence::assess(
                &RetrievalInputs { chunks: &retrieval.chunks },
                &ContentInputs {
                    citations: &crate::core::CitationReport::default(),
                    top_k: 0,
                    response_word_count: 0,
                    coherence: 0.0,
                },
                &ContextInputs { analysis: &analysis, has_prior_turns },
                &GenerationInputs {
                    model: "none",
                    finish_reason: crate::completion::FinishReason::Stop,
                    word_count: 0,
                    tokens_used: 0,
                    max_tokens: config.response.max_tokens,
                },
                &thresholds,
            );
            assessment.issues.push(crate::core::Issue::NoRelevantSources);
            assessment.overall = confidence::fallback_confidence(assessment.overall);
            assessment.level = confidence::classify_level(assessment.overall, &thresholds);

            self.persist_turns(&session_id, trimmed, &fallback.message).await?;

            return Ok(RagResponse {
                message: fallback.message,
                session_id,
                used_knowledge_base: request.use_knowledge_base,
                confidence: assessment.overall,
                confidence_level: assessment.level,
                citations: Vec::new(),
                sources: Vec::new(),
                retrieved_chunks: Vec::new(),
                quality_indicators: assessment.reliability_metrics,
                processing_time_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
                metadata: ResponseMetadata {
                    retrieval_strategy: retrieval.strategy_used,
                    model: "none".to_string(),
                    tokens_used: 0,
                    fallback_applied: Some(true),
                },
            });
        }

        let assembler_config = config.assembler_config();
        let assembled = prompt::assemble(
            &self.prompt_template,
            trimmed,
            &retrieval.chunks,
            conversation.as_ref(),
            &assembler_config,
        );

        let completion_options = CompletionOptions {
            max_tokens: request.options.max_tokens.or(Some(config.response.max_tokens)),
            temperature: request.options.temperature.or(Some(config.response.temperature)),
            model: request.options.model.clone(),
        };

        let completion = self.completion.complete(&assembled.text, &completion_options).await;

        let (generated_text, finish_reason, model, tokens_used, generation_error) = match completion {
            Ok(response) => (response.text, response.finish_reason, response.model, response.tokens_used, false),
            Err(_) => (
                String::new(),
                crate::completion::FinishReason::Error,
                completion_options.model.clone().unwrap_or_else(|| "unknown".to_string()),
                0,
                true,
            ),
        };

        let citation_report = if config.response.enable_citation_validation {
            citation::extract_and_validate(&generated_text, &retrieval.chunks)
        } else {
            crate::core::CitationReport::default()
        };

        let response_word_count = generated_text.split_whitespace().count();
        let coherence = confidence::coherence(&generated_text);

        let retrieval_inputs = RetrievalInputs { chunks: &retrieval.chunks };
        let content_inputs = ContentInputs {
            citations: &citation_report,
            top_k: retrieval.chunks.len(),
            response_word_count,
            coherence,
        };
        let context_inputs = ContextInputs { analysis: &analysis, has_prior_turns };
        let generation_inputs = GenerationInputs {
            model: &model,
            finish_reason,
            word_count: response_word_count,
            tokens_used,
            max_tokens: completion_options.max_tokens.unwrap_or(config.response.max_tokens),
        };

        let mut assessment = confidence::assess(
            &retrieval_inputs,
            &content_inputs,
            &context_inputs,
            &generation_inputs,
            &thresholds,
        );
        if generation_error {
            assessment.issues.push(crate::core::Issue::GenerationError);
        }

        let mut fallback_applied = None;
        let final_message = if assessment.overall < config.response.confidence_threshold || assessment.governing_issue().is_some() {
            let issue = assessment.governing_issue().unwrap_or(crate::core::Issue::LowRetrievalConfidence);
            let fallback = confidence::fallback_for(issue, trimmed);
            assessment.overall = confidence::fallback_confidence(assessment.overall);
            assessment.level = confidence::classify_level(assessment.overall, &thresholds);
            fallback_applied = Some(true);
            fallback.message
        } else {
            generated_text
        };

        self.persist_turns(&session_id, trimmed, &final_message).await?;

        let sources = dedupe_sources(&retrieval.chunks);
        let retrieved_chunks = retrieval
            .chunks
            .iter()
            .map(|c| RetrievedChunkRef {
                id: c.chunk.id.unwrap_or_default(),
                score: c.score,
                title: c.chunk.display_title().to_string(),
            })
            .collect();

        Ok(RagResponse {
            message: final_message,
            session_id,
            used_knowledge_base: request.use_knowledge_base,
            confidence: assessment.overall,
            confidence_level: assessment.level,
            citations: citation_report.valid.iter().chain(citation_report.invalid.iter()).cloned().collect(),
            sources,
            retrieved_chunks,
            quality_indicators: assessment.reliability_metrics,
            processing_time_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            metadata: ResponseMetadata {
                retrieval_strategy: retrieval.strategy_used,
                model,
                tokens_used,
                fallback_applied,
            },
        })
    }

    async fn load_conversation(&self, session_id: &str) -> Result<Option<Conversation>> {
        let session_id = session_id.to_string();
        let pool = self.storage.clone();
        tokio::task::spawn_blocking(move || pool.with_storage(|s| s.load_conversation(&session_id)))
            .await
            .map_err(|e| Error::Internal { message: format!("conversation load task panicked: {e}") })?
    }

    async fn persist_turns(&self, session_id: &str, query: &str, answer: &str) -> Result<()> {
        let session_id = session_id.to_string();
        let user_turn = Turn::new(Role::User, query.to_string());
        let assistant_turn = Turn::new(Role::Assistant, answer.to_string());
        let pool = self.storage.clone();
        let retention = self.config.load().conversation.retention;

        tokio::task::spawn_blocking(move || {
            pool.with_storage(|s| {
                s.append_turn(&session_id, &user_turn)?;
                s.append_turn(&session_id, &assistant_turn)?;
                s.truncate_conversation(&session_id, retention)
            })
        })
        .await
        .map_err(|e| Error::Internal { message: format!("conversation persist task panicked: {e}") })?
    }

    async fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        let embedder = Arc::clone(&self.embedder);
        let query = query.to_string();
        tokio::task::spawn_blocking(move || embedder.embed(&query))
            .await
            .map_err(|e| Error::Internal { message: format!("embedding task panicked: {e}") })?
    }
}

fn dedupe_sources(chunks: &[ScoredChunk]) -> Vec<SourceRef> {
    let mut seen = std::collections::HashSet::new();
    let mut sources = Vec::new();
    for scored in chunks {
        let key = (scored.chunk.display_title().to_string(), scored.chunk.page_number);
        if seen.insert(key.clone()) {
            sources.push(SourceRef { title: key.0, page: key.1 });
        }
    }
    sources
}

/// Generates a session id for callers that don't supply their own, from
/// the current time and a process-local counter, hashed to keep the
/// format opaque and collision-resistant across restarts.
fn new_session_id() -> String {
    use sha2::{Digest, Sha256};
    use std::sync::atomic::{AtomicU64, Ordering};
    static COUNTER: AtomicU64 = AtomicU64::new(0);

    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_or(0, |d| d.as_nanos());
    let sequence = COUNTER.fetch_add(1, Ordering::Relaxed);

    let mut hasher = Sha256::new();
    hasher.update(nanos.to_le_bytes());
    hasher.update(sequence.to_le_bytes());
    format!("sess-{:x}", hasher.finalize())[..40].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::{CompletionResponse, FinishReason};
    use crate::core::{Chunk, Source};
    use crate::embedding::FallbackEmbedder;
    use crate::storage::{SqliteStorage, StoragePool};
    use async_trait::async_trait;
    use std::time::Duration as StdDuration;

    struct StubCompletion {
        text: String,
        finish_reason: FinishReason,
    }

    #[async_trait]
    impl CompletionClient for StubCompletion {
        async fn complete(&self, _prompt: &str, _options: &CompletionOptions) -> Result<CompletionResponse> {
            Ok(CompletionResponse {
                text: self.text.clone(),
                finish_reason: self.finish_reason,
                model: "gpt-4o-mini".to_string(),
                tokens_used: 120,
            })
        }
    }

    struct FailingCompletion;

    #[async_trait]
    impl CompletionClient for FailingCompletion {
        async fn complete(&self, _prompt: &str, _options: &CompletionOptions) -> Result<CompletionResponse> {
            Err(crate::error::CompletionError::Transient("boom".to_string()).into())
        }
    }

    /// Panics if called; used to assert a code path never reaches the
    /// Completion Client.
    struct UnreachableCompletion;

    #[async_trait]
    impl CompletionClient for UnreachableCompletion {
        async fn complete(&self, _prompt: &str, _options: &CompletionOptions) -> Result<CompletionResponse> {
            panic!("completion client should not be called for empty retrieval");
        }
    }

    fn pool() -> StoragePool<SqliteStorage> {
        let mut storage = SqliteStorage::in_memory().expect("in-memory storage");
        storage.init().expect("init");
        StoragePool::new(storage, StdDuration::from_secs(1))
    }

    fn seed_fund_creation_chunk(pool: &StoragePool<SqliteStorage>, embedder: &FallbackEmbedder) {
        pool.with_storage(|s| {
            let mut source = Source::new("guide.md".to_string(), b"Fund Creation Guide");
            source.mark_completed();
            let row_id = s.upsert_source(&source)?;
            let content = "To create a fund, submit form FC-1 to the fund administrator.";
            let embedding = embedder.embed(content)?;
            let chunk = Chunk::new(row_id, 0, content.to_string())
                .with_headings(None, None, vec!["Fund Creation Guide".to_string()])
                .with_page_number(1)
                .with_quality_score(0.9)
                .with_embedding(embedding);
            s.upsert(&chunk)
        })
        .expect("seed chunk");
    }

    fn orchestrator_with<Comp: CompletionClient + 'static>(
        completion: Comp,
    ) -> RagOrchestrator<SqliteStorage, FallbackEmbedder, Comp> {
        let pool = pool();
        let embedder = Arc::new(FallbackEmbedder::new(crate::embedding::DEFAULT_DIMENSIONS));
        seed_fund_creation_chunk(&pool, &embedder);

        RagOrchestrator::new(
            Arc::new(ArcSwap::new(Arc::new(RagConfig::default()))),
            pool,
            embedder,
            Arc::new(completion),
            PromptTemplate::defaults(),
            WordLists::defaults(),
        )
    }

    #[tokio::test]
    async fn test_answer_high_confidence_scenario() {
        let orchestrator = orchestrator_with(StubCompletion {
            text: "To create a fund, submit form FC-1 (Fund Creation Guide, p. 1). \
                   Therefore the process begins with that filing."
                .to_string(),
            finish_reason: FinishReason::Stop,
        });

        let response = orchestrator
            .answer(AnswerRequest {
                query: "How do I create a fund?".to_string(),
                session_id: Some("s1".to_string()),
                use_knowledge_base: true,
                options: AnswerOptions::default(),
            })
            .await
            .expect("answer");

        assert_eq!(response.metadata.fallback_applied, None);
        assert!(!response.retrieved_chunks.is_empty());
        assert!(!response.sources.is_empty());
    }

    #[tokio::test]
    async fn test_answer_rejects_empty_query() {
        let orchestrator = orchestrator_with(StubCompletion {
            text: "irrelevant".to_string(),
            finish_reason: FinishReason::Stop,
        });

        let result = orchestrator
            .answer(AnswerRequest {
                query: "   ".to_string(),
                session_id: None,
                use_knowledge_base: true,
                options: AnswerOptions::default(),
            })
            .await;

        assert!(matches!(result, Err(Error::Input(InputError::InvalidQuery { .. }))));
    }

    #[tokio::test]
    async fn test_answer_general_knowledge_mode_falls_back_on_low_confidence() {
        let orchestrator = orchestrator_with(StubCompletion {
            text: "I don't know anything about that.".to_string(),
            finish_reason: FinishReason::Stop,
        });

        let response = orchestrator
            .answer(AnswerRequest {
                query: "What is the capital of France?".to_string(),
                session_id: Some("s2".to_string()),
                use_knowledge_base: false,
                options: AnswerOptions::default(),
            })
            .await
            .expect("answer");

        assert_eq!(response.metadata.fallback_applied, Some(true));
    }

    #[tokio::test]
    async fn test_answer_empty_retrieval_skips_completion_and_falls_back() {
        let mut storage = SqliteStorage::in_memory().expect("in-memory storage");
        storage.init().expect("init");
        let pool = StoragePool::new(storage, StdDuration::from_secs(1));
        let embedder = Arc::new(FallbackEmbedder::new(crate::embedding::DEFAULT_DIMENSIONS));

        let orchestrator = RagOrchestrator::new(
            Arc::new(ArcSwap::new(Arc::new(RagConfig::default()))),
            pool,
            embedder,
            Arc::new(UnreachableCompletion),
            PromptTemplate::defaults(),
            WordLists::defaults(),
        );

        let response = orchestrator
            .answer(AnswerRequest {
                query: "Weather in Tokyo?".to_string(),
                session_id: Some("s2-empty".to_string()),
                use_knowledge_base: true,
                options: AnswerOptions::default(),
            })
            .await
            .expect("answer");

        assert_eq!(response.metadata.fallback_applied, Some(true));
        assert!(response.message.contains("couldn't find specific information"));
        assert!(response.confidence <= 0.3);
        assert!(response.citations.is_empty());
        assert!(response.retrieved_chunks.is_empty());
    }

    #[tokio::test]
    async fn test_answer_generation_error_falls_back() {
        let orchestrator = orchestrator_with(FailingCompletion);

        let response = orchestrator
            .answer(AnswerRequest {
                query: "How do I create a fund?".to_string(),
                session_id: Some("s3".to_string()),
                use_knowledge_base: true,
                options: AnswerOptions::default(),
            })
            .await
            .expect("answer");

        assert_eq!(response.metadata.fallback_applied, Some(true));
        assert!(response.confidence <= 0.3);
    }

    #[tokio::test]
    async fn test_conversation_persists_across_requests() {
        let orchestrator = orchestrator_with(StubCompletion {
            text: "To create a fund, submit form FC-1.".to_string(),
            finish_reason: FinishReason::Stop,
        });

        orchestrator
            .answer(AnswerRequest {
                query: "How do I create a fund?".to_string(),
                session_id: Some("s4".to_string()),
                use_knowledge_base: true,
                options: AnswerOptions::default(),
            })
            .await
            .expect("first answer");

        orchestrator
            .answer(AnswerRequest {
                query: "What is the next step?".to_string(),
                session_id: Some("s4".to_string()),
                use_knowledge_base: true,
                options: AnswerOptions::default(),
            })
            .await
            .expect("second answer");

        let conversation = orchestrator.load_conversation("s4").await.expect("load").expect("conversation exists");
        assert_eq!(conversation.len(), 4);
        assert_eq!(conversation.recent(4)[0].role, Role::User);
    }
}
