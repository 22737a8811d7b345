//! Completion Client: sends an assembled prompt to a chat-completion
//! provider and returns generated text plus generation metadata.
//!
//! Grounded in the teacher's `agent::provider::LlmProvider` trait and its
//! `agent::providers::openai::OpenAiProvider` implementation, generalized
//! from a single-model chat call to a primary-plus-fallback model list with
//! retry, a per-request timeout, and a bounded in-flight admission
//! controller (the teacher's `agent::orchestrator` fan-out uses the same
//! `tokio::sync::Semaphore` pattern for subcall concurrency).

use std::sync::Arc;
use std::time::Duration;

use async_openai::Client;
use async_openai::config::OpenAIConfig;
use async_openai::types::{
    ChatCompletionRequestMessage, ChatCompletionRequestUserMessage,
    ChatCompletionRequestUserMessageContent, CreateChatCompletionRequest,
};
use async_trait::async_trait;
use tokio::sync::Semaphore;

use crate::error::{CompletionError, Error, Result};

/// Why generation stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    /// The model completed its response naturally.
    Stop,
    /// The response was truncated at the token limit.
    Length,
    /// The provider's content filter intervened.
    ContentFilter,
    /// Generation failed.
    Error,
}

impl FinishReason {
    /// `finish_reason_score` from the confidence manager's generation
    /// sub-score formula: `stop=1.0, length=0.7, content_filter=0.3,
    /// error=0.0`.
    #[must_use]
    pub const fn score(self) -> f32 {
        match self {
            Self::Stop => 1.0,
            Self::Length => 0.7,
            Self::ContentFilter => 0.3,
            Self::Error => 0.0,
        }
    }

    fn from_provider_str(raw: &str) -> Self {
        match raw.to_lowercase().as_str() {
            "stop" => Self::Stop,
            "length" => Self::Length,
            "content_filter" => Self::ContentFilter,
            _ => Self::Error,
        }
    }
}

impl std::fmt::Display for FinishReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Stop => "stop",
            Self::Length => "length",
            Self::ContentFilter => "content_filter",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

/// Per-call generation options.
#[derive(Debug, Clone)]
pub struct CompletionOptions {
    /// Maximum tokens to generate.
    pub max_tokens: Option<u32>,
    /// Sampling temperature in `[0, 2]`.
    pub temperature: Option<f32>,
    /// Model override; if absent, the client's configured primary model
    /// (and fallback list) is used.
    pub model: Option<String>,
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self {
            max_tokens: Some(800),
            temperature: Some(0.2),
            model: None,
        }
    }
}

/// The result of a single `complete` call.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionResponse {
    /// Generated text.
    pub text: String,
    /// Why generation stopped.
    pub finish_reason: FinishReason,
    /// The model that actually produced the response (may differ from the
    /// requested model if the client fell back).
    pub model: String,
    /// Tokens consumed by this call, including the prompt.
    pub tokens_used: u32,
}

/// Trait for chat-completion backends.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Generates a completion for `prompt`.
    ///
    /// # Errors
    ///
    /// Returns [`CompletionError::QuotaExceeded`], `Unauthorized`, or
    /// `ContentFiltered` as terminal errors; other transient failures are
    /// retried internally up to the configured retry budget.
    async fn complete(&self, prompt: &str, options: &CompletionOptions) -> Result<CompletionResponse>;
}

/// Tunable parameters for [`OpenAiCompletionClient`].
#[derive(Debug, Clone)]
pub struct CompletionClientConfig {
    /// Ordered model list: the first is tried first, subsequent entries
    /// are used if the prior one is rejected as unavailable.
    pub models: Vec<String>,
    /// Per-request timeout.
    pub request_timeout: Duration,
    /// Maximum retry attempts for transient failures, per model.
    pub max_retries: u32,
    /// Base delay for exponential backoff between retries.
    pub base_delay: Duration,
    /// Maximum number of in-flight completion calls.
    pub max_in_flight: usize,
    /// How long a call will wait for an admission slot before failing with
    /// [`Error::Overloaded`].
    pub admission_deadline: Duration,
}

impl Default for CompletionClientConfig {
    fn default() -> Self {
        Self {
            models: vec!["gpt-4o-mini".to_string()],
            request_timeout: Duration::from_secs(30),
            max_retries: 3,
            base_delay: Duration::from_millis(200),
            max_in_flight: 16,
            admission_deadline: Duration::from_secs(5),
        }
    }
}

/// OpenAI-compatible chat-completion client with model fallback, retry and
/// bounded admission control.
pub struct OpenAiCompletionClient {
    client: Client<OpenAIConfig>,
    config: CompletionClientConfig,
    admission: Arc<Semaphore>,
}

impl OpenAiCompletionClient {
    /// Creates a client against `api_key` (and optional `base_url` for
    /// OpenAI-compatible proxies), configured per `config`.
    #[must_use]
    pub fn new(api_key: &str, base_url: Option<&str>, config: CompletionClientConfig) -> Self {
        let mut openai_config = OpenAIConfig::new().with_api_key(api_key);
        if let Some(base_url) = base_url {
            openai_config = openai_config.with_api_base(base_url);
        }

        let admission = Arc::new(Semaphore::new(config.max_in_flight));

        Self {
            client: Client::with_config(openai_config),
            config,
            admission,
        }
    }

    fn build_request(model: &str, prompt: &str, options: &CompletionOptions) -> CreateChatCompletionRequest {
        let messages = vec![ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage {
            content: ChatCompletionRequestUserMessageContent::Text(prompt.to_string()),
            name: None,
        })];

        CreateChatCompletionRequest {
            model: model.to_string(),
            messages,
            temperature: options.temperature,
            max_completion_tokens: options.max_tokens,
            ..Default::default()
        }
    }

    async fn call_model(&self, model: &str, prompt: &str, options: &CompletionOptions) -> Result<CompletionResponse> {
        let request = Self::build_request(model, prompt, options);

        let call = self.client.chat().create(request);
        let outcome = tokio::time::timeout(self.config.request_timeout, call)
            .await
            .map_err(|_| CompletionError::Transient("request timed out".to_string()))?;

        let response = outcome.map_err(|e| classify_openai_error(e, model))?;

        let choice = response.choices.first();
        let text = choice.and_then(|c| c.message.content.clone()).unwrap_or_default();
        let finish_reason = choice
            .and_then(|c| c.finish_reason.as_ref())
            .map_or(FinishReason::Stop, |fr| FinishReason::from_provider_str(&format!("{fr:?}")));

        let tokens_used = response.usage.map_or(0, |u| u.total_tokens);

        Ok(CompletionResponse {
            text,
            finish_reason,
            model: response.model,
            tokens_used,
        })
    }

    fn backoff_delay(&self, attempt: u32) -> Duration {
        let exp = self.config.base_delay.saturating_mul(1 << attempt.min(16));
        let jitter = 0.5 + (attempt.wrapping_mul(2_654_435_761) % 500) as f32 / 1000.0;
        exp.mul_f32(jitter)
    }
}

fn classify_openai_error(err: async_openai::error::OpenAIError, model: &str) -> Error {
    let message = err.to_string();
    let lower = message.to_lowercase();

    if lower.contains("quota") || lower.contains("billing") {
        CompletionError::QuotaExceeded.into()
    } else if lower.contains("unauthorized") || lower.contains("invalid api key") || lower.contains("401") {
        CompletionError::Unauthorized.into()
    } else if lower.contains("content") && lower.contains("filter") {
        CompletionError::ContentFiltered.into()
    } else if lower.contains("model") && (lower.contains("not found") || lower.contains("unavailable")) {
        CompletionError::ModelUnavailable { model: model.to_string() }.into()
    } else {
        CompletionError::Transient(message).into()
    }
}

const fn is_retryable(err: &Error) -> bool {
    matches!(err, Error::Completion(CompletionError::Transient(_)))
}

const fn is_model_unavailable(err: &Error) -> bool {
    matches!(err, Error::Completion(CompletionError::ModelUnavailable { .. }))
}

#[async_trait]
impl CompletionClient for OpenAiCompletionClient {
    async fn complete(&self, prompt: &str, options: &CompletionOptions) -> Result<CompletionResponse> {
        let permit = tokio::time::timeout(self.config.admission_deadline, self.admission.acquire())
            .await
            .map_err(|_| Error::Overloaded {
                reason: "completion client at capacity".to_string(),
            })?
            .map_err(|_| Error::Overloaded {
                reason: "completion admission semaphore closed".to_string(),
            })?;

        let requested_models: Vec<String> = options
            .model
            .clone()
            .map_or_else(|| self.config.models.clone(), |m| vec![m]);

        let mut last_err = Error::Internal {
            message: "no completion model configured".to_string(),
        };

        for model in &requested_models {
            let mut attempt = 0;
            loop {
                match self.call_model(model, prompt, options).await {
                    Ok(response) => {
                        drop(permit);
                        return Ok(response);
                    }
                    Err(err) if attempt < self.config.max_retries && is_retryable(&err) => {
                        tokio::time::sleep(self.backoff_delay(attempt)).await;
                        attempt += 1;
                    }
                    Err(err) if is_model_unavailable(&err) => {
                        last_err = err;
                        break;
                    }
                    Err(err) => {
                        drop(permit);
                        return Err(err);
                    }
                }
            }
        }

        drop(permit);
        Err(last_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finish_reason_scores() {
        assert_eq!(FinishReason::Stop.score(), 1.0);
        assert_eq!(FinishReason::Length.score(), 0.7);
        assert_eq!(FinishReason::ContentFilter.score(), 0.3);
        assert_eq!(FinishReason::Error.score(), 0.0);
    }

    #[test]
    fn test_finish_reason_from_provider_str() {
        assert_eq!(FinishReason::from_provider_str("Stop"), FinishReason::Stop);
        assert_eq!(FinishReason::from_provider_str("LENGTH"), FinishReason::Length);
        assert_eq!(FinishReason::from_provider_str("content_filter"), FinishReason::ContentFilter);
        assert_eq!(FinishReason::from_provider_str("weird"), FinishReason::Error);
    }

    #[test]
    fn test_classify_quota_error() {
        let err = async_openai::error::OpenAIError::ApiError(async_openai::error::ApiError {
            message: "You exceeded your current quota".to_string(),
            r#type: None,
            param: None,
            code: None,
        });
        assert!(matches!(
            classify_openai_error(err, "gpt-4o-mini"),
            Error::Completion(CompletionError::QuotaExceeded)
        ));
    }

    #[test]
    fn test_classify_unauthorized_error() {
        let err = async_openai::error::OpenAIError::ApiError(async_openai::error::ApiError {
            message: "401 Unauthorized: invalid api key".to_string(),
            r#type: None,
            param: None,
            code: None,
        });
        assert!(matches!(
            classify_openai_error(err, "gpt-4o-mini"),
            Error::Completion(CompletionError::Unauthorized)
        ));
    }

    #[test]
    fn test_default_config_has_one_model() {
        let config = CompletionClientConfig::default();
        assert_eq!(config.models.len(), 1);
    }
}
