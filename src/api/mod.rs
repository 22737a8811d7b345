//! HTTP surface: the external interface described in the design notes'
//! `POST /chat/message`, `GET`/`DELETE /chat/history/:sessionId`,
//! `POST /chat/feedback`, and `GET`/`PUT /admin/rag/config` routes.
//!
//! Grounded in the teacher's CLI output layer for the typed-error-to-
//! response mapping convention (`cli::output::format_error`), generalized
//! from text/JSON CLI output to HTTP status codes: 400 for malformed
//! input, 429 for admission/quota rejection, 503 when the knowledge base
//! has no usable index, and 500 for everything else uncategorized.
//!
//! Request logging follows the same shape as `legalis-api`'s structured
//! logging middleware (method/uri/status/duration, escalated to `warn!`
//! on a server error), extended with a per-request correlation id so a
//! caller-visible `X-Correlation-Id` header can be matched back to the
//! `tracing` spans it was logged under.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Path, Query, Request, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::Instrument;

use crate::completion::CompletionClient;
use crate::config::RagConfig;
use crate::embedding::Embedder;
use crate::error::{Error, RetrievalError};
use crate::orchestrator::{AnswerOptions, AnswerRequest, RagOrchestrator, RagResponse};
use crate::storage::{FeedbackRecord, Storage};

/// Shared application state handed to every handler.
pub struct AppState<S: Storage + 'static, E: Embedder, C: CompletionClient> {
    /// The wired orchestrator.
    pub orchestrator: RagOrchestrator<S, E, C>,
    /// Storage pool, used directly by handlers that don't need the full
    /// orchestrator pipeline (history, feedback, admin config).
    pub storage: crate::storage::StoragePool<S>,
    /// Live config snapshot, shared with the orchestrator.
    pub config: Arc<arc_swap::ArcSwap<RagConfig>>,
}

/// Builds the full router over `state`.
pub fn router<S, E, C>(state: Arc<AppState<S, E, C>>) -> Router
where
    S: Storage + 'static,
    E: Embedder + 'static,
    C: CompletionClient + 'static,
{
    Router::new()
        .route("/chat/message", post(post_message::<S, E, C>))
        .route("/chat/history/{session_id}", get(get_history::<S, E, C>))
        .route("/chat/history/{session_id}", delete(delete_history::<S, E, C>))
        .route("/chat/feedback", post(post_feedback::<S, E, C>))
        .route("/admin/rag/config", get(get_config::<S, E, C>))
        .route("/admin/rag/config", put(put_config::<S, E, C>))
        .layer(middleware::from_fn(log_request))
        .with_state(state)
}

/// Header a caller presents its granted capabilities under, as a
/// comma-separated list (e.g. `system:configure, chat:write`).
const CAPABILITIES_HEADER: &str = "x-rag-capabilities";

/// The capability required to read or write the live configuration
/// snapshot via `/admin/rag/config`.
const CONFIGURE_CAPABILITY: &str = "system:configure";

/// Rejects the request with [`Error::Forbidden`] unless `headers` carries
/// `capability` in its [`CAPABILITIES_HEADER`] list.
fn require_capability(headers: &HeaderMap, capability: &str) -> Result<(), ApiError> {
    let granted = headers
        .get(CAPABILITIES_HEADER)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.split(',').map(str::trim).any(|c| c == capability));

    if granted {
        Ok(())
    } else {
        Err(Error::Forbidden { capability: capability.to_string() }.into())
    }
}

/// Generates a per-request correlation id, distinct from conversation
/// session ids, from the current time and a process-local counter hashed
/// through `sha2` to keep the format short and opaque.
fn new_correlation_id() -> String {
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
    format!("{:x}", hasher.finalize())[..16].to_string()
}

/// Wraps every request in a `tracing` span keyed by a correlation id, and
/// logs completion with the method, path, status and duration. Escalates
/// to `warn!` on a server error, matching the severity split in
/// `legalis-api`'s request logging middleware.
async fn log_request(req: Request, next: Next) -> Response {
    let correlation_id = new_correlation_id();
    let method = req.method().clone();
    let uri = req.uri().clone();
    let started = Instant::now();

    let span = tracing::info_span!("http_request", %correlation_id, %method, %uri);
    let mut response = next.run(req).instrument(span.clone()).await;

    let status = response.status();
    let duration_ms = started.elapsed().as_millis();
    {
        let _entered = span.enter();
        if status.is_server_error() {
            tracing::warn!(status = status.as_u16(), duration_ms, "request completed with server error");
        } else {
            tracing::info!(status = status.as_u16(), duration_ms, "request completed");
        }
    }

    if let Ok(value) = HeaderValue::from_str(&correlation_id) {
        response.headers_mut().insert("x-correlation-id", value);
    }
    response
}

/// `POST /chat/message` request body.
#[derive(Debug, Clone, Deserialize)]
pub struct PostMessageRequest {
    /// The user's question.
    pub message: String,
    /// Conversation session id; a new one is created if absent.
    #[serde(rename = "sessionId")]
    pub session_id: Option<String>,
    /// Whether to consult the knowledge base. Defaults to `true`.
    #[serde(rename = "useKnowledgeBase", default = "default_true")]
    pub use_knowledge_base: bool,
    /// Per-call option overrides.
    #[serde(default)]
    pub options: PostMessageOptions,
}

const fn default_true() -> bool {
    true
}

/// Per-call overrides accepted on `POST /chat/message`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PostMessageOptions {
    /// Caps the number of retrieved chunks for this call.
    #[serde(rename = "maxResults")]
    pub max_results: Option<usize>,
    /// Caps generated tokens for this call.
    #[serde(rename = "maxTokens")]
    pub max_tokens: Option<u32>,
    /// Overrides sampling temperature for this call.
    pub temperature: Option<f32>,
    /// Overrides the completion model for this call.
    pub model: Option<String>,
}

async fn post_message<S, E, C>(
    State(state): State<Arc<AppState<S, E, C>>>,
    Json(body): Json<PostMessageRequest>,
) -> Result<Json<RagResponse>, ApiError>
where
    S: Storage + 'static,
    E: Embedder + 'static,
    C: CompletionClient + 'static,
{
    let request = AnswerRequest {
        query: body.message,
        session_id: body.session_id,
        use_knowledge_base: body.use_knowledge_base,
        options: AnswerOptions {
            max_results: body.options.max_results,
            max_tokens: body.options.max_tokens,
            temperature: body.options.temperature,
            model: body.options.model,
        },
    };

    let response = state.orchestrator.answer(request).await?;
    Ok(Json(response))
}

/// Query parameters for `GET /chat/history/:sessionId`.
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryQuery {
    /// Maximum turns returned, most recent first after truncation.
    pub limit: Option<usize>,
}

async fn get_history<S, E, C>(
    State(state): State<Arc<AppState<S, E, C>>>,
    Path(session_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<crate::core::Conversation>, ApiError>
where
    S: Storage + 'static,
    E: Embedder + 'static,
    C: CompletionClient + 'static,
{
    let pool = state.storage.clone();
    let session_id_for_lookup = session_id.clone();
    let conversation = tokio::task::spawn_blocking(move || pool.with_storage(|s| s.load_conversation(&session_id_for_lookup)))
        .await
        .map_err(|e| Error::Internal { message: format!("history lookup task panicked: {e}") })??;

    let Some(mut conversation) = conversation else {
        return Err(Error::from(crate::error::InputError::SessionNotFound { session_id }).into());
    };

    if let Some(limit) = query.limit {
        let turns = conversation.recent(limit).to_vec();
        conversation.turns = turns;
    }

    Ok(Json(conversation))
}

async fn delete_history<S, E, C>(
    State(state): State<Arc<AppState<S, E, C>>>,
    Path(session_id): Path<String>,
) -> Result<StatusCode, ApiError>
where
    S: Storage + 'static,
    E: Embedder + 'static,
    C: CompletionClient + 'static,
{
    let pool = state.storage.clone();
    tokio::task::spawn_blocking(move || pool.with_storage(|s| s.delete_conversation(&session_id)))
        .await
        .map_err(|e| Error::Internal { message: format!("history delete task panicked: {e}") })??;

    Ok(StatusCode::NO_CONTENT)
}

/// `POST /chat/feedback` request body.
#[derive(Debug, Clone, Deserialize)]
pub struct PostFeedbackRequest {
    /// Session the feedback belongs to.
    #[serde(rename = "sessionId")]
    pub session_id: String,
    /// Identifier of the assistant message being rated.
    #[serde(rename = "messageId")]
    pub message_id: String,
    /// Star-style rating, typically 1-5.
    pub rating: i64,
    /// Optional free-text comment.
    #[serde(rename = "feedbackText")]
    pub feedback_text: Option<String>,
    /// Optional structured complaint categories.
    pub categories: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize)]
struct PostFeedbackResponse {
    id: i64,
}

async fn post_feedback<S, E, C>(
    State(state): State<Arc<AppState<S, E, C>>>,
    Json(body): Json<PostFeedbackRequest>,
) -> Result<Json<PostFeedbackResponse>, ApiError>
where
    S: Storage + 'static,
    E: Embedder + 'static,
    C: CompletionClient + 'static,
{
    let categories = body
        .categories
        .map(|c| serde_json::to_string(&c))
        .transpose()
        .map_err(|e| Error::Internal { message: format!("failed to encode feedback categories: {e}") })?;

    let record = FeedbackRecord {
        session_id: body.session_id,
        message_id: body.message_id,
        rating: body.rating,
        feedback_text: body.feedback_text,
        categories,
        quality_score: None,
    };

    let pool = state.storage.clone();
    let id = tokio::task::spawn_blocking(move || pool.with_storage(|s| s.record_feedback(&record)))
        .await
        .map_err(|e| Error::Internal { message: format!("feedback write task panicked: {e}") })??;

    Ok(Json(PostFeedbackResponse { id }))
}

async fn get_config<S, E, C>(
    State(state): State<Arc<AppState<S, E, C>>>,
    headers: HeaderMap,
) -> Result<Json<RagConfig>, ApiError>
where
    S: Storage + 'static,
    E: Embedder + 'static,
    C: CompletionClient + 'static,
{
    require_capability(&headers, CONFIGURE_CAPABILITY)?;
    Ok(Json((*state.config.load_full()).clone()))
}

async fn put_config<S, E, C>(
    State(state): State<Arc<AppState<S, E, C>>>,
    headers: HeaderMap,
    Json(new_config): Json<RagConfig>,
) -> Result<Json<RagConfig>, ApiError>
where
    S: Storage + 'static,
    E: Embedder + 'static,
    C: CompletionClient + 'static,
{
    require_capability(&headers, CONFIGURE_CAPABILITY)?;
    new_config.validate()?;
    state.config.store(Arc::new(new_config.clone()));
    Ok(Json(new_config))
}

/// Wraps [`Error`] for the `IntoResponse` impl, translating the typed
/// error hierarchy into a stable HTTP status and JSON body.
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

#[derive(Debug, Serialize)]
struct ApiErrorBody {
    code: &'static str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::Input(_) => StatusCode::BAD_REQUEST,
            Error::Overloaded { .. } | Error::Completion(crate::error::CompletionError::QuotaExceeded) => {
                StatusCode::TOO_MANY_REQUESTS
            }
            Error::Retrieval(RetrievalError::NoIndex) => StatusCode::SERVICE_UNAVAILABLE,
            Error::Storage(crate::error::StorageError::Timeout | crate::error::StorageError::ConnectionLost) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            Error::Config { .. } => StatusCode::BAD_REQUEST,
            Error::Forbidden { .. } => StatusCode::FORBIDDEN,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = ApiErrorBody {
            code: self.0.code(),
            message: self.0.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use tower::ServiceExt;

    use super::*;

    #[test]
    fn test_input_error_maps_to_bad_request() {
        let err: ApiError =
            Error::from(crate::error::InputError::InvalidQuery { reason: "empty".to_string() }).into();
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_no_index_maps_to_service_unavailable() {
        let err: ApiError = Error::from(RetrievalError::NoIndex).into();
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_overloaded_maps_to_too_many_requests() {
        let err: ApiError = Error::Overloaded { reason: "at capacity".to_string() }.into();
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[test]
    fn test_internal_maps_to_internal_server_error() {
        let err: ApiError = Error::Internal { message: "boom".to_string() }.into();
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_forbidden_maps_to_forbidden_status() {
        let err: ApiError = Error::Forbidden { capability: CONFIGURE_CAPABILITY.to_string() }.into();
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_require_capability_rejects_missing_header() {
        let headers = HeaderMap::new();
        let result = require_capability(&headers, CONFIGURE_CAPABILITY);
        assert!(result.is_err());
    }

    #[test]
    fn test_require_capability_rejects_unrelated_capability() {
        let mut headers = HeaderMap::new();
        headers.insert(CAPABILITIES_HEADER, HeaderValue::from_static("chat:write"));
        let result = require_capability(&headers, CONFIGURE_CAPABILITY);
        assert!(result.is_err());
    }

    #[test]
    fn test_require_capability_accepts_listed_capability() {
        let mut headers = HeaderMap::new();
        headers.insert(CAPABILITIES_HEADER, HeaderValue::from_static("chat:write, system:configure"));
        let result = require_capability(&headers, CONFIGURE_CAPABILITY);
        assert!(result.is_ok());
    }

    #[test]
    fn test_correlation_ids_are_unique_per_request() {
        let first = new_correlation_id();
        let second = new_correlation_id();
        assert_ne!(first, second);
        assert_eq!(first.len(), 16);
    }

    #[tokio::test]
    async fn test_log_request_sets_correlation_id_header() {
        let app = Router::new()
            .route("/ping", get(|| async { "pong" }))
            .layer(middleware::from_fn(log_request));

        let response = app
            .oneshot(axum::http::Request::builder().uri("/ping").body(axum::body::Body::empty()).expect("request"))
            .await
            .expect("response");

        assert!(response.headers().contains_key("x-correlation-id"));
    }
}
