//! CLI command implementations.
//!
//! Contains the business logic for each `fund-ragd` subcommand: storage
//! lifecycle (`init`/`status`/`reset`), document ingestion, source
//! management, ad-hoc question answering, the HTTP server, and
//! configuration inspection.

#![allow(clippy::too_many_lines)]
#![allow(clippy::option_if_let_else)]

use std::path::Path;
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::chunking::{ChunkerMetadata, create_chunker};
use crate::cli::output::{
    OutputFormat, format_ask_response, format_config, format_ingest_result, format_source,
    format_sources_list, format_status,
};
use crate::cli::parser::{Cli, Commands, ConfigCommand, SourcesCommand};
use crate::completion::{CompletionClientConfig, OpenAiCompletionClient};
use crate::config::RagConfig;
use crate::core::chunk::{DEFAULT_MAX_TOKENS, DEFAULT_MIN_QUALITY, DEFAULT_MIN_TOKENS};
use crate::embedding::{Embedder, create_embedder};
use crate::error::{CommandError, Result, StorageError};
use crate::io::read_file;
use crate::orchestrator::{AnswerOptions, AnswerRequest, RagOrchestrator};
use crate::prompt::PromptTemplate;
use crate::query::WordLists;
use crate::storage::{SqliteStorage, Storage, StoragePool};

/// Environment variable naming the completion provider's API key. The
/// underlying client is OpenAI-compatible, so this follows the provider's
/// own convention rather than the `FUND_RAG_` prefix used for this crate's
/// own settings.
const API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Environment variable overriding the completion provider's base URL, for
/// OpenAI-compatible proxies.
const API_BASE_ENV: &str = "OPENAI_API_BASE";

/// Executes the CLI command.
///
/// # Errors
///
/// Returns an error if the command's underlying operation fails, or if a
/// destructive command is invoked without its confirmation flag.
pub fn execute(cli: &Cli) -> Result<String> {
    let db_path = cli.get_db_path();
    let format = OutputFormat::parse(&cli.format);

    match &cli.command {
        Commands::Init { force } => cmd_init(&db_path, *force),
        Commands::Status => cmd_status(&db_path, format),
        Commands::Reset { yes } => cmd_reset(&db_path, *yes),
        Commands::Ingest { file, document_type, title, chunk_size, overlap } => {
            cmd_ingest(&db_path, file, document_type, title.as_deref(), *chunk_size, *overlap, format)
        }
        Commands::Sources { command } => cmd_sources(&db_path, command, format),
        Commands::Ask { query, session, no_knowledge_base, max_results } => {
            cmd_ask(cli, &db_path, query, session.as_deref(), *no_knowledge_base, *max_results, format)
        }
        Commands::Serve { host, port } => cmd_serve(cli, &db_path, host, *port),
        Commands::Config { command } => cmd_config(cli, command, format),
    }
}

/// Opens storage, requiring it to already be initialized.
fn open_storage(db_path: &Path) -> Result<SqliteStorage> {
    let storage = SqliteStorage::open(db_path)?;

    if !storage.is_initialized()? {
        return Err(StorageError::NotInitialized.into());
    }

    Ok(storage)
}

// ==================== Command Implementations ====================

fn cmd_init(db_path: &Path, force: bool) -> Result<String> {
    if db_path.exists() && !force {
        return Err(CommandError::ExecutionFailed(
            "Database already exists. Use --force to reinitialize.".to_string(),
        )
        .into());
    }

    if force && db_path.exists() {
        std::fs::remove_file(db_path)
            .map_err(|e| CommandError::ExecutionFailed(format!("failed to remove existing database: {e}")))?;
    }

    let mut storage = SqliteStorage::open(db_path)?;
    storage.init()?;

    Ok(format!("Initialized fund-rag database at: {}\n", db_path.display()))
}

fn cmd_status(db_path: &Path, format: OutputFormat) -> Result<String> {
    let storage = open_storage(db_path)?;
    let stats = storage.stats()?;
    Ok(format_status(&stats, format))
}

fn cmd_reset(db_path: &Path, yes: bool) -> Result<String> {
    if !yes {
        return Err(CommandError::ExecutionFailed(
            "Use --yes to confirm reset. This deletes all sources, chunks, conversations and feedback.".to_string(),
        )
        .into());
    }

    let mut storage = open_storage(db_path)?;
    storage.reset()?;

    Ok("fund-rag state reset successfully.\n".to_string())
}

#[allow(clippy::too_many_arguments)]
fn cmd_ingest(
    db_path: &Path,
    file: &Path,
    document_type: &str,
    title: Option<&str>,
    chunk_size: usize,
    overlap: usize,
    format: OutputFormat,
) -> Result<String> {
    let mut storage = open_storage(db_path)?;

    let content = read_file(file)?;
    let filename = file
        .file_name()
        .map_or_else(|| file.display().to_string(), |n| n.to_string_lossy().to_string());

    let mut source = crate::core::Source::new(filename, content.as_bytes()).with_document_type(document_type);
    if let Some(title) = title {
        source = source.with_title(title);
    }
    source.mark_processing();

    let source_row_id = storage.upsert_source(&source)?;

    let chunker = create_chunker("fixed")?;
    let metadata = ChunkerMetadata::with_size_and_overlap(chunk_size, overlap);
    let candidate_chunks = chunker.chunk(source_row_id, &content, Some(&metadata))?;

    let embedder = create_embedder()?;

    let mut written = 0usize;
    let mut skipped = 0usize;
    for mut chunk in candidate_chunks {
        if chunk.token_count < DEFAULT_MIN_TOKENS
            || chunk.token_count > DEFAULT_MAX_TOKENS
            || chunk.quality_score < DEFAULT_MIN_QUALITY
        {
            skipped += 1;
            continue;
        }

        let embedding = embedder.embed(&chunk.content)?;
        chunk.embedding = Some(embedding);
        storage.upsert(&chunk)?;
        written += 1;
    }

    source.mark_completed();
    storage.upsert_source(&source)?;

    let _ = skipped;
    Ok(format_ingest_result(&source, written, format))
}

fn cmd_sources(db_path: &Path, command: &SourcesCommand, format: OutputFormat) -> Result<String> {
    match command {
        SourcesCommand::List => {
            let storage = open_storage(db_path)?;
            let sources = storage.list_sources()?;
            Ok(format_sources_list(&sources, format))
        }
        SourcesCommand::Show { source_id } => {
            let storage = open_storage(db_path)?;
            let source = storage
                .get_source(source_id)?
                .ok_or_else(|| StorageError::SourceNotFound { identifier: source_id.clone() })?;
            Ok(format_source(&source, format))
        }
        SourcesCommand::Delete { source_id, yes } => {
            if !*yes {
                return Err(CommandError::ExecutionFailed(
                    "Use --yes to confirm deletion. This cascades to the source's chunks.".to_string(),
                )
                .into());
            }
            let mut storage = open_storage(db_path)?;
            storage.delete_source(source_id)?;
            Ok(format!("Deleted source {source_id} and its chunks.\n"))
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn cmd_ask(
    cli: &Cli,
    db_path: &Path,
    query: &str,
    session: Option<&str>,
    no_knowledge_base: bool,
    max_results: Option<usize>,
    format: OutputFormat,
) -> Result<String> {
    let runtime = tokio::runtime::Runtime::new()
        .map_err(|e| CommandError::ExecutionFailed(format!("failed to start async runtime: {e}")))?;

    runtime.block_on(async move {
        let orchestrator = build_orchestrator(cli, db_path)?;

        let request = AnswerRequest {
            query: query.to_string(),
            session_id: session.map(ToString::to_string),
            use_knowledge_base: !no_knowledge_base,
            options: AnswerOptions { max_results, max_tokens: None, temperature: None, model: None },
        };

        let response = orchestrator.answer(request).await?;
        Ok(format_ask_response(&response, format))
    })
}

fn cmd_serve(cli: &Cli, db_path: &Path, host: &str, port: u16) -> Result<String> {
    let runtime = tokio::runtime::Runtime::new()
        .map_err(|e| CommandError::ExecutionFailed(format!("failed to start async runtime: {e}")))?;

    runtime.block_on(async move {
        let config = config_snapshot(cli)?;
        let storage_pool = open_storage_pool(db_path)?;
        let embedder = Arc::new(create_embedder()?);
        let completion = Arc::new(build_completion_client(&config.load())?);
        let prompt_template = PromptTemplate::load(None);
        let word_lists = WordLists::load(None)?;

        let orchestrator =
            RagOrchestrator::new(Arc::clone(&config), storage_pool.clone(), embedder, completion, prompt_template, word_lists);

        let state = Arc::new(crate::api::AppState { orchestrator, storage: storage_pool, config });
        let app = crate::api::router(state);

        let addr = format!("{host}:{port}");
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| CommandError::ExecutionFailed(format!("failed to bind {addr}: {e}")))?;

        tracing::info!(%addr, "fund-ragd listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| CommandError::ExecutionFailed(format!("server error: {e}")))?;

        Ok("Server stopped.\n".to_string())
    })
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

fn cmd_config(cli: &Cli, command: &ConfigCommand, format: OutputFormat) -> Result<String> {
    match command {
        ConfigCommand::Show => {
            let config = RagConfig::load(cli.get_config_path().as_deref())?;
            Ok(format_config(&config, format))
        }
    }
}

/// Opens storage (requiring prior `init`) and wraps it in a bounded-wait
/// pool for sharing across the orchestrator and the HTTP handlers.
fn open_storage_pool(db_path: &Path) -> Result<StoragePool<SqliteStorage>> {
    let storage = open_storage(db_path)?;
    Ok(StoragePool::new(storage, crate::storage::pool::DEFAULT_ACQUIRE_TIMEOUT))
}

/// Loads the layered configuration and wraps it for atomic admin updates.
fn config_snapshot(cli: &Cli) -> Result<Arc<ArcSwap<RagConfig>>> {
    let config = RagConfig::load(cli.get_config_path().as_deref())?;
    Ok(Arc::new(ArcSwap::new(Arc::new(config))))
}

/// Builds an `OpenAiCompletionClient` from `config` and the process
/// environment.
///
/// # Errors
///
/// Returns [`CommandError::MissingArgument`] if `OPENAI_API_KEY` is unset.
fn build_completion_client(config: &RagConfig) -> Result<OpenAiCompletionClient> {
    let api_key = std::env::var(API_KEY_ENV)
        .map_err(|_| CommandError::MissingArgument(format!("{API_KEY_ENV} environment variable")))?;
    let base_url = std::env::var(API_BASE_ENV).ok();

    let completion_config =
        CompletionClientConfig { models: config.response.models.clone(), ..CompletionClientConfig::default() };

    Ok(OpenAiCompletionClient::new(&api_key, base_url.as_deref(), completion_config))
}

/// Builds a fully wired orchestrator for a single `ask` call.
fn build_orchestrator(
    cli: &Cli,
    db_path: &Path,
) -> Result<RagOrchestrator<SqliteStorage, Box<dyn Embedder>, OpenAiCompletionClient>> {
    let config = config_snapshot(cli)?;
    let storage_pool = open_storage_pool(db_path)?;
    let embedder = Arc::new(create_embedder()?);
    let completion = Arc::new(build_completion_client(&config.load())?);
    let prompt_template = PromptTemplate::load(None);
    let word_lists = WordLists::load(None)?;

    Ok(RagOrchestrator::new(config, storage_pool, embedder, completion, prompt_template, word_lists))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::parser::Cli as ParsedCli;
    use clap::Parser;
    use tempfile::TempDir;

    fn temp_db_path() -> (TempDir, std::path::PathBuf) {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("test.db");
        (dir, path)
    }

    #[test]
    fn test_init_then_status() {
        let (_dir, path) = temp_db_path();
        let init_out = cmd_init(&path, false).expect("init");
        assert!(init_out.contains("Initialized"));

        let status_out = cmd_status(&path, OutputFormat::Text).expect("status");
        assert!(status_out.contains("Sources:"));
    }

    #[test]
    fn test_init_twice_without_force_fails() {
        let (_dir, path) = temp_db_path();
        cmd_init(&path, false).expect("init");
        assert!(cmd_init(&path, false).is_err());
    }

    #[test]
    fn test_init_twice_with_force_succeeds() {
        let (_dir, path) = temp_db_path();
        cmd_init(&path, false).expect("init");
        assert!(cmd_init(&path, true).is_ok());
    }

    #[test]
    fn test_reset_without_yes_fails() {
        let (_dir, path) = temp_db_path();
        cmd_init(&path, false).expect("init");
        assert!(cmd_reset(&path, false).is_err());
    }

    #[test]
    fn test_reset_with_yes_succeeds() {
        let (_dir, path) = temp_db_path();
        cmd_init(&path, false).expect("init");
        assert!(cmd_reset(&path, true).is_ok());
    }

    #[test]
    fn test_status_before_init_fails() {
        let (_dir, path) = temp_db_path();
        assert!(cmd_status(&path, OutputFormat::Text).is_err());
    }

    #[test]
    fn test_ingest_and_list_sources() {
        let (dir, path) = temp_db_path();
        cmd_init(&path, false).expect("init");

        let doc_path = dir.path().join("guide.md");
        std::fs::write(&doc_path, "# Fund Creation Guide\n\nTo create a fund: submit form FC-1 to the registrar and await approval from the compliance desk before funding the initial subscription.\n").expect("write doc");

        let out = cmd_ingest(&path, &doc_path, "markdown", None, 3_000, 500, OutputFormat::Text).expect("ingest");
        assert!(out.contains("guide.md"));

        let list_out = cmd_sources(&path, &SourcesCommand::List, OutputFormat::Text).expect("list");
        assert!(list_out.contains("guide"));
    }

    #[test]
    fn test_sources_show_unknown_fails() {
        let (_dir, path) = temp_db_path();
        cmd_init(&path, false).expect("init");
        let result = cmd_sources(&path, &SourcesCommand::Show { source_id: "nope".to_string() }, OutputFormat::Text);
        assert!(result.is_err());
    }

    #[test]
    fn test_sources_delete_without_yes_fails() {
        let (_dir, path) = temp_db_path();
        cmd_init(&path, false).expect("init");
        let result = cmd_sources(
            &path,
            &SourcesCommand::Delete { source_id: "guide.md".to_string(), yes: false },
            OutputFormat::Text,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_config_show_returns_defaults() {
        let cli = ParsedCli::parse_from(["fund-ragd", "config", "show"]);
        let out = cmd_config(&cli, &ConfigCommand::Show, OutputFormat::Json).expect("config show");
        assert!(out.contains("retrieval"));
    }

    #[test]
    fn test_ask_without_api_key_surfaces_missing_argument() {
        let (dir, path) = temp_db_path();
        cmd_init(&path, false).expect("init");
        // SAFETY: test-only removal of an environment variable this process
        // does not rely on elsewhere; no other thread reads it concurrently
        // within this single-threaded test.
        unsafe {
            std::env::remove_var(API_KEY_ENV);
        }
        let cli = ParsedCli::parse_from(["fund-ragd", "--db-path", &path.to_string_lossy(), "ask", "how do I create a fund?"]);
        let result = cmd_ask(&cli, &path, "how do I create a fund?", None, false, None, OutputFormat::Text);
        assert!(result.is_err());
        drop(dir);
    }
}
