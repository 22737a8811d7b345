//! Command-line argument parsing for `fund-ragd`.
//!
//! Grounded in the teacher's `cli::parser` (clap derive, a global `db_path`
//! plus a `format` flag shared by every subcommand), generalized from
//! buffer/context ingestion commands to the ingest/ask/serve/admin surface
//! this crate actually exposes.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Retrieval-augmented question answering over a fund-management document
/// corpus.
#[derive(Debug, Parser)]
#[command(name = "fund-ragd", version, about, long_about = None)]
pub struct Cli {
    /// Path to the `SQLite` database file.
    #[arg(long, env = "FUND_RAG_DB_PATH", global = true)]
    pub db_path: Option<PathBuf>,

    /// Path to a layered TOML configuration file.
    #[arg(long, env = "FUND_RAG_CONFIG_PATH", global = true)]
    pub config_path: Option<PathBuf>,

    /// Enables debug-level logging.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format: text, json, or ndjson.
    #[arg(long, default_value = "text", global = true)]
    pub format: String,

    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Resolves the effective database path: the explicit flag/env var, or
    /// the crate-wide default.
    #[must_use]
    pub fn get_db_path(&self) -> PathBuf {
        self.db_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(crate::storage::DEFAULT_DB_PATH))
    }

    /// Resolves the effective config file path: the explicit flag/env var,
    /// or `<platform config dir>/fund-rag/config.toml`. Returns `None` if
    /// neither is set and the platform config directory cannot be
    /// determined, in which case [`crate::config::RagConfig::load`] falls
    /// back to compiled-in defaults plus environment overrides.
    #[must_use]
    pub fn get_config_path(&self) -> Option<PathBuf> {
        self.config_path
            .clone()
            .or_else(|| dirs::config_dir().map(|dir| dir.join("fund-rag").join("config.toml")))
    }
}

/// Top-level operational commands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Initializes storage (creates the schema).
    Init {
        /// Re-initializes even if storage already exists.
        #[arg(long)]
        force: bool,
    },
    /// Prints storage statistics.
    Status,
    /// Deletes all stored sources, chunks, conversations and feedback.
    Reset {
        /// Skips the confirmation prompt.
        #[arg(short, long)]
        yes: bool,
    },
    /// Ingests a document: reads, chunks, embeds and stores it.
    Ingest {
        /// Path to the document file.
        file: PathBuf,
        /// Document type tag (e.g. "pdf", "markdown", "docx").
        #[arg(long, default_value = "markdown")]
        document_type: String,
        /// Overrides the title derived from the filename.
        #[arg(long)]
        title: Option<String>,
        /// Target chunk size in characters.
        #[arg(long, default_value_t = crate::chunking::DEFAULT_CHUNK_SIZE)]
        chunk_size: usize,
        /// Overlap between consecutive chunks, in characters.
        #[arg(long, default_value_t = crate::chunking::DEFAULT_OVERLAP)]
        overlap: usize,
    },
    /// Manages ingested source documents.
    Sources {
        /// The sources sub-command.
        #[command(subcommand)]
        command: SourcesCommand,
    },
    /// Asks a question against the knowledge base.
    Ask {
        /// The question text.
        query: String,
        /// Continues an existing conversation session.
        #[arg(long)]
        session: Option<String>,
        /// Skips retrieval and answers from the model alone.
        #[arg(long)]
        no_knowledge_base: bool,
        /// Caps the number of retrieved chunks for this call.
        #[arg(long)]
        max_results: Option<usize>,
    },
    /// Runs the HTTP API server.
    Serve {
        /// Bind address.
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        /// Bind port.
        #[arg(long, default_value_t = 8080)]
        port: u16,
    },
    /// Inspects runtime configuration.
    Config {
        /// The config sub-command.
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

/// Operations on ingested source documents.
#[derive(Debug, Subcommand)]
pub enum SourcesCommand {
    /// Lists all ingested sources.
    List,
    /// Shows a single source's metadata.
    Show {
        /// Source id.
        source_id: String,
    },
    /// Deletes a source and its chunks.
    Delete {
        /// Source id.
        source_id: String,
        /// Skips the confirmation prompt.
        #[arg(short, long)]
        yes: bool,
    },
}

/// Operations on runtime configuration.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Prints the effective, layered configuration.
    Show,
}
