//! Output formatting for CLI commands.
//!
//! Supports text and JSON output formats. Grounded in the teacher's
//! `cli::output` module, generalized from buffer/context/peek formatting to
//! the source/ask/config surface this crate exposes.

use std::fmt::Write;

use serde::Serialize;

use crate::config::RagConfig;
use crate::core::Source;
use crate::error::Error;
use crate::orchestrator::RagResponse;
use crate::storage::StorageStats;

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable text output.
    Text,
    /// JSON output.
    Json,
    /// Newline-delimited JSON (NDJSON) for streaming.
    /// Each record is a single JSON object on its own line.
    Ndjson,
}

impl OutputFormat {
    /// Parses format from string.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => Self::Json,
            "ndjson" | "jsonl" | "stream" => Self::Ndjson,
            _ => Self::Text,
        }
    }

    /// Returns true if this format is a streaming format.
    #[must_use]
    pub const fn is_streaming(&self) -> bool {
        matches!(self, Self::Ndjson)
    }
}

/// Formats storage statistics.
#[must_use]
pub fn format_status(stats: &StorageStats, format: OutputFormat) -> String {
    if matches!(format, OutputFormat::Json | OutputFormat::Ndjson) {
        return format_json(stats).unwrap_or_else(|e| format!("{{\"error\":\"{e}\"}}"));
    }

    let mut out = String::new();
    let _ = writeln!(out, "Sources:              {}", stats.source_count);
    let _ = writeln!(out, "Chunks:                {}", stats.chunk_count);
    let _ = writeln!(out, "Embedded chunks:       {}", stats.embedded_chunk_count);
    let _ = writeln!(out, "Conversations:         {}", stats.conversation_count);
    let _ = writeln!(out, "Schema version:        {}", stats.schema_version);
    match stats.db_size {
        Some(size) => {
            let _ = writeln!(out, "Database size:         {}", format_size(size));
        }
        None => {
            let _ = writeln!(out, "Database size:         (in-memory)");
        }
    }
    out
}

/// Formats a list of sources.
#[must_use]
pub fn format_sources_list(sources: &[Source], format: OutputFormat) -> String {
    if matches!(format, OutputFormat::Json | OutputFormat::Ndjson) {
        return format_json(sources).unwrap_or_else(|e| format!("{{\"error\":\"{e}\"}}"));
    }

    if sources.is_empty() {
        return "No sources ingested yet.\n".to_string();
    }

    let mut out = String::new();
    for source in sources {
        let _ = writeln!(
            out,
            "{}  {:<10}  v{}  {}",
            source.source_id, source.status, source.version, source.title
        );
    }
    out
}

/// Formats a single source's metadata.
#[must_use]
pub fn format_source(source: &Source, format: OutputFormat) -> String {
    if matches!(format, OutputFormat::Json | OutputFormat::Ndjson) {
        return format_json(source).unwrap_or_else(|e| format!("{{\"error\":\"{e}\"}}"));
    }

    let mut out = String::new();
    let _ = writeln!(out, "Source ID:    {}", source.source_id);
    let _ = writeln!(out, "Title:        {}", source.title);
    let _ = writeln!(out, "Filename:     {}", source.filename);
    let _ = writeln!(out, "Type:         {}", source.document_type);
    let _ = writeln!(out, "Version:      {}", source.version);
    let _ = writeln!(out, "Status:       {}", source.status);
    if let Some(author) = &source.author {
        let _ = writeln!(out, "Author:       {author}");
    }
    let _ = writeln!(out, "Content hash: {}", source.content_hash);
    out
}

/// Formats the result of an ingest command.
#[must_use]
pub fn format_ingest_result(source: &Source, chunk_count: usize, format: OutputFormat) -> String {
    if matches!(format, OutputFormat::Json | OutputFormat::Ndjson) {
        #[derive(Serialize)]
        struct IngestResult<'a> {
            source: &'a Source,
            chunk_count: usize,
        }
        return format_json(&IngestResult { source, chunk_count }).unwrap_or_else(|e| format!("{{\"error\":\"{e}\"}}"));
    }

    format!(
        "Ingested {} ({}): {chunk_count} chunk{} written, source id {}\n",
        source.filename,
        source.document_type,
        if chunk_count == 1 { "" } else { "s" },
        source.source_id
    )
}

/// Formats an orchestrator response for the `ask` command.
#[must_use]
pub fn format_ask_response(response: &RagResponse, format: OutputFormat) -> String {
    if matches!(format, OutputFormat::Json | OutputFormat::Ndjson) {
        return format_json(response).unwrap_or_else(|e| format!("{{\"error\":\"{e}\"}}"));
    }

    let mut out = String::new();
    let _ = writeln!(out, "{}", response.message);
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "confidence: {:.2} ({})  session: {}",
        response.confidence, response.confidence_level, response.session_id
    );

    if !response.sources.is_empty() {
        let _ = writeln!(out, "sources:");
        for source in &response.sources {
            match source.page {
                Some(page) => {
                    let _ = writeln!(out, "  - {} (p. {page})", source.title);
                }
                None => {
                    let _ = writeln!(out, "  - {}", source.title);
                }
            }
        }
    }

    out
}

/// Formats the effective, layered configuration. There is no natural
/// plain-text rendering for a nested config tree, so text mode prints the
/// same pretty JSON as the structured formats.
#[must_use]
pub fn format_config(config: &RagConfig, _format: OutputFormat) -> String {
    format_json(config).unwrap_or_else(|e| format!("{{\"error\":\"{e}\"}}"))
}

/// Serializes a value to pretty-printed JSON.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn format_json<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(value)
}

/// Formats an error for display, honoring `format`.
#[must_use]
pub fn format_error(err: &Error, format: OutputFormat) -> String {
    match format {
        OutputFormat::Json | OutputFormat::Ndjson => {
            #[derive(Serialize)]
            struct ErrorBody {
                code: &'static str,
                message: String,
            }
            let body = ErrorBody {
                code: err.code(),
                message: err.to_string(),
            };
            format_json(&body).unwrap_or_else(|_| format!("{{\"code\":\"{}\",\"message\":\"{err}\"}}", err.code()))
        }
        OutputFormat::Text => err.to_string(),
    }
}

/// Formats a byte count as a human-readable size.
#[must_use]
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} {}", UNITS[unit])
    } else {
        format!("{size:.1} {}", UNITS[unit])
    }
}
