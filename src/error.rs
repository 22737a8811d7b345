//! Error types for `fund-rag` operations.
//!
//! This module provides a comprehensive error hierarchy using `thiserror`
//! covering storage, chunking, I/O, CLI commands, and the query-time RAG
//! pipeline (embedding, retrieval, completion, orchestration). Typed errors
//! are returned, never raised as exceptions, so retry/fallback/cancellation
//! decisions stay explicit at every component boundary.

use thiserror::Error;

/// Result type alias for `fund-rag` operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type for `fund-rag` operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Request input is malformed or refers to unknown state.
    #[error("input error: {0}")]
    Input(#[from] InputError),

    /// Storage-related errors (database operations).
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Chunking-related errors (ingestion text processing).
    #[error("chunking error: {0}")]
    Chunking(#[from] ChunkingError),

    /// I/O errors (file operations).
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// CLI command errors.
    #[error("command error: {0}")]
    Command(#[from] CommandError),

    /// Embedder errors.
    #[error("embedder error: {0}")]
    Embedder(#[from] EmbedderError),

    /// Completion client errors.
    #[error("completion error: {0}")]
    Completion(#[from] CompletionError),

    /// Retrieval errors.
    #[error("retrieval error: {0}")]
    Retrieval(#[from] RetrievalError),

    /// Admission-controlled overload.
    #[error("overloaded: {reason}")]
    Overloaded {
        /// Why the request was rejected.
        reason: String,
    },

    /// Configuration errors.
    #[error("configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// The caller lacks a capability required for the requested operation.
    #[error("forbidden: missing capability {capability}")]
    Forbidden {
        /// The capability the caller was missing.
        capability: String,
    },

    /// Any uncategorized failure, logged with a request id and surfaced as
    /// a generic internal error.
    #[error("internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl Error {
    /// The stable error code surfaced to HTTP clients (never a raw provider
    /// string or stack trace).
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Input(InputError::InvalidQuery { .. }) => "invalid_query",
            Self::Input(InputError::SessionNotFound { .. }) => "session_not_found",
            Self::Storage(StorageError::DimensionMismatch { .. }) => "dimension_mismatch",
            Self::Storage(StorageError::IntegrityError(_)) => "integrity_error",
            Self::Storage(StorageError::Timeout) => "storage_timeout",
            Self::Storage(StorageError::ConnectionLost) => "connection_lost",
            Self::Storage(_) => "storage_error",
            Self::Chunking(_) => "chunking_error",
            Self::Io(_) => "io_error",
            Self::Command(_) => "command_error",
            Self::Embedder(EmbedderError::QuotaExceeded) | Self::Completion(CompletionError::QuotaExceeded) => {
                "quota_exceeded"
            }
            Self::Embedder(EmbedderError::Unauthorized) | Self::Completion(CompletionError::Unauthorized) => {
                "unauthorized"
            }
            Self::Embedder(EmbedderError::DimensionMismatch { .. }) => "dimension_mismatch",
            Self::Embedder(_) => "embedder_error",
            Self::Completion(CompletionError::ContentFiltered) => "content_filtered",
            Self::Completion(CompletionError::ModelUnavailable { .. }) => "model_unavailable",
            Self::Completion(_) => "completion_error",
            Self::Retrieval(RetrievalError::NoIndex) => "no_index",
            Self::Retrieval(_) => "retrieval_error",
            Self::Overloaded { .. } => "overloaded",
            Self::Config { .. } => "configuration_error",
            Self::Forbidden { .. } => "forbidden",
            Self::Internal { .. } => "internal_error",
        }
    }
}

/// Request-input errors.
#[derive(Error, Debug)]
pub enum InputError {
    /// The query string was empty or otherwise invalid.
    #[error("invalid query: {reason}")]
    InvalidQuery {
        /// Why the query was rejected.
        reason: String,
    },

    /// Referenced a session id with no known conversation state.
    #[error("session not found: {session_id}")]
    SessionNotFound {
        /// The session id that was not found.
        session_id: String,
    },
}

/// Storage-specific errors for database operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Database connection or query error.
    #[error("database error: {0}")]
    Database(String),

    /// Storage not initialized (init command not run).
    #[error("fund-rag storage not initialized. Run: fund-ragd init")]
    NotInitialized,

    /// Source not found by id.
    #[error("source not found: {identifier}")]
    SourceNotFound {
        /// Source id or filename that was not found.
        identifier: String,
    },

    /// Chunk not found by ID.
    #[error("chunk not found: {id}")]
    ChunkNotFound {
        /// Chunk ID that was not found.
        id: i64,
    },

    /// The underlying `SQLite` connection reported a busy/locked/unopenable
    /// or OS-level I/O failure. [`crate::storage::StoragePool::with_storage`]
    /// retries this locally with exponential backoff up to a configured
    /// ceiling before giving up and propagating it to the caller.
    #[error("storage connection lost")]
    ConnectionLost,

    /// A storage call exceeded its per-call timeout; surfaced to the caller.
    #[error("storage operation timed out")]
    Timeout,

    /// An embedding's dimension did not equal the configured `D`; fatal for
    /// the write that triggered it.
    #[error("embedding dimension {actual} does not match configured dimension {expected}")]
    DimensionMismatch {
        /// Dimension the write attempted to store.
        actual: usize,
        /// Configured dimension `D`.
        expected: usize,
    },

    /// A constraint violation on write (e.g. duplicate content-hash);
    /// fatal and non-retryable.
    #[error("integrity error: {0}")]
    IntegrityError(String),

    /// Schema migration error.
    #[error("migration error: {0}")]
    Migration(String),

    /// Transaction error.
    #[error("transaction error: {0}")]
    Transaction(String),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Vector search error (feature-gated).
    #[cfg(feature = "usearch-hnsw")]
    #[error("vector search error: {0}")]
    VectorSearch(String),
}

/// Chunking-specific errors for ingestion text processing.
#[derive(Error, Debug)]
pub enum ChunkingError {
    /// Invalid UTF-8 encountered at specific byte offset.
    #[error("invalid UTF-8 at byte offset {offset}")]
    InvalidUtf8 {
        /// Byte offset where invalid UTF-8 was found.
        offset: usize,
    },

    /// Chunk size exceeds maximum allowed.
    #[error("chunk size {size} exceeds maximum {max}")]
    ChunkTooLarge {
        /// Actual chunk size.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// Invalid chunk configuration.
    #[error("invalid chunk configuration: {reason}")]
    InvalidConfig {
        /// Reason the configuration is invalid.
        reason: String,
    },

    /// Overlap exceeds chunk size.
    #[error("overlap {overlap} must be less than chunk size {size}")]
    OverlapTooLarge {
        /// Overlap size.
        overlap: usize,
        /// Chunk size.
        size: usize,
    },

    /// Parallel processing error.
    #[error("parallel processing failed: {reason}")]
    ParallelFailed {
        /// Reason for failure.
        reason: String,
    },

    /// Semantic analysis error.
    #[error("semantic analysis failed: {0}")]
    SemanticFailed(String),

    /// Regex compilation error.
    #[error("regex error: {0}")]
    Regex(String),

    /// Unknown chunking strategy.
    #[error("unknown chunking strategy: {name}")]
    UnknownStrategy {
        /// Name of the unknown strategy.
        name: String,
    },
}

/// I/O-specific errors for file operations.
#[derive(Error, Debug)]
pub enum IoError {
    /// File not found.
    #[error("file not found: {path}")]
    FileNotFound {
        /// Path to the file that was not found.
        path: String,
    },

    /// Failed to read file.
    #[error("failed to read file: {path}: {reason}")]
    ReadFailed {
        /// Path to the file.
        path: String,
        /// Reason for failure.
        reason: String,
    },

    /// Failed to write file.
    #[error("failed to write file: {path}: {reason}")]
    WriteFailed {
        /// Path to the file.
        path: String,
        /// Reason for failure.
        reason: String,
    },

    /// Memory mapping error.
    #[error("memory mapping failed: {path}: {reason}")]
    MmapFailed {
        /// Path to the file.
        path: String,
        /// Reason for failure.
        reason: String,
    },

    /// Directory creation error.
    #[error("failed to create directory: {path}: {reason}")]
    DirectoryFailed {
        /// Path to the directory.
        path: String,
        /// Reason for failure.
        reason: String,
    },

    /// Path traversal security error.
    #[error("path traversal denied: {path}")]
    PathTraversal {
        /// Path that was denied.
        path: String,
    },

    /// Generic I/O error wrapper.
    #[error("I/O error: {0}")]
    Generic(String),
}

/// CLI command-specific errors.
#[derive(Error, Debug)]
pub enum CommandError {
    /// Unknown command.
    #[error("unknown command: {0}")]
    UnknownCommand(String),

    /// Invalid argument provided.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Missing required argument.
    #[error("missing required argument: {0}")]
    MissingArgument(String),

    /// Command execution failed.
    #[error("command execution failed: {0}")]
    ExecutionFailed(String),

    /// User cancelled operation.
    #[error("operation cancelled by user")]
    Cancelled,

    /// Output format error.
    #[error("output format error: {0}")]
    OutputFormat(String),
}

/// Embedder errors.
#[derive(Error, Debug)]
pub enum EmbedderError {
    /// Input was empty after whitespace trim.
    #[error("embedder input is empty")]
    EmptyInput,

    /// The embedding model returned a vector of the wrong length, or a
    /// non-finite component.
    #[error("embedder returned dimension {actual}, expected {expected}")]
    DimensionMismatch {
        /// Dimension actually returned.
        actual: usize,
        /// Configured dimension `D`.
        expected: usize,
    },

    /// Rate-limit, 5xx, or network failure; retried locally up to
    /// `max_retries` with jittered exponential backoff.
    #[error("transient embedder failure: {0}")]
    Transient(String),

    /// Authentication failed; not retried.
    #[error("embedder authentication failed")]
    Unauthorized,

    /// Quota or billing limit reached; not retried.
    #[error("embedder quota exceeded")]
    QuotaExceeded,
}

/// Completion client errors.
#[derive(Error, Debug)]
pub enum CompletionError {
    /// Rate-limit, 5xx, or network failure; retried locally up to
    /// `max_retries` with exponential backoff.
    #[error("transient completion failure: {0}")]
    Transient(String),

    /// Authentication failed; not retried.
    #[error("completion authentication failed")]
    Unauthorized,

    /// Quota or billing limit reached; not retried.
    #[error("completion quota exceeded")]
    QuotaExceeded,

    /// The provider filtered the generated content.
    #[error("completion content filtered")]
    ContentFiltered,

    /// The requested model was rejected as unavailable; the client falls
    /// back to the next configured model before surfacing this error.
    #[error("model unavailable: {model}")]
    ModelUnavailable {
        /// The model that was rejected.
        model: String,
    },

    /// The request's per-call timeout elapsed.
    #[error("completion request timed out")]
    Timeout,
}

/// Retrieval errors.
#[derive(Error, Debug)]
pub enum RetrievalError {
    /// Neither the vector nor the lexical index is available; the
    /// orchestrator must invoke a fallback.
    #[error("no retrieval index available")]
    NoIndex,

    /// Retrieval produced no candidate chunks; not itself an error, but
    /// modeled here so it can flow through the same `Result` plumbing as
    /// other retrieval outcomes.
    #[error("retrieval returned no results")]
    EmptyResult,
}

// Implement From traits for standard library and third-party errors.

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io(IoError::Generic(err.to_string()))
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Self::Storage(StorageError::from(err))
    }
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        if is_connection_lost(&err) {
            Self::ConnectionLost
        } else {
            Self::Database(err.to_string())
        }
    }
}

/// Classifies a `rusqlite` failure as a recoverable connection-loss
/// condition (the connection's underlying file handle is busy, locked,
/// unopenable, or failed at the OS I/O level) rather than a generic
/// query/constraint error. [`StoragePool::with_storage`](crate::storage::StoragePool::with_storage)
/// retries [`StorageError::ConnectionLost`] locally with backoff; every
/// other `rusqlite::Error` surfaces as [`StorageError::Database`] and is
/// not retried.
fn is_connection_lost(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error {
                code: rusqlite::ErrorCode::DatabaseBusy
                    | rusqlite::ErrorCode::DatabaseLocked
                    | rusqlite::ErrorCode::SystemIoFailure
                    | rusqlite::ErrorCode::CannotOpen
                    | rusqlite::ErrorCode::OperationInterrupted,
                ..
            },
            _,
        )
    )
}

impl From<regex::Error> for ChunkingError {
    fn from(err: regex::Error) -> Self {
        Self::Regex(err.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<std::string::FromUtf8Error> for ChunkingError {
    fn from(err: std::string::FromUtf8Error) -> Self {
        Self::InvalidUtf8 {
            offset: err.utf8_error().valid_up_to(),
        }
    }
}

impl From<std::str::Utf8Error> for ChunkingError {
    fn from(err: std::str::Utf8Error) -> Self {
        Self::InvalidUtf8 {
            offset: err.valid_up_to(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_internal() {
        let err = Error::Internal {
            message: "test error".to_string(),
        };
        assert_eq!(err.to_string(), "internal error: test error");
    }

    #[test]
    fn test_input_error_display() {
        let err = InputError::InvalidQuery {
            reason: "empty".to_string(),
        };
        assert_eq!(err.to_string(), "invalid query: empty");

        let err = InputError::SessionNotFound {
            session_id: "s1".to_string(),
        };
        assert_eq!(err.to_string(), "session not found: s1");
    }

    #[test]
    fn test_storage_error_display() {
        let err = StorageError::NotInitialized;
        assert!(err.to_string().contains("not initialized"));

        let err = StorageError::SourceNotFound {
            identifier: "fund-guide".to_string(),
        };
        assert_eq!(err.to_string(), "source not found: fund-guide");

        let err = StorageError::DimensionMismatch {
            actual: 256,
            expected: 384,
        };
        assert!(err.to_string().contains("256"));
        assert!(err.to_string().contains("384"));
    }

    #[test]
    fn test_database_busy_classified_as_connection_lost() {
        let err = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error {
                code: rusqlite::ErrorCode::DatabaseBusy,
                extended_code: 5,
            },
            Some("database is locked".to_string()),
        );
        assert!(matches!(StorageError::from(err), StorageError::ConnectionLost));
    }

    #[test]
    fn test_constraint_violation_not_classified_as_connection_lost() {
        let err = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error {
                code: rusqlite::ErrorCode::ConstraintViolation,
                extended_code: 19,
            },
            Some("UNIQUE constraint failed".to_string()),
        );
        assert!(matches!(StorageError::from(err), StorageError::Database(_)));
    }

    #[test]
    fn test_chunking_error_display() {
        let err = ChunkingError::InvalidUtf8 { offset: 42 };
        assert_eq!(err.to_string(), "invalid UTF-8 at byte offset 42");

        let err = ChunkingError::OverlapTooLarge {
            overlap: 100,
            size: 50,
        };
        assert_eq!(
            err.to_string(),
            "overlap 100 must be less than chunk size 50"
        );
    }

    #[test]
    fn test_io_error_display() {
        let err = IoError::FileNotFound {
            path: "/tmp/test.txt".to_string(),
        };
        assert_eq!(err.to_string(), "file not found: /tmp/test.txt");
    }

    #[test]
    fn test_command_error_display() {
        let err = CommandError::MissingArgument("--file".to_string());
        assert_eq!(err.to_string(), "missing required argument: --file");
    }

    #[test]
    fn test_embedder_error_display() {
        let err = EmbedderError::DimensionMismatch {
            actual: 100,
            expected: 384,
        };
        assert!(err.to_string().contains("100"));

        assert_eq!(
            EmbedderError::Unauthorized.to_string(),
            "embedder authentication failed"
        );
        assert_eq!(
            EmbedderError::QuotaExceeded.to_string(),
            "embedder quota exceeded"
        );
    }

    #[test]
    fn test_completion_error_display() {
        let err = CompletionError::ModelUnavailable {
            model: "gpt-5".to_string(),
        };
        assert_eq!(err.to_string(), "model unavailable: gpt-5");
        assert_eq!(
            CompletionError::ContentFiltered.to_string(),
            "completion content filtered"
        );
    }

    #[test]
    fn test_retrieval_error_display() {
        assert_eq!(
            RetrievalError::NoIndex.to_string(),
            "no retrieval index available"
        );
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_error_from_storage() {
        let storage_err = StorageError::NotInitialized;
        let err: Error = storage_err.into();
        assert!(matches!(err, Error::Storage(_)));
    }

    #[test]
    fn test_error_from_chunking() {
        let chunk_err = ChunkingError::InvalidUtf8 { offset: 0 };
        let err: Error = chunk_err.into();
        assert!(matches!(err, Error::Chunking(_)));
    }

    #[test]
    fn test_error_from_command() {
        let cmd_err = CommandError::Cancelled;
        let err: Error = cmd_err.into();
        assert!(matches!(err, Error::Command(_)));
    }

    #[test]
    fn test_error_from_embedder() {
        let err: Error = EmbedderError::Unauthorized.into();
        assert!(matches!(err, Error::Embedder(_)));
    }

    #[test]
    fn test_error_from_completion() {
        let err: Error = CompletionError::Timeout.into();
        assert!(matches!(err, Error::Completion(_)));
    }

    #[test]
    fn test_error_from_retrieval() {
        let err: Error = RetrievalError::NoIndex.into();
        assert!(matches!(err, Error::Retrieval(_)));
    }

    #[test]
    fn test_error_config() {
        let err = Error::Config {
            message: "bad config".to_string(),
        };
        assert_eq!(err.to_string(), "configuration error: bad config");
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(
            Error::Input(InputError::InvalidQuery {
                reason: "empty".to_string()
            })
            .code(),
            "invalid_query"
        );
        assert_eq!(
            Error::Completion(CompletionError::QuotaExceeded).code(),
            "quota_exceeded"
        );
        assert_eq!(
            Error::Overloaded {
                reason: "semaphore saturated".to_string()
            }
            .code(),
            "overloaded"
        );
        assert_eq!(Error::Retrieval(RetrievalError::NoIndex).code(), "no_index");
    }

    #[test]
    fn test_from_rusqlite_error_to_error() {
        let rusqlite_err = rusqlite::Error::InvalidQuery;
        let err: Error = rusqlite_err.into();
        assert!(matches!(err, Error::Storage(StorageError::Database(_))));
    }

    #[test]
    fn test_from_rusqlite_error_to_storage_error() {
        let rusqlite_err = rusqlite::Error::InvalidQuery;
        let err: StorageError = rusqlite_err.into();
        assert!(matches!(err, StorageError::Database(_)));
    }

    #[test]
    #[allow(clippy::invalid_regex)]
    fn test_from_regex_error_to_chunking_error() {
        let regex_err = regex::Regex::new("[invalid").unwrap_err();
        let err: ChunkingError = regex_err.into();
        assert!(matches!(err, ChunkingError::Regex(_)));
    }

    #[test]
    fn test_from_serde_json_error_to_storage_error() {
        let json_err: serde_json::Error = serde_json::from_str::<i32>("invalid").unwrap_err();
        let err: StorageError = json_err.into();
        assert!(matches!(err, StorageError::Serialization(_)));
    }

    #[test]
    fn test_from_string_utf8_error_to_chunking_error() {
        let invalid_bytes = vec![0xff, 0xfe];
        let utf8_err = String::from_utf8(invalid_bytes).unwrap_err();
        let err: ChunkingError = utf8_err.into();
        assert!(matches!(err, ChunkingError::InvalidUtf8 { .. }));
    }

    #[test]
    fn test_from_str_utf8_error_to_chunking_error() {
        let invalid_bytes: Vec<u8> = vec![0xff, 0xfe];
        let utf8_err = std::str::from_utf8(&invalid_bytes).unwrap_err();
        let err: ChunkingError = utf8_err.into();
        assert!(matches!(err, ChunkingError::InvalidUtf8 { .. }));
    }
}
