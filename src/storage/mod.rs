//! Storage layer for `fund-rag`.
//!
//! Provides persistent storage for sources, chunks (with embeddings and a
//! lexical full-text index), conversation turn logs, and feedback, backed by
//! `SQLite`. A single connection is used; callers share it through a
//! `parking_lot::Mutex`-guarded pool (see [`pool`]).

pub mod pool;
pub mod schema;
pub mod sqlite;
pub mod traits;

pub use pool::StoragePool;
pub use schema::{CURRENT_SCHEMA_VERSION, SCHEMA_SQL};
pub use sqlite::SqliteStorage;
pub use traits::{ChunkFilter, FeedbackRecord, ScoredRow, Storage, StorageStats};

#[cfg(feature = "usearch-hnsw")]
pub use traits::VectorIndex;

/// Default database file name.
pub const DEFAULT_DB_NAME: &str = "fund-rag.db";

/// Default database path relative to the configured data directory.
pub const DEFAULT_DB_PATH: &str = ".fund-rag/fund-rag.db";
