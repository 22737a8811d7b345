//! # fund-rag
//!
//! Retrieval-augmented question answering over a fund-management document
//! corpus.
//!
//! `fund-rag` chunks and indexes fund-operations source documents, then
//! answers natural-language questions against them: analyzing the query,
//! retrieving relevant passages (vector, lexical, or hybrid search),
//! assembling a grounded prompt, generating a response, validating its
//! citations against the retrieved chunks, scoring confidence, and falling
//! back to a safe canned response when that confidence is too low.
//!
//! ## Modules
//!
//! - [`core`]: pure domain types shared across the pipeline.
//! - [`chunking`]: ingestion-time text segmentation.
//! - [`embedding`]: embedding generation, caching and retry.
//! - [`storage`]: the `SQLite`-backed persistence layer.
//! - [`query`]: the Query Analyzer.
//! - [`retriever`]: the Retriever.
//! - [`prompt`]: the Prompt Assembler.
//! - [`completion`]: the Completion Client.
//! - [`citation`]: the Citation Extractor/Validator.
//! - [`confidence`]: the Confidence Manager.
//! - [`orchestrator`]: wires the above into a single `answer` call.
//! - [`config`]: runtime configuration, admin-editable at runtime.
//! - [`api`]: the HTTP surface.
//! - [`cli`]: ingestion and operational commands.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
// Memory-mapped I/O (memmap2) needs unsafe; confined to `io::reader`.
#![warn(unsafe_code)]

pub mod api;
pub mod chunking;
pub mod citation;
pub mod cli;
pub mod completion;
pub mod confidence;
pub mod config;
pub mod core;
pub mod embedding;
pub mod error;
pub mod io;
pub mod orchestrator;
pub mod prompt;
pub mod query;
pub mod retriever;
pub mod storage;

pub use cli::Cli;
pub use config::RagConfig;
pub use error::{Error, Result};
pub use orchestrator::{AnswerOptions, AnswerRequest, RagOrchestrator, RagResponse};
pub use storage::{DEFAULT_DB_PATH, SqliteStorage, Storage};

#[cfg(feature = "fastembed-embeddings")]
pub use embedding::FastEmbedEmbedder;
pub use embedding::{DEFAULT_DIMENSIONS, Embedder, FallbackEmbedder, cosine_similarity, create_embedder};
