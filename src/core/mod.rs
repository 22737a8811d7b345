//! Core domain models.
//!
//! This module contains the fundamental data structures used throughout the
//! RAG pipeline: sources, chunks, query analysis, retrieval results,
//! citations, confidence assessments, and conversations. These are pure
//! domain models with no I/O dependencies.

pub mod chunk;
pub mod citation;
pub mod confidence;
pub mod conversation;
pub mod query_analysis;
pub mod retrieval;
pub mod source;

pub use chunk::{Chunk, ContentType};
pub use citation::{Citation, CitationReport, InvalidReason};
pub use confidence::{ConfidenceAssessment, ConfidenceLevel, Issue, ReliabilityMetric, SubScores};
pub use conversation::{Conversation, Role, Turn};
pub use query_analysis::{Complexity, Intent, QueryAnalysis};
pub use retrieval::{ComponentScores, RetrievalResult, ScoredChunk, StrategyTag};
pub use source::{ProcessingStatus, Source};
