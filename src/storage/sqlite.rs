//! `SQLite` storage implementation.
//!
//! Provides persistent storage using `SQLite` with proper transaction
//! management and migration support.

// SQLite stores all integers as i64. These casts are intentional and safe
// because we only store non-negative values that fit in usize.
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]

use crate::core::{Chunk, ContentType, Conversation, ProcessingStatus, Role, Source, Turn};
use crate::error::{Result, StorageError};
use crate::storage::schema::{
    CHECK_SCHEMA_SQL, CURRENT_SCHEMA_VERSION, GET_VERSION_SQL, SCHEMA_SQL, SET_VERSION_SQL,
};
use crate::storage::traits::{ChunkFilter, FeedbackRecord, ScoredRow, Storage, StorageStats};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::{Path, PathBuf};

/// Default embedding dimensionality enforced by [`SqliteStorage::search_vector`]
/// and [`SqliteStorage::upsert`].
pub const DEFAULT_DIMENSIONS: usize = 384;

/// `SQLite`-based storage implementation.
///
/// Provides persistent storage for RAG state with full ACID guarantees. A
/// single connection is used; concurrent access is serialized by the caller
/// (see `storage::pool`), matching the teacher's single-connection model.
///
/// # Examples
///
/// ```no_run
/// use fund_rag::storage::{SqliteStorage, Storage};
///
/// let mut storage = SqliteStorage::open("fund-rag.db").unwrap();
/// storage.init().unwrap();
/// ```
pub struct SqliteStorage {
    /// `SQLite` connection.
    conn: Connection,
    /// Path to the database file (None for in-memory).
    path: Option<PathBuf>,
    /// Embedding dimensionality this store enforces.
    dimensions: usize,
}

impl SqliteStorage {
    /// Opens or creates a `SQLite` database at the given path.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the database file. Parent directory must exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or initialized.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StorageError::Database(e.to_string()))?;
            }
        }

        let conn = Connection::open(&path).map_err(StorageError::from)?;

        conn.execute("PRAGMA foreign_keys = ON;", [])
            .map_err(StorageError::from)?;

        let _: String = conn
            .query_row("PRAGMA journal_mode = WAL;", [], |row| row.get(0))
            .map_err(StorageError::from)?;

        Ok(Self {
            conn,
            path: Some(path),
            dimensions: DEFAULT_DIMENSIONS,
        })
    }

    /// Creates an in-memory `SQLite` database.
    ///
    /// Useful for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be created.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(StorageError::from)?;
        conn.execute("PRAGMA foreign_keys = ON;", [])
            .map_err(StorageError::from)?;

        Ok(Self {
            conn,
            path: None,
            dimensions: DEFAULT_DIMENSIONS,
        })
    }

    /// Overrides the embedding dimensionality this store enforces.
    #[must_use]
    pub const fn with_dimensions(mut self, dimensions: usize) -> Self {
        self.dimensions = dimensions;
        self
    }

    /// Returns the database path (None for in-memory).
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Gets the current schema version.
    fn get_schema_version(&self) -> Result<Option<u32>> {
        let version: Option<String> = self
            .conn
            .query_row(GET_VERSION_SQL, [], |row| row.get(0))
            .optional()
            .map_err(StorageError::from)?;

        Ok(version.and_then(|v| v.parse().ok()))
    }

    /// Sets the schema version.
    fn set_schema_version(&self, version: u32) -> Result<()> {
        self.conn
            .execute(SET_VERSION_SQL, params![version.to_string()])
            .map_err(StorageError::from)?;
        Ok(())
    }

    /// Returns current Unix timestamp.
    #[allow(clippy::cast_possible_wrap)]
    fn now() -> i64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0)
    }

    /// Looks up a source's internal row id by its opaque `source_id`.
    fn source_row_id(&self, source_id: &str) -> Result<Option<i64>> {
        self.conn
            .query_row(
                "SELECT id FROM sources WHERE source_id = ? ORDER BY version DESC LIMIT 1",
                params![source_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| StorageError::from(e).into())
    }

    fn row_to_chunk(row: &rusqlite::Row) -> rusqlite::Result<(Chunk, i64)> {
        let section_path_json: String = row.get(6)?;
        let section_path: Vec<String> = serde_json::from_str(&section_path_json).unwrap_or_default();
        let content_type_str: String = row.get(8)?;
        let content_type = parse_content_type(&content_type_str);
        let metadata_json: String = row.get(14)?;
        let metadata = serde_json::from_str(&metadata_json).unwrap_or_default();

        let id: i64 = row.get(0)?;
        let chunk = Chunk {
            id: Some(id),
            source_id: row.get(1)?,
            chunk_index: row.get::<_, i64>(2)? as usize,
            heading: row.get(3)?,
            subheading: row.get(4)?,
            page_number: row.get::<_, Option<i64>>(5)?.map(|v| v as u32),
            section_path,
            content: row.get(7)?,
            content_type,
            token_count: row.get::<_, i64>(9)? as usize,
            character_count: row.get::<_, i64>(10)? as usize,
            word_count: row.get::<_, i64>(11)? as usize,
            quality_score: row.get(12)?,
            embedding: None,
            lexical_field: row.get(13)?,
            metadata,
        };
        Ok((chunk, id))
    }

    /// Fetches and decodes the embedding blob for a chunk, if present.
    fn fetch_embedding(&self, chunk_id: i64) -> Result<Option<Vec<f32>>> {
        let bytes: Option<Vec<u8>> = self
            .conn
            .query_row(
                "SELECT embedding FROM chunk_embeddings WHERE chunk_id = ?",
                params![chunk_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(StorageError::from)?;

        Ok(bytes.map(|bytes| {
            bytes
                .chunks_exact(4)
                .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect()
        }))
    }

    const CHUNK_SELECT_COLUMNS: &'static str = "id, source_id, chunk_index, heading, subheading, \
        page_number, section_path, content, content_type, token_count, character_count, \
        word_count, quality_score, lexical_field, metadata";
}

fn parse_content_type(s: &str) -> ContentType {
    match s {
        "table" => ContentType::Table,
        "list" => ContentType::List,
        "code" => ContentType::Code,
        "definition" => ContentType::Definition,
        "procedure" => ContentType::Procedure,
        _ => ContentType::Text,
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if mag_a == 0.0 || mag_b == 0.0 {
        0.0
    } else {
        dot / (mag_a * mag_b)
    }
}

impl Storage for SqliteStorage {
    fn init(&mut self) -> Result<()> {
        let is_init: i64 = self
            .conn
            .query_row(CHECK_SCHEMA_SQL, [], |row| row.get(0))
            .map_err(StorageError::from)?;

        if is_init == 0 {
            self.conn
                .execute_batch(SCHEMA_SQL)
                .map_err(StorageError::from)?;
            self.set_schema_version(CURRENT_SCHEMA_VERSION)?;
        } else if let Some(current) = self.get_schema_version()? {
            if current < CURRENT_SCHEMA_VERSION {
                let migrations = crate::storage::schema::get_migrations_from(current);
                for migration in migrations {
                    self.conn
                        .execute_batch(migration.sql)
                        .map_err(|e| StorageError::Migration(e.to_string()))?;
                }
                self.set_schema_version(CURRENT_SCHEMA_VERSION)?;
            }
        }

        Ok(())
    }

    fn is_initialized(&self) -> Result<bool> {
        let count: i64 = self
            .conn
            .query_row(CHECK_SCHEMA_SQL, [], |row| row.get(0))
            .map_err(StorageError::from)?;
        Ok(count > 0)
    }

    fn reset(&mut self) -> Result<()> {
        self.conn
            .execute_batch(
                "DELETE FROM feedback;
                 DELETE FROM turns;
                 DELETE FROM conversations;
                 DELETE FROM chunk_embeddings;
                 DELETE FROM chunks_fts;
                 DELETE FROM chunks;
                 DELETE FROM sources;
                 DELETE FROM metadata;",
            )
            .map_err(StorageError::from)?;
        Ok(())
    }

    // ==================== Source Operations ====================

    fn upsert_source(&mut self, source: &Source) -> Result<i64> {
        self.conn
            .execute(
                r"
                INSERT INTO sources (
                    source_id, filename, title, author, version, content_hash,
                    document_type, status, created_at, updated_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(source_id, version) DO UPDATE SET
                    filename = excluded.filename,
                    title = excluded.title,
                    author = excluded.author,
                    content_hash = excluded.content_hash,
                    document_type = excluded.document_type,
                    status = excluded.status,
                    updated_at = excluded.updated_at
            ",
                params![
                    source.source_id,
                    source.filename,
                    source.title,
                    source.author,
                    source.version,
                    source.content_hash,
                    source.document_type,
                    source.status.to_string(),
                    source.created_at,
                    source.updated_at,
                ],
            )
            .map_err(StorageError::from)?;

        self.source_row_id(&source.source_id)?
            .ok_or_else(|| StorageError::SourceNotFound {
                identifier: source.source_id.clone(),
            })
            .map_err(|e| e.into())
    }

    fn get_source(&self, source_id: &str) -> Result<Option<Source>> {
        self.conn
            .query_row(
                r"
                SELECT id, source_id, filename, title, author, version, content_hash,
                       document_type, status, created_at, updated_at
                FROM sources WHERE source_id = ? ORDER BY version DESC LIMIT 1
            ",
                params![source_id],
                |row| {
                    let status_str: String = row.get(8)?;
                    Ok(Source {
                        id: Some(row.get(0)?),
                        source_id: row.get(1)?,
                        filename: row.get(2)?,
                        title: row.get(3)?,
                        author: row.get(4)?,
                        version: row.get::<_, i64>(5)? as u32,
                        content_hash: row.get(6)?,
                        document_type: row.get(7)?,
                        status: parse_status(&status_str),
                        created_at: row.get(9)?,
                        updated_at: row.get(10)?,
                    })
                },
            )
            .optional()
            .map_err(|e| StorageError::from(e).into())
    }

    fn list_sources(&self) -> Result<Vec<Source>> {
        let mut stmt = self
            .conn
            .prepare(
                r"
                SELECT id, source_id, filename, title, author, version, content_hash,
                       document_type, status, created_at, updated_at
                FROM sources ORDER BY created_at
            ",
            )
            .map_err(StorageError::from)?;

        let sources = stmt
            .query_map([], |row| {
                let status_str: String = row.get(8)?;
                Ok(Source {
                    id: Some(row.get(0)?),
                    source_id: row.get(1)?,
                    filename: row.get(2)?,
                    title: row.get(3)?,
                    author: row.get(4)?,
                    version: row.get::<_, i64>(5)? as u32,
                    content_hash: row.get(6)?,
                    document_type: row.get(7)?,
                    status: parse_status(&status_str),
                    created_at: row.get(9)?,
                    updated_at: row.get(10)?,
                })
            })
            .map_err(StorageError::from)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StorageError::from)?;

        Ok(sources)
    }

    fn delete_source(&mut self, source_id: &str) -> Result<()> {
        let tx = self.conn.transaction().map_err(StorageError::from)?;
        tx.execute(
            "DELETE FROM sources WHERE source_id = ?",
            params![source_id],
        )
        .map_err(StorageError::from)?;
        tx.commit().map_err(StorageError::from)?;
        Ok(())
    }

    // ==================== Chunk Store Operations ====================

    fn upsert(&mut self, chunk: &Chunk) -> Result<i64> {
        if let Some(embedding) = &chunk.embedding {
            if embedding.len() != self.dimensions {
                return Err(StorageError::DimensionMismatch {
                    actual: embedding.len(),
                    expected: self.dimensions,
                }
                .into());
            }
        }

        let now = Self::now();
        let section_path_json =
            serde_json::to_string(&chunk.section_path).map_err(StorageError::from)?;
        let metadata_json = serde_json::to_string(&chunk.metadata).map_err(StorageError::from)?;

        let tx = self.conn.transaction().map_err(StorageError::from)?;

        tx.execute(
            r"
            INSERT INTO chunks (
                source_id, chunk_index, heading, subheading, page_number,
                section_path, content, content_type, token_count,
                character_count, word_count, quality_score, lexical_field,
                metadata, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(source_id, chunk_index) DO UPDATE SET
                heading = excluded.heading,
                subheading = excluded.subheading,
                page_number = excluded.page_number,
                section_path = excluded.section_path,
                content = excluded.content,
                content_type = excluded.content_type,
                token_count = excluded.token_count,
                character_count = excluded.character_count,
                word_count = excluded.word_count,
                quality_score = excluded.quality_score,
                lexical_field = excluded.lexical_field,
                metadata = excluded.metadata
        ",
            params![
                chunk.source_id,
                chunk.chunk_index as i64,
                chunk.heading,
                chunk.subheading,
                chunk.page_number.map(i64::from),
                section_path_json,
                chunk.content,
                chunk.content_type.to_string(),
                chunk.token_count as i64,
                chunk.character_count as i64,
                chunk.word_count as i64,
                chunk.quality_score,
                chunk.lexical_field,
                metadata_json,
                now,
            ],
        )
        .map_err(StorageError::from)?;

        let chunk_id: i64 = tx
            .query_row(
                "SELECT id FROM chunks WHERE source_id = ? AND chunk_index = ?",
                params![chunk.source_id, chunk.chunk_index as i64],
                |row| row.get(0),
            )
            .map_err(StorageError::from)?;

        if let Some(embedding) = &chunk.embedding {
            let bytes: Vec<u8> = embedding.iter().flat_map(|f| f.to_le_bytes()).collect();
            tx.execute(
                r"
                INSERT OR REPLACE INTO chunk_embeddings (chunk_id, embedding, dimensions, model_id, created_at)
                VALUES (?, ?, ?, ?, ?)
            ",
                params![chunk_id, bytes, embedding.len() as i64, Option::<String>::None, now],
            )
            .map_err(StorageError::from)?;
        }

        tx.commit().map_err(StorageError::from)?;

        Ok(chunk_id)
    }

    fn delete_by_source(&mut self, source_id: &str) -> Result<()> {
        let tx = self.conn.transaction().map_err(StorageError::from)?;
        tx.execute(
            "DELETE FROM chunks WHERE source_id IN (SELECT id FROM sources WHERE source_id = ?)",
            params![source_id],
        )
        .map_err(StorageError::from)?;
        tx.execute(
            "DELETE FROM sources WHERE source_id = ?",
            params![source_id],
        )
        .map_err(StorageError::from)?;
        tx.commit().map_err(StorageError::from)?;
        Ok(())
    }

    fn search_vector(
        &self,
        query_vec: &[f32],
        k: usize,
        filter: &ChunkFilter,
    ) -> Result<Vec<ScoredRow>> {
        let (where_clause, sql_params) = build_filter_clause(filter);
        let sql = format!(
            "SELECT {cols}, e.embedding FROM chunks c \
             JOIN chunk_embeddings e ON e.chunk_id = c.id \
             JOIN sources s ON s.id = c.source_id \
             WHERE {where_clause}",
            cols = Self::CHUNK_SELECT_COLUMNS
                .split(", ")
                .map(|c| format!("c.{c}"))
                .collect::<Vec<_>>()
                .join(", "),
        );

        let mut stmt = self.conn.prepare(&sql).map_err(StorageError::from)?;

        let mut rows = stmt
            .query_map(rusqlite::params_from_iter(sql_params.iter()), |row| {
                let (chunk, _id) = Self::row_to_chunk(row)?;
                let bytes: Vec<u8> = row.get(15)?;
                Ok((chunk, bytes))
            })
            .map_err(StorageError::from)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StorageError::from)?;

        let mut scored: Vec<ScoredRow> = rows
            .drain(..)
            .filter_map(|(mut chunk, bytes)| {
                if bytes.len() != self.dimensions * 4 {
                    return None;
                }
                let embedding: Vec<f32> = bytes
                    .chunks_exact(4)
                    .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                    .collect();
                let sim = cosine_similarity(query_vec, &embedding);
                let score = (sim + 1.0) / 2.0;
                chunk.embedding = Some(embedding);
                Some(ScoredRow { chunk, score })
            })
            .collect();

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }

    fn search_lexical(
        &self,
        query_text: &str,
        k: usize,
        filter: &ChunkFilter,
    ) -> Result<Vec<ScoredRow>> {
        let (where_clause, mut sql_params) = build_filter_clause(filter);
        let sql = format!(
            "SELECT {cols}, -bm25(chunks_fts) as score FROM chunks c \
             JOIN chunks_fts ON chunks_fts.rowid = c.id \
             JOIN sources s ON s.id = c.source_id \
             WHERE chunks_fts MATCH ? AND {where_clause} \
             ORDER BY score DESC LIMIT ?",
            cols = Self::CHUNK_SELECT_COLUMNS
                .split(", ")
                .map(|c| format!("c.{c}"))
                .collect::<Vec<_>>()
                .join(", "),
        );

        let mut stmt = self.conn.prepare(&sql).map_err(StorageError::from)?;

        let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> =
            vec![Box::new(query_text.to_string())];
        params_vec.append(&mut sql_params);
        params_vec.push(Box::new(k as i64));

        let rows = stmt
            .query_map(rusqlite::params_from_iter(params_vec.iter()), |row| {
                let (chunk, id) = Self::row_to_chunk(row)?;
                let raw_score: f64 = row.get(15)?;
                Ok((chunk, id, raw_score))
            })
            .map_err(StorageError::from)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StorageError::from)?;

        let max_score = rows
            .iter()
            .map(|(_, _, s)| *s)
            .fold(f64::MIN, f64::max)
            .max(0.0);

        let mut out = Vec::with_capacity(rows.len());
        for (mut chunk, id, raw_score) in rows {
            chunk.embedding = self.fetch_embedding(id)?;
            let score = if max_score > 0.0 {
                (raw_score / max_score) as f32
            } else {
                0.0
            };
            out.push(ScoredRow { chunk, score });
        }

        Ok(out)
    }

    fn get_by_ids(&self, ids: &[i64]) -> Result<Vec<Chunk>> {
        let mut by_id = std::collections::HashMap::with_capacity(ids.len());

        for &id in ids {
            let sql = format!(
                "SELECT {cols} FROM chunks c WHERE c.id = ?",
                cols = Self::CHUNK_SELECT_COLUMNS
                    .split(", ")
                    .map(|c| format!("c.{c}"))
                    .collect::<Vec<_>>()
                    .join(", "),
            );
            let found: Option<Chunk> = self
                .conn
                .query_row(&sql, params![id], |row| {
                    let (chunk, _id) = Self::row_to_chunk(row)?;
                    Ok(chunk)
                })
                .optional()
                .map_err(StorageError::from)?;

            if let Some(mut chunk) = found {
                chunk.embedding = self.fetch_embedding(id)?;
                by_id.insert(id, chunk);
            }
        }

        Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
    }

    // ==================== Conversation Operations ====================

    fn append_turn(&mut self, session_id: &str, turn: &Turn) -> Result<()> {
        let now = Self::now();
        let tx = self.conn.transaction().map_err(StorageError::from)?;

        tx.execute(
            r"
            INSERT INTO conversations (session_id, created_at, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(session_id) DO UPDATE SET updated_at = excluded.updated_at
        ",
            params![session_id, now, now],
        )
        .map_err(StorageError::from)?;

        let next_index: i64 = tx
            .query_row(
                "SELECT COALESCE(MAX(turn_index), -1) + 1 FROM turns WHERE session_id = ?",
                params![session_id],
                |row| row.get(0),
            )
            .map_err(StorageError::from)?;

        let metadata_json = turn
            .metadata
            .as_ref()
            .map(std::string::ToString::to_string);

        tx.execute(
            r"
            INSERT INTO turns (session_id, turn_index, role, text, timestamp, metadata)
            VALUES (?, ?, ?, ?, ?, ?)
        ",
            params![
                session_id,
                next_index,
                turn.role.to_string(),
                turn.text,
                turn.timestamp,
                metadata_json,
            ],
        )
        .map_err(StorageError::from)?;

        tx.commit().map_err(StorageError::from)?;
        Ok(())
    }

    fn truncate_conversation(&mut self, session_id: &str, keep_last: usize) -> Result<()> {
        let keep_last = i64::try_from(keep_last).unwrap_or(i64::MAX);
        self.conn
            .execute(
                r"
                DELETE FROM turns
                WHERE session_id = ?1
                AND turn_index NOT IN (
                    SELECT turn_index FROM turns
                    WHERE session_id = ?1
                    ORDER BY turn_index DESC
                    LIMIT ?2
                )
            ",
                params![session_id, keep_last],
            )
            .map_err(StorageError::from)?;
        Ok(())
    }

    fn load_conversation(&self, session_id: &str) -> Result<Option<Conversation>> {
        let exists: bool = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM conversations WHERE session_id = ?",
                params![session_id],
                |row| row.get::<_, i64>(0),
            )
            .map_err(StorageError::from)?
            > 0;

        if !exists {
            return Ok(None);
        }

        let mut stmt = self
            .conn
            .prepare(
                "SELECT role, text, timestamp, metadata FROM turns \
                 WHERE session_id = ? ORDER BY turn_index",
            )
            .map_err(StorageError::from)?;

        let turns = stmt
            .query_map(params![session_id], |row| {
                let role_str: String = row.get(0)?;
                let metadata_str: Option<String> = row.get(3)?;
                Ok(Turn {
                    role: if role_str == "assistant" {
                        Role::Assistant
                    } else {
                        Role::User
                    },
                    text: row.get(1)?,
                    timestamp: row.get(2)?,
                    metadata: metadata_str.and_then(|s| serde_json::from_str(&s).ok()),
                })
            })
            .map_err(StorageError::from)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StorageError::from)?;

        Ok(Some(Conversation {
            session_id: session_id.to_string(),
            turns,
        }))
    }

    fn delete_conversation(&mut self, session_id: &str) -> Result<()> {
        self.conn
            .execute(
                "DELETE FROM conversations WHERE session_id = ?",
                params![session_id],
            )
            .map_err(StorageError::from)?;
        Ok(())
    }

    // ==================== Feedback Operations ====================

    fn record_feedback(&mut self, feedback: &FeedbackRecord) -> Result<i64> {
        let now = Self::now();
        self.conn
            .execute(
                r"
                INSERT INTO feedback (
                    session_id, message_id, rating, feedback_text, categories,
                    quality_score, created_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?)
            ",
                params![
                    feedback.session_id,
                    feedback.message_id,
                    feedback.rating,
                    feedback.feedback_text,
                    feedback.categories,
                    feedback.quality_score,
                    now,
                ],
            )
            .map_err(StorageError::from)?;

        Ok(self.conn.last_insert_rowid())
    }

    // ==================== Utility Operations ====================

    fn stats(&self) -> Result<StorageStats> {
        let source_count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM sources", [], |row| row.get(0))
            .map_err(StorageError::from)?;

        let chunk_count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))
            .map_err(StorageError::from)?;

        let embedded_chunk_count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM chunk_embeddings", [], |row| {
                row.get(0)
            })
            .map_err(StorageError::from)?;

        let conversation_count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM conversations", [], |row| row.get(0))
            .map_err(StorageError::from)?;

        let schema_version = self.get_schema_version()?.unwrap_or(0);

        let db_size = self
            .path
            .as_ref()
            .and_then(|p| std::fs::metadata(p).ok().map(|m| m.len()));

        Ok(StorageStats {
            source_count: source_count as usize,
            chunk_count: chunk_count as usize,
            embedded_chunk_count: embedded_chunk_count as usize,
            conversation_count: conversation_count as usize,
            schema_version,
            db_size,
        })
    }
}

fn parse_status(s: &str) -> ProcessingStatus {
    match s {
        "processing" => ProcessingStatus::Processing,
        "completed" => ProcessingStatus::Completed,
        "failed" => ProcessingStatus::Failed,
        _ => ProcessingStatus::Pending,
    }
}

/// Builds a SQL `WHERE` fragment (without the leading `WHERE`) and its bound
/// parameters from a [`ChunkFilter`]. Always includes at least `1 = 1` so the
/// fragment composes cleanly with an `AND`-joined caller.
#[allow(clippy::type_complexity)]
fn build_filter_clause(filter: &ChunkFilter) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
    let mut clauses = vec!["1 = 1".to_string()];
    let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

    if !filter.source_ids.is_empty() {
        let placeholders = filter.source_ids.iter().map(|_| "?").collect::<Vec<_>>().join(", ");
        clauses.push(format!("s.source_id IN ({placeholders})"));
        for id in &filter.source_ids {
            params.push(Box::new(id.clone()));
        }
    }

    if !filter.content_types.is_empty() {
        let placeholders = filter
            .content_types
            .iter()
            .map(|_| "?")
            .collect::<Vec<_>>()
            .join(", ");
        clauses.push(format!("c.content_type IN ({placeholders})"));
        for ct in &filter.content_types {
            params.push(Box::new(ct.to_string()));
        }
    }

    if let Some(min_quality) = filter.min_quality {
        clauses.push("c.quality_score >= ?".to_string());
        params.push(Box::new(f64::from(min_quality)));
    }

    (clauses.join(" AND "), params)
}
