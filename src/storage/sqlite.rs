//! SQLite-backed vector store.
//!
//! Vectors are stored as little-endian `f32` BLOBs and ranked client-side.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use super::{Chunk, SearchResult, VectorStore, rank_by_similarity};
use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::error::RagError;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS embeddings (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    content      TEXT NOT NULL,
    content_hash TEXT NOT NULL,
    embedding    BLOB,
    created_at   TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_embeddings_hash ON embeddings(content_hash);
";

/// Vector store over a single SQLite database file.
pub struct SqliteVectorStore {
    conn: Mutex<Connection>,
}

impl SqliteVectorStore {
    /// Opens (or creates) a database file. Call [`Self::init`] before use.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::StoreUnavailable`] if the file cannot be opened.
    pub fn open(path: &Path) -> Result<Self, RagError> {
        let conn = Connection::open(path)?;
        debug!(path = %path.display(), "opened vector store");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Opens a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::StoreUnavailable`] on SQLite failure.
    pub fn in_memory() -> Result<Self, RagError> {
        Ok(Self {
            conn: Mutex::new(Connection::open_in_memory()?),
        })
    }

    /// Creates the schema if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::StoreUnavailable`] on SQLite failure.
    pub fn init(&self) -> Result<(), RagError> {
        self.lock()?.execute_batch(SCHEMA)?;
        info!("vector store schema ready");
        Ok(())
    }

    /// Loads a chunk by id.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::StoreUnavailable`] on SQLite failure.
    pub fn get(&self, id: i64) -> Result<Option<Chunk>, RagError> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT id, content, content_hash, embedding, created_at
                 FROM embeddings WHERE id = ?1",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, Option<Vec<u8>>>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                },
            )
            .optional()?;

        row.map(|(id, content, content_hash, blob, created_at)| {
            let created_at = DateTime::parse_from_rfc3339(&created_at)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|e| RagError::StoreUnavailable {
                    message: format!("invalid created_at for chunk {id}: {e}"),
                })?;
            Ok(Chunk {
                id,
                content,
                content_hash,
                embedding: blob.as_deref().map(blob_to_vec).unwrap_or_default(),
                created_at,
            })
        })
        .transpose()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, RagError> {
        self.conn.lock().map_err(|_| RagError::StoreUnavailable {
            message: "connection lock poisoned".to_string(),
        })
    }

    fn stored_dimension(conn: &Connection) -> Result<Option<usize>, RagError> {
        let len: Option<i64> = conn
            .query_row(
                "SELECT length(embedding) FROM embeddings WHERE embedding IS NOT NULL LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;
        Ok(len.and_then(|bytes| usize::try_from(bytes).ok()).map(|bytes| bytes / 4))
    }
}

/// SHA-256 of `content`, hex encoded.
#[must_use]
pub fn content_hash(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}

impl VectorStore for SqliteVectorStore {
    fn insert(&self, content: &str, embedding: &[f32]) -> Result<i64, RagError> {
        if embedding.is_empty() {
            return Err(RagError::Config {
                message: "cannot store an empty embedding".to_string(),
            });
        }

        let conn = self.lock()?;
        if let Some(dim) = Self::stored_dimension(&conn)?
            && dim != embedding.len()
        {
            return Err(RagError::Config {
                message: format!(
                    "embedding dimension {} does not match store dimension {dim}",
                    embedding.len()
                ),
            });
        }

        conn.execute(
            "INSERT INTO embeddings (content, content_hash, embedding, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                content,
                content_hash(content),
                vec_to_blob(embedding),
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn similarity_search(&self, query: &[f32], limit: usize) -> Result<Vec<SearchResult>, RagError> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, content, embedding FROM embeddings WHERE embedding IS NOT NULL",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Vec<u8>>(2)?,
            ))
        })?;

        let mut results = Vec::new();
        for row in rows {
            let (chunk_id, content, blob) = row?;
            let similarity = cosine_similarity(query, &blob_to_vec(&blob));
            results.push(SearchResult {
                chunk_id,
                content,
                similarity,
                rerank_score: None,
            });
        }

        let scanned = results.len();
        let ranked = rank_by_similarity(results, limit);
        debug!(scanned, returned = ranked.len(), "similarity search complete");
        Ok(ranked)
    }

    fn count(&self) -> Result<usize, RagError> {
        let n: i64 = self
            .lock()?
            .query_row("SELECT COUNT(*) FROM embeddings", [], |row| row.get(0))?;
        Ok(usize::try_from(n).unwrap_or(0))
    }
}

impl std::fmt::Debug for SqliteVectorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteVectorStore").finish_non_exhaustive()
    }
}
