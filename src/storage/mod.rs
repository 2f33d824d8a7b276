//! Vector store abstraction.
//!
//! Chunks are written during ingestion and read-only to the query path.
//! [`VectorStore::similarity_search`] ranks by cosine similarity,
//! descending, and never returns more than `limit` results.

mod sqlite;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use sqlite::{SqliteVectorStore, content_hash};

use crate::error::RagError;

/// A stored unit of source text paired with its embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Row id.
    pub id: i64,
    /// Chunk text.
    pub content: String,
    /// SHA-256 of `content`, hex encoded.
    pub content_hash: String,
    /// Embedding vector; constant length within a store.
    pub embedding: Vec<f32>,
    /// Insertion time.
    pub created_at: DateTime<Utc>,
}

/// One ranked search hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Id of the matched chunk.
    #[serde(rename = "id")]
    pub chunk_id: i64,
    /// Chunk text.
    pub content: String,
    /// Cosine similarity to the query, in `[-1, 1]`.
    pub similarity: f32,
    /// Cross-encoder score, present after a successful rerank.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rerank_score: Option<f32>,
}

/// Storage backend for embedded chunks.
pub trait VectorStore: Send + Sync {
    /// Stores a chunk and returns its id.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::StoreUnavailable`] on backend failure and
    /// [`RagError::Config`] for an empty vector or one whose length
    /// differs from the stored vectors.
    fn insert(&self, content: &str, embedding: &[f32]) -> Result<i64, RagError>;

    /// Returns up to `limit` chunks ranked by cosine similarity, descending.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::StoreUnavailable`] when the backend cannot be queried.
    fn similarity_search(&self, query: &[f32], limit: usize) -> Result<Vec<SearchResult>, RagError>;

    /// Number of stored chunks.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::StoreUnavailable`] on backend failure.
    fn count(&self) -> Result<usize, RagError>;
}

/// Sorts by similarity descending (stable for ties) and keeps `limit`.
pub(crate) fn rank_by_similarity(mut results: Vec<SearchResult>, limit: usize) -> Vec<SearchResult> {
    results.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
    results.truncate(limit);
    results
}
