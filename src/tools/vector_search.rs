//! `vector_search`: embed the query, rank stored chunks by cosine
//! similarity, then rerank the candidates with the cross-encoder.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::info;

use super::{optional_count, required_query};
use crate::agent::tool::{Tool, ToolDefinition};
use crate::embedding::EmbeddingGateway;
use crate::error::RagError;
use crate::rerank::Reranker;
use crate::storage::{SearchResult, VectorStore};

/// Tool name.
pub const VECTOR_SEARCH: &str = "vector_search";
/// Default first-stage candidate count.
pub const DEFAULT_LIMIT: usize = 15;
/// Upper bound accepted for `limit`.
const MAX_LIMIT: usize = 100;

/// Successful `vector_search` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorSearchOutput {
    /// Always `true`; failures are reported as error payloads.
    pub success: bool,
    /// Final results, reranked when a model was available.
    pub results: Vec<SearchResult>,
    /// Number of final results.
    pub count: usize,
    /// Number of first-stage candidates.
    pub original_count: usize,
    /// Whether cross-encoder scores were applied.
    pub reranked: bool,
    /// Reranker model name, or `"passthrough"`.
    pub reranking_method: String,
}

/// Two-stage statute search.
pub struct VectorSearchTool {
    embedder: EmbeddingGateway,
    store: Arc<dyn VectorStore>,
    reranker: Reranker,
    default_limit: usize,
    top_k: usize,
}

impl VectorSearchTool {
    /// Creates the tool with the default candidate count and top-k.
    #[must_use]
    pub fn new(embedder: EmbeddingGateway, store: Arc<dyn VectorStore>, reranker: Reranker) -> Self {
        Self {
            embedder,
            store,
            reranker,
            default_limit: DEFAULT_LIMIT,
            top_k: crate::rerank::DEFAULT_TOP_K,
        }
    }

    /// Sets the candidate count used when the caller gives none.
    #[must_use]
    pub fn with_default_limit(mut self, limit: usize) -> Self {
        self.default_limit = limit.clamp(1, MAX_LIMIT);
        self
    }

    /// Sets the number of results kept after reranking.
    #[must_use]
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.max(1);
        self
    }

    /// Runs the search directly, outside the agent loop.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ServiceUnavailable`] when the query cannot be
    /// embedded and [`RagError::StoreUnavailable`] when the store fails.
    pub async fn search(&self, query: &str, limit: usize) -> Result<VectorSearchOutput, RagError> {
        info!(query, limit, "vector search");

        let vector = self.embedder.embed(query).await;
        if vector.is_empty() {
            return Err(RagError::ServiceUnavailable {
                service: "embedding".to_string(),
                message: "could not embed the query".to_string(),
            });
        }

        // The scan and the cross-encoder pass are CPU-bound; on the blocking
        // pool a caller's timeout can abandon them.
        let store = Arc::clone(&self.store);
        let reranker = self.reranker.clone();
        let owned_query = query.to_string();
        let top_k = self.top_k;
        let (original_count, results) = tokio::task::spawn_blocking(move || {
            let candidates = store.similarity_search(&vector, limit)?;
            let original_count = candidates.len();
            info!(original_count, "first-stage candidates");
            Ok::<_, RagError>((original_count, reranker.rerank(&owned_query, candidates, top_k)))
        })
        .await
        .map_err(|e| RagError::tool(VECTOR_SEARCH, format!("search task failed: {e}")))??;

        let reranked = results.iter().any(|r| r.rerank_score.is_some());

        Ok(VectorSearchOutput {
            success: true,
            count: results.len(),
            results,
            original_count,
            reranked,
            reranking_method: self.reranker.method().to_string(),
        })
    }
}

#[async_trait]
impl Tool for VectorSearchTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: VECTOR_SEARCH.to_string(),
            description: "Semantic search over Labor Standards Act articles. Retrieves candidate \
                          articles by vector similarity, reorders them with a cross-encoder and \
                          returns the most relevant ones."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "Search query describing the statutory question"
                    },
                    "limit": {
                        "type": "integer",
                        "description": "Number of candidates to retrieve before reranking",
                        "default": self.default_limit
                    }
                },
                "required": ["query"]
            }),
        }
    }

    async fn call(&self, arguments: Value) -> Result<Value, RagError> {
        let query = required_query(VECTOR_SEARCH, &arguments)?;
        let limit = optional_count(&arguments, "limit")
            .unwrap_or(self.default_limit)
            .clamp(1, MAX_LIMIT);
        let output = self.search(&query, limit).await?;
        serde_json::to_value(output).map_err(|e| RagError::tool(VECTOR_SEARCH, e.to_string()))
    }
}

impl std::fmt::Debug for VectorSearchTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorSearchTool")
            .field("embedder", &self.embedder)
            .field("reranker", &self.reranker)
            .field("default_limit", &self.default_limit)
            .field("top_k", &self.top_k)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::embedding::Embedder;
    use crate::rerank::{CrossEncoder, RerankerTier};
    use crate::storage::SqliteVectorStore;

    struct AxisEmbedder;

    #[async_trait]
    impl Embedder for AxisEmbedder {
        fn model(&self) -> &str {
            "axis"
        }

        async fn embed(&self, text: &str) -> Result<Vec<f32>, RagError> {
            if text.is_empty() {
                return Err(RagError::ServiceUnavailable {
                    service: "embedding".to_string(),
                    message: "empty".to_string(),
                });
            }
            Ok(vec![1.0, 0.0])
        }
    }

    struct LengthEncoder;

    impl CrossEncoder for LengthEncoder {
        fn name(&self) -> &str {
            "length"
        }

        #[allow(clippy::cast_precision_loss)]
        fn predict(&self, pairs: &[(String, String)]) -> Result<Vec<f32>, RagError> {
            Ok(pairs.iter().map(|(_, d)| d.chars().count() as f32).collect())
        }
    }

    struct LimitRecorder {
        inner: SqliteVectorStore,
        limits: Mutex<Vec<usize>>,
    }

    impl VectorStore for LimitRecorder {
        fn insert(&self, content: &str, embedding: &[f32]) -> Result<i64, RagError> {
            self.inner.insert(content, embedding)
        }

        fn similarity_search(&self, query: &[f32], limit: usize) -> Result<Vec<SearchResult>, RagError> {
            if let Ok(mut limits) = self.limits.lock() {
                limits.push(limit);
            }
            self.inner.similarity_search(query, limit)
        }

        fn count(&self) -> Result<usize, RagError> {
            self.inner.count()
        }
    }

    fn store() -> Arc<LimitRecorder> {
        let inner = SqliteVectorStore::in_memory().unwrap_or_else(|e| panic!("store: {e}"));
        inner.init().unwrap_or_else(|e| panic!("init: {e}"));
        for (i, content) in ["一", "一二三", "一二", "一二三四"].iter().enumerate() {
            #[allow(clippy::cast_precision_loss)]
            let angle = i as f32 * 0.1;
            inner
                .insert(content, &[angle.cos(), angle.sin()])
                .unwrap_or_else(|e| panic!("insert: {e}"));
        }
        Arc::new(LimitRecorder {
            inner,
            limits: Mutex::new(Vec::new()),
        })
    }

    fn tool(store: Arc<LimitRecorder>, reranker: Reranker) -> VectorSearchTool {
        VectorSearchTool::new(EmbeddingGateway::new(Arc::new(AxisEmbedder)), store, reranker).with_top_k(2)
    }

    #[tokio::test]
    async fn test_reranked_output_shape() {
        let reranker = Reranker::with_encoder(RerankerTier::Primary, Arc::new(LengthEncoder));
        let payload = tool(store(), reranker)
            .call(json!({"query": "工資"}))
            .await
            .unwrap_or_else(|e| panic!("call: {e}"));
        let output: VectorSearchOutput =
            serde_json::from_value(payload).unwrap_or_else(|e| panic!("decode: {e}"));

        assert!(output.success);
        assert!(output.reranked);
        assert_eq!(output.original_count, 4);
        assert_eq!(output.count, 2);
        assert_eq!(output.reranking_method, "length");
        let contents: Vec<&str> = output.results.iter().map(|r| r.content.as_str()).collect();
        assert_eq!(contents, ["一二三四", "一二三"]);
    }

    #[tokio::test]
    async fn test_passthrough_output_keeps_similarity_order() {
        let payload = tool(store(), Reranker::passthrough())
            .call(json!({"query": "工資", "limit": 3}))
            .await
            .unwrap_or_else(|e| panic!("call: {e}"));
        assert_eq!(payload["reranked"], false);
        assert_eq!(payload["reranking_method"], "passthrough");
        assert_eq!(payload["original_count"], 3);
        assert_eq!(payload["results"][0]["content"], "一");
        assert!(payload["results"][0].get("rerank_score").is_none());
    }

    #[tokio::test]
    async fn test_default_limit_used_when_absent() {
        let store = store();
        let _ = tool(store.clone(), Reranker::passthrough())
            .call(json!({"query": "工資"}))
            .await;
        let limits = store.limits.lock().map(|l| l.clone()).unwrap_or_default();
        assert_eq!(limits, vec![DEFAULT_LIMIT]);
    }

    #[tokio::test]
    async fn test_missing_query_is_error() {
        let err = tool(store(), Reranker::passthrough()).call(json!({})).await.err();
        assert!(matches!(err, Some(RagError::ToolExecution { .. })));
    }
}
