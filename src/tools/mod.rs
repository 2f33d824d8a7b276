//! The agent's tools: statute vector search and web search.

pub mod vector_search;
pub mod web_search;

use std::sync::Arc;

use serde_json::Value;

pub use vector_search::{VECTOR_SEARCH, VectorSearchOutput, VectorSearchTool};
pub use web_search::{TavilyClient, WEB_SEARCH, WebResult, WebSearchClient, WebSearchOutput, WebSearchTool};

use crate::agent::tool::ToolRegistry;
use crate::error::RagError;

/// Registers both tools, vector search first.
///
/// # Errors
///
/// Returns [`RagError::DuplicateTool`] if a name collides.
pub fn build_registry(vector: VectorSearchTool, web: WebSearchTool) -> Result<ToolRegistry, RagError> {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(vector))?;
    registry.register(Arc::new(web))?;
    Ok(registry)
}

/// Extracts a non-blank `query` string argument.
fn required_query(tool: &str, arguments: &Value) -> Result<String, RagError> {
    arguments
        .get("query")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .map(str::to_string)
        .ok_or_else(|| RagError::tool(tool, "missing required argument 'query'"))
}

/// Reads a positive integer argument.
fn optional_count(arguments: &Value, key: &str) -> Option<usize> {
    arguments
        .get(key)
        .and_then(Value::as_u64)
        .and_then(|n| usize::try_from(n).ok())
        .filter(|&n| n > 0)
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use test_case::test_case;

    use super::*;

    #[test_case(json!({"query": "特休"}), Some("特休") ; "present")]
    #[test_case(json!({"query": "  "}), None ; "blank")]
    #[test_case(json!({"query": 3}), None ; "wrong type")]
    #[test_case(json!({}), None ; "absent")]
    fn test_required_query(args: Value, expected: Option<&str>) {
        assert_eq!(required_query("t", &args).ok().as_deref(), expected);
    }

    #[test_case(json!({"limit": 10}), Some(10) ; "positive")]
    #[test_case(json!({"limit": 0}), None ; "zero")]
    #[test_case(json!({"limit": -3}), None ; "negative")]
    #[test_case(json!({}), None ; "absent")]
    fn test_optional_count(args: Value, expected: Option<usize>) {
        assert_eq!(optional_count(&args, "limit"), expected);
    }

    struct NoEmbed;

    #[async_trait::async_trait]
    impl crate::embedding::Embedder for NoEmbed {
        fn model(&self) -> &str {
            "none"
        }

        async fn embed(&self, _text: &str) -> Result<Vec<f32>, RagError> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_registry_order() {
        let store: Arc<dyn crate::storage::VectorStore> = Arc::new(
            crate::storage::SqliteVectorStore::in_memory().unwrap_or_else(|_| unreachable!()),
        );
        let vector = VectorSearchTool::new(
            crate::embedding::EmbeddingGateway::new(Arc::new(NoEmbed)),
            store,
            crate::rerank::Reranker::passthrough(),
        );
        let registry =
            build_registry(vector, WebSearchTool::unconfigured()).unwrap_or_else(|_| unreachable!());
        let names: Vec<&str> = registry.definitions().iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, [VECTOR_SEARCH, WEB_SEARCH]);
    }
}
