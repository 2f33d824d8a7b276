//! Technical-detail tracking for one query.
//!
//! [`TrackingProvider`] and [`TrackingDispatcher`] wrap the orchestrator's
//! model and tool ports by reference and record into a shared [`Tracker`].
//! The wrapped objects are never modified; dropping the wrappers ends
//! tracking on every exit path.

use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::executor::ToolDispatcher;
use super::message::{ChatRequest, ChatResponse, TokenUsage};
use super::provider::LlmProvider;
use super::tool::{ToolCall, ToolDefinition, ToolResult};
use crate::error::RagError;
use crate::rerank::truncate_chars;
use crate::storage::SearchResult;
use crate::tools::{VECTOR_SEARCH, VectorSearchOutput, WEB_SEARCH, WebResult, WebSearchOutput};

/// Default display truncation for used chunks.
pub const DEFAULT_DISPLAY_TRUNCATE: usize = 200;

/// Accumulated token counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenTotals {
    /// Prompt tokens across all model calls.
    pub input: u64,
    /// Completion tokens across all model calls.
    pub output: u64,
    /// `input + output`.
    pub total: u64,
}

/// Summary of the last vector search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorSearchMetadata {
    /// Final result count.
    pub count: usize,
    /// First-stage candidate count.
    pub original_count: usize,
    /// Whether cross-encoder scores were applied.
    pub reranked: bool,
    /// Reranker model name or `"passthrough"`.
    pub reranking_method: String,
}

/// Summary of the last web search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebSearchMetadata {
    /// Result count.
    pub count: usize,
    /// Query that was searched.
    pub query: String,
}

/// Per-tool summaries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchMetadata {
    /// Last successful vector search.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector_search: Option<VectorSearchMetadata>,
    /// Last successful web search.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub web_search: Option<WebSearchMetadata>,
}

/// A retrieved chunk that was handed to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsedChunk {
    /// Chunk id.
    pub id: i64,
    /// Content truncated for display.
    pub content: String,
    /// Full chunk content.
    pub full_content: String,
    /// Cosine similarity to the query.
    pub similarity: f32,
    /// Cross-encoder score, if reranked.
    pub rerank_score: Option<f32>,
    /// Tool that surfaced the chunk.
    pub source: String,
    /// Always `true` for chunks returned to the model.
    pub used_in_response: bool,
}

/// Everything recorded for one query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TechnicalDetails {
    /// Per-tool summaries.
    pub search_metadata: SearchMetadata,
    /// Results of the last vector search.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub vector_results: Vec<SearchResult>,
    /// Results of the last web search.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub web_results: Vec<WebResult>,
    /// Every chunk returned by any vector search, in call order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub used_chunks: Vec<UsedChunk>,
    /// Token totals across all model calls, including the rewrite.
    pub token_usage: TokenTotals,
}

/// Recording sink shared by the tracking wrappers.
#[derive(Debug)]
pub struct Tracker {
    record: Mutex<TechnicalDetails>,
    display_truncate: usize,
}

impl Default for Tracker {
    fn default() -> Self {
        Self::new(DEFAULT_DISPLAY_TRUNCATE)
    }
}

impl Tracker {
    /// Creates an empty tracker.
    #[must_use]
    pub fn new(display_truncate: usize) -> Self {
        Self {
            record: Mutex::new(TechnicalDetails::default()),
            display_truncate,
        }
    }

    fn record(&self) -> MutexGuard<'_, TechnicalDetails> {
        self.record.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds one model call's usage.
    pub fn record_usage(&self, usage: &TokenUsage) {
        let mut record = self.record();
        let totals = &mut record.token_usage;
        totals.input += u64::from(usage.prompt_tokens);
        totals.output += u64::from(usage.completion_tokens);
        totals.total = totals.input + totals.output;
    }

    /// Records a tool result; failures and unknown tools are ignored.
    pub fn record_tool_result(&self, result: &ToolResult) {
        if !result.success {
            return;
        }
        match result.tool_name.as_str() {
            VECTOR_SEARCH => match serde_json::from_value::<VectorSearchOutput>(result.payload.clone()) {
                Ok(output) => self.record_vector_search(output),
                Err(e) => debug!(error = %e, "unrecognised vector_search payload"),
            },
            WEB_SEARCH => match serde_json::from_value::<WebSearchOutput>(result.payload.clone()) {
                Ok(output) => {
                    let mut record = self.record();
                    record.search_metadata.web_search = Some(WebSearchMetadata {
                        count: output.count,
                        query: output.query,
                    });
                    record.web_results = output.results;
                }
                Err(e) => debug!(error = %e, "unrecognised web_search payload"),
            },
            _ => {}
        }
    }

    fn record_vector_search(&self, output: VectorSearchOutput) {
        let used = output.results.iter().map(|r| UsedChunk {
            id: r.chunk_id,
            content: truncate_chars(&r.content, self.display_truncate),
            full_content: r.content.clone(),
            similarity: r.similarity,
            rerank_score: r.rerank_score,
            source: VECTOR_SEARCH.to_string(),
            used_in_response: true,
        });

        let mut record = self.record();
        record.used_chunks.extend(used);
        record.search_metadata.vector_search = Some(VectorSearchMetadata {
            count: output.count,
            original_count: output.original_count,
            reranked: output.reranked,
            reranking_method: output.reranking_method,
        });
        record.vector_results = output.results;
    }

    /// Returns a snapshot of everything recorded so far.
    #[must_use]
    pub fn details(&self) -> TechnicalDetails {
        self.record().clone()
    }

    /// Consumes the tracker and returns its record.
    #[must_use]
    pub fn into_details(self) -> TechnicalDetails {
        self.record
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Model port that records token usage.
pub struct TrackingProvider<'a> {
    inner: &'a dyn LlmProvider,
    tracker: &'a Tracker,
}

impl<'a> TrackingProvider<'a> {
    /// Wraps `inner`, recording into `tracker`.
    #[must_use]
    pub const fn new(inner: &'a dyn LlmProvider, tracker: &'a Tracker) -> Self {
        Self { inner, tracker }
    }
}

#[async_trait]
impl LlmProvider for TrackingProvider<'_> {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, RagError> {
        let response = self.inner.chat(request).await?;
        self.tracker.record_usage(&response.usage);
        Ok(response)
    }
}

/// Tool port that records tool results.
pub struct TrackingDispatcher<'a> {
    inner: &'a dyn ToolDispatcher,
    tracker: &'a Tracker,
}

impl<'a> TrackingDispatcher<'a> {
    /// Wraps `inner`, recording into `tracker`.
    #[must_use]
    pub const fn new(inner: &'a dyn ToolDispatcher, tracker: &'a Tracker) -> Self {
        Self { inner, tracker }
    }
}

#[async_trait]
impl ToolDispatcher for TrackingDispatcher<'_> {
    fn definitions(&self) -> Vec<ToolDefinition> {
        self.inner.definitions()
    }

    async fn execute(&self, call: &ToolCall) -> ToolResult {
        let result = self.inner.execute(call).await;
        self.tracker.record_tool_result(&result);
        result
    }

    async fn execute_concurrently(&self, calls: &[ToolCall]) -> Vec<ToolResult> {
        let results = self.inner.execute_concurrently(calls).await;
        for result in &results {
            self.tracker.record_tool_result(result);
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn call(name: &str) -> ToolCall {
        ToolCall {
            id: "c1".to_string(),
            name: name.to_string(),
            arguments: "{}".to_string(),
        }
    }

    fn vector_payload() -> serde_json::Value {
        json!({
            "success": true,
            "results": [
                {"id": 7, "content": "工".repeat(250), "similarity": 0.8, "rerank_score": 3.5},
                {"id": 2, "content": "短", "similarity": 0.9, "rerank_score": 1.0}
            ],
            "count": 2,
            "original_count": 15,
            "reranked": true,
            "reranking_method": "BAAI/bge-reranker-v2-m3"
        })
    }

    #[test]
    fn test_usage_accumulates() {
        let tracker = Tracker::default();
        for (p, c) in [(100, 20), (50, 5)] {
            tracker.record_usage(&TokenUsage {
                prompt_tokens: p,
                completion_tokens: c,
                total_tokens: p + c,
            });
        }
        let usage = tracker.details().token_usage;
        assert_eq!(
            usage,
            TokenTotals {
                input: 150,
                output: 25,
                total: 175
            }
        );
    }

    #[test]
    fn test_vector_search_records_used_chunks() {
        let tracker = Tracker::default();
        tracker.record_tool_result(&ToolResult::ok(&call(VECTOR_SEARCH), vector_payload()));
        let details = tracker.into_details();

        let meta = details
            .search_metadata
            .vector_search
            .unwrap_or_else(|| unreachable!());
        assert_eq!(meta.original_count, 15);
        assert!(meta.reranked);
        assert_eq!(details.used_chunks.len(), 2);

        let first = &details.used_chunks[0];
        assert_eq!(first.id, 7);
        assert_eq!(first.content.chars().count(), DEFAULT_DISPLAY_TRUNCATE + 3);
        assert_eq!(first.full_content.chars().count(), 250);
        assert_eq!(first.rerank_score, Some(3.5));
        assert_eq!(first.source, "vector_search");
        assert!(first.used_in_response);
        assert_eq!(details.vector_results.len(), 2);
    }

    #[test]
    fn test_repeated_searches_append_chunks_and_replace_results() {
        let tracker = Tracker::default();
        tracker.record_tool_result(&ToolResult::ok(&call(VECTOR_SEARCH), vector_payload()));
        tracker.record_tool_result(&ToolResult::ok(&call(VECTOR_SEARCH), vector_payload()));
        let details = tracker.details();
        assert_eq!(details.used_chunks.len(), 4);
        assert_eq!(details.vector_results.len(), 2);
    }

    #[test]
    fn test_web_search_and_failures() {
        let tracker = Tracker::default();
        tracker.record_tool_result(&ToolResult::ok(
            &call(WEB_SEARCH),
            json!({
                "success": true,
                "results": [{"title": "t", "content": "c", "url": "u", "score": 0.5}],
                "count": 1,
                "query": "最低工資"
            }),
        ));
        tracker.record_tool_result(&ToolResult::failed(
            &call(VECTOR_SEARCH),
            &RagError::ToolTimeout {
                name: VECTOR_SEARCH.to_string(),
                timeout_secs: 60,
            },
        ));
        let details = tracker.details();
        assert_eq!(
            details.search_metadata.web_search,
            Some(WebSearchMetadata {
                count: 1,
                query: "最低工資".to_string()
            })
        );
        assert!(details.search_metadata.vector_search.is_none());
        assert!(details.used_chunks.is_empty());
    }

    #[test]
    fn test_details_serialize_shape() {
        let tracker = Tracker::default();
        let value = serde_json::to_value(tracker.details()).unwrap_or_default();
        assert_eq!(value["token_usage"], json!({"input": 0, "output": 0, "total": 0}));
        assert!(value.get("used_chunks").is_none());
    }
}
