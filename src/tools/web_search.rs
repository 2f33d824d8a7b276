//! `web_search`: recent legal news and supplementary material via Tavily.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::info;

use super::{optional_count, required_query};
use crate::agent::tool::{Tool, ToolDefinition};
use crate::error::RagError;

/// Tool name.
pub const WEB_SEARCH: &str = "web_search";
/// Default number of web results.
pub const DEFAULT_MAX_RESULTS: usize = 5;
/// Upper bound accepted for `max_results`.
const MAX_RESULTS_CAP: usize = 20;
/// Tavily search endpoint.
const TAVILY_ENDPOINT: &str = "https://api.tavily.com/search";
/// HTTP timeout; shorter than the tool timeout so the error text is specific.
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// One normalized web hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebResult {
    /// Page title.
    #[serde(default)]
    pub title: String,
    /// Extracted snippet.
    #[serde(default)]
    pub content: String,
    /// Page URL.
    #[serde(default)]
    pub url: String,
    /// Provider relevance score.
    #[serde(default)]
    pub score: f64,
}

/// Successful `web_search` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebSearchOutput {
    /// Always `true`; failures are reported as error payloads.
    pub success: bool,
    /// Normalized hits.
    pub results: Vec<WebResult>,
    /// Number of hits.
    pub count: usize,
    /// Query that was searched.
    pub query: String,
}

/// A web search backend.
#[async_trait]
pub trait WebSearchClient: Send + Sync {
    /// Returns up to `max_results` hits for `query`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ServiceUnavailable`] on transport or API failure.
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<WebResult>, RagError>;
}

#[derive(Serialize)]
struct TavilyRequest<'a> {
    query: &'a str,
    max_results: usize,
}

#[derive(Deserialize)]
struct TavilyResponse {
    results: Option<Vec<WebResult>>,
}

/// Tavily search API client.
pub struct TavilyClient {
    http: reqwest::Client,
    api_key: String,
    endpoint: String,
}

impl TavilyClient {
    /// Creates a client for the public Tavily endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if the HTTP client cannot be built.
    pub fn new(api_key: impl Into<String>) -> Result<Self, RagError> {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| RagError::Config {
                message: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            http,
            api_key: api_key.into(),
            endpoint: TAVILY_ENDPOINT.to_string(),
        })
    }

    /// Overrides the endpoint (for proxies).
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

impl std::fmt::Debug for TavilyClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TavilyClient")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl WebSearchClient for TavilyClient {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<WebResult>, RagError> {
        let unavailable = |message: String| RagError::ServiceUnavailable {
            service: WEB_SEARCH.to_string(),
            message,
        };

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&TavilyRequest { query, max_results })
            .send()
            .await
            .map_err(|e| unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(unavailable(format!("HTTP {status}: {body}")));
        }

        let parsed: TavilyResponse = response
            .json()
            .await
            .map_err(|e| unavailable(format!("invalid response: {e}")))?;
        parsed
            .results
            .ok_or_else(|| unavailable("response contained no results".to_string()))
    }
}

/// Web search tool.
///
/// Without a client every call reports an error payload, so the model can
/// fall back to statute search.
pub struct WebSearchTool {
    client: Option<Arc<dyn WebSearchClient>>,
    default_max_results: usize,
}

impl WebSearchTool {
    /// Creates the tool around `client`.
    #[must_use]
    pub fn new(client: Arc<dyn WebSearchClient>) -> Self {
        Self {
            client: Some(client),
            default_max_results: DEFAULT_MAX_RESULTS,
        }
    }

    /// Creates a tool that reports web search as not configured.
    #[must_use]
    pub const fn unconfigured() -> Self {
        Self {
            client: None,
            default_max_results: DEFAULT_MAX_RESULTS,
        }
    }

    /// Sets the result count used when the caller gives none.
    #[must_use]
    pub fn with_default_max_results(mut self, n: usize) -> Self {
        self.default_max_results = n.clamp(1, MAX_RESULTS_CAP);
        self
    }
}

impl std::fmt::Debug for WebSearchTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSearchTool")
            .field("configured", &self.client.is_some())
            .field("default_max_results", &self.default_max_results)
            .finish()
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: WEB_SEARCH.to_string(),
            description: "Web search for recent amendments, policy news, court practice and \
                          other material not found in the statute text."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "Search query"
                    },
                    "max_results": {
                        "type": "integer",
                        "description": "Maximum number of results",
                        "default": self.default_max_results
                    }
                },
                "required": ["query"]
            }),
        }
    }

    async fn call(&self, arguments: Value) -> Result<Value, RagError> {
        let query = required_query(WEB_SEARCH, &arguments)?;
        let Some(client) = &self.client else {
            return Err(RagError::ServiceUnavailable {
                service: WEB_SEARCH.to_string(),
                message: "TAVILY_API_KEY is not configured".to_string(),
            });
        };
        let max_results = optional_count(&arguments, "max_results")
            .unwrap_or(self.default_max_results)
            .clamp(1, MAX_RESULTS_CAP);

        info!(query, max_results, "web search");
        let results = client.search(&query, max_results).await?;
        info!(count = results.len(), "web search complete");

        let output = WebSearchOutput {
            success: true,
            count: results.len(),
            results,
            query,
        };
        serde_json::to_value(output).map_err(|e| RagError::tool(WEB_SEARCH, e.to_string()))
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    struct CannedClient {
        requested: Mutex<Vec<usize>>,
    }

    #[async_trait]
    impl WebSearchClient for CannedClient {
        async fn search(&self, query: &str, max_results: usize) -> Result<Vec<WebResult>, RagError> {
            if let Ok(mut r) = self.requested.lock() {
                r.push(max_results);
            }
            Ok(vec![WebResult {
                title: format!("{query} news"),
                content: "2024 年基本工資調整".to_string(),
                url: "https://example.org/a".to_string(),
                score: 0.9,
            }])
        }
    }

    #[tokio::test]
    async fn test_output_shape_and_default_count() {
        let client = Arc::new(CannedClient {
            requested: Mutex::new(Vec::new()),
        });
        let tool = WebSearchTool::new(client.clone());
        let payload = tool
            .call(json!({"query": "基本工資"}))
            .await
            .unwrap_or_else(|e| panic!("call: {e}"));
        assert_eq!(payload["success"], true);
        assert_eq!(payload["count"], 1);
        assert_eq!(payload["query"], "基本工資");
        assert_eq!(payload["results"][0]["url"], "https://example.org/a");
        let requested = client.requested.lock().map(|r| r.clone()).unwrap_or_default();
        assert_eq!(requested, vec![DEFAULT_MAX_RESULTS]);
    }

    #[tokio::test]
    async fn test_unconfigured_reports_error() {
        let err = WebSearchTool::unconfigured()
            .call(json!({"query": "x"}))
            .await
            .err();
        assert!(matches!(err, Some(RagError::ServiceUnavailable { .. })));
    }

    #[test]
    fn test_tavily_items_normalize_missing_fields() {
        let parsed: TavilyResponse = serde_json::from_str(
            r#"{"results":[{"title":"t","url":"u","raw_content":null}]}"#,
        )
        .unwrap_or_else(|e| panic!("decode: {e}"));
        let results = parsed.results.unwrap_or_default();
        assert_eq!(results[0].content, "");
        assert!(results[0].score.abs() < f64::EPSILON);
    }
}
