//! Agent configuration with builder pattern and environment variable support.
//!
//! Configuration is resolved in order: explicit values → environment variables → defaults.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::RagError;

/// Default chat completion attempts (rewriter and agent).
const DEFAULT_CHAT_ATTEMPTS: u32 = 3;
/// Default embedding attempts.
const DEFAULT_EMBEDDING_ATTEMPTS: u32 = 2;
/// Default sampling temperature.
const DEFAULT_TEMPERATURE: f32 = 0.7;
/// Default iteration budget without conversation history.
const DEFAULT_MAX_ITERATIONS: usize = 3;
/// Default iteration budget when conversation history is supplied.
const DEFAULT_CONVERSATIONAL_MAX_ITERATIONS: usize = 5;
/// Default per-tool timeout in seconds.
const DEFAULT_TOOL_TIMEOUT_SECS: u64 = 60;
/// Default concurrent tool workers.
const DEFAULT_MAX_TOOL_WORKERS: usize = 3;
/// Default first-stage candidate count.
const DEFAULT_SEARCH_LIMIT: usize = 15;
/// Default reranked results kept.
const DEFAULT_RERANK_TOP_K: usize = 5;
/// Default characters of each candidate scored by the cross-encoder.
const DEFAULT_RERANK_MAX_CHARS: usize = 512;
/// Default web search result count.
const DEFAULT_WEB_MAX_RESULTS: usize = 5;
/// Default display truncation for tracked chunks.
const DEFAULT_DISPLAY_TRUNCATE: usize = 200;
/// Default chat model.
const DEFAULT_CHAT_MODEL: &str = "gpt-4o";
/// Default rewrite model.
const DEFAULT_REWRITE_MODEL: &str = "gpt-4o-mini";
/// Default embedding model.
const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";
/// Default SQLite database file.
const DEFAULT_DB_PATH: &str = "labor_law.db";

/// Reranker selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RerankerMode {
    /// Try the model chain, fall back to pass-through.
    #[default]
    Auto,
    /// Skip model loading and always pass through.
    None,
}

impl std::str::FromStr for RerankerMode {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "none" | "off" | "passthrough" => Ok(Self::None),
            other => Err(RagError::Config {
                message: format!("unknown reranker mode '{other}' (expected auto or none)"),
            }),
        }
    }
}

/// Configuration for the agent system.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// LLM provider name (e.g., "openai").
    pub provider: String,
    /// API key for the completion service.
    pub api_key: String,
    /// Optional base URL override (for proxies or compatible APIs).
    pub base_url: Option<String>,
    /// Model used by the agent loop.
    pub chat_model: String,
    /// Model used by the query rewriter.
    pub rewrite_model: String,
    /// API key for the embedding service; falls back to `api_key`.
    pub embedding_api_key: Option<String>,
    /// Base URL of the embedding service; falls back to `base_url`.
    pub embedding_base_url: Option<String>,
    /// Embedding model name.
    pub embedding_model: String,
    /// Tavily API key; web search reports an error payload when absent.
    pub web_search_api_key: Option<String>,
    /// Path of the SQLite vector store.
    pub db_path: PathBuf,
    /// Directory containing prompt template files.
    ///
    /// Missing files fall back to compiled-in defaults.
    pub prompt_dir: Option<PathBuf>,
    /// Sampling temperature for the agent loop.
    pub temperature: f32,
    /// Maximum tokens per completion, if capped.
    pub max_tokens: Option<u32>,
    /// Attempts per chat completion before giving up.
    pub chat_attempts: u32,
    /// Attempts per embedding before returning an empty vector.
    pub embedding_attempts: u32,
    /// Iteration budget without history.
    pub max_iterations: usize,
    /// Iteration budget with history.
    pub conversational_max_iterations: usize,
    /// Timeout applied to each tool call.
    pub tool_timeout: Duration,
    /// Concurrent tool workers.
    pub max_tool_workers: usize,
    /// First-stage candidates fetched by vector search.
    pub search_limit: usize,
    /// Results kept after reranking.
    pub rerank_top_k: usize,
    /// Characters of each candidate passed to the cross-encoder.
    pub rerank_max_chars: usize,
    /// Web search results requested by default.
    pub web_max_results: usize,
    /// Characters of chunk content kept for display in tracked details.
    pub display_truncate: usize,
    /// Reranker selection.
    pub reranker: RerankerMode,
}

impl AgentConfig {
    /// Creates a new builder for `AgentConfig`.
    #[must_use]
    pub fn builder() -> AgentConfigBuilder {
        AgentConfigBuilder::default()
    }

    /// Creates configuration from environment variables with defaults.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ApiKeyMissing`] if no API key is found.
    pub fn from_env() -> Result<Self, RagError> {
        Self::builder().from_env().build()
    }

    /// Iteration budget for a query with or without history.
    #[must_use]
    pub const fn iteration_budget(&self, conversational: bool) -> usize {
        if conversational {
            self.conversational_max_iterations
        } else {
            self.max_iterations
        }
    }
}

/// Builder for [`AgentConfig`].
#[derive(Debug, Clone, Default)]
pub struct AgentConfigBuilder {
    provider: Option<String>,
    api_key: Option<String>,
    base_url: Option<String>,
    chat_model: Option<String>,
    rewrite_model: Option<String>,
    embedding_api_key: Option<String>,
    embedding_base_url: Option<String>,
    embedding_model: Option<String>,
    web_search_api_key: Option<String>,
    db_path: Option<PathBuf>,
    prompt_dir: Option<PathBuf>,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    chat_attempts: Option<u32>,
    embedding_attempts: Option<u32>,
    max_iterations: Option<usize>,
    conversational_max_iterations: Option<usize>,
    tool_timeout: Option<Duration>,
    max_tool_workers: Option<usize>,
    search_limit: Option<usize>,
    rerank_top_k: Option<usize>,
    web_max_results: Option<usize>,
    reranker: Option<RerankerMode>,
}

fn env_parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

impl AgentConfigBuilder {
    /// Populates unset fields from environment variables.
    #[must_use]
    pub fn from_env(mut self) -> Self {
        if self.provider.is_none() {
            self.provider = std::env::var("RAG_PROVIDER").ok();
        }
        if self.api_key.is_none() {
            self.api_key = std::env::var("OPENAI_API_KEY")
                .or_else(|_| std::env::var("RAG_API_KEY"))
                .ok();
        }
        if self.base_url.is_none() {
            self.base_url = std::env::var("OPENAI_BASE_URL")
                .or_else(|_| std::env::var("RAG_BASE_URL"))
                .ok();
        }
        if self.chat_model.is_none() {
            self.chat_model = std::env::var("RAG_CHAT_MODEL").ok();
        }
        if self.rewrite_model.is_none() {
            self.rewrite_model = std::env::var("RAG_REWRITE_MODEL").ok();
        }
        if self.embedding_api_key.is_none() {
            self.embedding_api_key = std::env::var("EMBEDDING_API_KEY").ok();
        }
        if self.embedding_base_url.is_none() {
            self.embedding_base_url = std::env::var("EMBEDDING_URL").ok();
        }
        if self.embedding_model.is_none() {
            self.embedding_model = std::env::var("EMBEDDING_MODEL").ok();
        }
        if self.web_search_api_key.is_none() {
            self.web_search_api_key = std::env::var("TAVILY_API_KEY").ok();
        }
        if self.db_path.is_none() {
            self.db_path = std::env::var("RAG_DB_PATH").ok().map(PathBuf::from);
        }
        if self.prompt_dir.is_none() {
            self.prompt_dir = std::env::var("RAG_PROMPT_DIR").ok().map(PathBuf::from);
        }
        if self.max_iterations.is_none() {
            self.max_iterations = env_parsed("RAG_MAX_ITERATIONS");
        }
        if self.tool_timeout.is_none() {
            self.tool_timeout = env_parsed("RAG_TOOL_TIMEOUT_SECS").map(Duration::from_secs);
        }
        if self.reranker.is_none() {
            self.reranker = env_parsed("RAG_RERANKER");
        }
        self
    }

    /// Sets the LLM provider name.
    #[must_use]
    pub fn provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// Sets the API key.
    #[must_use]
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Sets the base URL override.
    #[must_use]
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Sets the agent model.
    #[must_use]
    pub fn chat_model(mut self, model: impl Into<String>) -> Self {
        self.chat_model = Some(model.into());
        self
    }

    /// Sets the rewriter model.
    #[must_use]
    pub fn rewrite_model(mut self, model: impl Into<String>) -> Self {
        self.rewrite_model = Some(model.into());
        self
    }

    /// Sets the embedding service key.
    #[must_use]
    pub fn embedding_api_key(mut self, key: impl Into<String>) -> Self {
        self.embedding_api_key = Some(key.into());
        self
    }

    /// Sets the embedding service base URL.
    #[must_use]
    pub fn embedding_base_url(mut self, url: impl Into<String>) -> Self {
        self.embedding_base_url = Some(url.into());
        self
    }

    /// Sets the embedding model.
    #[must_use]
    pub fn embedding_model(mut self, model: impl Into<String>) -> Self {
        self.embedding_model = Some(model.into());
        self
    }

    /// Sets the Tavily API key.
    #[must_use]
    pub fn web_search_api_key(mut self, key: impl Into<String>) -> Self {
        self.web_search_api_key = Some(key.into());
        self
    }

    /// Sets the SQLite database path.
    #[must_use]
    pub fn db_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.db_path = Some(path.into());
        self
    }

    /// Sets the prompt template directory.
    #[must_use]
    pub fn prompt_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.prompt_dir = Some(dir.into());
        self
    }

    /// Sets the sampling temperature.
    #[must_use]
    pub const fn temperature(mut self, t: f32) -> Self {
        self.temperature = Some(t);
        self
    }

    /// Caps completion length.
    #[must_use]
    pub const fn max_tokens(mut self, n: u32) -> Self {
        self.max_tokens = Some(n);
        self
    }

    /// Sets the chat completion attempts.
    #[must_use]
    pub const fn chat_attempts(mut self, n: u32) -> Self {
        self.chat_attempts = Some(n);
        self
    }

    /// Sets the embedding attempts.
    #[must_use]
    pub const fn embedding_attempts(mut self, n: u32) -> Self {
        self.embedding_attempts = Some(n);
        self
    }

    /// Sets the single-shot iteration budget.
    #[must_use]
    pub const fn max_iterations(mut self, n: usize) -> Self {
        self.max_iterations = Some(n);
        self
    }

    /// Sets the conversational iteration budget.
    #[must_use]
    pub const fn conversational_max_iterations(mut self, n: usize) -> Self {
        self.conversational_max_iterations = Some(n);
        self
    }

    /// Sets the per-tool timeout.
    #[must_use]
    pub const fn tool_timeout(mut self, duration: Duration) -> Self {
        self.tool_timeout = Some(duration);
        self
    }

    /// Sets the concurrent tool workers.
    #[must_use]
    pub const fn max_tool_workers(mut self, n: usize) -> Self {
        self.max_tool_workers = Some(n);
        self
    }

    /// Sets the first-stage candidate count.
    #[must_use]
    pub const fn search_limit(mut self, n: usize) -> Self {
        self.search_limit = Some(n);
        self
    }

    /// Sets the reranked result count.
    #[must_use]
    pub const fn rerank_top_k(mut self, n: usize) -> Self {
        self.rerank_top_k = Some(n);
        self
    }

    /// Sets the default web search result count.
    #[must_use]
    pub const fn web_max_results(mut self, n: usize) -> Self {
        self.web_max_results = Some(n);
        self
    }

    /// Sets the reranker mode.
    #[must_use]
    pub const fn reranker(mut self, mode: RerankerMode) -> Self {
        self.reranker = Some(mode);
        self
    }

    /// Builds the [`AgentConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ApiKeyMissing`] if no API key was set and
    /// [`RagError::Config`] for a zero iteration budget.
    pub fn build(self) -> Result<AgentConfig, RagError> {
        let api_key = self
            .api_key
            .filter(|k| !k.trim().is_empty())
            .ok_or(RagError::ApiKeyMissing)?;

        let max_iterations = self.max_iterations.unwrap_or(DEFAULT_MAX_ITERATIONS);
        let conversational_max_iterations = self
            .conversational_max_iterations
            .unwrap_or(DEFAULT_CONVERSATIONAL_MAX_ITERATIONS);
        if max_iterations == 0 || conversational_max_iterations == 0 {
            return Err(RagError::Config {
                message: "iteration budget must be at least 1".to_string(),
            });
        }

        Ok(AgentConfig {
            provider: self.provider.unwrap_or_else(|| "openai".to_string()),
            api_key,
            base_url: self.base_url,
            chat_model: self
                .chat_model
                .unwrap_or_else(|| DEFAULT_CHAT_MODEL.to_string()),
            rewrite_model: self
                .rewrite_model
                .unwrap_or_else(|| DEFAULT_REWRITE_MODEL.to_string()),
            embedding_api_key: self.embedding_api_key,
            embedding_base_url: self.embedding_base_url,
            embedding_model: self
                .embedding_model
                .unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string()),
            web_search_api_key: self.web_search_api_key.filter(|k| !k.trim().is_empty()),
            db_path: self
                .db_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_PATH)),
            prompt_dir: self.prompt_dir,
            temperature: self.temperature.unwrap_or(DEFAULT_TEMPERATURE),
            max_tokens: self.max_tokens,
            chat_attempts: self.chat_attempts.unwrap_or(DEFAULT_CHAT_ATTEMPTS),
            embedding_attempts: self
                .embedding_attempts
                .unwrap_or(DEFAULT_EMBEDDING_ATTEMPTS),
            max_iterations,
            conversational_max_iterations,
            tool_timeout: self
                .tool_timeout
                .unwrap_or(Duration::from_secs(DEFAULT_TOOL_TIMEOUT_SECS)),
            max_tool_workers: self.max_tool_workers.unwrap_or(DEFAULT_MAX_TOOL_WORKERS),
            search_limit: self.search_limit.unwrap_or(DEFAULT_SEARCH_LIMIT),
            rerank_top_k: self.rerank_top_k.unwrap_or(DEFAULT_RERANK_TOP_K),
            rerank_max_chars: DEFAULT_RERANK_MAX_CHARS,
            web_max_results: self.web_max_results.unwrap_or(DEFAULT_WEB_MAX_RESULTS),
            display_truncate: DEFAULT_DISPLAY_TRUNCATE,
            reranker: self.reranker.unwrap_or_default(),
        })
    }
}
