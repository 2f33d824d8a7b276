//! Query orchestration.
//!
//! [`RagAgent`] runs one query end to end: rewrite the question, seed the
//! conversation, then drive [`agentic_loop`] over the tool executor until
//! the model answers or the iteration budget runs out.

use std::sync::Arc;

use tracing::{info, warn};

use super::agentic_loop::{AgentOutcome, agentic_loop};
use super::client::create_provider;
use super::config::{AgentConfig, RerankerMode};
use super::executor::{ToolDispatcher, ToolExecutor};
use super::message::{ChatMessage, ChatRequest, ToolChoice, system_message, user_message};
use super::prompt::{PromptSet, build_question_prompt};
use super::provider::LlmProvider;
use super::rewriter::QueryRewriter;
use super::tracker::{TechnicalDetails, Tracker, TrackingDispatcher, TrackingProvider};
use crate::embedding::{EmbeddingGateway, OpenAiEmbedder};
use crate::error::RagError;
use crate::rerank::{Reranker, default_loaders};
use crate::storage::{SqliteVectorStore, VectorStore};
use crate::tools::{TavilyClient, VectorSearchTool, WebSearchTool, build_registry};

/// Longest question accepted, in bytes.
const MAX_QUESTION_LEN: usize = 10_000;

/// The labor-law question answering agent.
///
/// Holds only read-only state; concurrent queries each build their own
/// conversation.
pub struct RagAgent {
    provider: Arc<dyn LlmProvider>,
    dispatcher: Arc<dyn ToolDispatcher>,
    rewriter: QueryRewriter,
    system_prompt: String,
    config: AgentConfig,
}

impl RagAgent {
    /// Creates an agent from already-built ports.
    #[must_use]
    pub fn new(
        config: AgentConfig,
        provider: Arc<dyn LlmProvider>,
        dispatcher: Arc<dyn ToolDispatcher>,
        prompts: PromptSet,
    ) -> Self {
        let rewriter =
            QueryRewriter::new(config.rewrite_model.clone(), prompts.rewrite).with_max_tokens(config.max_tokens);
        Self {
            provider,
            dispatcher,
            rewriter,
            system_prompt: prompts.agent,
            config,
        }
    }

    /// Wires the production stack: `OpenAI` completions and embeddings,
    /// the `SQLite` store at [`AgentConfig::db_path`], the reranker chain and
    /// Tavily web search.
    ///
    /// # Errors
    ///
    /// Returns [`RagError`] if the provider, store or web client cannot be
    /// constructed.
    pub fn from_config(config: AgentConfig) -> Result<Self, RagError> {
        let provider = create_provider(&config)?;

        let store = SqliteVectorStore::open(&config.db_path)?;
        store.init()?;
        let vector = vector_search_tool(&config, Arc::new(store));

        let web = match config.web_search_api_key.as_deref().filter(|k| !k.trim().is_empty()) {
            Some(key) => WebSearchTool::new(Arc::new(TavilyClient::new(key)?)),
            None => {
                warn!("TAVILY_API_KEY not set, web search disabled");
                WebSearchTool::unconfigured()
            }
        }
        .with_default_max_results(config.web_max_results);

        let registry = build_registry(vector, web)?;
        let executor = ToolExecutor::new(Arc::new(registry))
            .with_timeout(config.tool_timeout)
            .with_max_workers(config.max_tool_workers);

        let prompts = PromptSet::load(config.prompt_dir.as_deref());
        Ok(Self::new(config, provider, Arc::new(executor), prompts))
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Rewrites a question into a search-oriented query.
    ///
    /// Never fails: any model error yields `question` unchanged.
    pub async fn rewrite_query(&self, question: &str) -> String {
        self.rewriter.rewrite(self.provider.as_ref(), question).await
    }

    /// Runs one query and returns its terminal state.
    ///
    /// `history` holds earlier turns of a conversation; supplying it selects
    /// the conversational iteration budget.
    pub async fn run(&self, question: &str, history: Option<&[ChatMessage]>) -> AgentOutcome {
        self.run_with(self.provider.as_ref(), self.dispatcher.as_ref(), question, history)
            .await
    }

    /// Answers a question. Every terminal state becomes a user-visible string.
    pub async fn generate_agent_response(&self, question: &str, history: Option<&[ChatMessage]>) -> String {
        self.run(question, history).await.into_answer()
    }

    /// Answers a question while recording token usage, tool results and the
    /// chunks handed to the model.
    pub async fn execute_query_with_tracking(
        &self,
        question: &str,
        history: Option<&[ChatMessage]>,
    ) -> (String, TechnicalDetails) {
        let tracker = Tracker::new(self.config.display_truncate);
        let outcome = {
            let provider = TrackingProvider::new(self.provider.as_ref(), &tracker);
            let dispatcher = TrackingDispatcher::new(self.dispatcher.as_ref(), &tracker);
            self.run_with(&provider, &dispatcher, question, history).await
        };
        let details = tracker.into_details();
        info!(
            input_tokens = details.token_usage.input,
            output_tokens = details.token_usage.output,
            used_chunks = details.used_chunks.len(),
            "tracked query complete"
        );
        (outcome.into_answer(), details)
    }

    async fn run_with(
        &self,
        provider: &dyn LlmProvider,
        dispatcher: &dyn ToolDispatcher,
        question: &str,
        history: Option<&[ChatMessage]>,
    ) -> AgentOutcome {
        if question.trim().is_empty() {
            return AgentOutcome::Fatal(RagError::FatalOrchestrator {
                message: "question cannot be empty".to_string(),
            });
        }
        if question.len() > MAX_QUESTION_LEN {
            return AgentOutcome::Fatal(RagError::FatalOrchestrator {
                message: format!(
                    "question exceeds maximum length ({} bytes, max {MAX_QUESTION_LEN})",
                    question.len()
                ),
            });
        }

        let improved = self.rewriter.rewrite(provider, question).await;

        let mut request = ChatRequest {
            model: self.config.chat_model.clone(),
            messages: self.seed_messages(question, &improved, history),
            temperature: Some(self.config.temperature),
            max_tokens: self.config.max_tokens,
            tools: dispatcher.definitions(),
            tool_choice: ToolChoice::Auto,
        };

        let max_iterations = self.config.iteration_budget(history.is_some());
        info!(
            max_iterations,
            history_turns = history.map_or(0, <[ChatMessage]>::len),
            "starting agent"
        );
        agentic_loop(provider, &mut request, dispatcher, max_iterations).await
    }

    fn seed_messages(&self, question: &str, improved: &str, history: Option<&[ChatMessage]>) -> Vec<ChatMessage> {
        let mut messages = vec![system_message(&self.system_prompt)];
        if let Some(history) = history {
            messages.extend(history.iter().filter(|m| m.is_plain_turn()).cloned());
        }
        messages.push(user_message(&build_question_prompt(question, improved)));
        messages
    }
}

impl std::fmt::Debug for RagAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RagAgent")
            .field("provider", &self.provider.name())
            .field("rewriter", &self.rewriter)
            .field("chat_model", &self.config.chat_model)
            .finish_non_exhaustive()
    }
}

/// Builds the `vector_search` tool over `store` from configuration.
///
/// Honors [`AgentConfig::reranker`]: `Auto` walks the model chain, `None`
/// skips model loading.
#[must_use]
pub fn vector_search_tool(config: &AgentConfig, store: Arc<dyn VectorStore>) -> VectorSearchTool {
    let embedder = EmbeddingGateway::with_attempts(
        Arc::new(OpenAiEmbedder::from_config(config)),
        config.embedding_attempts,
    );
    let reranker = match config.reranker {
        RerankerMode::Auto => Reranker::initialize(&default_loaders()),
        RerankerMode::None => Reranker::passthrough(),
    }
    .with_max_chars(config.rerank_max_chars);

    VectorSearchTool::new(embedder, store, reranker)
        .with_default_limit(config.search_limit)
        .with_top_k(config.rerank_top_k)
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::{Value, json};

    use super::*;
    use crate::agent::agentic_loop::MAX_ITERATIONS_MESSAGE;
    use crate::agent::message::{ChatResponse, Role, TokenUsage, assistant_message};
    use crate::agent::tool::{Tool, ToolCall, ToolDefinition, ToolRegistry};

    /// Replays canned responses and records every request.
    struct Scripted {
        responses: Mutex<VecDeque<Result<ChatResponse, RagError>>>,
        requests: Mutex<Vec<ChatRequest>>,
    }

    impl Scripted {
        fn new(responses: Vec<Result<ChatResponse, RagError>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn requests(&self) -> Vec<ChatRequest> {
            self.requests.lock().map(|r| r.clone()).unwrap_or_default()
        }
    }

    #[async_trait]
    impl LlmProvider for Scripted {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, RagError> {
            if let Ok(mut r) = self.requests.lock() {
                r.push(request.clone());
            }
            self.responses
                .lock()
                .ok()
                .and_then(|mut r| r.pop_front())
                .unwrap_or_else(|| Ok(text("fallback")))
        }
    }

    fn text(content: &str) -> ChatResponse {
        ChatResponse {
            content: content.to_string(),
            usage: TokenUsage {
                prompt_tokens: 10,
                completion_tokens: 2,
                total_tokens: 12,
            },
            ..ChatResponse::default()
        }
    }

    fn tool_call(id: &str) -> ChatResponse {
        ChatResponse {
            tool_calls: vec![ToolCall {
                id: id.to_string(),
                name: "echo".to_string(),
                arguments: r#"{"query":"x"}"#.to_string(),
            }],
            ..ChatResponse::default()
        }
    }

    struct Echo;

    #[async_trait]
    impl Tool for Echo {
        fn definition(&self) -> ToolDefinition {
            ToolDefinition {
                name: "echo".to_string(),
                description: "echo".to_string(),
                parameters: json!({"type": "object", "properties": {"query": {"type": "string"}}}),
            }
        }

        async fn call(&self, arguments: Value) -> Result<Value, RagError> {
            Ok(arguments)
        }
    }

    fn agent(provider: Arc<Scripted>) -> RagAgent {
        let mut registry = ToolRegistry::new();
        registry
            .register(Arc::new(Echo))
            .unwrap_or_else(|e| panic!("register: {e}"));
        let config = AgentConfig::builder()
            .api_key("test")
            .build()
            .unwrap_or_else(|e| panic!("config: {e}"));
        RagAgent::new(
            config,
            provider,
            Arc::new(ToolExecutor::new(Arc::new(registry))),
            PromptSet::defaults(),
        )
    }

    #[tokio::test]
    async fn test_question_seeds_conversation_with_rewrite() {
        let provider = Scripted::new(vec![Ok(text("延長工時工資計算")), Ok(text("答案"))]);
        let answer = agent(provider.clone())
            .generate_agent_response("加班費怎麼算？", None)
            .await;
        assert_eq!(answer, "答案");

        let requests = provider.requests();
        assert_eq!(requests.len(), 2);
        assert!(requests[0].tools.is_empty());
        assert_eq!(requests[0].tool_choice, ToolChoice::None);

        let agent_request = &requests[1];
        assert_eq!(agent_request.tool_choice, ToolChoice::Auto);
        assert_eq!(agent_request.tools.len(), 1);
        assert_eq!(agent_request.messages.len(), 2);
        assert_eq!(agent_request.messages[0].role, Role::System);
        assert_eq!(
            agent_request.messages[1].content,
            build_question_prompt("加班費怎麼算？", "延長工時工資計算")
        );
    }

    #[tokio::test]
    async fn test_history_is_placed_between_system_and_question() {
        let provider = Scripted::new(vec![Ok(text("q")), Ok(text("a"))]);
        let history = vec![
            user_message("特休幾天？"),
            assistant_message("依年資計算。"),
            crate::agent::message::tool_message("c0", "{}"),
        ];
        let _ = agent(provider.clone())
            .generate_agent_response("那半年呢？", Some(history.as_slice()))
            .await;
        let messages = &provider.requests()[1].messages;
        let roles: Vec<Role> = messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, [Role::System, Role::User, Role::Assistant, Role::User]);
    }

    #[tokio::test]
    async fn test_budget_depends_on_history() {
        let looping = || {
            let mut script = vec![Ok(text("q"))];
            script.extend((0..10).map(|i| Ok(tool_call(&format!("c{i}")))));
            Scripted::new(script)
        };

        let provider = looping();
        let outcome = agent(provider.clone()).run("問題", None).await;
        assert!(matches!(outcome, AgentOutcome::MaxIterationsExceeded { max_iterations: 3 }));
        assert_eq!(provider.requests().len(), 1 + 3);

        let provider = looping();
        let no_turns: Vec<ChatMessage> = Vec::new();
        let answer = agent(provider.clone())
            .generate_agent_response("問題", Some(no_turns.as_slice()))
            .await;
        assert_eq!(answer, MAX_ITERATIONS_MESSAGE);
        assert_eq!(provider.requests().len(), 1 + 5);
    }

    #[tokio::test]
    async fn test_rewrite_failure_keeps_question() {
        let provider = Scripted::new(vec![Err(RagError::ServiceUnavailable {
            service: "completion".to_string(),
            message: "down".to_string(),
        })]);
        assert_eq!(agent(provider).rewrite_query("資遣費").await, "資遣費");
    }

    #[tokio::test]
    async fn test_empty_question_is_fatal_answer() {
        let provider = Scripted::new(Vec::new());
        let answer = agent(provider.clone()).generate_agent_response("  ", None).await;
        assert!(answer.starts_with(crate::agent::agentic_loop::FATAL_MESSAGE_PREFIX));
        assert!(provider.requests().is_empty());
    }

    #[tokio::test]
    async fn test_tracking_counts_rewrite_and_agent_tokens() {
        let provider = Scripted::new(vec![Ok(text("q")), Ok(tool_call("c1")), Ok(text("a"))]);
        let agent = agent(provider);
        let (answer, details) = agent.execute_query_with_tracking("問題", None).await;
        assert_eq!(answer, "a");
        // rewrite + final answer report usage; the tool-call turn reports none
        assert_eq!(details.token_usage.input, 20);
        assert_eq!(details.token_usage.output, 4);
        assert_eq!(details.token_usage.total, 24);
        assert!(details.used_chunks.is_empty());
    }
}
