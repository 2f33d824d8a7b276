//! Agentic tool-calling loop.
//!
//! Drives the LLM ↔ tool execution round-trip: sends the conversation to the
//! model, dispatches any tool calls in the response, appends results in
//! request order, and repeats until the model produces a final text answer
//! or the iteration budget runs out.

use tracing::{debug, info, warn};

use super::executor::ToolDispatcher;
use super::message::{ChatRequest, assistant_tool_calls_message, tool_message};
use super::provider::LlmProvider;
use crate::error::RagError;

/// Answer returned when the iteration budget is exhausted.
pub const MAX_ITERATIONS_MESSAGE: &str = "抱歉，AI Agent 達到最大迭代次數，無法完成回答。";

/// Prefix of the answer returned after a fatal error.
pub const FATAL_MESSAGE_PREFIX: &str = "抱歉，處理您的問題時發生錯誤：AI Agent 處理錯誤: ";

/// Terminal state of one agent run.
#[derive(Debug)]
pub enum AgentOutcome {
    /// The model produced a final text answer.
    Done {
        /// Final answer text.
        answer: String,
        /// Model calls made, including the final one.
        iterations: usize,
    },
    /// The model kept requesting tools past the budget.
    MaxIterationsExceeded {
        /// Budget that was exhausted.
        max_iterations: usize,
    },
    /// An unrecoverable error ended the run.
    Fatal(RagError),
}

impl AgentOutcome {
    /// Renders the user-visible answer for this outcome.
    #[must_use]
    pub fn into_answer(self) -> String {
        match self {
            Self::Done { answer, .. } => answer,
            Self::MaxIterationsExceeded { .. } => MAX_ITERATIONS_MESSAGE.to_string(),
            Self::Fatal(e) => format!("{FATAL_MESSAGE_PREFIX}{e}"),
        }
    }

    /// Returns `true` if the model produced an answer.
    #[must_use]
    pub const fn is_done(&self) -> bool {
        matches!(self, Self::Done { .. })
    }
}

/// Runs the agentic loop: model → tool calls → tool results → model → …
///
/// `request` is mutated in place: every assistant tool-call message and tool
/// result is appended, so after return it holds the full transcript.
///
/// A single tool call runs inline; several run through
/// [`ToolDispatcher::execute_concurrently`]. Tool failures arrive as error
/// payloads and never end the loop.
pub async fn agentic_loop(
    provider: &dyn LlmProvider,
    request: &mut ChatRequest,
    dispatcher: &dyn ToolDispatcher,
    max_iterations: usize,
) -> AgentOutcome {
    for iteration in 0..max_iterations {
        info!(iteration = iteration + 1, max_iterations, "calling model");

        let response = match provider.chat(request).await {
            Ok(r) => r,
            Err(e) => {
                warn!(iteration = iteration + 1, error = %e, "model call failed");
                return AgentOutcome::Fatal(e);
            }
        };

        if response.tool_calls.is_empty() {
            if response.content.trim().is_empty() {
                return AgentOutcome::Fatal(RagError::FatalOrchestrator {
                    message: "language model returned an empty response".to_string(),
                });
            }
            debug!(iteration = iteration + 1, "agentic loop completed with final text response");
            return AgentOutcome::Done {
                answer: response.content,
                iterations: iteration + 1,
            };
        }

        debug!(
            iteration = iteration + 1,
            tool_count = response.tool_calls.len(),
            "executing tool calls"
        );

        let calls = response.tool_calls;
        request
            .messages
            .push(assistant_tool_calls_message(response.content, calls.clone()));

        let results = if let [call] = calls.as_slice() {
            vec![dispatcher.execute(call).await]
        } else {
            dispatcher.execute_concurrently(&calls).await
        };

        for result in &results {
            debug!(
                tool = result.tool_name,
                call_id = result.tool_call_id,
                is_error = !result.success,
                "appending tool result"
            );
            request
                .messages
                .push(tool_message(&result.tool_call_id, &result.content()));
        }
    }

    warn!(max_iterations, "agent reached maximum iterations");
    AgentOutcome::MaxIterationsExceeded { max_iterations }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use serde_json::{Value, json};

    use super::*;
    use crate::agent::executor::ToolExecutor;
    use crate::agent::message::{
        ChatResponse, Role, TokenUsage, ToolChoice, system_message, user_message,
    };
    use crate::agent::tool::{Tool, ToolCall, ToolDefinition, ToolRegistry};

    /// Returns `calls_per_round` tool calls on the first `tool_rounds` calls,
    /// then a final text response.
    struct MockToolProvider {
        call_count: AtomicUsize,
        tool_rounds: usize,
        calls_per_round: usize,
        final_text: &'static str,
    }

    impl MockToolProvider {
        fn new(tool_rounds: usize) -> Self {
            Self {
                call_count: AtomicUsize::new(0),
                tool_rounds,
                calls_per_round: 1,
                final_text: "Final answer based on tool results.",
            }
        }
    }

    #[async_trait]
    impl LlmProvider for MockToolProvider {
        fn name(&self) -> &'static str {
            "mock"
        }

        async fn chat(&self, _request: &ChatRequest) -> Result<ChatResponse, RagError> {
            let count = self.call_count.fetch_add(1, Ordering::SeqCst);

            if count < self.tool_rounds {
                Ok(ChatResponse {
                    content: String::new(),
                    usage: TokenUsage::default(),
                    tool_calls: (0..self.calls_per_round)
                        .map(|i| ToolCall {
                            id: format!("call_{count}_{i}"),
                            name: "lookup".to_string(),
                            arguments: format!(r#"{{"article":{i}}}"#),
                        })
                        .collect(),
                    finish_reason: Some("tool_calls".to_string()),
                })
            } else {
                Ok(ChatResponse {
                    content: self.final_text.to_string(),
                    usage: TokenUsage {
                        prompt_tokens: 100,
                        completion_tokens: 20,
                        total_tokens: 120,
                    },
                    tool_calls: Vec::new(),
                    finish_reason: Some("stop".to_string()),
                })
            }
        }
    }

    struct FailingProvider;

    #[async_trait]
    impl LlmProvider for FailingProvider {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn chat(&self, _request: &ChatRequest) -> Result<ChatResponse, RagError> {
            Err(RagError::ServiceUnavailable {
                service: "completion".to_string(),
                message: "503".to_string(),
            })
        }
    }

    struct LookupTool;

    #[async_trait]
    impl Tool for LookupTool {
        fn definition(&self) -> ToolDefinition {
            ToolDefinition {
                name: "lookup".to_string(),
                description: "Looks up an article.".to_string(),
                parameters: json!({"type": "object", "properties": {"article": {"type": "integer"}}}),
            }
        }

        async fn call(&self, arguments: Value) -> Result<Value, RagError> {
            Ok(json!({"success": true, "article": arguments["article"]}))
        }
    }

    fn executor() -> ToolExecutor {
        let mut registry = ToolRegistry::new();
        registry
            .register(Arc::new(LookupTool))
            .unwrap_or_else(|e| panic!("register failed: {e}"));
        ToolExecutor::new(Arc::new(registry))
    }

    fn request() -> ChatRequest {
        ChatRequest {
            model: "test".to_string(),
            messages: vec![system_message("test"), user_message("query")],
            temperature: Some(0.0),
            max_tokens: None,
            tools: Vec::new(),
            tool_choice: ToolChoice::Auto,
        }
    }

    #[tokio::test]
    async fn test_single_tool_round() {
        let mut req = request();
        let outcome = agentic_loop(&MockToolProvider::new(1), &mut req, &executor(), 3).await;

        assert!(matches!(outcome, AgentOutcome::Done { iterations: 2, .. }));
        // system + user + assistant(tool_calls) + tool(result)
        assert_eq!(req.messages.len(), 4);
        assert_eq!(req.messages[3].role, Role::Tool);
        assert_eq!(req.messages[3].tool_call_id.as_deref(), Some("call_0_0"));
    }

    #[tokio::test]
    async fn test_concurrent_round_preserves_order() {
        let provider = MockToolProvider {
            calls_per_round: 3,
            ..MockToolProvider::new(1)
        };
        let mut req = request();
        let outcome = agentic_loop(&provider, &mut req, &executor(), 3).await;

        assert!(outcome.is_done());
        let ids: Vec<_> = req.messages[3..]
            .iter()
            .filter_map(|m| m.tool_call_id.as_deref())
            .collect();
        assert_eq!(ids, ["call_0_0", "call_0_1", "call_0_2"]);
    }

    #[tokio::test]
    async fn test_exceeds_max_iterations() {
        let provider = MockToolProvider::new(100);
        let mut req = request();
        let outcome = agentic_loop(&provider, &mut req, &executor(), 3).await;

        assert!(matches!(
            outcome,
            AgentOutcome::MaxIterationsExceeded { max_iterations: 3 }
        ));
        assert_eq!(provider.call_count.load(Ordering::SeqCst), 3);
        assert_eq!(outcome.into_answer(), MAX_ITERATIONS_MESSAGE);
    }

    #[tokio::test]
    async fn test_no_tools_returns_immediately() {
        let mut req = request();
        let outcome = agentic_loop(&MockToolProvider::new(0), &mut req, &executor(), 3).await;

        assert_eq!(outcome.into_answer(), "Final answer based on tool results.");
        assert_eq!(req.messages.len(), 2);
    }

    #[tokio::test]
    async fn test_model_failure_is_fatal() {
        let mut req = request();
        let outcome = agentic_loop(&FailingProvider, &mut req, &executor(), 3).await;

        let answer = outcome.into_answer();
        assert!(answer.starts_with(FATAL_MESSAGE_PREFIX));
        assert!(answer.contains("503"));
    }

    #[tokio::test]
    async fn test_empty_final_text_is_fatal() {
        let provider = MockToolProvider {
            final_text: "  ",
            ..MockToolProvider::new(0)
        };
        let mut req = request();
        let outcome = agentic_loop(&provider, &mut req, &executor(), 3).await;
        assert!(matches!(
            outcome,
            AgentOutcome::Fatal(RagError::FatalOrchestrator { .. })
        ));
    }

    #[tokio::test]
    async fn test_unknown_tool_does_not_end_loop() {
        struct UnknownThenAnswer(AtomicUsize);

        #[async_trait]
        impl LlmProvider for UnknownThenAnswer {
            fn name(&self) -> &'static str {
                "unknown-then-answer"
            }

            async fn chat(&self, _request: &ChatRequest) -> Result<ChatResponse, RagError> {
                if self.0.fetch_add(1, Ordering::SeqCst) == 0 {
                    Ok(ChatResponse {
                        tool_calls: vec![ToolCall {
                            id: "x".to_string(),
                            name: "calculator".to_string(),
                            arguments: "{}".to_string(),
                        }],
                        ..ChatResponse::default()
                    })
                } else {
                    Ok(ChatResponse {
                        content: "done".to_string(),
                        ..ChatResponse::default()
                    })
                }
            }
        }

        let mut req = request();
        let outcome =
            agentic_loop(&UnknownThenAnswer(AtomicUsize::new(0)), &mut req, &executor(), 3).await;
        assert!(outcome.is_done());
        assert!(req.messages[3].content.contains("unknown_tool"));
    }
}
