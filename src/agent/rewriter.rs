//! Query rewriter.
//!
//! One tool-free completion that turns the user's question into a
//! search-oriented query. Rewriting is best effort: any failure returns
//! the original question.

use async_trait::async_trait;
use tracing::{info, warn};

use super::provider::LlmProvider;
use super::traits::Agent;

/// Rewrites questions into precise statute search queries.
#[derive(Debug, Clone)]
pub struct QueryRewriter {
    model: String,
    system_prompt: String,
    max_tokens: Option<u32>,
}

impl QueryRewriter {
    /// Creates a rewriter with the given model and system prompt.
    #[must_use]
    pub fn new(model: impl Into<String>, system_prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            system_prompt: system_prompt.into(),
            max_tokens: None,
        }
    }

    /// Caps the rewritten query length.
    #[must_use]
    pub const fn with_max_tokens(mut self, max_tokens: Option<u32>) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Rewrites `question`, returning it unchanged on any failure or an
    /// empty response.
    pub async fn rewrite(&self, provider: &dyn LlmProvider, question: &str) -> String {
        info!(question, "rewriting query");
        match self.execute(provider, question).await {
            Ok(response) => {
                let rewritten = response.content.trim();
                if rewritten.is_empty() {
                    warn!("rewriter returned empty text, keeping original question");
                    return question.to_string();
                }
                info!(
                    rewritten,
                    input_tokens = response.usage.prompt_tokens,
                    output_tokens = response.usage.completion_tokens,
                    "query rewritten"
                );
                rewritten.to_string()
            }
            Err(e) => {
                warn!(error = %e, "query rewrite failed, keeping original question");
                question.to_string()
            }
        }
    }
}

#[async_trait]
impl Agent for QueryRewriter {
    fn name(&self) -> &'static str {
        "rewriter"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    fn max_tokens(&self) -> Option<u32> {
        self.max_tokens
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::agent::message::{ChatRequest, ChatResponse, Role, ToolChoice};
    use crate::error::RagError;

    struct ScriptedProvider {
        reply: Result<String, String>,
        seen: Mutex<Vec<ChatRequest>>,
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, RagError> {
            if let Ok(mut seen) = self.seen.lock() {
                seen.push(request.clone());
            }
            match &self.reply {
                Ok(text) => Ok(ChatResponse {
                    content: text.clone(),
                    ..ChatResponse::default()
                }),
                Err(message) => Err(RagError::ServiceUnavailable {
                    service: "completion".to_string(),
                    message: message.clone(),
                }),
            }
        }
    }

    fn provider(reply: Result<&str, &str>) -> ScriptedProvider {
        ScriptedProvider {
            reply: reply.map(str::to_string).map_err(str::to_string),
            seen: Mutex::new(Vec::new()),
        }
    }

    #[tokio::test]
    async fn test_rewrite_uses_trimmed_response() {
        let p = provider(Ok("  勞動基準法延長工時工資計算方式？\n"));
        let rewriter = QueryRewriter::new("mini", "rewrite please");
        let out = rewriter.rewrite(&p, "加班費怎麼算？").await;
        assert_eq!(out, "勞動基準法延長工時工資計算方式？");

        let seen = p.seen.lock().map(|s| s.clone()).unwrap_or_default();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].tools.is_empty());
        assert_eq!(seen[0].tool_choice, ToolChoice::None);
        assert_eq!(seen[0].messages[0].role, Role::System);
        assert_eq!(seen[0].messages[1].content, "加班費怎麼算？");
    }

    #[tokio::test]
    async fn test_rewrite_falls_back_on_error() {
        let p = provider(Err("connection reset"));
        let rewriter = QueryRewriter::new("mini", "rewrite please");
        assert_eq!(rewriter.rewrite(&p, "特休幾天？").await, "特休幾天？");
    }

    #[tokio::test]
    async fn test_rewrite_falls_back_on_empty_text() {
        let p = provider(Ok("   "));
        let rewriter = QueryRewriter::new("mini", "rewrite please");
        assert_eq!(rewriter.rewrite(&p, "特休幾天？").await, "特休幾天？");
    }
}
