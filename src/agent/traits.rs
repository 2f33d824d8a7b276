//! Agent trait definition.
//!
//! Single-shot agents (currently the query rewriter) implement this trait:
//! a fixed system prompt and model configuration applied to one user
//! message, with no tools.

use async_trait::async_trait;

use super::message::{ChatRequest, TokenUsage, ToolChoice, system_message, user_message};
use super::provider::LlmProvider;
use crate::error::RagError;

/// Response from an agent execution.
#[derive(Debug, Clone)]
pub struct AgentResponse {
    /// The agent's text output.
    pub content: String,
    /// Token usage for this call.
    pub usage: TokenUsage,
    /// Why the model stopped generating (e.g. `"stop"`, `"length"`).
    pub finish_reason: Option<String>,
}

/// Trait implemented by single-shot agents.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Agent name for logging and identification.
    fn name(&self) -> &'static str;

    /// Model identifier to use for this agent.
    fn model(&self) -> &str;

    /// System prompt that defines the agent's role and behavior.
    fn system_prompt(&self) -> &str;

    /// Sampling temperature.
    fn temperature(&self) -> f32 {
        0.0
    }

    /// Maximum tokens for the response, if capped.
    fn max_tokens(&self) -> Option<u32> {
        None
    }

    /// Executes the agent with the given user message.
    ///
    /// The request carries no tools and [`ToolChoice::None`].
    ///
    /// # Errors
    ///
    /// Returns [`RagError`] on provider failures.
    async fn execute(
        &self,
        provider: &dyn LlmProvider,
        user_msg: &str,
    ) -> Result<AgentResponse, RagError> {
        let request = ChatRequest {
            model: self.model().to_string(),
            messages: vec![system_message(self.system_prompt()), user_message(user_msg)],
            temperature: Some(self.temperature()),
            max_tokens: self.max_tokens(),
            tools: Vec::new(),
            tool_choice: ToolChoice::None,
        };

        let response = provider.chat(&request).await?;

        Ok(AgentResponse {
            content: response.content,
            usage: response.usage,
            finish_reason: response.finish_reason,
        })
    }
}
