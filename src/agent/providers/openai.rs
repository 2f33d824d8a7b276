//! `OpenAI` provider implementation using the `async-openai` crate.
//!
//! Supports any `OpenAI`-compatible API (`OpenAI`, Azure gateways, local
//! proxies) via the base URL override in [`AgentConfig`].

use async_openai::Client;
use async_openai::config::OpenAIConfig;
use async_openai::types::{
    ChatCompletionMessageToolCall, ChatCompletionRequestAssistantMessage,
    ChatCompletionRequestAssistantMessageContent, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessage, ChatCompletionRequestSystemMessageContent,
    ChatCompletionRequestToolMessage, ChatCompletionRequestToolMessageContent,
    ChatCompletionRequestUserMessage, ChatCompletionRequestUserMessageContent, ChatCompletionTool,
    ChatCompletionToolChoiceOption, ChatCompletionToolType, CreateChatCompletionRequest,
    CreateChatCompletionResponse, FunctionCall, FunctionObject,
};
use async_trait::async_trait;
use tracing::debug;

use crate::agent::config::AgentConfig;
use crate::agent::message::{ChatMessage, ChatRequest, ChatResponse, Role, TokenUsage, ToolChoice};
use crate::agent::provider::LlmProvider;
use crate::agent::tool::{ToolCall, ToolDefinition};
use crate::error::RagError;

/// Chat completions over an `OpenAI`-compatible endpoint.
pub struct OpenAiProvider {
    client: Client<OpenAIConfig>,
}

impl OpenAiProvider {
    /// Creates a provider from the completion key and base URL in `config`.
    #[must_use]
    pub fn new(config: &AgentConfig) -> Self {
        let mut openai_config = OpenAIConfig::new().with_api_key(&config.api_key);
        if let Some(base_url) = config.base_url.as_deref() {
            openai_config = openai_config.with_api_base(base_url);
        }
        Self {
            client: Client::with_config(openai_config),
        }
    }

    fn build_request(request: &ChatRequest) -> CreateChatCompletionRequest {
        let tools: Option<Vec<ChatCompletionTool>> =
            (!request.tools.is_empty()).then(|| request.tools.iter().map(Into::into).collect());

        // Sending tool_choice without tools is rejected by the API.
        let tool_choice = tools.as_ref().map(|_| match request.tool_choice {
            ToolChoice::Auto => ChatCompletionToolChoiceOption::Auto,
            ToolChoice::None => ChatCompletionToolChoiceOption::None,
        });

        CreateChatCompletionRequest {
            model: request.model.clone(),
            messages: request.messages.iter().map(Into::into).collect(),
            temperature: request.temperature,
            max_completion_tokens: request.max_tokens,
            tools,
            tool_choice,
            ..Default::default()
        }
    }
}

impl From<&ChatMessage> for ChatCompletionRequestMessage {
    fn from(msg: &ChatMessage) -> Self {
        let text = msg.content.clone();
        match msg.role {
            Role::System => Self::System(ChatCompletionRequestSystemMessage {
                content: ChatCompletionRequestSystemMessageContent::Text(text),
                name: None,
            }),
            Role::User => Self::User(ChatCompletionRequestUserMessage {
                content: ChatCompletionRequestUserMessageContent::Text(text),
                name: None,
            }),
            Role::Assistant => {
                let tool_calls = (!msg.tool_calls.is_empty())
                    .then(|| msg.tool_calls.iter().map(Into::into).collect());
                let content =
                    (!text.is_empty()).then_some(ChatCompletionRequestAssistantMessageContent::Text(text));
                #[allow(deprecated)]
                Self::Assistant(ChatCompletionRequestAssistantMessage {
                    content,
                    name: None,
                    tool_calls,
                    refusal: None,
                    audio: None,
                    function_call: None,
                })
            }
            Role::Tool => Self::Tool(ChatCompletionRequestToolMessage {
                content: ChatCompletionRequestToolMessageContent::Text(text),
                tool_call_id: msg.tool_call_id.clone().unwrap_or_default(),
            }),
        }
    }
}

impl From<&ToolCall> for ChatCompletionMessageToolCall {
    fn from(call: &ToolCall) -> Self {
        Self {
            id: call.id.clone(),
            r#type: ChatCompletionToolType::Function,
            function: FunctionCall {
                name: call.name.clone(),
                arguments: call.arguments.clone(),
            },
        }
    }
}

impl From<&ToolDefinition> for ChatCompletionTool {
    fn from(def: &ToolDefinition) -> Self {
        Self {
            r#type: ChatCompletionToolType::Function,
            function: FunctionObject {
                name: def.name.clone(),
                description: Some(def.description.clone()),
                parameters: Some(def.parameters.clone()),
                strict: None,
            },
        }
    }
}

/// Reads the first choice; a response without choices is an empty answer.
fn parse_response(response: CreateChatCompletionResponse) -> ChatResponse {
    let usage = response.usage.map_or_else(TokenUsage::default, |u| TokenUsage {
        prompt_tokens: u.prompt_tokens,
        completion_tokens: u.completion_tokens,
        total_tokens: u.total_tokens,
    });

    let Some(choice) = response.choices.into_iter().next() else {
        return ChatResponse {
            usage,
            ..ChatResponse::default()
        };
    };

    let tool_calls = choice
        .message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|tc| ToolCall {
            id: tc.id,
            name: tc.function.name,
            arguments: tc.function.arguments,
        })
        .collect();

    ChatResponse {
        content: choice.message.content.unwrap_or_default(),
        usage,
        tool_calls,
        // Serialized form matches the wire value, e.g. "tool_calls".
        finish_reason: choice
            .finish_reason
            .and_then(|reason| serde_json::to_value(reason).ok())
            .and_then(|v| v.as_str().map(str::to_owned)),
    }
}

impl std::fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiProvider").finish_non_exhaustive()
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, RagError> {
        debug!(
            model = request.model,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "chat completion request"
        );
        let response = self
            .client
            .chat()
            .create(Self::build_request(request))
            .await
            .map_err(|e| RagError::ServiceUnavailable {
                service: "completion".to_string(),
                message: e.to_string(),
            })?;
        Ok(parse_response(response))
    }
}
