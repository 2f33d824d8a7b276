//! OpenAI-compatible embedding backend via `async-openai`.

use async_openai::Client;
use async_openai::config::OpenAIConfig;
use async_openai::types::CreateEmbeddingRequestArgs;
use async_trait::async_trait;

use super::Embedder;
use crate::agent::config::AgentConfig;
use crate::error::RagError;

/// Embedding client for `POST /embeddings` on an OpenAI-compatible API.
pub struct OpenAiEmbedder {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiEmbedder {
    /// Creates an embedder from explicit credentials.
    #[must_use]
    pub fn new(api_key: &str, base_url: Option<&str>, model: impl Into<String>) -> Self {
        let mut openai_config = OpenAIConfig::new().with_api_key(api_key);
        if let Some(base_url) = base_url {
            openai_config = openai_config.with_api_base(base_url);
        }
        Self {
            client: Client::with_config(openai_config),
            model: model.into(),
        }
    }

    /// Creates an embedder from agent configuration.
    ///
    /// The embedding key and URL fall back to the completion service's.
    #[must_use]
    pub fn from_config(config: &AgentConfig) -> Self {
        let api_key = config
            .embedding_api_key
            .as_deref()
            .unwrap_or(&config.api_key);
        let base_url = config
            .embedding_base_url
            .as_deref()
            .or(config.base_url.as_deref());
        Self::new(api_key, base_url, config.embedding_model.clone())
    }
}

impl std::fmt::Debug for OpenAiEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiEmbedder")
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn model(&self) -> &str {
        &self.model
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, RagError> {
        let unavailable = |message: String| RagError::ServiceUnavailable {
            service: "embedding".to_string(),
            message,
        };

        let request = CreateEmbeddingRequestArgs::default()
            .model(&self.model)
            .input(text)
            .build()
            .map_err(|e| unavailable(e.to_string()))?;

        let response = self
            .client
            .embeddings()
            .create(request)
            .await
            .map_err(|e| unavailable(e.to_string()))?;

        response
            .data
            .into_iter()
            .next()
            .map(|item| item.embedding)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| unavailable("response contained no embedding".to_string()))
    }
}
