//! Provider registry and factory.
//!
//! Maps provider names to concrete [`LlmProvider`] implementations and
//! wraps them in the retrying decorator.

use std::sync::Arc;

use crate::agent::config::AgentConfig;
use crate::agent::provider::{LlmProvider, RetryingProvider};
use crate::agent::providers::OpenAiProvider;
use crate::error::RagError;

/// Creates an [`LlmProvider`] based on the configured provider name.
///
/// The returned provider retries each request up to
/// [`AgentConfig::chat_attempts`] times.
///
/// # Supported Providers
///
/// - `"openai"` (default): OpenAI-compatible APIs via `async-openai`,
///   including Azure-style gateways reached through `base_url`
///
/// # Errors
///
/// Returns [`RagError::UnsupportedProvider`] for unknown provider names.
pub fn create_provider(config: &AgentConfig) -> Result<Arc<dyn LlmProvider>, RagError> {
    let inner: Arc<dyn LlmProvider> = match config.provider.as_str() {
        "openai" => Arc::new(OpenAiProvider::new(config)),
        other => {
            return Err(RagError::UnsupportedProvider {
                name: other.to_string(),
            });
        }
    };
    Ok(Arc::new(RetryingProvider::new(inner, config.chat_attempts)))
}
