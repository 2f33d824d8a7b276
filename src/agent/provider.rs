//! Pluggable LLM provider trait and the retrying decorator.
//!
//! Implementations translate provider-agnostic [`ChatRequest`]/[`ChatResponse`]
//! into provider-specific SDK calls. The orchestrator only ever sees this
//! trait, which is also the seam the tracker wraps.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use super::message::{ChatRequest, ChatResponse};
use crate::error::RagError;

/// Trait for LLM provider backends.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider name (e.g., `"openai"`).
    fn name(&self) -> &'static str;

    /// Executes a chat completion request.
    ///
    /// # Errors
    ///
    /// Returns [`RagError`] on API failures, timeouts, or parse errors.
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, RagError>;
}

/// Retries a provider a fixed number of times with no backoff.
///
/// After the last failed attempt the error is reported as
/// [`RagError::ServiceUnavailable`].
pub struct RetryingProvider {
    inner: Arc<dyn LlmProvider>,
    max_attempts: u32,
}

impl RetryingProvider {
    /// Wraps `inner`, allowing up to `max_attempts` calls per request (minimum 1).
    #[must_use]
    pub fn new(inner: Arc<dyn LlmProvider>, max_attempts: u32) -> Self {
        Self {
            inner,
            max_attempts: max_attempts.max(1),
        }
    }
}

#[async_trait]
impl LlmProvider for RetryingProvider {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, RagError> {
        let mut last_error = String::new();
        for attempt in 1..=self.max_attempts {
            match self.inner.chat(request).await {
                Ok(response) => return Ok(response),
                Err(e) => {
                    warn!(
                        provider = self.inner.name(),
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %e,
                        "chat completion failed"
                    );
                    last_error = e.to_string();
                }
            }
        }
        Err(RagError::ServiceUnavailable {
            service: "completion".to_string(),
            message: last_error,
        })
    }
}

impl std::fmt::Debug for RetryingProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryingProvider")
            .field("inner", &self.inner.name())
            .field("max_attempts", &self.max_attempts)
            .finish()
    }
}
