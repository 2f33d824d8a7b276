//! Error types for the retrieval and agent pipeline.
//!
//! A single [`RagError`] covers transport failures, tool failures and
//! orchestration faults. Tool failures are turned into structured payloads
//! by the executor (see [`RagError::to_payload`]) so the language model can
//! react to them in its next turn; only orchestration faults end a query.

use serde_json::{Value, json};
use thiserror::Error;

/// Result alias for library operations.
pub type Result<T> = std::result::Result<T, RagError>;

/// Errors produced by the retrieval and agent pipeline.
#[derive(Debug, Error)]
pub enum RagError {
    /// An external service (embedding, completion, web search) failed.
    #[error("{service} service unavailable: {message}")]
    ServiceUnavailable {
        /// Service name (e.g. `"embedding"`, `"completion"`).
        service: String,
        /// Underlying failure description.
        message: String,
    },

    /// The backing vector store could not be reached or queried.
    #[error("vector store unavailable: {message}")]
    StoreUnavailable {
        /// Underlying failure description.
        message: String,
    },

    /// A tool call named a tool that is not registered.
    #[error("unknown tool: {name}")]
    UnknownTool {
        /// Requested tool name.
        name: String,
    },

    /// A tool did not complete within its time budget.
    #[error("tool '{name}' timed out after {timeout_secs}s")]
    ToolTimeout {
        /// Tool name.
        name: String,
        /// Timeout that elapsed, in seconds.
        timeout_secs: u64,
    },

    /// Tool arguments could not be parsed or did not match the schema.
    #[error("invalid arguments for tool '{name}': {message}")]
    InvalidToolArguments {
        /// Tool name.
        name: String,
        /// What was wrong with the arguments.
        message: String,
    },

    /// A tool handler failed while running.
    #[error("tool '{name}' failed: {message}")]
    ToolExecution {
        /// Tool name.
        name: String,
        /// Failure description.
        message: String,
    },

    /// The tool-calling loop ran out of iterations.
    #[error("agent exceeded {max_iterations} tool-calling iterations")]
    MaxIterationsExceeded {
        /// Configured iteration budget.
        max_iterations: usize,
    },

    /// Unanticipated failure that terminates the current query.
    #[error("{message}")]
    FatalOrchestrator {
        /// Failure description.
        message: String,
    },

    /// No API key was configured for the completion service.
    #[error("API key missing: set OPENAI_API_KEY or RAG_API_KEY")]
    ApiKeyMissing,

    /// The configured provider name is not supported.
    #[error("unsupported provider: {name}")]
    UnsupportedProvider {
        /// Requested provider name.
        name: String,
    },

    /// Invalid configuration value.
    #[error("configuration error: {message}")]
    Config {
        /// Description of the invalid value.
        message: String,
    },

    /// A tool with the same name was registered twice.
    #[error("tool already registered: {name}")]
    DuplicateTool {
        /// Duplicated tool name.
        name: String,
    },

    /// A reranker model failed to load.
    #[error("failed to load model '{model}': {message}")]
    ModelLoad {
        /// Model identifier.
        model: String,
        /// Failure description.
        message: String,
    },
}

impl RagError {
    /// Stable snake_case tag for this error, used in tool error payloads.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::ServiceUnavailable { .. } => "service_unavailable",
            Self::StoreUnavailable { .. } => "store_unavailable",
            Self::UnknownTool { .. } => "unknown_tool",
            Self::ToolTimeout { .. } => "tool_timeout",
            Self::InvalidToolArguments { .. } => "invalid_tool_arguments",
            Self::ToolExecution { .. } => "tool_execution",
            Self::MaxIterationsExceeded { .. } => "max_iterations_exceeded",
            Self::FatalOrchestrator { .. } => "fatal_orchestrator_error",
            Self::ApiKeyMissing => "api_key_missing",
            Self::UnsupportedProvider { .. } => "unsupported_provider",
            Self::Config { .. } => "config",
            Self::DuplicateTool { .. } => "duplicate_tool",
            Self::ModelLoad { .. } => "model_load",
        }
    }

    /// Renders this error as a tool result payload.
    #[must_use]
    pub fn to_payload(&self) -> Value {
        json!({
            "error": {
                "kind": self.kind(),
                "message": self.to_string(),
            }
        })
    }

    /// Shorthand for a [`RagError::ToolExecution`].
    pub fn tool(name: &str, message: impl Into<String>) -> Self {
        Self::ToolExecution {
            name: name.to_string(),
            message: message.into(),
        }
    }
}

impl From<rusqlite::Error> for RagError {
    fn from(err: rusqlite::Error) -> Self {
        Self::StoreUnavailable {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_tags() {
        let err = RagError::UnknownTool {
            name: "calculator".to_string(),
        };
        assert_eq!(err.kind(), "unknown_tool");
        assert_eq!(err.to_string(), "unknown tool: calculator");

        let err = RagError::ToolTimeout {
            name: "web_search".to_string(),
            timeout_secs: 60,
        };
        assert_eq!(err.kind(), "tool_timeout");
        assert!(err.to_string().contains("60s"));
    }

    #[test]
    fn test_payload_shape() {
        let payload = RagError::tool("vector_search", "boom").to_payload();
        assert_eq!(payload["error"]["kind"], "tool_execution");
        assert_eq!(
            payload["error"]["message"],
            "tool 'vector_search' failed: boom"
        );
    }

    #[test]
    fn test_sqlite_error_maps_to_store_unavailable() {
        let err: RagError = rusqlite::Error::InvalidQuery.into();
        assert_eq!(err.kind(), "store_unavailable");
    }
}
