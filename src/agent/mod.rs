//! Tool-calling agent for labor-law questions.
//!
//! Provides the query pipeline on top of a pluggable provider abstraction
//! backed by OpenAI-compatible APIs.
//!
//! # Architecture
//!
//! ```text
//! Question → QueryRewriter (one tool-free completion)
//!   └── RagAgent
//!       ├── system prompt + history + original/rewritten question
//!       └── agentic_loop (bounded: 3 single-shot, 5 conversational)
//!           ├── LlmProvider::chat (tools offered, tool_choice = auto)
//!           └── ToolExecutor (60 s per call, 3 workers)
//!               ├── vector_search → embed → SQLite cosine → rerank
//!               └── web_search → Tavily
//! ```
//!
//! [`tracker`] wraps the provider and executor ports to record token usage
//! and the chunks handed to the model.

pub mod agentic_loop;
pub mod client;
pub mod config;
pub mod executor;
pub mod message;
pub mod orchestrator;
pub mod prompt;
pub mod provider;
pub mod providers;
pub mod rewriter;
pub mod tool;
pub mod tracker;
pub mod traits;

// Re-export key types
pub use agentic_loop::{AgentOutcome, FATAL_MESSAGE_PREFIX, MAX_ITERATIONS_MESSAGE, agentic_loop};
pub use client::create_provider;
pub use config::{AgentConfig, AgentConfigBuilder, RerankerMode};
pub use executor::{ToolDispatcher, ToolExecutor};
pub use message::{ChatMessage, ChatRequest, ChatResponse, Role, TokenUsage, ToolChoice};
pub use orchestrator::RagAgent;
pub use prompt::PromptSet;
pub use provider::{LlmProvider, RetryingProvider};
pub use rewriter::QueryRewriter;
pub use tool::{Tool, ToolCall, ToolDefinition, ToolRegistry, ToolResult};
pub use tracker::{TechnicalDetails, Tracker, TrackingDispatcher, TrackingProvider};
pub use traits::{Agent, AgentResponse};
