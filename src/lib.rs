//! # statute-rag
//!
//! Retrieval-augmented question answering over the Labor Standards Act.
//!
//! A question is rewritten into a search-oriented query, then a
//! tool-calling language model answers it with two tools: `vector_search`
//! (embedding similarity over a `SQLite` store of statute chunks, reordered
//! by a cross-encoder) and `web_search` (Tavily). The loop is bounded, every
//! tool call has a timeout, and tool failures are reported back to the model
//! as structured payloads instead of aborting the query.
//!
//! ## Modules
//!
//! - [`agent`]: provider abstraction, tool registry/executor, query
//!   rewriter, agent loop and technical-detail tracking
//! - [`embedding`]: embedding gateway and vector helpers
//! - [`storage`]: vector store trait and `SQLite` implementation
//! - [`rerank`]: cross-encoder reranking with a fallback chain
//! - [`tools`]: the `vector_search` and `web_search` tools
//! - [`cli`]: command-line interface

pub mod agent;
pub mod cli;
pub mod embedding;
pub mod error;
pub mod rerank;
pub mod storage;
pub mod tools;

pub use agent::{AgentConfig, AgentOutcome, RagAgent, TechnicalDetails};
pub use embedding::{Embedder, EmbeddingGateway, cosine_similarity};
pub use error::{RagError, Result};
pub use rerank::{CrossEncoder, Reranker, RerankerTier};
pub use storage::{SearchResult, SqliteVectorStore, VectorStore};
