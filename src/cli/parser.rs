//! Command-line argument parsing.
//!
//! Defines the CLI structure using clap derive macros.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::rerank::DEFAULT_TOP_K;
use crate::tools::vector_search::DEFAULT_LIMIT;

/// Default database path when neither `--db-path` nor `RAG_DB_PATH` is set.
pub const DEFAULT_DB_PATH: &str = "labor_law.db";

/// statute-rag: labor-law question answering over a statute vector store.
///
/// Rewrites the question, searches the statute store and the web through a
/// tool-calling model, and prints the model's answer.
#[derive(Parser, Debug)]
#[command(name = "statute-rag")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the statute vector database.
    ///
    /// Defaults to `labor_law.db` in the current directory.
    #[arg(short, long, env = "RAG_DB_PATH", global = true)]
    pub db_path: Option<PathBuf>,

    /// Directory containing `agent.md` and `rewrite.md` prompt overrides.
    #[arg(long, env = "RAG_PROMPT_DIR", global = true)]
    pub prompt_dir: Option<PathBuf>,

    /// Enable verbose logging on stderr.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json).
    #[arg(long, default_value = "text", global = true)]
    pub format: String,

    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the vector store schema.
    #[command(after_help = r#"Examples:
  statute-rag init                        # Create labor_law.db here
  statute-rag --db-path ./lsa.db init     # Custom path
  statute-rag init --write-prompts        # Also export default prompts
"#)]
    Init {
        /// Write the default prompt files to the prompt directory.
        #[arg(long)]
        write_prompts: bool,
    },

    /// Answer one question.
    #[command(after_help = r#"Examples:
  statute-rag ask "加班費怎麼算？"
  statute-rag ask "特休幾天？" --details
  statute-rag ask "那半年呢？" --history turns.json
  statute-rag --format json ask "資遣費" --details | jq '.technical_details.used_chunks'

History file format (JSON array of chat messages):
[
  {"role": "user", "content": "特休幾天？"},
  {"role": "assistant", "content": "依年資計算……"}
]"#)]
    Ask {
        /// The question.
        question: String,

        /// Also report token usage, search metadata and used chunks.
        #[arg(long)]
        details: bool,

        /// JSON file holding earlier conversation turns.
        #[arg(long)]
        history: Option<PathBuf>,
    },

    /// Print the search-oriented rewrite of a question.
    Rewrite {
        /// The question.
        question: String,
    },

    /// Run the statute vector search directly.
    #[command(after_help = r#"Examples:
  statute-rag search "延長工時工資"                # 15 candidates, top 5 after reranking
  statute-rag search "資遣費" -k 30 --top-k 10
  statute-rag --format json search "特別休假" | jq '.results[].id'
"#)]
    Search {
        /// Search query text.
        query: String,

        /// Candidates retrieved before reranking.
        #[arg(short = 'k', long, default_value_t = DEFAULT_LIMIT)]
        limit: usize,

        /// Results kept after reranking.
        #[arg(long, default_value_t = DEFAULT_TOP_K)]
        top_k: usize,

        /// Preview length in characters.
        #[arg(long, default_value = "120")]
        preview_len: usize,
    },

    /// Interactive session; type `exit` to leave.
    Chat {
        /// Print technical details after each answer.
        #[arg(long)]
        details: bool,
    },
}

impl Cli {
    /// Returns the database path, using the default if not specified.
    #[must_use]
    pub fn get_db_path(&self) -> PathBuf {
        self.db_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_PATH))
    }
}
