//! CLI layer for statute-rag.
//!
//! Provides the command-line interface using clap, with commands for
//! initializing the store, asking questions and inspecting retrieval.

pub mod commands;
pub mod output;
pub mod parser;

pub use commands::execute;
pub use output::OutputFormat;
pub use parser::{Cli, Commands};
