//! CLI command implementations.
//!
//! Each command returns the text to print on stdout; the interactive
//! `chat` command writes as it goes and returns an empty string.

#![allow(clippy::format_push_string)]

use std::io::Write as IoWrite;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::agent::config::AgentConfig;
use crate::agent::message::{ChatMessage, assistant_message, user_message};
use crate::agent::orchestrator::{RagAgent, vector_search_tool};
use crate::agent::prompt::PromptSet;
use crate::cli::output::{OutputFormat, format_answer, format_details_text, format_search};
use crate::cli::parser::{Cli, Commands};
use crate::storage::{SqliteVectorStore, VectorStore};

/// Words that end an interactive session.
const EXIT_WORDS: [&str; 3] = ["exit", "quit", "q"];

/// Executes the CLI command.
///
/// # Errors
///
/// Returns an error if configuration, storage or I/O fails. Model and tool
/// failures do not error; they become part of the printed answer.
pub async fn execute(cli: &Cli) -> Result<String> {
    let format = OutputFormat::parse(&cli.format);
    let db_path = cli.get_db_path();

    match &cli.command {
        Commands::Init { write_prompts } => cmd_init(&db_path, cli.prompt_dir.as_deref(), *write_prompts),
        Commands::Ask {
            question,
            details,
            history,
        } => {
            let agent = build_agent(cli)?;
            let history = history.as_deref().map(load_history).transpose()?;
            cmd_ask(&agent, question, history.as_deref(), *details, format).await
        }
        Commands::Rewrite { question } => {
            let agent = build_agent(cli)?;
            Ok(agent.rewrite_query(question).await)
        }
        Commands::Search {
            query,
            limit,
            top_k,
            preview_len,
        } => {
            let config = load_config(cli)?;
            let store = open_store(&config.db_path)?;
            let tool = vector_search_tool(&config, Arc::new(store)).with_top_k(*top_k);
            let output = tool
                .search(query, *limit)
                .await
                .context("vector search failed")?;
            Ok(format_search(&output, *preview_len, format))
        }
        Commands::Chat { details } => {
            let agent = build_agent(cli)?;
            cmd_chat(&agent, *details).await?;
            Ok(String::new())
        }
    }
}

/// Resolves configuration: environment, then CLI overrides.
fn load_config(cli: &Cli) -> Result<AgentConfig> {
    let mut builder = AgentConfig::builder().from_env().db_path(cli.get_db_path());
    if let Some(dir) = &cli.prompt_dir {
        builder = builder.prompt_dir(dir.clone());
    }
    builder.build().context("agent configuration error")
}

fn build_agent(cli: &Cli) -> Result<RagAgent> {
    let config = load_config(cli)?;
    RagAgent::from_config(config).context("failed to initialise the agent")
}

fn open_store(db_path: &Path) -> Result<SqliteVectorStore> {
    let store = SqliteVectorStore::open(db_path)
        .with_context(|| format!("failed to open vector store at {}", db_path.display()))?;
    store.init().context("failed to initialise vector store schema")?;
    Ok(store)
}

fn load_history(path: &Path) -> Result<Vec<ChatMessage>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read history file {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("invalid history file {}", path.display()))
}

fn cmd_init(db_path: &Path, prompt_dir: Option<&Path>, write_prompts: bool) -> Result<String> {
    let store = open_store(db_path)?;
    let mut output = format!(
        "Initialized vector store at {} ({} chunks)",
        db_path.display(),
        store.count()?
    );

    if write_prompts {
        let dir = prompt_dir
            .map(Path::to_path_buf)
            .or_else(PromptSet::default_dir)
            .context("no prompt directory: pass --prompt-dir")?;
        let written = PromptSet::write_defaults(&dir)
            .with_context(|| format!("failed to write prompts to {}", dir.display()))?;
        if written.is_empty() {
            output.push_str(&format!("\nPrompt files already present in {}", dir.display()));
        }
        for path in written {
            output.push_str(&format!("\nWrote {}", path.display()));
        }
    }
    Ok(output)
}

async fn cmd_ask(
    agent: &RagAgent,
    question: &str,
    history: Option<&[ChatMessage]>,
    details: bool,
    format: OutputFormat,
) -> Result<String> {
    if details {
        let (answer, details) = agent.execute_query_with_tracking(question, history).await;
        Ok(format_answer(&answer, Some(&details), format))
    } else {
        let answer = agent.generate_agent_response(question, history).await;
        Ok(format_answer(&answer, None, format))
    }
}

async fn cmd_chat(agent: &RagAgent, details: bool) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut history: Vec<ChatMessage> = Vec::new();

    loop {
        {
            let mut out = std::io::stdout().lock();
            write!(out, "\n> ")?;
            out.flush()?;
        }

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if EXIT_WORDS.contains(&question.to_ascii_lowercase().as_str()) {
            break;
        }

        // The first turn runs single-shot; later turns carry the transcript.
        let turns = (!history.is_empty()).then_some(history.as_slice());
        let (answer, report) = if details {
            let (answer, tracked) = agent.execute_query_with_tracking(question, turns).await;
            (answer, Some(format_details_text(&tracked)))
        } else {
            (agent.generate_agent_response(question, turns).await, None)
        };

        {
            let mut out = std::io::stdout().lock();
            writeln!(out, "{answer}")?;
            if let Some(report) = report {
                writeln!(out, "\n---\n{report}")?;
            }
        }

        history.push(user_message(question));
        history.push(assistant_message(&answer));
    }
    Ok(())
}
