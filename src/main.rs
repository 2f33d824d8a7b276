//! statute-rag command-line entry point.

use std::io::Write;

use anyhow::Result;
use clap::Parser;
use statute_rag::cli::{Cli, execute};
use tracing_subscriber::EnvFilter;

fn init_tracing(verbose: bool) {
    let default = if verbose { "statute_rag=info,warn" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let output = execute(&cli).await?;
    if !output.is_empty() {
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "{output}")?;
    }
    Ok(())
}
