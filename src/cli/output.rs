//! Output formatting for CLI commands.

use std::fmt::Write as FmtWrite;

use serde_json::json;

use crate::agent::tracker::TechnicalDetails;
use crate::rerank::truncate_chars;
use crate::tools::VectorSearchOutput;

/// Output format for command results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable text.
    #[default]
    Text,
    /// Pretty-printed JSON.
    Json,
}

impl OutputFormat {
    /// Parses a format name; anything unrecognised is text.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Self::Json,
            _ => Self::Text,
        }
    }
}

fn to_json(value: &serde_json::Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string())
}

/// Formats an answer and, if present, its technical details.
#[must_use]
pub fn format_answer(answer: &str, details: Option<&TechnicalDetails>, format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => {
            let mut value = json!({ "answer": answer });
            if let Some(details) = details {
                value["technical_details"] = serde_json::to_value(details).unwrap_or_default();
            }
            to_json(&value)
        }
        OutputFormat::Text => {
            let mut output = answer.to_string();
            if let Some(details) = details {
                output.push_str("\n\n---\n");
                output.push_str(&format_details_text(details));
            }
            output
        }
    }
}

/// Renders technical details as a short text report.
#[must_use]
pub fn format_details_text(details: &TechnicalDetails) -> String {
    let mut out = String::new();
    let usage = &details.token_usage;
    let _ = writeln!(
        out,
        "Tokens: {} in / {} out / {} total",
        usage.input, usage.output, usage.total
    );

    if let Some(vector) = &details.search_metadata.vector_search {
        let _ = writeln!(
            out,
            "Vector search: {} of {} candidates ({}{})",
            vector.count,
            vector.original_count,
            vector.reranking_method,
            if vector.reranked { ", reranked" } else { "" }
        );
    }
    if let Some(web) = &details.search_metadata.web_search {
        let _ = writeln!(out, "Web search: {} results for \"{}\"", web.count, web.query);
    }

    if !details.used_chunks.is_empty() {
        let _ = writeln!(out, "Used chunks:");
        for (rank, chunk) in details.used_chunks.iter().enumerate() {
            let rerank = chunk
                .rerank_score
                .map_or_else(|| "-".to_string(), |s| format!("{s:.4}"));
            let _ = writeln!(
                out,
                "  {}. #{} similarity {:.4} rerank {}",
                rank + 1,
                chunk.id,
                chunk.similarity,
                rerank
            );
            let _ = writeln!(out, "     {}", chunk.content.replace('\n', " "));
        }
    }
    out.trim_end().to_string()
}

/// Formats a direct vector search.
#[must_use]
pub fn format_search(output: &VectorSearchOutput, preview_len: usize, format: OutputFormat) -> String {
    if format == OutputFormat::Json {
        return to_json(&serde_json::to_value(output).unwrap_or_default());
    }

    if output.results.is_empty() {
        return "No results.".to_string();
    }

    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} of {} candidates, method: {}",
        output.count, output.original_count, output.reranking_method
    );
    for (rank, result) in output.results.iter().enumerate() {
        let rerank = result
            .rerank_score
            .map_or_else(|| "-".to_string(), |s| format!("{s:.4}"));
        let _ = writeln!(
            out,
            "{:>3}. #{:<6} similarity {:.4}  rerank {}",
            rank + 1,
            result.chunk_id,
            result.similarity,
            rerank
        );
        let _ = writeln!(
            out,
            "     {}",
            truncate_chars(&result.content, preview_len).replace('\n', " ")
        );
    }
    out.trim_end().to_string()
}
