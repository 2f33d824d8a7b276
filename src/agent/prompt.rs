//! System prompts and message builders for the agent and the rewriter.
//!
//! Prompts are loaded from template files when present, falling back to the
//! compiled-in defaults below.

use std::path::{Path, PathBuf};

/// System prompt for the tool-calling agent.
pub const AGENT_SYSTEM_PROMPT: &str = r"You are a legal assistant specialised in the Labor Standards Act. Answer the user's question using the tools below.

## Tools

1. **vector_search**: semantic search over the statute text. The system retrieves 15 candidate articles, reorders them with a cross-encoder, and returns the 5 most relevant.
2. **web_search**: web search for recent amendments, policy news, court practice and other supplementary material.

## Tool strategy

- For questions about statutory provisions, prefer vector_search.
- For recent policy, amendments or practical cases, use web_search.
- Both tools may be called in the same turn when the question needs both.

## Answer rules

- Base the answer on retrieved material only. Do not invent provisions.
- Be clear, specific and practical. Cite article numbers when available.
- Reply in Traditional Chinese.";

/// System prompt for the query rewriter.
pub const REWRITE_SYSTEM_PROMPT: &str = r"You rewrite user questions about the Labor Standards Act into precise search queries.

## Rules

1. Keep the user's original intent.
2. Make the query more specific and precise.
3. Add the relevant legal terms and keywords.
4. If the query is vague, split it into several explicit questions.
5. If several concepts are involved, name each of them.
6. Write in Traditional Chinese.

Return only the rewritten query, without explanation.

## Examples

Original: 加班費怎麼算？
Rewritten: 勞動基準法中延長工時工資（加班費）的計算方式與標準為何？包括平日延長工時與休息日、例假日出勤的加給比例。

Original: 可以隨便開除員工嗎？
Rewritten: 雇主終止勞動契約的法定事由與程序為何？勞動基準法對資遣、預告期間及資遣費有哪些規定？";

/// Default prompt directory under user config.
const DEFAULT_PROMPT_DIR: &str = ".config/statute-rag/prompts";

/// Filename for the agent prompt template.
const AGENT_FILENAME: &str = "agent.md";
/// Filename for the rewriter prompt template.
const REWRITE_FILENAME: &str = "rewrite.md";

/// System prompts for the agent and the rewriter.
///
/// Use [`PromptSet::load`] to resolve the prompt directory from CLI flags,
/// environment variables, or the default path.
#[derive(Debug, Clone)]
pub struct PromptSet {
    /// System prompt for the tool-calling agent.
    pub agent: String,
    /// System prompt for the query rewriter.
    pub rewrite: String,
}

impl PromptSet {
    /// Loads prompts from the given directory, falling back to compiled-in defaults.
    ///
    /// Resolution order for `prompt_dir`:
    /// 1. Explicit `prompt_dir` argument (from `--prompt-dir` or config)
    /// 2. `RAG_PROMPT_DIR` environment variable
    /// 3. `~/.config/statute-rag/prompts/`
    ///
    /// Each file is loaded independently; a missing or blank file uses its default.
    #[must_use]
    pub fn load(prompt_dir: Option<&Path>) -> Self {
        let resolved_dir = prompt_dir
            .map(PathBuf::from)
            .or_else(|| std::env::var("RAG_PROMPT_DIR").ok().map(PathBuf::from))
            .or_else(Self::default_dir);

        let load_file = |filename: &str, default: &str| -> String {
            resolved_dir
                .as_ref()
                .map(|dir| dir.join(filename))
                .and_then(|path| std::fs::read_to_string(&path).ok())
                .filter(|text| !text.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        Self {
            agent: load_file(AGENT_FILENAME, AGENT_SYSTEM_PROMPT),
            rewrite: load_file(REWRITE_FILENAME, REWRITE_SYSTEM_PROMPT),
        }
    }

    /// Returns compiled-in defaults without checking the filesystem.
    #[must_use]
    pub fn defaults() -> Self {
        Self {
            agent: AGENT_SYSTEM_PROMPT.to_string(),
            rewrite: REWRITE_SYSTEM_PROMPT.to_string(),
        }
    }

    /// Writes the compiled-in default prompts to the given directory.
    ///
    /// Creates the directory if it does not exist. Existing files are
    /// **not** overwritten.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if directory creation or file writing fails.
    pub fn write_defaults(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
        std::fs::create_dir_all(dir)?;

        let templates = [
            (AGENT_FILENAME, AGENT_SYSTEM_PROMPT),
            (REWRITE_FILENAME, REWRITE_SYSTEM_PROMPT),
        ];

        let mut written = Vec::new();
        for (filename, content) in &templates {
            let path = dir.join(filename);
            if !path.exists() {
                std::fs::write(&path, content)?;
                written.push(path);
            }
        }

        Ok(written)
    }

    /// Returns the default prompt directory under the user's home.
    #[must_use]
    pub fn default_dir() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(DEFAULT_PROMPT_DIR))
    }
}

/// Builds the first user message of a query: the original question followed
/// by its rewritten form.
#[must_use]
pub fn build_question_prompt(original: &str, improved: &str) -> String {
    format!("用戶原始問題：{original}\n\n完善後的問題：{improved}")
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn test_build_question_prompt() {
        let prompt = build_question_prompt("加班費怎麼算？", "延長工時工資如何計算？");
        assert!(prompt.starts_with("用戶原始問題：加班費怎麼算？"));
        assert!(prompt.ends_with("完善後的問題：延長工時工資如何計算？"));
    }

    #[test]
    fn test_load_falls_back_per_file() {
        let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
        std::fs::write(dir.path().join(AGENT_FILENAME), "custom agent prompt")
            .unwrap_or_else(|e| panic!("write: {e}"));
        std::fs::write(dir.path().join(REWRITE_FILENAME), "   \n")
            .unwrap_or_else(|e| panic!("write: {e}"));

        let prompts = PromptSet::load(Some(dir.path()));
        assert_eq!(prompts.agent, "custom agent prompt");
        assert_eq!(prompts.rewrite, REWRITE_SYSTEM_PROMPT);
    }

    #[test]
    fn test_write_defaults_does_not_overwrite() {
        let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
        std::fs::write(dir.path().join(AGENT_FILENAME), "mine")
            .unwrap_or_else(|e| panic!("write: {e}"));

        let written =
            PromptSet::write_defaults(dir.path()).unwrap_or_else(|e| panic!("write_defaults: {e}"));
        assert_eq!(written, vec![dir.path().join(REWRITE_FILENAME)]);
        let agent = std::fs::read_to_string(dir.path().join(AGENT_FILENAME)).unwrap_or_default();
        assert_eq!(agent, "mine");
    }

    #[test]
    fn test_prompts_mention_both_tools() {
        assert!(AGENT_SYSTEM_PROMPT.contains("vector_search"));
        assert!(AGENT_SYSTEM_PROMPT.contains("web_search"));
        assert!(!REWRITE_SYSTEM_PROMPT.is_empty());
    }
}
