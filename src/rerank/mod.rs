//! Cross-encoder reranking with a load-time fallback chain.
//!
//! [`Reranker::initialize`] walks an ordered list of loaders and adopts the
//! first model that loads. When none does, the reranker passes candidates
//! through in similarity order. A scoring failure at query time falls back
//! to pass-through for that call only.

#[cfg(feature = "fastembed-rerank")]
mod fastembed;

use std::fmt;
use std::sync::Arc;

use tracing::{info, warn};

#[cfg(feature = "fastembed-rerank")]
pub use self::fastembed::{FastembedCrossEncoder, FastembedLoader};

use crate::error::RagError;
use crate::storage::SearchResult;

/// Default number of results kept after reranking.
pub const DEFAULT_TOP_K: usize = 5;
/// Default characters of each candidate passed to the model.
pub const DEFAULT_MAX_CHARS: usize = 512;
/// Method name reported when no model is in use.
pub const PASSTHROUGH_METHOD: &str = "passthrough";

/// A model that scores (query, document) pairs jointly.
pub trait CrossEncoder: Send + Sync {
    /// Model identifier.
    fn name(&self) -> &str;

    /// Scores every pair in one batch; higher is more relevant.
    ///
    /// # Errors
    ///
    /// Returns [`RagError`] when inference fails.
    fn predict(&self, pairs: &[(String, String)]) -> Result<Vec<f32>, RagError>;
}

/// Position of a model in the fallback chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RerankerTier {
    /// Preferred model.
    Primary,
    /// First fallback.
    FallbackA,
    /// Second fallback.
    FallbackB,
}

impl fmt::Display for RerankerTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Primary => "primary",
            Self::FallbackA => "fallback-a",
            Self::FallbackB => "fallback-b",
        })
    }
}

/// Lazily constructs a [`CrossEncoder`].
pub trait CrossEncoderLoader: Send + Sync {
    /// Tier this loader fills.
    fn tier(&self) -> RerankerTier;

    /// Model identifier, for logging.
    fn model(&self) -> &str;

    /// Loads the model.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ModelLoad`] if the model cannot be loaded.
    fn load(&self) -> Result<Arc<dyn CrossEncoder>, RagError>;
}

#[derive(Clone)]
enum Backend {
    Model {
        tier: RerankerTier,
        encoder: Arc<dyn CrossEncoder>,
    },
    Passthrough,
}

/// Second-stage ranker.
///
/// Cheap to clone; clones share the loaded model.
#[derive(Clone)]
pub struct Reranker {
    backend: Backend,
    max_chars: usize,
}

impl Reranker {
    /// Adopts the first loader that succeeds, or pass-through if none does.
    #[must_use]
    pub fn initialize(loaders: &[Box<dyn CrossEncoderLoader>]) -> Self {
        for loader in loaders {
            match loader.load() {
                Ok(encoder) => {
                    info!(tier = %loader.tier(), model = loader.model(), "reranker loaded");
                    return Self::with_encoder(loader.tier(), encoder);
                }
                Err(e) => warn!(
                    tier = %loader.tier(),
                    model = loader.model(),
                    error = %e,
                    "reranker failed to load, trying next"
                ),
            }
        }
        warn!("no reranker model available, using pass-through ranking");
        Self::passthrough()
    }

    /// A reranker that keeps the incoming order.
    #[must_use]
    pub const fn passthrough() -> Self {
        Self {
            backend: Backend::Passthrough,
            max_chars: DEFAULT_MAX_CHARS,
        }
    }

    /// A reranker backed by an already-loaded model.
    #[must_use]
    pub fn with_encoder(tier: RerankerTier, encoder: Arc<dyn CrossEncoder>) -> Self {
        Self {
            backend: Backend::Model { tier, encoder },
            max_chars: DEFAULT_MAX_CHARS,
        }
    }

    /// Sets the per-candidate character budget.
    #[must_use]
    pub fn with_max_chars(mut self, max_chars: usize) -> Self {
        self.max_chars = max_chars.max(1);
        self
    }

    /// Name of the model in use, or `"passthrough"`.
    #[must_use]
    pub fn method(&self) -> &str {
        match &self.backend {
            Backend::Model { encoder, .. } => encoder.name(),
            Backend::Passthrough => PASSTHROUGH_METHOD,
        }
    }

    /// Tier of the model in use.
    #[must_use]
    pub const fn tier(&self) -> Option<RerankerTier> {
        match &self.backend {
            Backend::Model { tier, .. } => Some(*tier),
            Backend::Passthrough => None,
        }
    }

    /// Returns `true` if a model is loaded.
    #[must_use]
    pub const fn is_model_backed(&self) -> bool {
        matches!(self.backend, Backend::Model { .. })
    }

    /// Reorders `candidates` by cross-encoder score and keeps `top_k`.
    ///
    /// Each candidate is scored on its first `max_chars` characters. The
    /// output is sorted by `rerank_score` descending; ties keep their
    /// similarity order. Without a model, or when scoring fails, returns the
    /// first `top_k` candidates unchanged.
    #[must_use]
    pub fn rerank(
        &self,
        query: &str,
        mut candidates: Vec<SearchResult>,
        top_k: usize,
    ) -> Vec<SearchResult> {
        let Backend::Model { encoder, .. } = &self.backend else {
            candidates.truncate(top_k);
            return candidates;
        };
        if candidates.is_empty() {
            return candidates;
        }

        let pairs: Vec<(String, String)> = candidates
            .iter()
            .map(|c| (query.to_string(), truncate_chars(&c.content, self.max_chars)))
            .collect();

        let scores = match encoder.predict(&pairs) {
            Ok(scores) if scores.len() == candidates.len() => scores,
            Ok(scores) => {
                warn!(
                    expected = candidates.len(),
                    got = scores.len(),
                    "reranker returned wrong score count, passing through"
                );
                candidates.truncate(top_k);
                return candidates;
            }
            Err(e) => {
                warn!(error = %e, "reranking failed, passing through");
                candidates.truncate(top_k);
                return candidates;
            }
        };

        for (candidate, score) in candidates.iter_mut().zip(scores) {
            candidate.rerank_score = Some(score);
        }
        candidates.sort_by(|a, b| {
            let (a, b) = (a.rerank_score.unwrap_or(f32::MIN), b.rerank_score.unwrap_or(f32::MIN));
            b.total_cmp(&a)
        });
        candidates.truncate(top_k);

        for (rank, c) in candidates.iter().enumerate() {
            info!(
                rank = rank + 1,
                chunk_id = c.chunk_id,
                similarity = c.similarity,
                rerank_score = c.rerank_score,
                "reranked"
            );
        }
        candidates
    }
}

impl fmt::Debug for Reranker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reranker")
            .field("method", &self.method())
            .field("tier", &self.tier())
            .field("max_chars", &self.max_chars)
            .finish()
    }
}

/// The default fallback chain.
///
/// Empty when the `fastembed-rerank` feature is disabled.
#[must_use]
pub fn default_loaders() -> Vec<Box<dyn CrossEncoderLoader>> {
    #[cfg(feature = "fastembed-rerank")]
    {
        self::fastembed::chain()
    }
    #[cfg(not(feature = "fastembed-rerank"))]
    {
        Vec::new()
    }
}

/// Keeps the first `max_chars` characters, appending `"..."` when cut.
#[must_use]
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}...", &text[..byte_idx]),
        None => text.to_string(),
    }
}
