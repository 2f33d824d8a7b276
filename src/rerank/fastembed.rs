//! `fastembed` (ONNX) cross-encoder backends.

use std::sync::{Arc, Mutex};

use fastembed::{RerankInitOptions, RerankerModel, TextRerank};
use tracing::debug;

use super::{CrossEncoder, CrossEncoderLoader, RerankerTier};
use crate::error::RagError;

/// A loaded `fastembed` reranker.
///
/// Inference needs exclusive access to the session, so calls serialise on
/// an internal mutex.
pub struct FastembedCrossEncoder {
    name: &'static str,
    model: Mutex<TextRerank>,
}

impl CrossEncoder for FastembedCrossEncoder {
    fn name(&self) -> &str {
        self.name
    }

    fn predict(&self, pairs: &[(String, String)]) -> Result<Vec<f32>, RagError> {
        let Some((query, _)) = pairs.first() else {
            return Ok(Vec::new());
        };
        let documents: Vec<&str> = pairs.iter().map(|(_, doc)| doc.as_str()).collect();

        let mut model = self.model.lock().map_err(|_| RagError::ToolExecution {
            name: "rerank".to_string(),
            message: "reranker session lock poisoned".to_string(),
        })?;
        let results = model
            .rerank(query.as_str(), documents, false, None)
            .map_err(|e| RagError::ToolExecution {
                name: "rerank".to_string(),
                message: e.to_string(),
            })?;

        // Results come back sorted by score; restore input order.
        let mut scores = vec![f32::MIN; pairs.len()];
        for r in results {
            if let Some(slot) = scores.get_mut(r.index) {
                *slot = r.score;
            }
        }
        debug!(model = self.name, pairs = pairs.len(), "scored pairs");
        Ok(scores)
    }
}

/// Loads one `fastembed` reranker model.
pub struct FastembedLoader {
    tier: RerankerTier,
    name: &'static str,
    model: RerankerModel,
}

impl FastembedLoader {
    /// Creates a loader for `model` at `tier`.
    #[must_use]
    pub const fn new(tier: RerankerTier, name: &'static str, model: RerankerModel) -> Self {
        Self { tier, name, model }
    }
}

impl CrossEncoderLoader for FastembedLoader {
    fn tier(&self) -> RerankerTier {
        self.tier
    }

    fn model(&self) -> &str {
        self.name
    }

    fn load(&self) -> Result<Arc<dyn CrossEncoder>, RagError> {
        let options = RerankInitOptions::new(self.model.clone()).with_show_download_progress(false);
        let model = TextRerank::try_new(options).map_err(|e| RagError::ModelLoad {
            model: self.name.to_string(),
            message: e.to_string(),
        })?;
        Ok(Arc::new(FastembedCrossEncoder {
            name: self.name,
            model: Mutex::new(model),
        }))
    }
}

/// BGE reranker v2-m3 (multilingual), then BGE reranker base, then Jina turbo.
pub(super) fn chain() -> Vec<Box<dyn CrossEncoderLoader>> {
    vec![
        Box::new(FastembedLoader::new(
            RerankerTier::Primary,
            "BAAI/bge-reranker-v2-m3",
            RerankerModel::BGERerankerV2M3,
        )),
        Box::new(FastembedLoader::new(
            RerankerTier::FallbackA,
            "BAAI/bge-reranker-base",
            RerankerModel::BGERerankerBase,
        )),
        Box::new(FastembedLoader::new(
            RerankerTier::FallbackB,
            "jinaai/jina-reranker-v1-turbo-en",
            RerankerModel::JINARerankerV1TurboEn,
        )),
    ]
}
