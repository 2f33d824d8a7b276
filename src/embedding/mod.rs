//! Text embedding gateway and vector math.
//!
//! [`Embedder`] is the seam to an external embedding service.
//! [`EmbeddingGateway`] adds bounded retries and turns exhaustion into an
//! empty vector, which callers treat as "embedding unavailable".

mod openai;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

pub use openai::OpenAiEmbedder;

use crate::error::RagError;

/// Default embedding attempts.
pub const DEFAULT_EMBEDDING_ATTEMPTS: u32 = 2;

/// A backend that turns text into a fixed-length vector.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model identifier, for logging.
    fn model(&self) -> &str;

    /// Embeds one text.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ServiceUnavailable`] on transport or service failure.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, RagError>;
}

/// Retrying front of an [`Embedder`].
#[derive(Clone)]
pub struct EmbeddingGateway {
    inner: Arc<dyn Embedder>,
    max_attempts: u32,
}

impl EmbeddingGateway {
    /// Wraps `inner` with the default attempt bound.
    #[must_use]
    pub fn new(inner: Arc<dyn Embedder>) -> Self {
        Self::with_attempts(inner, DEFAULT_EMBEDDING_ATTEMPTS)
    }

    /// Wraps `inner`, allowing `max_attempts` calls per text (minimum 1).
    #[must_use]
    pub fn with_attempts(inner: Arc<dyn Embedder>, max_attempts: u32) -> Self {
        Self {
            inner,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Embeds `text`, retrying without backoff.
    ///
    /// Returns an empty vector once every attempt has failed.
    pub async fn embed(&self, text: &str) -> Vec<f32> {
        for attempt in 1..=self.max_attempts {
            match self.inner.embed(text).await {
                Ok(vector) => return vector,
                Err(e) => warn!(
                    model = self.inner.model(),
                    attempt,
                    max_attempts = self.max_attempts,
                    error = %e,
                    "embedding failed"
                ),
            }
        }
        Vec::new()
    }
}

impl std::fmt::Debug for EmbeddingGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingGateway")
            .field("model", &self.inner.model())
            .field("max_attempts", &self.max_attempts)
            .finish()
    }
}

/// Encodes a float vector as a little-endian BLOB (`len × 4` bytes).
#[must_use]
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decodes a BLOB written by [`vec_to_blob`]. Trailing partial floats are dropped.
#[must_use]
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine similarity of two vectors, in `[-1.0, 1.0]`.
///
/// Returns `0.0` when either vector has zero norm, when lengths differ, or
/// when either is empty. Accumulates in `f64`.
///
/// ```text
///            a · b
/// cos(θ) = ─────────
///          ‖a‖ × ‖b‖
/// ```
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (&x, &y) in a.iter().zip(b) {
        let (x, y) = (f64::from(x), f64::from(y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom <= f64::EPSILON || !denom.is_finite() {
        return 0.0;
    }

    (dot / denom).clamp(-1.0, 1.0) as f32
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use proptest::prelude::*;

    use super::*;

    struct FlakyEmbedder {
        calls: AtomicU32,
        failures: u32,
    }

    #[async_trait]
    impl Embedder for FlakyEmbedder {
        fn model(&self) -> &str {
            "flaky"
        }

        async fn embed(&self, _text: &str) -> Result<Vec<f32>, RagError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) < self.failures {
                Err(RagError::ServiceUnavailable {
                    service: "embedding".to_string(),
                    message: "timeout".to_string(),
                })
            } else {
                Ok(vec![0.1, 0.2, 0.3])
            }
        }
    }

    #[tokio::test]
    async fn test_gateway_retries_once() {
        let inner = Arc::new(FlakyEmbedder {
            calls: AtomicU32::new(0),
            failures: 1,
        });
        let gateway = EmbeddingGateway::new(inner.clone());
        assert_eq!(gateway.embed("工資").await, vec![0.1, 0.2, 0.3]);
        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_gateway_returns_empty_after_exhaustion() {
        let inner = Arc::new(FlakyEmbedder {
            calls: AtomicU32::new(0),
            failures: u32::MAX,
        });
        let gateway = EmbeddingGateway::new(inner.clone());
        assert!(gateway.embed("工資").await.is_empty());
        assert_eq!(inner.calls.load(Ordering::SeqCst), DEFAULT_EMBEDDING_ATTEMPTS);
    }

    #[test]
    fn test_vec_blob_roundtrip() {
        let vec = vec![1.0f32, -2.5, 3.125, 0.0, -0.001];
        assert_eq!(blob_to_vec(&vec_to_blob(&vec)), vec);
    }

    #[test]
    fn test_cosine_known_values() {
        assert!((cosine_similarity(&[1.0, 2.0, 3.0], &[1.0, 2.0, 3.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_degenerate_inputs() {
        assert!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]).abs() < f32::EPSILON);
        assert!(cosine_similarity(&[1.0], &[1.0, 2.0]).abs() < f32::EPSILON);
        assert!(cosine_similarity(&[], &[]).abs() < f32::EPSILON);
    }

    fn vector(len: usize) -> impl Strategy<Value = Vec<f32>> {
        prop::collection::vec(-100.0f32..100.0, len)
    }

    proptest! {
        #[test]
        fn prop_cosine_symmetric_and_bounded(
            (a, b) in (1usize..32).prop_flat_map(|n| (vector(n), vector(n)))
        ) {
            let ab = cosine_similarity(&a, &b);
            let ba = cosine_similarity(&b, &a);
            prop_assert!((ab - ba).abs() < 1e-6);
            prop_assert!((-1.0..=1.0).contains(&ab));
        }

        #[test]
        fn prop_cosine_zero_vector_is_zero(b in vector(8)) {
            let zero = vec![0.0f32; 8];
            prop_assert!(cosine_similarity(&zero, &b).abs() < f32::EPSILON);
        }
    }
}
