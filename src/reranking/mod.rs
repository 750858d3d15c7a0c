pub mod cross_encoder;
pub mod hash_fallback;

pub use cross_encoder::CrossEncoderReranker;
pub use hash_fallback::HashFallbackReranker;

use crate::error::ModelError;

/// Unified cross-encoder contract: score `(query, passage)` pairs. Scores
/// are unbounded reals, higher is more relevant — normalization is the
/// Search layer's responsibility, not the reranker's.
pub trait Reranker: Send + Sync {
    /// Score a single (query, document) pair.
    fn score(&self, query: &str, document: &str) -> Result<f32, ModelError>;

    /// Score and sort `candidates` (id, text) by relevance to `query`,
    /// truncated to `top_k`. Default implementation calls `score` per pair;
    /// implementations with batched inference should override this.
    fn rerank(
        &self,
        query: &str,
        candidates: &[(String, String)],
        top_k: usize,
    ) -> Result<Vec<(String, f32)>, ModelError> {
        let mut scored: Vec<(String, f32)> = candidates
            .iter()
            .map(|(id, text)| self.score(query, text).map(|s| (id.clone(), s)))
            .collect::<Result<_, _>>()?;
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);
        Ok(scored)
    }
}
