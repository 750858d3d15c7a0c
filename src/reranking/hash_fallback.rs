//! Lexical-overlap fallback reranker, mirroring the embedder's degraded-mode
//! story: deterministic, no model weights, good enough to drive control
//! flow (ordering, normalization, confidence classification) in tests.

use std::collections::HashSet;

use super::Reranker;
use crate::error::ModelError;

#[derive(Default)]
pub struct HashFallbackReranker;

impl HashFallbackReranker {
    pub fn new() -> Self {
        Self
    }

    fn tokenize(text: &str) -> HashSet<String> {
        text.chars()
            .map(|c| if c.is_alphanumeric() { c.to_ascii_lowercase() } else { ' ' })
            .collect::<String>()
            .split_whitespace()
            .map(|s| s.to_string())
            .collect()
    }
}

impl Reranker for HashFallbackReranker {
    fn score(&self, query: &str, document: &str) -> Result<f32, ModelError> {
        let q = Self::tokenize(query);
        if q.is_empty() {
            return Ok(0.0);
        }
        let d = Self::tokenize(document);
        let overlap = q.intersection(&d).count();
        Ok(overlap as f32 / q.len() as f32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_match_scores_highest() {
        let reranker = HashFallbackReranker::new();
        let exact = reranker.score("climate risk analysis", "climate risk analysis").unwrap();
        let unrelated = reranker.score("climate risk analysis", "unrelated banana recipe").unwrap();
        assert!(exact > unrelated);
    }

    #[test]
    fn rerank_sorts_descending() {
        let reranker = HashFallbackReranker::new();
        let candidates = vec![
            ("a".to_string(), "totally unrelated".to_string()),
            ("b".to_string(), "climate risk analysis".to_string()),
        ];
        let ranked = reranker.rerank("climate risk analysis", &candidates, 2).unwrap();
        assert_eq!(ranked[0].0, "b");
    }
}
