//! Deterministic, dependency-free pseudo-embedder. Used for tests and as
//! the degraded-mode substitute when `ModelUnavailable` would otherwise be
//! fatal. Not semantically meaningful — word and character-trigram hashing
//! clusters lexically similar text, nothing more. Grounded on
//! `zircote-rlm-rs`'s `FallbackEmbedder`.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use super::EmbeddingModel;
use crate::embeddings::onnx::EMBEDDING_DIMENSION;
use crate::error::ModelError;

pub struct HashFallbackEmbedder {
    dimensions: usize,
}

impl HashFallbackEmbedder {
    pub const fn new() -> Self {
        Self {
            dimensions: EMBEDDING_DIMENSION,
        }
    }

    fn hash_string(s: &str) -> u64 {
        let mut hasher = DefaultHasher::new();
        s.hash(&mut hasher);
        hasher.finish()
    }

    fn generate_embedding(&self, text: &str) -> Vec<f32> {
        let mut embedding = vec![0.0f32; self.dimensions];

        let normalized: String = text
            .chars()
            .map(|c| {
                if c.is_alphanumeric() || c.is_whitespace() {
                    c.to_ascii_lowercase()
                } else {
                    ' '
                }
            })
            .collect();

        let words: Vec<&str> = normalized.split_whitespace().collect();

        for word in &words {
            let hash = Self::hash_string(word);
            let idx = (hash as usize) % self.dimensions;
            let sign = if (hash >> 32) & 1 == 0 { 1.0 } else { -1.0 };
            let magnitude = 1.0 + ((hash >> 16) & 0xFF) as f32 / 255.0;
            embedding[idx] += sign * magnitude;
        }

        let chars: Vec<char> = normalized.chars().collect();
        if chars.len() >= 3 {
            for window in chars.windows(3) {
                let trigram: String = window.iter().collect();
                let hash = Self::hash_string(&trigram);
                let idx = (hash as usize) % self.dimensions;
                let sign = if (hash >> 32) & 1 == 0 { 0.5 } else { -0.5 };
                embedding[idx] += sign;
            }
        }

        let magnitude: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for val in &mut embedding {
                *val /= magnitude;
            }
        }

        embedding
    }
}

impl Default for HashFallbackEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

impl EmbeddingModel for HashFallbackEmbedder {
    fn embed_query(&self, text: &str) -> Result<Vec<f32>, ModelError> {
        Ok(self.generate_embedding(text))
    }

    fn embed_document(&self, text: &str) -> Result<Vec<f32>, ModelError> {
        Ok(self.generate_embedding(text))
    }

    fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, ModelError> {
        use rayon::prelude::*;
        Ok(texts
            .par_iter()
            .map(|text| self.generate_embedding(text))
            .collect())
    }

    fn dimension(&self) -> usize {
        self.dimensions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic() {
        let embedder = HashFallbackEmbedder::new();
        assert_eq!(
            embedder.embed_query("hello world").unwrap(),
            embedder.embed_query("hello world").unwrap()
        );
    }

    #[test]
    fn produces_768_dims() {
        let embedder = HashFallbackEmbedder::new();
        assert_eq!(embedder.embed_query("test").unwrap().len(), 768);
    }

    #[test]
    fn normalized_to_unit_length() {
        let embedder = HashFallbackEmbedder::new();
        let emb = embedder.embed_query("hello world").unwrap();
        let magnitude: f32 = emb.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((magnitude - 1.0).abs() < 1e-5);
    }

    #[test]
    fn empty_text_yields_zero_vector() {
        let embedder = HashFallbackEmbedder::new();
        let emb = embedder.embed_query("").unwrap();
        assert!(emb.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn batch_matches_single_calls() {
        let embedder = HashFallbackEmbedder::new();
        let batch = embedder.embed_documents(&["a", "b"]).unwrap();
        assert_eq!(batch[0], embedder.embed_document("a").unwrap());
        assert_eq!(batch[1], embedder.embed_document("b").unwrap());
    }
}
