pub mod hash_fallback;
pub mod onnx;
pub mod tokenizer;

pub use hash_fallback::HashFallbackEmbedder;
pub use onnx::{OnnxEmbedder, OnnxEmbedderConfig};

use crate::error::ModelError;

/// Unified embedding model contract: a batch of strings maps to fixed
/// 768-dimension dense vectors. Implementations serialize batches
/// internally or expose a per-call lock; either way a single loaded model
/// may be called from multiple callers.
pub trait EmbeddingModel: Send + Sync {
    /// Embed a search query (with the model's query-side prefix, if any).
    fn embed_query(&self, text: &str) -> Result<Vec<f32>, ModelError>;

    /// Embed a document/passage (with the model's passage-side prefix, if any).
    fn embed_document(&self, text: &str) -> Result<Vec<f32>, ModelError>;

    /// Batch embed documents for ingestion.
    fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, ModelError> {
        texts.iter().map(|t| self.embed_document(t)).collect()
    }

    /// Embedding vector dimension (768, per the Chunk invariant).
    fn dimension(&self) -> usize;
}
