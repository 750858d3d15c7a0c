use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::segmenter;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub embedding: EmbeddingConfig,
    pub reranking: RerankingConfig,
    pub segmentation: SegmentationConfig,
    pub search: SearchConfig,
    pub sweeper: SweeperConfig,
    /// Disables the `Store::log_search` audit write when false.
    pub log_search_queries: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    pub model_dir: PathBuf,
    pub dimension: usize,
    pub max_length: usize,
    pub cache_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerankingConfig {
    pub model_dir: PathBuf,
    pub max_length: usize,
}

/// Segmentation constants, overridable but bounded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentationConfig {
    pub max_chunks: usize,
    pub max_text_length: usize,
    pub max_chunk_size: usize,
    pub min_level3_length: usize,
    pub max_level3_chunks_per_paragraph: usize,
    pub large_threshold_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    pub default_top_k: usize,
    pub max_top_k: usize,
    pub candidate_multiplier: usize,
    pub min_relevance: f32,
    pub high_confidence: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweeperConfig {
    pub interval_hours: u64,
    pub keep_last_n_results: usize,
}

impl Config {
    /// Validate config values, returning errors for clearly broken configurations.
    pub fn validate(&self) -> Result<(), String> {
        if self.embedding.dimension != 768 {
            return Err("embedding.dimension must be 768".into());
        }
        if self.embedding.max_length == 0 {
            return Err("embedding.max_length must be > 0".into());
        }
        if self.segmentation.max_chunks == 0 {
            return Err("segmentation.max_chunks must be > 0".into());
        }
        if self.segmentation.max_chunk_size == 0
            || self.segmentation.max_chunk_size > self.segmentation.max_text_length
        {
            return Err("segmentation.max_chunk_size must be > 0 and <= max_text_length".into());
        }
        if self.segmentation.min_level3_length == 0 {
            return Err("segmentation.min_level3_length must be > 0".into());
        }
        if self.search.default_top_k == 0 || self.search.default_top_k > self.search.max_top_k {
            return Err("search.default_top_k must be > 0 and <= max_top_k".into());
        }
        if self.search.candidate_multiplier == 0 {
            return Err("search.candidate_multiplier must be > 0".into());
        }
        if !(0.0..=1.0).contains(&self.search.min_relevance) {
            return Err("search.min_relevance must be in [0.0, 1.0]".into());
        }
        if !(0.0..=1.0).contains(&self.search.high_confidence) {
            return Err("search.high_confidence must be in [0.0, 1.0]".into());
        }
        if self.search.high_confidence < self.search.min_relevance {
            return Err("search.high_confidence must be >= min_relevance".into());
        }
        if self.sweeper.interval_hours == 0 {
            return Err("sweeper.interval_hours must be > 0".into());
        }
        if self.database.max_connections == 0 {
            return Err("database.max_connections must be > 0".into());
        }
        Ok(())
    }

    /// Load config from a JSON file, validating before returning.
    pub fn from_file(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("failed to read config file: {}", e))?;
        let config: Self = serde_json::from_str(&content)
            .map_err(|e| format!("failed to parse config: {}", e))?;
        config.validate()?;
        Ok(config)
    }
}

impl SegmentationConfig {
    /// Pulled from `segmenter`'s own constants, so the segmenter's
    /// defaults and a loaded `Config` always agree absent an explicit
    /// override.
    pub fn design_defaults() -> Self {
        Self {
            max_chunks: segmenter::MAX_CHUNKS,
            max_text_length: segmenter::MAX_TEXT_LENGTH,
            max_chunk_size: segmenter::MAX_CHUNK_SIZE,
            min_level3_length: segmenter::MIN_LEVEL3_LENGTH,
            max_level3_chunks_per_paragraph: segmenter::MAX_LEVEL3_CHUNKS_PER_PARAGRAPH,
            large_threshold_bytes: segmenter::LARGE_THRESHOLD_BYTES,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("clea-api");

        Self {
            database: DatabaseConfig {
                url: std::env::var("DATABASE_URL")
                    .unwrap_or_else(|_| "postgres://localhost/clea".to_string()),
                max_connections: 10,
            },
            embedding: EmbeddingConfig {
                model_dir: data_dir.join("models").join("embedding"),
                dimension: 768,
                max_length: 512,
                cache_size: 1000,
            },
            reranking: RerankingConfig {
                model_dir: data_dir.join("models").join("reranker"),
                max_length: 512,
            },
            segmentation: SegmentationConfig::design_defaults(),
            search: SearchConfig {
                default_top_k: 10,
                max_top_k: 100,
                candidate_multiplier: 3,
                min_relevance: 0.3,
                high_confidence: 0.7,
            },
            sweeper: SweeperConfig {
                interval_hours: 24,
                keep_last_n_results: 20,
            },
            log_search_queries: true,
        }
    }
}
