//! Cléa-API core: hierarchical document segmentation, corpus-scoped ANN
//! indexing, and hybrid retrieval.
//!
//! The HTTP routing layer, document-format extractors' wiring into a web
//! framework, the RAG prompt/LLM layer, statistics aggregation, the CLI
//! launcher, and packaging live outside this crate. What's here: the
//! segmenter (`text_analyzer` + `segmenter`), the store + index manager
//! lifecycle (`store` + `index_manager` + `sweeper`), and the hybrid
//! retrieval engine (`search_engine`), plus the embedding/reranking/parsing
//! glue they sit on.

pub mod config;
pub mod embeddings;
pub mod error;
pub mod index_manager;
pub mod processing;
pub mod reranking;
pub mod search_engine;
pub mod segmenter;
pub mod store;
pub mod sweeper;
pub mod text_analyzer;
pub mod types;

pub use config::Config;
pub use error::{IndexError, ModelError, SearchError, SegmenterError, StoreError};
pub use index_manager::IndexManager;
pub use search_engine::SearchEngine;
pub use segmenter::segment;
pub use store::Store;
pub use sweeper::Sweeper;

pub use anyhow::{Error, Result};
pub use uuid::Uuid;
