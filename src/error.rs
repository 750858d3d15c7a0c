//! Crate-wide error taxonomy. One enum family per component, following the
//! `AuditError` convention: each component owns its variants, and errors
//! compose upward via `#[from]` rather than a single god-enum.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SegmenterError {
    #[error("input text of {len} chars exceeds the {max} char limit")]
    InputTooLarge { len: usize, max: usize },
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("integrity violation: {0}")]
    IntegrityViolation(String),

    #[error("transient store error")]
    Transient(#[from] sqlx::Error),
}

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("index already exists for this corpus")]
    IndexExists,

    #[error("no index exists for this corpus")]
    IndexMissing,

    #[error("transient index error")]
    Transient(#[from] sqlx::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("inference failed: {0}")]
    InferenceFailed(String),
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("operation cancelled")]
    Cancelled,
}
