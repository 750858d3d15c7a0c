use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Hierarchy level of a chunk: 0 = document preview, 1 = section,
/// 2 = paragraph, 3 = fine-grained chunk carrying the embedding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(i16)]
pub enum HierarchyLevel {
    Preview = 0,
    Section = 1,
    Paragraph = 2,
    Fine = 3,
}

impl HierarchyLevel {
    pub fn as_i16(self) -> i16 {
        self as i16
    }

    pub fn from_i16(v: i16) -> Option<Self> {
        match v {
            0 => Some(Self::Preview),
            1 => Some(Self::Section),
            2 => Some(Self::Paragraph),
            3 => Some(Self::Fine),
            _ => None,
        }
    }
}

/// Per-corpus ANN index flavor. HNSW carries the same lifecycle contract as
/// IVFFLAT (see DESIGN.md) but is not built by `create_simple_index`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum IndexType {
    Ivfflat,
    Hnsw,
}

/// Metadata-only document record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub title: String,
    pub theme: Option<String>,
    pub document_type: Option<String>,
    pub publish_date: Option<DateTime<Utc>>,
    pub corpus_id: String,
    pub created_at: DateTime<Utc>,
    pub index_needed: bool,
}

/// Metadata accepted by `Store::add_document_with_chunks`. `corpus_id` is
/// assigned a fresh UUID string when absent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewDocument {
    pub title: String,
    pub theme: Option<String>,
    pub document_type: Option<String>,
    pub publish_date: Option<DateTime<Utc>>,
    pub corpus_id: Option<String>,
}

/// Fields accepted by a document update. `None` leaves the field unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentPatch {
    pub document_id: Uuid,
    pub title: Option<String>,
    pub theme: Option<String>,
    pub document_type: Option<String>,
    pub publish_date: Option<DateTime<Utc>>,
    pub corpus_id: Option<String>,
}

/// Indexed unit of retrieval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: Uuid,
    pub document_id: Uuid,
    pub content: String,
    pub embedding: Option<Vec<f32>>,
    pub start_char: i64,
    pub end_char: i64,
    pub hierarchy_level: HierarchyLevel,
    pub parent_chunk_id: Option<Uuid>,
}

/// A chunk as produced by the Segmenter, before persistence: parent
/// references are positional indices into the same batch, not database ids.
#[derive(Debug, Clone)]
pub struct RawChunk {
    pub content: String,
    pub start_char: usize,
    pub end_char: usize,
    pub hierarchy_level: HierarchyLevel,
    /// Index of the parent within the same emitted stream, if any.
    pub parent_index: Option<usize>,
}

/// Per-corpus ANN index state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    pub id: Uuid,
    pub corpus_id: String,
    pub index_type: IndexType,
    pub is_indexed: bool,
    pub chunk_count: i64,
    pub last_indexed: Option<DateTime<Utc>>,
    pub ivf_lists: i32,
    pub hnsw_m: i32,
    pub hnsw_ef_construction: i32,
}

/// Append-only query audit record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchQueryRecord {
    pub query_text: String,
    pub theme: Option<String>,
    pub document_type: Option<String>,
    pub corpus_id: Option<String>,
    pub results_count: i32,
    pub confidence_level: f32,
    pub user_id: Option<String>,
}

/// Reported status of a corpus's ANN index, combining the IndexConfig row
/// with the live state of its projection/index objects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexStatus {
    pub corpus_id: String,
    pub index_exists: bool,
    pub config_exists: bool,
    pub is_indexed: bool,
    pub index_type: Option<IndexType>,
    pub live_chunk_count: i64,
    pub configured_chunk_count: i64,
    pub last_indexed: Option<DateTime<Utc>>,
}

/// Outcome of `IndexManager::create_simple_index`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexBuildResult {
    pub index_type: IndexType,
    pub lists: i32,
    pub documents_updated: i64,
    pub projection_name: String,
}

/// Outcome of `IndexManager::clean_orphans`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CleanupResult {
    pub deleted_count: i64,
    pub cleaned_corpus_ids: Vec<String>,
    pub errors: Vec<String>,
    pub partial_success: bool,
}

/// Outcome of `Store::add_document_with_chunks`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestResult {
    pub document_id: Uuid,
    /// Live (embedded) chunks added by this call — the same count folded
    /// into `index_configs.chunk_count`, not the total chunks across every
    /// hierarchy level.
    pub chunk_count: i64,
    pub corpus_id: String,
    pub index_needed: bool,
}

/// Document input format, dispatched on by the processing glue.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum DocumentFormat {
    Txt,
    Md,
    Html,
    Json,
    Pdf,
    Docx,
}

impl DocumentFormat {
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "md" | "markdown" => Self::Md,
            "html" | "htm" => Self::Html,
            "json" => Self::Json,
            "pdf" => Self::Pdf,
            "docx" => Self::Docx,
            _ => Self::Txt,
        }
    }
}
