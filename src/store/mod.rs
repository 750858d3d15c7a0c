//! Transactional persistence over `sqlx::PgPool` + pgvector. Grounded on the
//! `pgvector::Vector` / `sqlx::query` usage in the pack's `rag_service.rs`
//! and `rag-ingest.rs` reference files, and on `legalis-registry`'s `sqlx`
//! dependency declaration — see DESIGN.md for why this replaces the
//! teacher's embedded LanceDB store.

pub mod schema;

use chrono::{DateTime, Utc};
use pgvector::Vector;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::embeddings::EmbeddingModel;
use crate::error::StoreError;
use crate::types::{
    DocumentPatch, HierarchyLevel, IngestResult, NewDocument, RawChunk, SearchQueryRecord,
};

/// Filter bag for the parameterized candidate query `SearchEngine` assembles.
/// Every field is bound, never interpolated.
#[derive(Debug, Clone)]
pub struct CandidateFilter {
    pub query_embedding: Vec<f32>,
    pub theme: Option<String>,
    pub document_type: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub corpus_id: Option<String>,
    pub hierarchy_level: Option<HierarchyLevel>,
    /// Size of the candidate pool returned to the caller for reranking —
    /// `top_k * candidate_multiplier`. `fetch_candidates` returns up to
    /// this many rows, ordered by distance; the final `top_k` truncation
    /// happens in `SearchEngine::hybrid_search` after reranking, not here.
    pub expanded: i64,
}

/// One row of the `ranked` CTE: a chunk joined with its document's metadata
/// and cosine distance to the query vector.
#[derive(Debug, Clone)]
pub struct CandidateRow {
    pub chunk_id: Uuid,
    pub document_id: Uuid,
    pub content: String,
    pub start_char: i64,
    pub end_char: i64,
    pub hierarchy_level: HierarchyLevel,
    pub parent_chunk_id: Option<Uuid>,
    pub title: String,
    pub theme: Option<String>,
    pub document_type: Option<String>,
    pub publish_date: Option<DateTime<Utc>>,
    pub distance: f64,
}

/// One ancestor level returned by `fetch_parent_chain`.
#[derive(Debug, Clone)]
pub struct ParentLevel {
    pub chunk_id: Uuid,
    pub content: String,
    pub hierarchy_level: HierarchyLevel,
}

pub struct Store {
    pool: PgPool,
}

impl Store {
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Applies the embedded schema. Safe to call repeatedly (`IF NOT EXISTS`
    /// throughout).
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(schema::SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    /// Inserts `doc` and consumes `chunks` in batches of `batch_size`,
    /// embedding level-3 chunks via `embedder` and resolving `parent_index`
    /// positional references to persisted ids as it goes. All-or-nothing.
    pub async fn add_document_with_chunks<I>(
        &self,
        doc: NewDocument,
        chunks: I,
        embedder: &dyn EmbeddingModel,
        batch_size: usize,
    ) -> Result<IngestResult, StoreError>
    where
        I: IntoIterator<Item = RawChunk>,
    {
        let corpus_id = doc
            .corpus_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let batch_size = batch_size.max(1);

        let mut tx = self.pool.begin().await?;

        let document_id: Uuid = sqlx::query_scalar(
            "INSERT INTO documents (title, theme, document_type, publish_date, corpus_id, index_needed) \
             VALUES ($1, $2, $3, $4, $5, true) RETURNING id",
        )
        .bind(&doc.title)
        .bind(&doc.theme)
        .bind(&doc.document_type)
        .bind(doc.publish_date)
        .bind(&corpus_id)
        .fetch_one(&mut *tx)
        .await?;

        let mut persisted_ids: Vec<Uuid> = Vec::new();
        let mut total_inserted: i64 = 0;
        let mut batch: Vec<RawChunk> = Vec::with_capacity(batch_size);

        for raw in chunks {
            batch.push(raw);
            if batch.len() >= batch_size {
                total_inserted +=
                    Self::insert_batch(&mut tx, document_id, &batch, &mut persisted_ids, embedder)
                        .await?;
                batch.clear();
            }
        }
        if !batch.is_empty() {
            total_inserted +=
                Self::insert_batch(&mut tx, document_id, &batch, &mut persisted_ids, embedder)
                    .await?;
        }

        Self::upsert_index_config_delta(&mut tx, &corpus_id, total_inserted).await?;

        tx.commit().await?;

        tracing::info!(
            document_id = %document_id,
            corpus_id = %corpus_id,
            chunk_count = total_inserted,
            "ingested document"
        );

        Ok(IngestResult {
            document_id,
            chunk_count: total_inserted,
            corpus_id,
            index_needed: true,
        })
    }

    /// Applies `patch`'s present fields and appends `new_chunks` (a fresh
    /// positional arena of their own, resolved against the document's
    /// existing chunk set, not against the old chunk arena).
    pub async fn update_document(
        &self,
        patch: DocumentPatch,
        new_chunks: Option<Vec<RawChunk>>,
        embedder: &dyn EmbeddingModel,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        let old_corpus: String =
            sqlx::query_scalar("SELECT corpus_id FROM documents WHERE id = $1")
                .bind(patch.document_id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or_else(|| StoreError::NotFound(format!("document {}", patch.document_id)))?;

        sqlx::query(
            "UPDATE documents SET \
                title = COALESCE($2, title), \
                theme = COALESCE($3, theme), \
                document_type = COALESCE($4, document_type), \
                publish_date = COALESCE($5, publish_date), \
                corpus_id = COALESCE($6, corpus_id), \
                index_needed = true \
             WHERE id = $1",
        )
        .bind(patch.document_id)
        .bind(&patch.title)
        .bind(&patch.theme)
        .bind(&patch.document_type)
        .bind(patch.publish_date)
        .bind(&patch.corpus_id)
        .execute(&mut *tx)
        .await?;

        let new_corpus = patch.corpus_id.clone().unwrap_or_else(|| old_corpus.clone());

        let mut persisted_ids: Vec<Uuid> = Vec::new();
        let mut inserted = 0i64;
        if let Some(chunks) = new_chunks {
            if !chunks.is_empty() {
                inserted =
                    Self::insert_batch(&mut tx, patch.document_id, &chunks, &mut persisted_ids, embedder)
                        .await?;
            }
        }

        if new_corpus != old_corpus {
            let doc_chunk_count: i64 = sqlx::query_scalar(
                "SELECT COUNT(*) FROM chunks WHERE document_id = $1 AND embedding IS NOT NULL",
            )
            .bind(patch.document_id)
            .fetch_one(&mut *tx)
            .await?;

            sqlx::query(
                "UPDATE index_configs SET chunk_count = GREATEST(chunk_count - $2, 0), is_indexed = false \
                 WHERE corpus_id = $1",
            )
            .bind(&old_corpus)
            .bind(doc_chunk_count)
            .execute(&mut *tx)
            .await?;

            Self::upsert_index_config_delta(&mut tx, &new_corpus, doc_chunk_count).await?;
            sqlx::query("UPDATE index_configs SET is_indexed = false WHERE corpus_id = $1")
                .bind(&new_corpus)
                .execute(&mut *tx)
                .await?;
        } else if inserted > 0 {
            Self::upsert_index_config_delta(&mut tx, &new_corpus, inserted).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Deletes `chunk_ids` (or all of `document_id`'s chunks when absent)
    /// and adjusts the owning corpus's `IndexConfig`.
    pub async fn delete_chunks(
        &self,
        document_id: Uuid,
        chunk_ids: Option<Vec<Uuid>>,
    ) -> Result<u64, StoreError> {
        let mut tx = self.pool.begin().await?;

        let corpus_id: String = sqlx::query_scalar("SELECT corpus_id FROM documents WHERE id = $1")
            .bind(document_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("document {document_id}")))?;

        // RETURNING whether each deleted row had an embedding so the
        // IndexConfig decrement uses the same "live chunk" definition
        // (embedded chunks) as ingestion and index_manager, while the
        // count handed back to the caller still reflects every deleted row.
        let had_embedding: Vec<bool> = match chunk_ids {
            Some(ids) if !ids.is_empty() => {
                sqlx::query_scalar(
                    "DELETE FROM chunks WHERE document_id = $1 AND id = ANY($2) \
                     RETURNING embedding IS NOT NULL",
                )
                .bind(document_id)
                .bind(&ids)
                .fetch_all(&mut *tx)
                .await?
            }
            _ => {
                sqlx::query_scalar(
                    "DELETE FROM chunks WHERE document_id = $1 RETURNING embedding IS NOT NULL",
                )
                .bind(document_id)
                .fetch_all(&mut *tx)
                .await?
            }
        };

        let deleted = had_embedding.len() as u64;
        let embedded_deleted = had_embedding.iter().filter(|&&e| e).count() as i64;

        if embedded_deleted > 0 {
            sqlx::query(
                "UPDATE index_configs SET chunk_count = GREATEST(chunk_count - $2, 0), is_indexed = false \
                 WHERE corpus_id = $1",
            )
            .bind(&corpus_id)
            .bind(embedded_deleted)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(deleted)
    }

    /// Cascades chunk deletion (FK `ON DELETE CASCADE`) and adjusts the
    /// owning corpus's `IndexConfig`.
    pub async fn delete_document(&self, document_id: Uuid) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        let row: Option<(String, i64)> = sqlx::query_as(
            "SELECT d.corpus_id, COUNT(c.id) FILTER (WHERE c.embedding IS NOT NULL) FROM documents d \
             LEFT JOIN chunks c ON c.document_id = d.id \
             WHERE d.id = $1 GROUP BY d.corpus_id",
        )
        .bind(document_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((corpus_id, chunk_count)) = row else {
            return Err(StoreError::NotFound(format!("document {document_id}")));
        };

        sqlx::query("DELETE FROM documents WHERE id = $1")
            .bind(document_id)
            .execute(&mut *tx)
            .await?;

        if chunk_count > 0 {
            sqlx::query(
                "UPDATE index_configs SET chunk_count = GREATEST(chunk_count - $2, 0), is_indexed = false \
                 WHERE corpus_id = $1",
            )
            .bind(&corpus_id)
            .bind(chunk_count)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Executes the `WITH ranked AS (...)` candidate query inside a
    /// read-only transaction, returning the full `expanded` candidate
    /// pool (not yet truncated to `top_k`) for the reranker to score.
    pub async fn fetch_candidates(
        &self,
        filter: &CandidateFilter,
    ) -> Result<Vec<CandidateRow>, StoreError> {
        let mut qb: sqlx::QueryBuilder<sqlx::Postgres> = sqlx::QueryBuilder::new(
            "WITH ranked AS (SELECT c.id, c.document_id, c.content, c.start_char, c.end_char, \
             c.hierarchy_level, c.parent_chunk_id, d.title, d.theme, d.document_type, d.publish_date, \
             c.embedding <=> ",
        );
        qb.push_bind(Vector::from(filter.query_embedding.clone()));
        qb.push(" AS distance FROM chunks c JOIN documents d ON d.id = c.document_id WHERE 1=1");

        if let Some(theme) = &filter.theme {
            qb.push(" AND d.theme = ").push_bind(theme.clone());
        }
        if let Some(dtype) = &filter.document_type {
            qb.push(" AND d.document_type = ").push_bind(dtype.clone());
        }
        if let (Some(start), Some(end)) = (filter.start_date, filter.end_date) {
            qb.push(" AND d.publish_date BETWEEN ")
                .push_bind(start)
                .push(" AND ")
                .push_bind(end);
        }
        if let Some(corpus) = &filter.corpus_id {
            qb.push(" AND d.corpus_id = ").push_bind(corpus.clone());
        }
        if let Some(level) = filter.hierarchy_level {
            qb.push(" AND c.hierarchy_level = ").push_bind(level.as_i16());
        }

        qb.push(" ORDER BY distance LIMIT ").push_bind(filter.expanded);
        qb.push(") SELECT * FROM ranked ORDER BY distance LIMIT ")
            .push_bind(filter.expanded);

        let mut tx = self.pool.begin().await?;
        let rows = qb.build().fetch_all(&mut *tx).await?;
        tx.commit().await?;

        rows.iter().map(Self::candidate_from_row).collect()
    }

    /// Walks `parent_chunk_id` up to 3 levels (0/1/2); missing levels stay
    /// `None`.
    pub async fn fetch_parent_chain(
        &self,
        chunk_id: Uuid,
    ) -> Result<[Option<ParentLevel>; 3], StoreError> {
        let mut levels: [Option<ParentLevel>; 3] = [None, None, None];
        let mut current = chunk_id;

        for _ in 0..3 {
            let row = sqlx::query(
                "SELECT p.id, p.content, p.hierarchy_level \
                 FROM chunks c JOIN chunks p ON p.id = c.parent_chunk_id \
                 WHERE c.id = $1",
            )
            .bind(current)
            .fetch_optional(&self.pool)
            .await?;
            let Some(row) = row else { break };

            let parent_id: Uuid = row.try_get("id")?;
            let level_raw: i16 = row.try_get("hierarchy_level")?;
            let Some(level) = HierarchyLevel::from_i16(level_raw) else {
                break;
            };
            let idx = level.as_i16() as usize;
            if idx < 3 {
                levels[idx] = Some(ParentLevel {
                    chunk_id: parent_id,
                    content: row.try_get("content")?,
                    hierarchy_level: level,
                });
            }
            current = parent_id;
        }
        Ok(levels)
    }

    /// Best-effort audit insert. Never propagates a failure to the caller —
    /// a dropped audit row should not turn a successful search into an
    /// error.
    pub async fn log_search(&self, record: &SearchQueryRecord) {
        let result = sqlx::query(
            "INSERT INTO search_queries \
             (query_text, theme, document_type, corpus_id, results_count, confidence_level, user_id) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(&record.query_text)
        .bind(&record.theme)
        .bind(&record.document_type)
        .bind(&record.corpus_id)
        .bind(record.results_count)
        .bind(record.confidence_level)
        .bind(&record.user_id)
        .execute(&self.pool)
        .await;

        if let Err(e) = result {
            tracing::warn!(error = %e, "failed to persist search query audit record");
        }
    }

    async fn insert_batch(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        document_id: Uuid,
        batch: &[RawChunk],
        persisted_ids: &mut Vec<Uuid>,
        embedder: &dyn EmbeddingModel,
    ) -> Result<i64, StoreError> {
        let fine_texts: Vec<&str> = batch
            .iter()
            .filter(|c| c.hierarchy_level == HierarchyLevel::Fine)
            .map(|c| c.content.as_str())
            .collect();

        let mut fine_embeddings = if fine_texts.is_empty() {
            Vec::new().into_iter()
        } else {
            embedder
                .embed_documents(&fine_texts)
                .map_err(|e| StoreError::IntegrityViolation(format!("embedding failed: {e}")))?
                .into_iter()
        };

        for raw in batch {
            let parent_id = raw.parent_index.and_then(|i| persisted_ids.get(i).copied());
            let embedding = if raw.hierarchy_level == HierarchyLevel::Fine {
                fine_embeddings.next()
            } else {
                None
            };
            let vector = embedding.map(Vector::from);

            let id: Uuid = sqlx::query_scalar(
                "INSERT INTO chunks \
                 (document_id, content, embedding, start_char, end_char, hierarchy_level, parent_chunk_id) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING id",
            )
            .bind(document_id)
            .bind(&raw.content)
            .bind(vector)
            .bind(raw.start_char as i64)
            .bind(raw.end_char as i64)
            .bind(raw.hierarchy_level.as_i16())
            .bind(parent_id)
            .fetch_one(&mut **tx)
            .await?;

            persisted_ids.push(id);
        }

        // `index_configs.chunk_count` counts live chunks, defined (matching
        // index_manager's projection/lists query) as chunks with an embedding,
        // not every hierarchy level inserted.
        Ok(batch
            .iter()
            .filter(|c| c.hierarchy_level == HierarchyLevel::Fine)
            .count() as i64)
    }

    async fn upsert_index_config_delta(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        corpus_id: &str,
        delta: i64,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO index_configs (corpus_id, chunk_count) VALUES ($1, $2) \
             ON CONFLICT (corpus_id) DO UPDATE \
             SET chunk_count = GREATEST(index_configs.chunk_count + EXCLUDED.chunk_count, 0)",
        )
        .bind(corpus_id)
        .bind(delta)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    fn candidate_from_row(row: &PgRow) -> Result<CandidateRow, StoreError> {
        let level_raw: i16 = row.try_get("hierarchy_level")?;
        let hierarchy_level = HierarchyLevel::from_i16(level_raw).ok_or_else(|| {
            StoreError::IntegrityViolation(format!("invalid hierarchy_level {level_raw}"))
        })?;
        Ok(CandidateRow {
            chunk_id: row.try_get("id")?,
            document_id: row.try_get("document_id")?,
            content: row.try_get("content")?,
            start_char: row.try_get("start_char")?,
            end_char: row.try_get("end_char")?,
            hierarchy_level,
            parent_chunk_id: row.try_get("parent_chunk_id")?,
            title: row.try_get("title")?,
            theme: row.try_get("theme")?,
            document_type: row.try_get("document_type")?,
            publish_date: row.try_get("publish_date")?,
            distance: row.try_get("distance")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidate_filter_is_clonable() {
        let f = CandidateFilter {
            query_embedding: vec![0.0; 768],
            theme: None,
            document_type: None,
            start_date: None,
            end_date: None,
            corpus_id: None,
            hierarchy_level: None,
            expanded: 30,
        };
        let g = f.clone();
        assert_eq!(f.expanded, g.expanded);
    }
}
