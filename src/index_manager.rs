//! Per-corpus ANN index lifecycle over materialized projections. Built on
//! the same `pgvector`/`sqlx` patterns used throughout `store`; the advisory
//! lock and projection naming scheme exist because there is no store-level
//! ANN index that manages itself automatically here.

use chrono::Utc;
use sqlx::PgPool;

use crate::error::IndexError;
use crate::types::{IndexBuildResult, IndexStatus, IndexType};

fn sanitize_corpus_id(corpus_id: &str) -> String {
    corpus_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

fn projection_name(corpus_id: &str) -> String {
    format!("proj_{}", sanitize_corpus_id(corpus_id))
}

fn index_name(corpus_id: &str) -> String {
    format!("idx_vector_{}", sanitize_corpus_id(corpus_id))
}

pub struct IndexManager {
    pool: PgPool,
}

impl IndexManager {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// If an index already exists, returns `IndexExists` without side
    /// effects. Otherwise builds the materialized projection and an
    /// IVFFLAT index over it, sized by `lists = max(1, min(1000,
    /// round(sqrt(n))))`.
    pub async fn create_simple_index(&self, corpus_id: &str) -> Result<IndexBuildResult, IndexError> {
        self.create_index_with_type(corpus_id, IndexType::Ivfflat).await
    }

    /// Generalization of `create_simple_index` accepting either ANN index
    /// type. Only `create_simple_index`'s IVFFLAT path is exercised by the
    /// ingest pipeline; HNSW carries the same create/drop/status lifecycle
    /// but no `lists`-equivalent tuning formula, left at pgvector's own
    /// defaults.
    pub async fn create_index_with_type(
        &self,
        corpus_id: &str,
        index_type: IndexType,
    ) -> Result<IndexBuildResult, IndexError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(corpus_id)
            .execute(&mut *tx)
            .await?;

        let already_indexed: Option<bool> =
            sqlx::query_scalar("SELECT is_indexed FROM index_configs WHERE corpus_id = $1")
                .bind(corpus_id)
                .fetch_optional(&mut *tx)
                .await?;
        if already_indexed == Some(true) {
            return Err(IndexError::IndexExists);
        }

        let live_count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM chunks c JOIN documents d ON d.id = c.document_id \
             WHERE d.corpus_id = $1 AND c.embedding IS NOT NULL",
        )
        .bind(corpus_id)
        .fetch_one(&mut *tx)
        .await?;

        let lists = ((live_count as f64).sqrt().round() as i32).clamp(1, 1000);
        let proj = projection_name(corpus_id);
        let idx = index_name(corpus_id);

        sqlx::query(&format!("DROP INDEX IF EXISTS {idx}"))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!("DROP TABLE IF EXISTS {proj}"))
            .execute(&mut *tx)
            .await?;

        sqlx::query(&format!(
            "CREATE TABLE {proj} AS \
             SELECT c.id AS chunk_id, c.embedding FROM chunks c \
             JOIN documents d ON d.id = c.document_id \
             WHERE d.corpus_id = $1 AND c.embedding IS NOT NULL",
        ))
        .bind(corpus_id)
        .execute(&mut *tx)
        .await?;

        match index_type {
            IndexType::Ivfflat => {
                sqlx::query(&format!(
                    "CREATE INDEX {idx} ON {proj} USING ivfflat (embedding vector_cosine_ops) \
                     WITH (lists = {lists})",
                ))
                .execute(&mut *tx)
                .await?;
            }
            IndexType::Hnsw => {
                sqlx::query(&format!(
                    "CREATE INDEX {idx} ON {proj} USING hnsw (embedding vector_cosine_ops)",
                ))
                .execute(&mut *tx)
                .await?;
            }
        }

        let documents_updated = sqlx::query("UPDATE documents SET index_needed = false WHERE corpus_id = $1")
            .bind(corpus_id)
            .execute(&mut *tx)
            .await?
            .rows_affected() as i64;

        sqlx::query(
            "INSERT INTO index_configs (corpus_id, index_type, is_indexed, chunk_count, last_indexed) \
             VALUES ($1, $2, true, $3, now()) \
             ON CONFLICT (corpus_id) DO UPDATE SET \
                index_type = EXCLUDED.index_type, \
                is_indexed = true, \
                chunk_count = EXCLUDED.chunk_count, \
                last_indexed = now()",
        )
        .bind(corpus_id)
        .bind(index_type)
        .bind(live_count)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(corpus_id, lists, live_count, "built corpus ANN index");

        Ok(IndexBuildResult {
            index_type,
            lists,
            documents_updated,
            projection_name: proj,
        })
    }

    /// Drops the index and projection if present; `IndexMissing` if absent.
    pub async fn drop_index(&self, corpus_id: &str) -> Result<(), IndexError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(corpus_id)
            .execute(&mut *tx)
            .await?;

        let exists: Option<bool> =
            sqlx::query_scalar("SELECT is_indexed FROM index_configs WHERE corpus_id = $1")
                .bind(corpus_id)
                .fetch_optional(&mut *tx)
                .await?;
        if exists != Some(true) {
            return Err(IndexError::IndexMissing);
        }

        let proj = projection_name(corpus_id);
        let idx = index_name(corpus_id);
        sqlx::query(&format!("DROP INDEX IF EXISTS {idx}")).execute(&mut *tx).await?;
        sqlx::query(&format!("DROP TABLE IF EXISTS {proj}")).execute(&mut *tx).await?;

        sqlx::query("UPDATE index_configs SET is_indexed = false WHERE corpus_id = $1")
            .bind(corpus_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Reports index existence (checked live via `to_regclass`), config
    /// existence, and staleness for one corpus.
    pub async fn check_status(&self, corpus_id: &str) -> Result<IndexStatus, IndexError> {
        let idx = index_name(corpus_id);
        let index_exists: bool =
            sqlx::query_scalar("SELECT to_regclass($1) IS NOT NULL")
                .bind(&idx)
                .fetch_one(&self.pool)
                .await?;

        let config: Option<IndexConfigRow> = sqlx::query_as(
            "SELECT corpus_id, index_type, is_indexed, chunk_count, last_indexed \
             FROM index_configs WHERE corpus_id = $1",
        )
        .bind(corpus_id)
        .fetch_optional(&self.pool)
        .await?;

        // Same "live chunk" definition as create_index_with_type's live_count:
        // only chunks with an embedding are indexable and counted.
        let live_chunk_count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM chunks c JOIN documents d ON d.id = c.document_id \
             WHERE d.corpus_id = $1 AND c.embedding IS NOT NULL",
        )
        .bind(corpus_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(IndexStatus {
            corpus_id: corpus_id.to_string(),
            index_exists,
            config_exists: config.is_some(),
            is_indexed: config.as_ref().map(|c| c.is_indexed).unwrap_or(false),
            index_type: config.as_ref().map(|c| c.index_type),
            live_chunk_count,
            configured_chunk_count: config.as_ref().map(|c| c.chunk_count).unwrap_or(0),
            last_indexed: config.and_then(|c| c.last_indexed),
        })
    }

    /// Reports `check_status` for every corpus with either a document or an
    /// `IndexConfig` row.
    pub async fn check_all(&self) -> Result<Vec<IndexStatus>, IndexError> {
        let corpus_ids: Vec<String> = sqlx::query_scalar(
            "SELECT corpus_id FROM documents \
             UNION \
             SELECT corpus_id FROM index_configs",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut statuses = Vec::with_capacity(corpus_ids.len());
        for corpus_id in corpus_ids {
            statuses.push(self.check_status(&corpus_id).await?);
        }
        Ok(statuses)
    }

    /// Deletes `IndexConfig` rows whose corpus has no remaining live
    /// documents, dropping the projection/index first. Collects partial
    /// failures rather than aborting the whole sweep.
    pub async fn clean_orphans(&self) -> Result<crate::types::CleanupResult, IndexError> {
        let orphan_corpus_ids: Vec<String> = sqlx::query_scalar(
            "SELECT ic.corpus_id FROM index_configs ic \
             WHERE NOT EXISTS (SELECT 1 FROM documents d WHERE d.corpus_id = ic.corpus_id)",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut result = crate::types::CleanupResult::default();

        for corpus_id in orphan_corpus_ids {
            let outcome: Result<(), IndexError> = async {
                let proj = projection_name(&corpus_id);
                let idx = index_name(&corpus_id);
                sqlx::query(&format!("DROP INDEX IF EXISTS {idx}")).execute(&self.pool).await?;
                sqlx::query(&format!("DROP TABLE IF EXISTS {proj}")).execute(&self.pool).await?;
                sqlx::query("DELETE FROM index_configs WHERE corpus_id = $1")
                    .bind(&corpus_id)
                    .execute(&self.pool)
                    .await?;
                Ok(())
            }
            .await;

            match outcome {
                Ok(()) => {
                    result.deleted_count += 1;
                    result.cleaned_corpus_ids.push(corpus_id);
                }
                Err(e) => {
                    result.partial_success = true;
                    result.errors.push(format!("{corpus_id}: {e}"));
                }
            }
        }

        tracing::info!(
            deleted = result.deleted_count,
            partial_success = result.partial_success,
            "reaped orphan index configs"
        );

        Ok(result)
    }
}

#[derive(sqlx::FromRow)]
struct IndexConfigRow {
    #[allow(dead_code)]
    corpus_id: String,
    index_type: IndexType,
    is_indexed: bool,
    chunk_count: i64,
    last_indexed: Option<chrono::DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitizes_non_identifier_characters() {
        assert_eq!(sanitize_corpus_id("corpus-A.1"), "corpus_A_1");
    }

    #[test]
    fn projection_and_index_names_are_stable() {
        assert_eq!(projection_name("rse-2024"), "proj_rse_2024");
        assert_eq!(index_name("rse-2024"), "idx_vector_rse_2024");
    }

    #[test]
    fn lists_formula_matches_spec_scenario() {
        let n = 121.0_f64;
        let lists = (n.sqrt().round() as i32).clamp(1, 1000);
        assert_eq!(lists, 11);
    }
}
