//! Embedded schema for documents, chunks, index configuration, and search
//! audit. Applied with `sqlx::raw_sql` rather than a `migrations/`
//! directory + `sqlx::migrate!`, since the crate ships as a library with
//! no fixed migration history of its own yet — callers embedding this
//! crate into a larger service are expected to fold this into their own
//! migration chain over time.

pub const SCHEMA_SQL: &str = r#"
CREATE EXTENSION IF NOT EXISTS vector;

CREATE TABLE IF NOT EXISTS documents (
    id              UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    title           TEXT NOT NULL,
    theme           TEXT,
    document_type   TEXT,
    publish_date    TIMESTAMPTZ,
    corpus_id       TEXT NOT NULL,
    created_at      TIMESTAMPTZ NOT NULL DEFAULT now(),
    index_needed    BOOLEAN NOT NULL DEFAULT true
);

CREATE INDEX IF NOT EXISTS idx_documents_theme ON documents (theme);
CREATE INDEX IF NOT EXISTS idx_documents_document_type ON documents (document_type);
CREATE INDEX IF NOT EXISTS idx_documents_publish_date ON documents (publish_date);
CREATE INDEX IF NOT EXISTS idx_documents_corpus_id ON documents (corpus_id);

CREATE TABLE IF NOT EXISTS chunks (
    id                UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    document_id       UUID NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
    content           TEXT NOT NULL,
    embedding         VECTOR(768),
    start_char        BIGINT NOT NULL,
    end_char          BIGINT NOT NULL,
    hierarchy_level   SMALLINT NOT NULL,
    parent_chunk_id   UUID REFERENCES chunks(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_chunks_document_level ON chunks (document_id, hierarchy_level);
CREATE INDEX IF NOT EXISTS idx_chunks_parent ON chunks (parent_chunk_id);

CREATE TABLE IF NOT EXISTS index_configs (
    id                       UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    corpus_id                TEXT NOT NULL UNIQUE,
    index_type               TEXT NOT NULL DEFAULT 'ivfflat',
    is_indexed               BOOLEAN NOT NULL DEFAULT false,
    chunk_count              BIGINT NOT NULL DEFAULT 0,
    last_indexed             TIMESTAMPTZ,
    ivf_lists                INT NOT NULL DEFAULT 1,
    hnsw_m                   INT NOT NULL DEFAULT 16,
    hnsw_ef_construction     INT NOT NULL DEFAULT 64
);

CREATE TABLE IF NOT EXISTS search_queries (
    id                 UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    query_text         TEXT NOT NULL,
    theme              TEXT,
    document_type      TEXT,
    corpus_id          TEXT,
    results_count      INT NOT NULL,
    confidence_level   REAL NOT NULL,
    created_at         TIMESTAMPTZ NOT NULL DEFAULT now(),
    user_id            TEXT
);
"#;
