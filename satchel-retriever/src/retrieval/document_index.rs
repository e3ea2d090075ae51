//! Relational persistence for documents and chunks.
//!
//! This module is the metadata side of the index: it records which
//! documents have been ingested (keyed by path, fingerprinted by content
//! hash) and the chunks extracted from them, including a serialized f16
//! embedding per chunk once one has been generated.
//!
//! ## Schema
//!
//! ```sql
//! CREATE TABLE documents (
//!     id INTEGER PRIMARY KEY AUTOINCREMENT,
//!     path TEXT UNIQUE,            -- source path; one live document per path
//!     name TEXT,                   -- display name
//!     doc_type TEXT,               -- extension tag ("txt", "md", ...)
//!     size_bytes INTEGER,
//!     modified_at INTEGER,         -- file mtime, unix seconds
//!     indexed_at INTEGER,          -- when this row was (re)written
//!     content_hash BLOB            -- blake3 hash (32 bytes)
//! );
//!
//! CREATE TABLE chunks (
//!     id INTEGER PRIMARY KEY AUTOINCREMENT,
//!     document_id INTEGER REFERENCES documents(id) ON DELETE CASCADE,
//!     ordinal INTEGER,             -- 0-based position within the document
//!     text TEXT,
//!     token_estimate INTEGER,
//!     embedding BLOB,              -- f16 vector (optional)
//!     embedding_model TEXT         -- model that produced the vector
//! );
//! ```
//!
//! A `raw_texts` table keeps the full extracted text per document and is
//! cascade-deleted with it.
//!
//! All write operations are one logical transaction per call. A changed
//! `content_hash` on a document is the sole trigger for reindexing it.

use anyhow::{Result, bail};
use half::f16;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::str::FromStr;

/// A document tracked by the index.
#[derive(Debug, Clone)]
pub struct DocumentRecord {
    /// Database id (None before the first insert)
    pub id: Option<i64>,
    /// Source path the document was loaded from
    pub path: String,
    /// Display name (file name)
    pub name: String,
    /// Document-type tag, the lowercased extension
    pub doc_type: String,
    /// Size of the source file in bytes
    pub size_bytes: i64,
    /// Last modification time of the source file (unix seconds)
    pub modified_at: i64,
    /// When the document was indexed (unix seconds)
    pub indexed_at: i64,
    /// Blake3 hash of the raw file bytes
    pub content_hash: [u8; 32],
}

/// A chunk of document text, the unit of embedding and retrieval.
///
/// Ordinals are contiguous and unique within a document, assigned at
/// segmentation time. A chunk without an embedding exists in the store
/// but is not eligible for retrieval.
#[derive(Debug, Clone)]
pub struct ChunkRecord {
    pub id: Option<i64>,
    pub document_id: i64,
    pub ordinal: usize,
    pub text: String,
    pub token_estimate: usize,
    pub embedding: Option<Vec<f16>>,
    pub embedding_model: Option<String>,
}

/// SQLite-backed store for documents, chunks, and raw extracted text.
#[derive(Clone, Debug)]
pub struct DocumentIndex {
    pool: SqlitePool,
}

impl DocumentIndex {
    /// Open (or create) the persistent store inside `index_dir`.
    pub async fn open(index_dir: &Path) -> Result<Self> {
        tokio::fs::create_dir_all(index_dir).await?;
        let db_path = index_dir.join("satchel.db");

        let pool = SqlitePool::connect_with(
            SqliteConnectOptions::new()
                .filename(db_path)
                .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
                .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
                .busy_timeout(std::time::Duration::from_secs(5))
                .foreign_keys(true)
                .create_if_missing(true)
                .auto_vacuum(sqlx::sqlite::SqliteAutoVacuum::Full)
                .optimize_on_close(true, 1 << 10),
        )
        .await?;
        Self::new_with_pool(pool).await
    }

    /// Open an in-memory store for testing.
    ///
    /// Pinned to a single connection: separate pool connections would
    /// each get their own private in-memory database.
    pub async fn open_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        Self::new_with_pool(pool).await
    }

    async fn new_with_pool(pool: SqlitePool) -> Result<Self> {
        Self::create_tables(&pool).await?;
        Ok(Self { pool })
    }

    async fn create_tables(pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                path TEXT UNIQUE NOT NULL,
                name TEXT NOT NULL,
                doc_type TEXT NOT NULL,
                size_bytes INTEGER NOT NULL,
                modified_at INTEGER NOT NULL,
                indexed_at INTEGER NOT NULL,
                content_hash BLOB NOT NULL
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chunks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                document_id INTEGER NOT NULL,
                ordinal INTEGER NOT NULL,
                text TEXT NOT NULL,
                token_estimate INTEGER NOT NULL,
                embedding BLOB,
                embedding_model TEXT,
                CONSTRAINT unique_ordinal UNIQUE(document_id, ordinal),
                FOREIGN KEY (document_id) REFERENCES documents(id) ON DELETE CASCADE
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS raw_texts (
                document_id INTEGER PRIMARY KEY,
                content TEXT NOT NULL,
                stored_at INTEGER NOT NULL,
                FOREIGN KEY (document_id) REFERENCES documents(id) ON DELETE CASCADE
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_document ON chunks(document_id)")
            .execute(pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_path ON documents(path)")
            .execute(pool)
            .await?;

        Ok(())
    }

    /// Insert or update a document record, keyed by path. Returns the
    /// row id.
    pub async fn upsert_document(&self, doc: &DocumentRecord) -> Result<i64> {
        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO documents (path, name, doc_type, size_bytes, modified_at, indexed_at, content_hash)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(path) DO UPDATE SET
                name = excluded.name,
                doc_type = excluded.doc_type,
                size_bytes = excluded.size_bytes,
                modified_at = excluded.modified_at,
                indexed_at = excluded.indexed_at,
                content_hash = excluded.content_hash
            RETURNING id
            "#,
        )
        .bind(&doc.path)
        .bind(&doc.name)
        .bind(&doc.doc_type)
        .bind(doc.size_bytes)
        .bind(doc.modified_at)
        .bind(doc.indexed_at)
        .bind(&doc.content_hash[..])
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    /// Look up the live document for a source path, if any.
    pub async fn get_document_by_path(&self, path: &str) -> Result<Option<DocumentRecord>> {
        let row = sqlx::query("SELECT * FROM documents WHERE path = ?1")
            .bind(path)
            .fetch_optional(&self.pool)
            .await?;
        row.map(document_from_row).transpose()
    }

    pub async fn get_document_by_id(&self, id: i64) -> Result<Option<DocumentRecord>> {
        let row = sqlx::query("SELECT * FROM documents WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(document_from_row).transpose()
    }

    pub async fn list_documents(&self) -> Result<Vec<DocumentRecord>> {
        let rows = sqlx::query("SELECT * FROM documents ORDER BY path")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(document_from_row).collect()
    }

    /// Delete a document; its chunks and raw text cascade away with it.
    pub async fn delete_document(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM documents WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Insert or update a single chunk, keyed by (document, ordinal).
    /// Returns the chunk row id.
    pub async fn save_chunk(&self, chunk: &ChunkRecord) -> Result<i64> {
        let embedding_bytes = chunk
            .embedding
            .as_ref()
            .map(|e| bytemuck::cast_slice::<f16, u8>(e));

        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO chunks (document_id, ordinal, text, token_estimate, embedding, embedding_model)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(document_id, ordinal) DO UPDATE SET
                text = excluded.text,
                token_estimate = excluded.token_estimate,
                embedding = excluded.embedding,
                embedding_model = excluded.embedding_model
            RETURNING id
            "#,
        )
        .bind(chunk.document_id)
        .bind(chunk.ordinal as i64)
        .bind(&chunk.text)
        .bind(chunk.token_estimate as i64)
        .bind(embedding_bytes)
        .bind(chunk.embedding_model.as_deref())
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    /// Insert or update a batch of chunks in one transaction.
    pub async fn upsert_chunks(&self, chunks: &[ChunkRecord]) -> Result<Vec<i64>> {
        let mut tx = self.pool.begin().await?;
        let mut ids = Vec::with_capacity(chunks.len());

        for chunk in chunks {
            let embedding_bytes = chunk
                .embedding
                .as_ref()
                .map(|e| bytemuck::cast_slice::<f16, u8>(e));

            let id = sqlx::query_scalar::<_, i64>(
                r#"
                INSERT INTO chunks (document_id, ordinal, text, token_estimate, embedding, embedding_model)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                ON CONFLICT(document_id, ordinal) DO UPDATE SET
                    text = excluded.text,
                    token_estimate = excluded.token_estimate,
                    embedding = excluded.embedding,
                    embedding_model = excluded.embedding_model
                RETURNING id
                "#,
            )
            .bind(chunk.document_id)
            .bind(chunk.ordinal as i64)
            .bind(&chunk.text)
            .bind(chunk.token_estimate as i64)
            .bind(embedding_bytes)
            .bind(chunk.embedding_model.as_deref())
            .fetch_one(&mut *tx)
            .await?;
            ids.push(id);
        }

        tx.commit().await?;
        Ok(ids)
    }

    /// Attach an embedding to an existing chunk. Fails when the chunk id
    /// does not exist, so a lost row cannot silently swallow a vector.
    pub async fn set_embedding(&self, chunk_id: i64, embedding: &[f16], model: &str) -> Result<()> {
        let embedding_bytes = bytemuck::cast_slice::<f16, u8>(embedding);

        let result = sqlx::query(
            "UPDATE chunks SET embedding = ?1, embedding_model = ?2 WHERE id = ?3",
        )
        .bind(embedding_bytes)
        .bind(model)
        .bind(chunk_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            bail!("chunk {chunk_id} not found");
        }
        Ok(())
    }

    pub async fn get_chunk_by_id(&self, id: i64) -> Result<Option<ChunkRecord>> {
        let row = sqlx::query("SELECT * FROM chunks WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(chunk_from_row).transpose()
    }

    /// All chunks of a document in ordinal order.
    pub async fn list_chunks_for_document(&self, document_id: i64) -> Result<Vec<ChunkRecord>> {
        let rows = sqlx::query("SELECT * FROM chunks WHERE document_id = ?1 ORDER BY ordinal")
            .bind(document_id)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(chunk_from_row).collect()
    }

    /// Delete a document's chunks, returning how many rows were removed.
    pub async fn delete_chunks_for_document(&self, document_id: i64) -> Result<usize> {
        let result = sqlx::query("DELETE FROM chunks WHERE document_id = ?1")
            .bind(document_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() as usize)
    }

    pub async fn count_documents(&self) -> Result<usize> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM documents")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as usize)
    }

    pub async fn count_chunks(&self) -> Result<usize> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as usize)
    }

    /// Number of chunks carrying an embedding. The vector index entry
    /// count must equal this after every indexing run; divergence means
    /// drift.
    pub async fn count_chunks_with_embedding(&self) -> Result<usize> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM chunks WHERE embedding IS NOT NULL",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(count as usize)
    }

    /// All (chunk id, embedding) pairs currently in the store, the
    /// source for a full vector index rebuild.
    pub async fn all_embedded_chunks(&self) -> Result<Vec<(i64, Vec<f16>)>> {
        let rows =
            sqlx::query("SELECT id, embedding FROM chunks WHERE embedding IS NOT NULL ORDER BY id")
                .fetch_all(&self.pool)
                .await?;

        let mut pairs = Vec::with_capacity(rows.len());
        for row in rows {
            let id: i64 = row.get("id");
            let bytes: Vec<u8> = row.get("embedding");
            pairs.push((id, bytemuck::pod_collect_to_vec::<u8, f16>(&bytes)));
        }
        Ok(pairs)
    }

    /// Store the full extracted text for a document.
    pub async fn save_raw_text(&self, document_id: i64, content: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO raw_texts (document_id, content, stored_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(document_id) DO UPDATE SET
                content = excluded.content,
                stored_at = excluded.stored_at
            "#,
        )
        .bind(document_id)
        .bind(content)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_raw_text(&self, document_id: i64) -> Result<Option<String>> {
        let content = sqlx::query_scalar::<_, String>(
            "SELECT content FROM raw_texts WHERE document_id = ?1",
        )
        .bind(document_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(content)
    }

    /// Get the underlying SQLite connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn document_from_row(row: sqlx::sqlite::SqliteRow) -> Result<DocumentRecord> {
    let hash_bytes: Vec<u8> = row.get("content_hash");
    if hash_bytes.len() != 32 {
        bail!("content hash must be 32 bytes, found {}", hash_bytes.len());
    }
    let mut content_hash = [0u8; 32];
    content_hash.copy_from_slice(&hash_bytes);

    Ok(DocumentRecord {
        id: Some(row.get("id")),
        path: row.get("path"),
        name: row.get("name"),
        doc_type: row.get("doc_type"),
        size_bytes: row.get("size_bytes"),
        modified_at: row.get("modified_at"),
        indexed_at: row.get("indexed_at"),
        content_hash,
    })
}

fn chunk_from_row(row: sqlx::sqlite::SqliteRow) -> Result<ChunkRecord> {
    let ordinal: i64 = row.get("ordinal");
    let token_estimate: i64 = row.get("token_estimate");
    let embedding_bytes: Option<Vec<u8>> = row.get("embedding");
    let embedding = embedding_bytes.map(|bytes| bytemuck::pod_collect_to_vec::<u8, f16>(&bytes));

    Ok(ChunkRecord {
        id: Some(row.get("id")),
        document_id: row.get("document_id"),
        ordinal: ordinal as usize,
        text: row.get("text"),
        token_estimate: token_estimate as usize,
        embedding,
        embedding_model: row.get("embedding_model"),
    })
}
