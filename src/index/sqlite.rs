//! SQLite-backed [`VectorIndex`].
//!
//! One durable store per knowledge-base instance: chunk text and metadata
//! in `chunks`, embedding vectors as little-endian f32 BLOBs in
//! `chunk_vectors`, and the embedding model identity in `meta`. Queries
//! fetch the stored vectors and rank by cosine similarity in Rust.
//!
//! Rebuilds never mutate a live store: a staging store is created fresh,
//! populated, and renamed over the old one by the caller.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use tracing::warn;

use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::error::KbError;
use crate::models::{Chunk, ElementRecord, ScoredChunk};

use super::{rank, VectorIndex};

pub struct SqliteIndex {
    pool: SqlitePool,
    model: String,
    dims: usize,
    path: PathBuf,
}

impl SqliteIndex {
    /// Create a fresh store at `path`, replacing any existing file, and
    /// record the embedding model identity.
    pub async fn create(path: &Path, model: &str, dims: usize) -> Result<Self, KbError> {
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        let pool = connect(path, true).await?;
        migrate(&pool).await?;

        sqlx::query("INSERT INTO meta (model, dims, built_at) VALUES (?, ?, ?)")
            .bind(model)
            .bind(dims as i64)
            .bind(chrono::Utc::now().timestamp())
            .execute(&pool)
            .await?;

        Ok(Self {
            pool,
            model: model.to_string(),
            dims,
            path: path.to_path_buf(),
        })
    }

    /// Open an existing store.
    ///
    /// Returns `Ok(None)` when the file is missing or unreadable as a
    /// knowledge-base store — a recoverable condition ("empty index,
    /// rebuild required"), never a silent stale result.
    pub async fn open(path: &Path) -> Result<Option<Self>, KbError> {
        if !path.exists() {
            return Ok(None);
        }

        let pool = match connect(path, false).await {
            Ok(pool) => pool,
            Err(e) => {
                warn!(path = %path.display(), "could not open persisted index: {e}");
                return Ok(None);
            }
        };

        let meta = sqlx::query("SELECT model, dims FROM meta LIMIT 1")
            .fetch_optional(&pool)
            .await;

        match meta {
            Ok(Some(row)) => {
                let model: String = row.get("model");
                let dims: i64 = row.get("dims");
                Ok(Some(Self {
                    pool,
                    model,
                    dims: dims as usize,
                    path: path.to_path_buf(),
                }))
            }
            Ok(None) | Err(_) => {
                warn!(
                    path = %path.display(),
                    "persisted index is corrupt or missing metadata; rebuild required"
                );
                pool.close().await;
                Ok(None)
            }
        }
    }

    /// Close the connection pool, checkpointing any pending WAL frames.
    pub async fn close(self) {
        let _ = sqlx::query("PRAGMA wal_checkpoint(TRUNCATE)")
            .execute(&self.pool)
            .await;
        self.pool.close().await;
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

async fn connect(path: &Path, create: bool) -> Result<SqlitePool, KbError> {
    if create {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))
        .map_err(KbError::Store)?
        .create_if_missing(create)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    Ok(pool)
}

async fn migrate(pool: &SqlitePool) -> Result<(), KbError> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS meta (
            model TEXT NOT NULL,
            dims INTEGER NOT NULL,
            built_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunks (
            id TEXT PRIMARY KEY,
            document TEXT NOT NULL,
            chunk_index INTEGER NOT NULL,
            text TEXT NOT NULL,
            start_char INTEGER NOT NULL,
            end_char INTEGER NOT NULL,
            hash TEXT NOT NULL,
            selectors_json TEXT NOT NULL DEFAULT '[]',
            UNIQUE(document, chunk_index)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunk_vectors (
            chunk_id TEXT PRIMARY KEY,
            embedding BLOB NOT NULL,
            FOREIGN KEY (chunk_id) REFERENCES chunks(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_document ON chunks(document)")
        .execute(pool)
        .await?;

    Ok(())
}

fn row_to_chunk(row: &sqlx::sqlite::SqliteRow) -> Result<Chunk, KbError> {
    let start: i64 = row.get("start_char");
    let end: i64 = row.get("end_char");
    let selectors_json: String = row.get("selectors_json");
    let selectors: Vec<ElementRecord> = serde_json::from_str(&selectors_json)?;

    Ok(Chunk {
        id: row.get("id"),
        document: row.get("document"),
        chunk_index: row.get("chunk_index"),
        text: row.get("text"),
        start: start as usize,
        end: end as usize,
        hash: row.get("hash"),
        selectors,
    })
}

#[async_trait]
impl VectorIndex for SqliteIndex {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn upsert(&self, chunk: &Chunk, vector: &[f32]) -> Result<(), KbError> {
        let selectors_json = serde_json::to_string(&chunk.selectors)?;

        sqlx::query(
            r#"
            INSERT INTO chunks (id, document, chunk_index, text, start_char, end_char, hash, selectors_json)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                document = excluded.document,
                chunk_index = excluded.chunk_index,
                text = excluded.text,
                start_char = excluded.start_char,
                end_char = excluded.end_char,
                hash = excluded.hash,
                selectors_json = excluded.selectors_json
            "#,
        )
        .bind(&chunk.id)
        .bind(&chunk.document)
        .bind(chunk.chunk_index)
        .bind(&chunk.text)
        .bind(chunk.start as i64)
        .bind(chunk.end as i64)
        .bind(&chunk.hash)
        .bind(&selectors_json)
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO chunk_vectors (chunk_id, embedding) VALUES (?, ?)
            ON CONFLICT(chunk_id) DO UPDATE SET embedding = excluded.embedding
            "#,
        )
        .bind(&chunk.id)
        .bind(vec_to_blob(vector))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<ScoredChunk>, KbError> {
        let rows = sqlx::query(
            r#"
            SELECT c.id, c.document, c.chunk_index, c.text, c.start_char, c.end_char,
                   c.hash, c.selectors_json, v.embedding
            FROM chunk_vectors v
            JOIN chunks c ON c.id = v.chunk_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut hits = Vec::with_capacity(rows.len());
        for row in &rows {
            let blob: Vec<u8> = row.get("embedding");
            let stored = blob_to_vec(&blob);
            hits.push(ScoredChunk {
                chunk: row_to_chunk(row)?,
                score: cosine_similarity(vector, &stored) as f64,
            });
        }

        Ok(rank(hits, k))
    }

    async fn count(&self) -> Result<usize, KbError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as usize)
    }

    async fn dump_chunks(&self) -> Result<Vec<Chunk>, KbError> {
        let rows = sqlx::query(
            r#"
            SELECT id, document, chunk_index, text, start_char, end_char, hash, selectors_json
            FROM chunks
            ORDER BY document, chunk_index
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_chunk).collect()
    }

    async fn persist(&self) -> Result<(), KbError> {
        sqlx::query("PRAGMA wal_checkpoint(FULL)")
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn chunk(document: &str, index: i64, text: &str) -> Chunk {
        Chunk {
            id: Chunk::chunk_id(document, index),
            document: document.to_string(),
            chunk_index: index,
            text: text.to_string(),
            start: 0,
            end: text.chars().count(),
            hash: "h".to_string(),
            selectors: Vec::new(),
        }
    }

    #[tokio::test]
    async fn create_upsert_query_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("kb.sqlite");

        let index = SqliteIndex::create(&path, "test-model", 2).await.unwrap();
        index
            .upsert(&chunk("a.md", 0, "alpha"), &[1.0, 0.0])
            .await
            .unwrap();
        index
            .upsert(&chunk("a.md", 1, "beta"), &[0.0, 1.0])
            .await
            .unwrap();

        let hits = index.query(&[1.0, 0.0], 5).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].chunk.text, "alpha");
        assert!(hits[0].score > hits[1].score);
    }

    #[tokio::test]
    async fn reopen_preserves_model_and_chunks() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("kb.sqlite");

        let index = SqliteIndex::create(&path, "test-model", 2).await.unwrap();
        index
            .upsert(&chunk("a.md", 0, "alpha"), &[1.0, 0.0])
            .await
            .unwrap();
        index.close().await;

        let reopened = SqliteIndex::open(&path).await.unwrap().unwrap();
        assert_eq!(reopened.model_id(), "test-model");
        assert_eq!(reopened.dims(), 2);
        assert_eq!(reopened.count().await.unwrap(), 1);
        let chunks = reopened.dump_chunks().await.unwrap();
        assert_eq!(chunks[0].id, "a.md#0000");
    }

    #[tokio::test]
    async fn missing_store_opens_as_none() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("absent.sqlite");
        assert!(SqliteIndex::open(&path).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn corrupted_store_opens_as_none() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("kb.sqlite");
        std::fs::write(&path, b"this is not a database").unwrap();
        assert!(SqliteIndex::open(&path).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn selectors_survive_the_store() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("kb.sqlite");

        let mut c = chunk("page.html", 0, "Pay now");
        c.selectors.push(ElementRecord {
            tag: "button".to_string(),
            id: Some("pay-now-btn".to_string()),
            name: None,
            classes: vec!["btn-green".to_string()],
            test_attr: None,
            text: "Pay now".to_string(),
            offset: 0,
        });

        let index = SqliteIndex::create(&path, "test-model", 2).await.unwrap();
        index.upsert(&c, &[1.0, 0.0]).await.unwrap();
        index.close().await;

        let reopened = SqliteIndex::open(&path).await.unwrap().unwrap();
        let chunks = reopened.dump_chunks().await.unwrap();
        assert_eq!(chunks[0].selectors.len(), 1);
        assert_eq!(chunks[0].selectors[0].id.as_deref(), Some("pay-now-btn"));
    }
}
