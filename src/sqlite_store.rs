//! SQLite-backed [`VectorStore`].
//!
//! Documents, chunks and their embeddings live in three tables (see
//! [`migrate`](crate::migrate)). Each document replace runs in a single
//! transaction, so a reader sees either the old chunks or the new ones.
//! Writers are serialized through one async lock: concurrent deferred
//! transactions that read before writing would otherwise fail with
//! `SQLITE_BUSY`. Readers never take the lock.
//! Vector search is brute-force cosine distance over the stored BLOBs.

use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};
use std::path::Path;
use tokio::sync::Mutex;

use docs_copilot_core::embedding::{blob_to_vec, cosine_distance, vec_to_blob};
use docs_copilot_core::models::{
    CollectionInfo, DocumentRecord, DocumentState, EmbeddingRecord, EmbeddingSpace,
    RetrievedChunk, SourceEntry, SourceRef,
};
use docs_copilot_core::retrieve::rank;
use docs_copilot_core::store::{check_query_dims, check_space, SearchFilter, VectorStore};
use docs_copilot_core::{Error, Result};

use crate::{db, migrate};

const KEY_MODEL: &str = "embedding_model";
const KEY_DIMS: &str = "embedding_dims";

/// SQLite implementation of [`VectorStore`].
pub struct SqliteStore {
    pool: SqlitePool,
    writes: Mutex<()>,
}

impl SqliteStore {
    /// Open the database at `path`, creating it and its schema if needed.
    pub async fn open(path: &Path) -> Result<Self> {
        let pool = db::connect(path).await?;
        migrate::run_migrations(&pool).await?;
        tracing::debug!(path = %path.display(), "opened sqlite store");
        Ok(Self::new(pool))
    }

    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            writes: Mutex::new(()),
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

async fn read_space(conn: &mut SqliteConnection) -> Result<Option<EmbeddingSpace>> {
    let rows: Vec<(String, String)> =
        sqlx::query_as("SELECT key, value FROM collection WHERE key IN (?, ?)")
            .bind(KEY_MODEL)
            .bind(KEY_DIMS)
            .fetch_all(&mut *conn)
            .await
            .map_err(Error::store)?;

    let mut model = None;
    let mut dims = None;
    for (key, value) in rows {
        match key.as_str() {
            KEY_MODEL => model = Some(value),
            KEY_DIMS => {
                dims = Some(
                    value
                        .parse::<usize>()
                        .map_err(|e| Error::store(format!("corrupt {}: {}", KEY_DIMS, e)))?,
                )
            }
            _ => {}
        }
    }
    Ok(model.zip(dims).map(|(model, dims)| EmbeddingSpace { model, dims }))
}

async fn write_space(conn: &mut SqliteConnection, space: &EmbeddingSpace) -> Result<()> {
    for (key, value) in [(KEY_MODEL, space.model.clone()), (KEY_DIMS, space.dims.to_string())] {
        sqlx::query(
            "INSERT INTO collection (key, value) VALUES (?, ?) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(key)
        .bind(value)
        .execute(&mut *conn)
        .await
        .map_err(Error::store)?;
    }
    Ok(())
}

fn state_from_row(row: &SqliteRow) -> DocumentState {
    let chunk_count: i64 = row.get("chunk_count");
    DocumentState {
        path: row.get("path"),
        title: row.get("title"),
        category: row.get("category"),
        fingerprint: row.get("fingerprint"),
        chunk_count: chunk_count as usize,
        modified_at: row.get("modified_at"),
    }
}

const STATE_SELECT: &str = r#"
    SELECT d.path, d.title, d.category, d.fingerprint, d.modified_at,
           (SELECT COUNT(*) FROM chunks c WHERE c.document_path = d.path) AS chunk_count
    FROM documents d
"#;

const CHUNK_SELECT: &str = r#"
    SELECT c.id, c.document_path, c.ordinal, c.heading_path_json, c.text, c.embedding,
           d.title, d.category, d.tags_json
    FROM chunks c
    JOIN documents d ON d.path = c.document_path
"#;

fn chunk_from_row(row: &SqliteRow, distance: f32) -> Result<RetrievedChunk> {
    let heading_json: String = row.get("heading_path_json");
    let tags_json: String = row.get("tags_json");
    let ordinal: i64 = row.get("ordinal");
    Ok(RetrievedChunk {
        chunk_id: row.get("id"),
        source: SourceRef {
            path: row.get("document_path"),
            title: row.get("title"),
            category: row.get("category"),
            tags: serde_json::from_str(&tags_json).map_err(Error::store)?,
        },
        heading_path: serde_json::from_str(&heading_json).map_err(Error::store)?,
        text: row.get("text"),
        ordinals: vec![ordinal as usize],
        distance,
    })
}

#[async_trait]
impl VectorStore for SqliteStore {
    async fn document_states(&self) -> Result<Vec<DocumentState>> {
        let rows = sqlx::query(&format!("{} ORDER BY d.path", STATE_SELECT))
            .fetch_all(&self.pool)
            .await
            .map_err(Error::store)?;
        Ok(rows.iter().map(state_from_row).collect())
    }

    async fn document_state(&self, path: &str) -> Result<Option<DocumentState>> {
        let row = sqlx::query(&format!("{} WHERE d.path = ?", STATE_SELECT))
            .bind(path)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::store)?;
        Ok(row.as_ref().map(state_from_row))
    }

    async fn replace_document(
        &self,
        doc: &DocumentRecord,
        records: &[EmbeddingRecord],
        space: &EmbeddingSpace,
    ) -> Result<usize> {
        let _guard = self.writes.lock().await;
        let mut tx = self.pool.begin().await.map_err(Error::store)?;

        let stored = read_space(&mut tx).await?;
        check_space(stored.as_ref(), space, records)?;
        if stored.is_none() {
            write_space(&mut tx, space).await?;
        }

        let previous: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks WHERE document_path = ?")
            .bind(&doc.source.path)
            .fetch_one(&mut *tx)
            .await
            .map_err(Error::store)?;

        sqlx::query("DELETE FROM chunks WHERE document_path = ?")
            .bind(&doc.source.path)
            .execute(&mut *tx)
            .await
            .map_err(Error::store)?;

        let tags_json = serde_json::to_string(&doc.source.tags).map_err(Error::store)?;
        sqlx::query(
            r#"
            INSERT INTO documents (path, title, category, tags_json, fingerprint,
                                   metadata_json, modified_at, ingested_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(path) DO UPDATE SET
                title = excluded.title,
                category = excluded.category,
                tags_json = excluded.tags_json,
                fingerprint = excluded.fingerprint,
                metadata_json = excluded.metadata_json,
                modified_at = excluded.modified_at,
                ingested_at = excluded.ingested_at
            "#,
        )
        .bind(&doc.source.path)
        .bind(&doc.source.title)
        .bind(&doc.source.category)
        .bind(&tags_json)
        .bind(&doc.fingerprint)
        .bind(doc.metadata.to_string())
        .bind(doc.modified_at)
        .bind(chrono::Utc::now().timestamp())
        .execute(&mut *tx)
        .await
        .map_err(Error::store)?;

        for record in records {
            let chunk = &record.chunk;
            let heading_json = serde_json::to_string(&chunk.heading_path).map_err(Error::store)?;
            sqlx::query(
                "INSERT INTO chunks (id, document_path, ordinal, heading_path_json, text, hash, embedding) \
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&chunk.id)
            .bind(&chunk.document_path)
            .bind(chunk.ordinal as i64)
            .bind(&heading_json)
            .bind(&chunk.text)
            .bind(&chunk.hash)
            .bind(vec_to_blob(&record.vector))
            .execute(&mut *tx)
            .await
            .map_err(Error::store)?;
        }

        tx.commit().await.map_err(Error::store)?;
        Ok(previous as usize)
    }

    async fn delete_document(&self, path: &str) -> Result<usize> {
        let _guard = self.writes.lock().await;
        let mut tx = self.pool.begin().await.map_err(Error::store)?;
        let removed = sqlx::query("DELETE FROM chunks WHERE document_path = ?")
            .bind(path)
            .execute(&mut *tx)
            .await
            .map_err(Error::store)?
            .rows_affected();
        sqlx::query("DELETE FROM documents WHERE path = ?")
            .bind(path)
            .execute(&mut *tx)
            .await
            .map_err(Error::store)?;
        tx.commit().await.map_err(Error::store)?;
        Ok(removed as usize)
    }

    async fn search(
        &self,
        query_vec: &[f32],
        limit: usize,
        filter: &SearchFilter,
    ) -> Result<Vec<RetrievedChunk>> {
        let mut conn = self.pool.acquire().await.map_err(Error::store)?;
        let space = read_space(&mut conn).await?;
        check_query_dims(space.as_ref(), query_vec)?;

        let mut sql = String::from(CHUNK_SELECT);
        if filter.category.is_some() {
            sql.push_str(" WHERE d.category = ?");
        }
        let mut query = sqlx::query(&sql);
        if let Some(category) = &filter.category {
            query = query.bind(category);
        }
        let rows = query.fetch_all(&mut *conn).await.map_err(Error::store)?;

        let mut candidates = Vec::with_capacity(rows.len());
        for row in &rows {
            let blob: Vec<u8> = row.get("embedding");
            let distance = cosine_distance(query_vec, &blob_to_vec(&blob));
            let category: String = row.get("category");
            if !filter.accepts(&category, 1.0 - distance) {
                continue;
            }
            candidates.push(chunk_from_row(row, distance)?);
        }

        Ok(rank(candidates, limit))
    }

    async fn document_chunks(&self, path: &str) -> Result<Vec<RetrievedChunk>> {
        let rows = sqlx::query(&format!(
            "{} WHERE c.document_path = ? ORDER BY c.ordinal",
            CHUNK_SELECT
        ))
        .bind(path)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::store)?;
        rows.iter().map(|row| chunk_from_row(row, 0.0)).collect()
    }

    async fn categories(&self) -> Result<Vec<String>> {
        sqlx::query_scalar::<_, String>(
            r#"
            SELECT DISTINCT d.category FROM documents d
            WHERE EXISTS (SELECT 1 FROM chunks c WHERE c.document_path = d.path)
            ORDER BY d.category
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(Error::store)
    }

    async fn list_sources(&self) -> Result<Vec<SourceEntry>> {
        let rows = sqlx::query(&format!("{} ORDER BY d.path", STATE_SELECT))
            .fetch_all(&self.pool)
            .await
            .map_err(Error::store)?;
        Ok(rows
            .iter()
            .map(|row| {
                let state = state_from_row(row);
                SourceEntry {
                    path: state.path,
                    title: state.title,
                    category: state.category,
                    chunk_count: state.chunk_count,
                }
            })
            .collect())
    }

    async fn info(&self) -> Result<CollectionInfo> {
        let mut conn = self.pool.acquire().await.map_err(Error::store)?;
        let documents: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
            .fetch_one(&mut *conn)
            .await
            .map_err(Error::store)?;
        let chunks: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&mut *conn)
            .await
            .map_err(Error::store)?;
        let space = read_space(&mut conn).await?;
        Ok(CollectionInfo {
            documents: documents as usize,
            chunks: chunks as usize,
            space,
        })
    }

    async fn clear(&self) -> Result<()> {
        let _guard = self.writes.lock().await;
        let mut tx = self.pool.begin().await.map_err(Error::store)?;
        for table in ["chunks", "documents", "collection"] {
            sqlx::query(&format!("DELETE FROM {}", table))
                .execute(&mut *tx)
                .await
                .map_err(Error::store)?;
        }
        tx.commit().await.map_err(Error::store)?;
        tracing::info!("cleared store");
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.pool.close().await;
        Ok(())
    }
}
