use sqlx::SqlitePool;

use docs_copilot_core::{Error, Result};

/// Create the schema if it does not exist. Safe to run on every open.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    // Create documents table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            path TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            category TEXT NOT NULL,
            tags_json TEXT NOT NULL DEFAULT '[]',
            fingerprint TEXT NOT NULL,
            metadata_json TEXT NOT NULL DEFAULT '{}',
            modified_at INTEGER NOT NULL,
            ingested_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(Error::store)?;

    // Create chunks table, one embedding per chunk
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunks (
            id TEXT PRIMARY KEY,
            document_path TEXT NOT NULL,
            ordinal INTEGER NOT NULL,
            heading_path_json TEXT NOT NULL,
            text TEXT NOT NULL,
            hash TEXT NOT NULL,
            embedding BLOB NOT NULL,
            UNIQUE(document_path, ordinal),
            FOREIGN KEY (document_path) REFERENCES documents(path) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(Error::store)?;

    // Embedding space and other collection-level settings
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS collection (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(Error::store)?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_document_path ON chunks(document_path)")
        .execute(pool)
        .await
        .map_err(Error::store)?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_category ON documents(category)")
        .execute(pool)
        .await
        .map_err(Error::store)?;

    Ok(())
}
