//! Index schema.
//!
//! ```text
//! passages         source_id PK, origin, position, text, hash, indexed_at
//! passage_vectors  source_id PK → passages, model, dims, vector (f32 LE BLOB)
//! ```
//!
//! Every statement is idempotent, so creating the schema twice is safe.

use anyhow::Result;
use sqlx::SqlitePool;

pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS passages (
            source_id TEXT PRIMARY KEY,
            origin TEXT NOT NULL,
            position INTEGER NOT NULL,
            text TEXT NOT NULL,
            hash TEXT NOT NULL,
            indexed_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS passage_vectors (
            source_id TEXT PRIMARY KEY,
            model TEXT NOT NULL,
            dims INTEGER NOT NULL,
            vector BLOB NOT NULL,
            FOREIGN KEY (source_id) REFERENCES passages(source_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_passages_origin ON passages(origin)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Whether [`create_schema`] has run against this database.
pub async fn schema_exists(pool: &SqlitePool) -> Result<bool> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN ('passages', 'passage_vectors')",
    )
    .fetch_one(pool)
    .await?;
    Ok(count == 2)
}
