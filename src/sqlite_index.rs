//! SQLite-backed [`VectorIndex`].
//!
//! Passages and their embedding vectors live in one SQLite file (see
//! [`crate::migrate`]). Search embeds the query, loads every stored vector,
//! and ranks by cosine similarity in process; the corpus of a support bot is
//! small enough that a full scan stays fast.
//!
//! A handle opened on a database without the schema is not ready: searches
//! are refused until [`VectorIndex::ensure_index`] runs (`ragchat init`),
//! whether through this handle or another process sharing the file.
//!
//! Stored vectors record the embedding model and dimensions they were made
//! with. Searching or inserting with a different embedder fails with a
//! pointer to `ragchat rebuild` instead of returning meaningless scores.

use anyhow::{bail, Result};
use async_trait::async_trait;
use ragchat_core::chunk::content_hash;
use ragchat_core::embedding::{blob_to_vec, cosine_similarity, embed_query, vec_to_blob, EmbeddingProvider};
use ragchat_core::store::{rank_candidates, VectorIndex};
use ragchat_core::{Passage, ScoredPassage};
use serde::Serialize;
use sqlx::{Row, SqlitePool};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

use crate::db;
use crate::migrate;

pub struct SqliteIndex {
    pool: SqlitePool,
    embedder: Arc<dyn EmbeddingProvider>,
    path: PathBuf,
    ready: AtomicBool,
}

/// Passage count for one origin file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OriginCount {
    pub origin: String,
    pub passages: i64,
}

impl SqliteIndex {
    /// Open the index file at `path`. Readiness reflects whether the schema exists.
    pub async fn open(path: &Path, embedder: Arc<dyn EmbeddingProvider>) -> Result<Self> {
        let pool = db::connect(path).await?;
        let ready = migrate::schema_exists(&pool).await?;
        Ok(Self {
            pool,
            embedder,
            path: path.to_path_buf(),
            ready: AtomicBool::new(ready),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn embedder(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedder
    }

    /// Readiness, re-reading the schema while the cached flag is unset.
    pub async fn reload_ready(&self) -> Result<bool> {
        if self.is_ready() {
            return Ok(true);
        }
        let ready = migrate::schema_exists(&self.pool).await?;
        if ready {
            debug!(path = %self.path.display(), "index schema appeared");
            self.ready.store(true, Ordering::SeqCst);
        }
        Ok(ready)
    }

    async fn require_ready(&self) -> Result<()> {
        if !self.reload_ready().await? {
            bail!(
                "Index at {} is not initialized. Run `ragchat init` first.",
                self.path.display()
            );
        }
        Ok(())
    }

    /// Fail if stored vectors were made by another model, or with a
    /// dimension other than `dims` when given.
    async fn check_embedding(&self, dims: Option<usize>) -> Result<()> {
        let rows = sqlx::query("SELECT DISTINCT model, dims FROM passage_vectors")
            .fetch_all(&self.pool)
            .await?;
        let configured = self.embedder.model_name();

        for row in &rows {
            let model: String = row.get("model");
            let stored_dims: i64 = row.get("dims");
            let dims_differ = dims.is_some_and(|d| d as i64 != stored_dims);
            if model != configured || dims_differ {
                bail!(
                    "Index was built with embedding model '{}' ({} dims) but '{}' is configured. Run `ragchat rebuild` to re-embed.",
                    model,
                    stored_dims,
                    configured
                );
            }
        }
        Ok(())
    }

    /// Passage counts grouped by origin, largest first.
    pub async fn origin_counts(&self) -> Result<Vec<OriginCount>> {
        self.require_ready().await?;
        let rows = sqlx::query(
            "SELECT origin, COUNT(*) AS passages FROM passages GROUP BY origin ORDER BY passages DESC, origin ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| OriginCount {
                origin: row.get("origin"),
                passages: row.get("passages"),
            })
            .collect())
    }

    /// Unix timestamp of the most recent insert, if any.
    pub async fn last_indexed(&self) -> Result<Option<i64>> {
        self.require_ready().await?;
        let ts: Option<i64> = sqlx::query_scalar("SELECT MAX(indexed_at) FROM passages")
            .fetch_one(&self.pool)
            .await?;
        Ok(ts)
    }

    /// Ids of all passages that came from `origin`.
    pub async fn ids_for_origin(&self, origin: &str) -> Result<HashSet<String>> {
        self.require_ready().await?;
        let ids: Vec<String> = sqlx::query_scalar("SELECT source_id FROM passages WHERE origin = ?")
            .bind(origin)
            .fetch_all(&self.pool)
            .await?;
        Ok(ids.into_iter().collect())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl VectorIndex for SqliteIndex {
    async fn ensure_index(&self) -> Result<()> {
        migrate::create_schema(&self.pool).await?;
        self.ready.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    async fn refresh_ready(&self) -> Result<bool> {
        if !self.reload_ready().await? {
            return Ok(false);
        }
        self.check_embedding(None).await?;
        Ok(true)
    }

    async fn search(&self, query: &str, k: usize, threshold: f32) -> Result<Vec<ScoredPassage>> {
        self.require_ready().await?;
        if k == 0 || query.trim().is_empty() {
            return Ok(Vec::new());
        }

        let query_vec = embed_query(self.embedder.as_ref(), query).await?;
        self.check_embedding(Some(query_vec.len())).await?;

        let rows = sqlx::query(
            r#"
            SELECT p.source_id, p.origin, p.position, p.text, v.vector
            FROM passages p
            JOIN passage_vectors v ON v.source_id = p.source_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let candidates: Vec<ScoredPassage> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("vector");
                let position: i64 = row.get("position");
                let passage = Passage {
                    source_id: row.get("source_id"),
                    origin: row.get("origin"),
                    position: position as usize,
                    text: row.get("text"),
                };
                ScoredPassage::new(passage, cosine_similarity(&query_vec, &blob_to_vec(&blob)))
            })
            .collect();

        debug!(query, scanned = candidates.len(), k, threshold, "vector scan");
        Ok(rank_candidates(candidates, k, threshold))
    }

    async fn upsert_batch(&self, passages: &[Passage]) -> Result<usize> {
        self.require_ready().await?;

        let existing = self.list_ids().await?;
        let mut seen = HashSet::new();
        let fresh: Vec<&Passage> = passages
            .iter()
            .filter(|p| !existing.contains(&p.source_id) && seen.insert(p.source_id.as_str()))
            .collect();
        if fresh.is_empty() {
            return Ok(0);
        }

        let texts: Vec<String> = fresh.iter().map(|p| p.text.clone()).collect();
        let vectors = self.embedder.embed(&texts).await?;
        if vectors.len() != fresh.len() {
            bail!(
                "Embedding provider returned {} vectors for {} passages",
                vectors.len(),
                fresh.len()
            );
        }
        if let Some(first) = vectors.first() {
            self.check_embedding(Some(first.len())).await?;
        }

        let now = chrono::Utc::now().timestamp();
        let model = self.embedder.model_name().to_string();
        let mut inserted = 0usize;
        let mut tx = self.pool.begin().await?;

        for (passage, vector) in fresh.iter().zip(&vectors) {
            let result = sqlx::query(
                "INSERT OR IGNORE INTO passages (source_id, origin, position, text, hash, indexed_at) VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(&passage.source_id)
            .bind(&passage.origin)
            .bind(passage.position as i64)
            .bind(&passage.text)
            .bind(content_hash(&passage.text))
            .bind(now)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() == 0 {
                continue;
            }
            inserted += 1;

            sqlx::query(
                "INSERT OR REPLACE INTO passage_vectors (source_id, model, dims, vector) VALUES (?, ?, ?, ?)",
            )
            .bind(&passage.source_id)
            .bind(&model)
            .bind(vector.len() as i64)
            .bind(vec_to_blob(vector))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(inserted)
    }

    async fn delete_by_id(&self, id: &str) -> Result<bool> {
        self.require_ready().await?;
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM passage_vectors WHERE source_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM passages WHERE source_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_ids(&self) -> Result<HashSet<String>> {
        self.require_ready().await?;
        let ids: Vec<String> = sqlx::query_scalar("SELECT source_id FROM passages")
            .fetch_all(&self.pool)
            .await?;
        Ok(ids.into_iter().collect())
    }

    async fn count(&self) -> Result<usize> {
        self.require_ready().await?;
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM passages")
            .fetch_one(&self.pool)
            .await?;
        Ok(n as usize)
    }

    async fn clear(&self) -> Result<()> {
        self.require_ready().await?;
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM passage_vectors")
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM passages").execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(())
    }
}
