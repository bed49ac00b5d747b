//! In-memory [`VectorIndex`] implementation for tests and ephemeral use.
//!
//! Stores passages and their vectors in a `HashMap` behind
//! `std::sync::RwLock`. Search is brute-force cosine similarity over every
//! stored vector. Locks are never held across an `.await`.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::embedding::{cosine_similarity, embed_query, EmbeddingProvider};
use crate::models::{Passage, ScoredPassage};

use super::{rank_candidates, VectorIndex};

struct StoredPassage {
    passage: Passage,
    vector: Vec<f32>,
}

/// In-memory index that embeds through a shared [`EmbeddingProvider`].
pub struct InMemoryIndex {
    embedder: Arc<dyn EmbeddingProvider>,
    entries: RwLock<HashMap<String, StoredPassage>>,
    ready: AtomicBool,
}

impl InMemoryIndex {
    /// Create an index that is not ready until [`VectorIndex::ensure_index`] runs.
    pub fn new(embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            embedder,
            entries: RwLock::new(HashMap::new()),
            ready: AtomicBool::new(false),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<String, StoredPassage>>> {
        self.entries
            .read()
            .map_err(|_| anyhow!("in-memory index lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<String, StoredPassage>>> {
        self.entries
            .write()
            .map_err(|_| anyhow!("in-memory index lock poisoned"))
    }
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn ensure_index(&self) -> Result<()> {
        self.ready.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    async fn search(&self, query: &str, k: usize, threshold: f32) -> Result<Vec<ScoredPassage>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let query_vec = embed_query(self.embedder.as_ref(), query).await?;
        let candidates: Vec<ScoredPassage> = self
            .read()?
            .values()
            .map(|sp| {
                ScoredPassage::new(sp.passage.clone(), cosine_similarity(&query_vec, &sp.vector))
            })
            .collect();
        Ok(rank_candidates(candidates, k, threshold))
    }

    async fn upsert_batch(&self, passages: &[Passage]) -> Result<usize> {
        let fresh: Vec<Passage> = {
            let entries = self.read()?;
            let mut seen = HashSet::new();
            passages
                .iter()
                .filter(|p| !entries.contains_key(&p.source_id) && seen.insert(&p.source_id))
                .cloned()
                .collect()
        };
        if fresh.is_empty() {
            return Ok(0);
        }

        let texts: Vec<String> = fresh.iter().map(|p| p.text.clone()).collect();
        let vectors = self.embedder.embed(&texts).await?;
        if vectors.len() != fresh.len() {
            anyhow::bail!(
                "embedding provider returned {} vectors for {} passages",
                vectors.len(),
                fresh.len()
            );
        }

        let mut entries = self.write()?;
        let mut inserted = 0;
        for (passage, vector) in fresh.into_iter().zip(vectors) {
            if entries.contains_key(&passage.source_id) {
                continue;
            }
            entries.insert(passage.source_id.clone(), StoredPassage { passage, vector });
            inserted += 1;
        }
        Ok(inserted)
    }

    async fn delete_by_id(&self, id: &str) -> Result<bool> {
        Ok(self.write()?.remove(id).is_some())
    }

    async fn list_ids(&self) -> Result<HashSet<String>> {
        Ok(self.read()?.keys().cloned().collect())
    }

    async fn clear(&self) -> Result<()> {
        self.write()?.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Embeds by counting a handful of keywords, enough to rank passages.
    struct KeywordEmbedder;

    const KEYWORDS: [&str; 4] = ["refund", "price", "support", "security"];

    #[async_trait]
    impl EmbeddingProvider for KeywordEmbedder {
        fn model_name(&self) -> &str {
            "keywords"
        }
        fn dims(&self) -> usize {
            KEYWORDS.len()
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| {
                    let lower = t.to_lowercase();
                    KEYWORDS
                        .iter()
                        .map(|k| lower.matches(k).count() as f32)
                        .collect()
                })
                .collect())
        }
    }

    fn passage(id: &str, text: &str) -> Passage {
        Passage {
            text: text.to_string(),
            source_id: id.to_string(),
            origin: "policy.txt".to_string(),
            position: 0,
        }
    }

    async fn ready_index() -> InMemoryIndex {
        let index = InMemoryIndex::new(Arc::new(KeywordEmbedder));
        index.ensure_index().await.unwrap();
        index
    }

    #[tokio::test]
    async fn test_not_ready_until_ensured() {
        let index = InMemoryIndex::new(Arc::new(KeywordEmbedder));
        assert!(!index.is_ready());
        index.ensure_index().await.unwrap();
        index.ensure_index().await.unwrap();
        assert!(index.is_ready());
    }

    #[tokio::test]
    async fn test_upsert_skips_existing_ids() {
        let index = ready_index().await;
        let first = index
            .upsert_batch(&[passage("p:0", "refund"), passage("p:1", "price")])
            .await
            .unwrap();
        assert_eq!(first, 2);

        let second = index
            .upsert_batch(&[passage("p:1", "price"), passage("p:2", "support")])
            .await
            .unwrap();
        assert_eq!(second, 1);
        assert_eq!(index.count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_search_applies_threshold_and_order() {
        let index = ready_index().await;
        index
            .upsert_batch(&[
                passage("a", "refund refund policy"),
                passage("b", "refund and price"),
                passage("c", "security audit"),
            ])
            .await
            .unwrap();

        let hits = index.search("refund", 5, 0.5).await.unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.source_id()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert!(hits[0].score >= hits[1].score);
    }

    #[tokio::test]
    async fn test_replace_and_delete() {
        let index = ready_index().await;
        index.upsert_batch(&[passage("a", "refund")]).await.unwrap();
        index.replace(&passage("a", "security")).await.unwrap();

        let hits = index.search("security", 1, 0.5).await.unwrap();
        assert_eq!(hits[0].passage.text, "security");

        assert!(index.delete_by_id("a").await.unwrap());
        assert!(!index.delete_by_id("a").await.unwrap());
        assert!(index.list_ids().await.unwrap().is_empty());
    }
}
