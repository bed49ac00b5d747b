//! Vector index abstraction.
//!
//! The [`VectorIndex`] trait is the only storage contract the retrieval
//! pipeline depends on. It owns embedding of both passages and queries, so
//! callers search with plain text. Backends: [`memory::InMemoryIndex`] here,
//! and a SQLite-backed index in the app crate.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use std::collections::HashSet;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{Passage, ScoredPassage};

/// Abstract nearest-neighbour index over [`Passage`]s.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`ensure_index`](VectorIndex::ensure_index) | Idempotently create backing storage |
/// | [`is_ready`](VectorIndex::is_ready) | Whether searches can be served |
/// | [`refresh_ready`](VectorIndex::refresh_ready) | Re-check readiness against storage |
/// | [`search`](VectorIndex::search) | Top-`k` passages at or above a score threshold |
/// | [`upsert_batch`](VectorIndex::upsert_batch) | Insert passages not yet present |
/// | [`replace`](VectorIndex::replace) | Delete and re-insert one passage under its id |
/// | [`delete_by_id`](VectorIndex::delete_by_id) | Remove one passage |
/// | [`list_ids`](VectorIndex::list_ids) | All stored passage ids |
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Create backing storage if it does not exist. Safe to call repeatedly.
    async fn ensure_index(&self) -> Result<()>;

    /// Whether [`ensure_index`](VectorIndex::ensure_index) has run for this handle.
    fn is_ready(&self) -> bool;

    /// Re-check readiness against the backing storage, which another
    /// process may have built since this handle was opened.
    ///
    /// `Ok(false)` means not built yet. An error means the index exists but
    /// cannot serve queries as configured.
    async fn refresh_ready(&self) -> Result<bool> {
        Ok(self.is_ready())
    }

    /// Return up to `k` passages whose score is `>= threshold`,
    /// ordered by descending score.
    async fn search(&self, query: &str, k: usize, threshold: f32) -> Result<Vec<ScoredPassage>>;

    /// Insert every passage whose `source_id` is not already stored.
    ///
    /// Returns the number of newly inserted passages. Existing ids are left
    /// untouched, so re-ingesting an unchanged corpus is a no-op.
    async fn upsert_batch(&self, passages: &[Passage]) -> Result<usize>;

    /// Replace a stored passage wholesale (delete + insert under the same id).
    async fn replace(&self, passage: &Passage) -> Result<()> {
        self.delete_by_id(&passage.source_id).await?;
        self.upsert_batch(std::slice::from_ref(passage)).await?;
        Ok(())
    }

    /// Delete a passage. Returns whether it existed.
    async fn delete_by_id(&self, id: &str) -> Result<bool>;

    /// All stored passage ids.
    async fn list_ids(&self) -> Result<HashSet<String>>;

    /// Number of stored passages.
    async fn count(&self) -> Result<usize> {
        Ok(self.list_ids().await?.len())
    }

    /// Remove every passage, keeping the (empty) index ready.
    async fn clear(&self) -> Result<()>;
}

/// Sort scored passages by descending score and keep those `>= threshold`, up to `k`.
///
/// Shared by index backends that score by brute force.
pub fn rank_candidates(
    mut candidates: Vec<ScoredPassage>,
    k: usize,
    threshold: f32,
) -> Vec<ScoredPassage> {
    candidates.retain(|c| c.score >= threshold);
    candidates.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.passage.source_id.cmp(&b.passage.source_id))
    });
    candidates.truncate(k);
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scored(id: &str, score: f32) -> ScoredPassage {
        ScoredPassage::new(
            Passage {
                text: String::new(),
                source_id: id.to_string(),
                origin: "o.txt".to_string(),
                position: 0,
            },
            score,
        )
    }

    #[test]
    fn test_rank_filters_sorts_truncates() {
        let ranked = rank_candidates(
            vec![scored("a", 0.2), scored("b", 0.9), scored("c", 0.6), scored("d", 0.7)],
            2,
            0.5,
        );
        let ids: Vec<&str> = ranked.iter().map(|r| r.source_id()).collect();
        assert_eq!(ids, vec!["b", "d"]);
    }

    #[test]
    fn test_rank_threshold_inclusive() {
        let ranked = rank_candidates(vec![scored("a", 0.5)], 5, 0.5);
        assert_eq!(ranked.len(), 1);
    }

    #[test]
    fn test_rank_ties_by_id() {
        let ranked = rank_candidates(vec![scored("z", 0.8), scored("a", 0.8)], 5, 0.0);
        assert_eq!(ranked[0].source_id(), "a");
    }
}
