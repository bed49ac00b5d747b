//! Multi-query retrieval with deduplication, threshold fallback, and ranking.
//!
//! # Algorithm
//!
//! 1. Expand the query into variants (original first) via [`QueryExpander`].
//! 2. Search the index once per variant for `k_per_query` hits at or above
//!    `relevance_threshold`. Searches run concurrently; results are merged
//!    in variant order, never completion order.
//! 3. Merge into one working set keyed by `source_id`. With
//!    [`DedupPolicy::FirstSeen`] the first observation of a passage wins even
//!    if a later variant scores it higher; [`DedupPolicy::MaxScore`] keeps
//!    the highest score instead.
//! 4. If nothing survived and `relevance_threshold > fallback_threshold`,
//!    search once more with the original query at `fallback_threshold`.
//! 5. Stable-sort by score (desc) and truncate to `top_k`.
//!
//! A failing variant search is logged and contributes nothing. Only an
//! index that was never built aborts retrieval.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::RagError;
use crate::expand::QueryExpander;
use crate::models::ScoredPassage;
use crate::store::VectorIndex;

/// How to resolve a passage seen more than once during one retrieval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DedupPolicy {
    /// Keep the first observation, in variant order.
    #[default]
    FirstSeen,
    /// Keep the observation with the highest score.
    MaxScore,
}

/// Retrieval tuning parameters, decoupled from application config.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalParams {
    /// Maximum entries in a [`RetrievalResult`].
    pub top_k: usize,
    /// Minimum score for a hit to be kept.
    pub relevance_threshold: f32,
    /// Number of alternative phrasings to request.
    pub multi_query_count: usize,
    /// Hits requested per variant.
    pub k_per_query: usize,
    /// Threshold used for the single widened search when nothing survives.
    pub fallback_threshold: f32,
    pub dedup: DedupPolicy,
}

impl Default for RetrievalParams {
    fn default() -> Self {
        Self {
            top_k: 5,
            relevance_threshold: 0.5,
            multi_query_count: 3,
            k_per_query: 3,
            fallback_threshold: 0.3,
            dedup: DedupPolicy::FirstSeen,
        }
    }
}

/// Ranked, deduplicated passages for one query.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RetrievalResult {
    /// Entries by descending score; `source_id`s are unique.
    pub entries: Vec<ScoredPassage>,
    /// Variants that were searched, original query first.
    pub variants: Vec<String>,
    /// Whether the widened fallback search ran.
    pub used_fallback: bool,
}

impl RetrievalResult {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ScoredPassage> {
        self.entries.iter()
    }
}

/// Accumulates hits across searches under a [`DedupPolicy`].
struct WorkingSet {
    policy: DedupPolicy,
    entries: Vec<ScoredPassage>,
    by_id: HashMap<String, usize>,
}

impl WorkingSet {
    fn new(policy: DedupPolicy) -> Self {
        Self {
            policy,
            entries: Vec::new(),
            by_id: HashMap::new(),
        }
    }

    fn merge(&mut self, hits: Vec<ScoredPassage>) {
        for hit in hits {
            match self.by_id.get(hit.source_id()) {
                None => {
                    self.by_id
                        .insert(hit.source_id().to_string(), self.entries.len());
                    self.entries.push(hit);
                }
                Some(&idx) => {
                    if self.policy == DedupPolicy::MaxScore && hit.score > self.entries[idx].score {
                        self.entries[idx].score = hit.score;
                    }
                }
            }
        }
    }

    fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn into_ranked(mut self, top_k: usize) -> Vec<ScoredPassage> {
        self.entries.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        self.entries.truncate(top_k);
        self.entries
    }
}

/// Orchestrates query expansion and per-variant index searches.
#[derive(Clone)]
pub struct MultiQueryRetriever {
    index: Arc<dyn VectorIndex>,
    expander: QueryExpander,
    params: RetrievalParams,
}

impl MultiQueryRetriever {
    pub fn new(index: Arc<dyn VectorIndex>, expander: QueryExpander, params: RetrievalParams) -> Self {
        Self {
            index,
            expander,
            params,
        }
    }

    pub fn params(&self) -> &RetrievalParams {
        &self.params
    }

    pub fn index(&self) -> &Arc<dyn VectorIndex> {
        &self.index
    }

    /// Retrieve a ranked, deduplicated, size-bounded result for `query`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::IndexUnavailable`] if the index has not been
    /// built or cannot serve queries with the configured embedder. Every
    /// other failure degrades to fewer (or no) results.
    pub async fn retrieve(&self, query: &str) -> Result<RetrievalResult, RagError> {
        match self.index.refresh_ready().await {
            Ok(true) => {}
            Ok(false) => {
                return Err(RagError::IndexUnavailable(
                    "the document index has not been built; run ingestion first".to_string(),
                ))
            }
            Err(e) => return Err(RagError::IndexUnavailable(format!("{:#}", e))),
        }
        if query.trim().is_empty() {
            return Ok(RetrievalResult::default());
        }

        let p = &self.params;
        let variants = self.expander.expand(query, p.multi_query_count).await;

        let mut working = WorkingSet::new(p.dedup);
        for hits in self.search_all(&variants, p.relevance_threshold).await {
            working.merge(hits);
        }

        let mut used_fallback = false;
        if working.is_empty() && p.relevance_threshold > p.fallback_threshold {
            info!(
                threshold = p.relevance_threshold,
                fallback = p.fallback_threshold,
                "no passages above threshold, widening search"
            );
            used_fallback = true;
            let widened = self
                .search_all(std::slice::from_ref(&variants[0]), p.fallback_threshold)
                .await;
            for hits in widened {
                working.merge(hits);
            }
        }

        let entries = working.into_ranked(p.top_k);
        debug!(
            variants = variants.len(),
            results = entries.len(),
            used_fallback,
            "retrieval complete"
        );

        Ok(RetrievalResult {
            entries,
            variants,
            used_fallback,
        })
    }

    /// Search every variant concurrently; results come back in variant order.
    async fn search_all(&self, variants: &[String], threshold: f32) -> Vec<Vec<ScoredPassage>> {
        let k = self.params.k_per_query;
        let searches = variants
            .iter()
            .map(|variant| self.index.search(variant, k, threshold));

        join_all(searches)
            .await
            .into_iter()
            .zip(variants)
            .map(|(outcome, variant)| match outcome {
                Ok(hits) => hits,
                Err(e) => {
                    let err = RagError::VariantSearchFailure {
                        variant: variant.clone(),
                        message: format!("{:#}", e),
                    };
                    warn!(error = %err, "skipping variant");
                    Vec::new()
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::GenerationProvider;
    use crate::models::{ChatMessage, Passage};
    use anyhow::Result;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::Mutex;

    /// Generator that always answers with the same expansion text.
    struct FixedExpansion(Option<&'static str>);

    #[async_trait]
    impl GenerationProvider for FixedExpansion {
        fn model_name(&self) -> &str {
            "fixed"
        }
        async fn generate(&self, _messages: &[ChatMessage]) -> Result<String> {
            match self.0 {
                Some(text) => Ok(text.to_string()),
                None => anyhow::bail!("model offline"),
            }
        }
    }

    /// Index with scripted per-query hits; honours `k` and `threshold`.
    struct ScriptedIndex {
        ready: bool,
        unusable: Option<&'static str>,
        hits: HashMap<String, Vec<(Passage, f32)>>,
        failing: HashSet<String>,
        calls: Mutex<Vec<(String, f32)>>,
    }

    impl ScriptedIndex {
        fn new() -> Self {
            Self {
                ready: true,
                unusable: None,
                hits: HashMap::new(),
                failing: HashSet::new(),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn with(mut self, query: &str, id: &str, score: f32) -> Self {
            self.hits
                .entry(query.to_string())
                .or_default()
                .push((passage(id), score));
            self
        }

        fn failing_on(mut self, query: &str) -> Self {
            self.failing.insert(query.to_string());
            self
        }

        fn calls(&self) -> Vec<(String, f32)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl VectorIndex for ScriptedIndex {
        async fn ensure_index(&self) -> Result<()> {
            Ok(())
        }
        fn is_ready(&self) -> bool {
            self.ready
        }
        async fn refresh_ready(&self) -> Result<bool> {
            match self.unusable {
                Some(reason) => anyhow::bail!(reason),
                None => Ok(self.ready),
            }
        }
        async fn search(&self, query: &str, k: usize, threshold: f32) -> Result<Vec<ScoredPassage>> {
            self.calls
                .lock()
                .unwrap()
                .push((query.to_string(), threshold));
            if self.failing.contains(query) {
                anyhow::bail!("index timeout");
            }
            let hits = self.hits.get(query).cloned().unwrap_or_default();
            Ok(crate::store::rank_candidates(
                hits.into_iter()
                    .map(|(p, s)| ScoredPassage::new(p, s))
                    .collect(),
                k,
                threshold,
            ))
        }
        async fn upsert_batch(&self, _passages: &[Passage]) -> Result<usize> {
            Ok(0)
        }
        async fn delete_by_id(&self, _id: &str) -> Result<bool> {
            Ok(false)
        }
        async fn list_ids(&self) -> Result<HashSet<String>> {
            Ok(HashSet::new())
        }
        async fn clear(&self) -> Result<()> {
            Ok(())
        }
    }

    fn passage(id: &str) -> Passage {
        Passage {
            text: format!("text of {}", id),
            source_id: id.to_string(),
            origin: format!("{}.txt", id),
            position: 0,
        }
    }

    fn retriever(
        index: ScriptedIndex,
        expansion: Option<&'static str>,
        params: RetrievalParams,
    ) -> (MultiQueryRetriever, Arc<ScriptedIndex>) {
        let index = Arc::new(index);
        let expander = QueryExpander::new(Arc::new(FixedExpansion(expansion)));
        (
            MultiQueryRetriever::new(index.clone(), expander, params),
            index,
        )
    }

    fn ids(result: &RetrievalResult) -> Vec<&str> {
        result.iter().map(|e| e.source_id()).collect()
    }

    #[tokio::test]
    async fn test_first_seen_wins_over_higher_later_score() {
        let index = ScriptedIndex::new()
            .with("q1", "A", 0.9)
            .with("q1", "B", 0.4)
            .with("q2", "A", 0.95);
        let params = RetrievalParams {
            top_k: 5,
            multi_query_count: 1,
            ..RetrievalParams::default()
        };
        let (r, _) = retriever(index, Some("q2"), params);

        let result = r.retrieve("q1").await.unwrap();
        assert_eq!(ids(&result), vec!["A"]);
        assert!((result.entries[0].score - 0.9).abs() < 1e-6);
        assert!(!result.used_fallback);
    }

    #[tokio::test]
    async fn test_max_score_policy_keeps_best() {
        let index = ScriptedIndex::new()
            .with("q1", "A", 0.9)
            .with("q2", "A", 0.95);
        let params = RetrievalParams {
            multi_query_count: 1,
            dedup: DedupPolicy::MaxScore,
            ..RetrievalParams::default()
        };
        let (r, _) = retriever(index, Some("q2"), params);

        let result = r.retrieve("q1").await.unwrap();
        assert_eq!(ids(&result), vec!["A"]);
        assert!((result.entries[0].score - 0.95).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_sorted_unique_and_bounded() {
        let index = ScriptedIndex::new()
            .with("q", "A", 0.6)
            .with("q", "B", 0.8)
            .with("q", "C", 0.7)
            .with("v1", "B", 0.99)
            .with("v1", "D", 0.9)
            .with("v1", "E", 0.55)
            .with("v2", "F", 0.65)
            .with("v2", "A", 0.75);
        let params = RetrievalParams {
            top_k: 4,
            multi_query_count: 2,
            ..RetrievalParams::default()
        };
        let (r, _) = retriever(index, Some("v1\nv2"), params);

        let result = r.retrieve("q").await.unwrap();
        assert_eq!(result.variants, vec!["q", "v1", "v2"]);
        assert_eq!(ids(&result), vec!["D", "B", "C", "F"]);
        for pair in result.entries.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
        let unique: HashSet<&str> = ids(&result).into_iter().collect();
        assert_eq!(unique.len(), result.len());
    }

    #[tokio::test]
    async fn test_fallback_widens_with_original_only() {
        let index = ScriptedIndex::new()
            .with("q", "A", 0.35)
            .with("v1", "B", 0.4);
        let params = RetrievalParams {
            multi_query_count: 1,
            ..RetrievalParams::default()
        };
        let (r, index) = retriever(index, Some("v1"), params);

        let result = r.retrieve("q").await.unwrap();
        assert!(result.used_fallback);
        assert_eq!(ids(&result), vec!["A"]);

        let calls = index.calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[2], ("q".to_string(), 0.3));
    }

    #[tokio::test]
    async fn test_no_fallback_when_threshold_already_low() {
        let index = ScriptedIndex::new().with("q", "A", 0.28);
        let params = RetrievalParams {
            relevance_threshold: 0.3,
            multi_query_count: 0,
            ..RetrievalParams::default()
        };
        let (r, index) = retriever(index, None, params);

        let result = r.retrieve("q").await.unwrap();
        assert!(result.is_empty());
        assert!(!result.used_fallback);
        assert_eq!(index.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_after_fallback_is_ok() {
        let index = ScriptedIndex::new().with("q", "A", 0.1);
        let (r, _) = retriever(index, Some("v1\nv2"), RetrievalParams::default());

        let result = r.retrieve("q").await.unwrap();
        assert!(result.is_empty());
        assert!(result.used_fallback);
    }

    #[tokio::test]
    async fn test_failing_variant_is_skipped() {
        let index = ScriptedIndex::new()
            .with("v2", "B", 0.7)
            .failing_on("q")
            .failing_on("v1");
        let (r, _) = retriever(index, Some("v1\nv2"), RetrievalParams::default());

        let result = r.retrieve("q").await.unwrap();
        assert_eq!(ids(&result), vec!["B"]);
    }

    #[tokio::test]
    async fn test_all_variants_failing_yields_empty() {
        let index = ScriptedIndex::new().failing_on("q");
        let (r, _) = retriever(index, None, RetrievalParams::default());

        let result = r.retrieve("q").await.unwrap();
        assert!(result.is_empty());
        assert_eq!(result.variants, vec!["q"]);
    }

    #[tokio::test]
    async fn test_unready_index_is_fatal() {
        let mut index = ScriptedIndex::new().with("q", "A", 0.9);
        index.ready = false;
        let (r, index) = retriever(index, Some("v1"), RetrievalParams::default());

        let err = r.retrieve("q").await.unwrap_err();
        assert!(matches!(err, RagError::IndexUnavailable(_)));
        assert!(index.calls().is_empty());
    }

    #[tokio::test]
    async fn test_unusable_index_reports_reason() {
        let mut index = ScriptedIndex::new().with("q", "A", 0.9);
        index.unusable = Some("embedding model changed; run `ragchat rebuild`");
        let (r, index) = retriever(index, Some("v1"), RetrievalParams::default());

        match r.retrieve("q").await.unwrap_err() {
            RagError::IndexUnavailable(msg) => assert!(msg.contains("ragchat rebuild")),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(index.calls().is_empty());
    }

    #[tokio::test]
    async fn test_retrieve_is_idempotent() {
        let index = ScriptedIndex::new()
            .with("q", "A", 0.6)
            .with("q", "B", 0.6)
            .with("v1", "C", 0.9);
        let (r, _) = retriever(index, Some("v1"), RetrievalParams::default());

        let first = r.retrieve("q").await.unwrap();
        let second = r.retrieve("q").await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_blank_query_short_circuits() {
        let (r, index) = retriever(ScriptedIndex::new(), Some("v1"), RetrievalParams::default());
        assert!(r.retrieve("   ").await.unwrap().is_empty());
        assert!(index.calls().is_empty());
    }
}
