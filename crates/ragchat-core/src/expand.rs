//! Query expansion.
//!
//! Asks the generation provider for alternative phrasings of a question so
//! the retriever can search with several wordings of the same intent. The
//! original query is always the first variant. Expansion failure is never
//! fatal: the expander falls back to the original query alone.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::RagError;
use crate::generation::GenerationProvider;
use crate::models::ChatMessage;

const EXPANSION_SYSTEM_PROMPT: &str = "You rewrite customer questions so they can be used \
to search a company knowledge base. You only ever output the rewritten questions.";

/// Produces query variants through one generation call.
///
/// Holds no per-call state, so one expander can serve concurrent retrievals.
#[derive(Clone)]
pub struct QueryExpander {
    generator: Arc<dyn GenerationProvider>,
}

impl QueryExpander {
    pub fn new(generator: Arc<dyn GenerationProvider>) -> Self {
        Self { generator }
    }

    /// Return `query` followed by up to `count` alternative phrasings.
    ///
    /// The result is never empty and its first element is always `query`.
    /// If the provider fails, the result is `[query]`. The provider is
    /// called through [`GenerationProvider::generate_once`], so a timeout
    /// falls back after one attempt.
    pub async fn expand(&self, query: &str, count: usize) -> Vec<String> {
        if count == 0 {
            return vec![query.to_string()];
        }

        let messages = [
            ChatMessage::system(EXPANSION_SYSTEM_PROMPT),
            ChatMessage::user(expansion_prompt(query, count)),
        ];

        match self.generator.generate_once(&messages).await {
            Ok(raw) => {
                let variants = build_variants(query, &raw, count);
                debug!(
                    query,
                    variants = variants.len() - 1,
                    "query expanded"
                );
                variants
            }
            Err(e) => {
                let err = RagError::ExpansionFailure(format!("{:#}", e));
                warn!(error = %err, "falling back to the original query");
                vec![query.to_string()]
            }
        }
    }
}

/// Instruction asking for `count` rephrasings, one per line.
pub fn expansion_prompt(query: &str, count: usize) -> String {
    format!(
        "Generate {count} different versions of the question below. Each version must keep \
the same meaning but use different words, so that together they find more relevant documents.\n\
Write exactly one question per line. Do not number the lines and do not add any other text.\n\n\
Original question: {query}"
    )
}

/// Parse a model response into variants: the original first, then up to
/// `count` cleaned, non-empty alternatives.
pub fn build_variants(query: &str, raw: &str, count: usize) -> Vec<String> {
    let mut variants = vec![query.to_string()];
    let original = query.trim().to_lowercase();

    for line in raw.lines() {
        if variants.len() > count {
            break;
        }
        let cleaned = strip_list_marker(line.trim());
        if cleaned.is_empty() || cleaned.to_lowercase() == original {
            continue;
        }
        variants.push(cleaned.to_string());
    }
    variants
}

/// Remove a leading `1.`, `2)`, `-`, `*`, or `•` marker. A marker must be
/// followed by whitespace, so `3.5 inch screens?` is left alone.
fn strip_list_marker(line: &str) -> &str {
    let without_digits = line.trim_start_matches(|c: char| c.is_ascii_digit());
    let rest = if without_digits.len() < line.len() {
        without_digits
            .strip_prefix('.')
            .or_else(|| without_digits.strip_prefix(')'))
    } else {
        line.strip_prefix(|c: char| matches!(c, '-' | '*' | '•'))
    };
    match rest {
        Some(rest) if rest.is_empty() || rest.starts_with(char::is_whitespace) => rest.trim(),
        _ => line,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CannedGenerator {
        reply: Option<String>,
        calls: AtomicUsize,
    }

    impl CannedGenerator {
        fn ok(reply: &str) -> Self {
            Self {
                reply: Some(reply.to_string()),
                calls: AtomicUsize::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                reply: None,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl GenerationProvider for CannedGenerator {
        fn model_name(&self) -> &str {
            "canned"
        }
        async fn generate(&self, _messages: &[ChatMessage]) -> anyhow::Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.reply {
                Some(r) => Ok(r.clone()),
                None => anyhow::bail!("connection refused"),
            }
        }
    }

    #[tokio::test]
    async fn test_original_query_first() {
        let generator = Arc::new(CannedGenerator::ok("How do refunds work?\nCan I get my money back?"));
        let expander = QueryExpander::new(generator);
        let variants = expander.expand("What is the refund policy?", 3).await;
        assert_eq!(
            variants,
            vec![
                "What is the refund policy?",
                "How do refunds work?",
                "Can I get my money back?"
            ]
        );
    }

    #[tokio::test]
    async fn test_failure_falls_back_to_query() {
        let generator = Arc::new(CannedGenerator::failing());
        let expander = QueryExpander::new(generator.clone());
        let variants = expander.expand("pricing", 3).await;
        assert_eq!(variants, vec!["pricing"]);
        assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
    }

    /// Succeeds only when retried; a single attempt always fails.
    struct RetryOnlyGenerator {
        retried_calls: AtomicUsize,
    }

    #[async_trait]
    impl GenerationProvider for RetryOnlyGenerator {
        fn model_name(&self) -> &str {
            "retry-only"
        }
        async fn generate(&self, _messages: &[ChatMessage]) -> anyhow::Result<String> {
            self.retried_calls.fetch_add(1, Ordering::SeqCst);
            Ok("How do refunds work?".to_string())
        }
        async fn generate_once(&self, _messages: &[ChatMessage]) -> anyhow::Result<String> {
            anyhow::bail!("request timed out")
        }
    }

    #[tokio::test]
    async fn test_expansion_does_not_retry() {
        let generator = Arc::new(RetryOnlyGenerator {
            retried_calls: AtomicUsize::new(0),
        });
        let expander = QueryExpander::new(generator.clone());
        assert_eq!(expander.expand("refund", 3).await, vec!["refund"]);
        assert_eq!(generator.retried_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_zero_count_skips_generation() {
        let generator = Arc::new(CannedGenerator::ok("unused"));
        let expander = QueryExpander::new(generator.clone());
        assert_eq!(expander.expand("pricing", 0).await, vec!["pricing"]);
        assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_empty_reply_yields_query_only() {
        let expander = QueryExpander::new(Arc::new(CannedGenerator::ok("  \n\n ")));
        assert_eq!(expander.expand("pricing", 3).await, vec!["pricing"]);
    }

    #[test]
    fn test_extra_lines_truncated() {
        let raw = "a\nb\nc\nd\ne";
        assert_eq!(build_variants("q", raw, 3), vec!["q", "a", "b", "c"]);
    }

    #[test]
    fn test_blank_lines_and_whitespace_dropped() {
        let raw = "\n   first  \n\n\tsecond\n";
        assert_eq!(build_variants("q", raw, 3), vec!["q", "first", "second"]);
    }

    #[test]
    fn test_list_markers_stripped() {
        let raw = "1. first\n2) second\n- third\n* fourth";
        assert_eq!(
            build_variants("q", raw, 4),
            vec!["q", "first", "second", "third", "fourth"]
        );
    }

    #[test]
    fn test_echoed_original_skipped() {
        let raw = "What is the refund policy?\nrefund rules";
        assert_eq!(
            build_variants("What is the refund policy?", raw, 3),
            vec!["What is the refund policy?", "refund rules"]
        );
    }

    #[test]
    fn test_number_without_marker_kept() {
        assert_eq!(strip_list_marker("24/7 support hours?"), "24/7 support hours?");
    }

    #[test]
    fn test_leading_decimal_is_not_a_marker() {
        assert_eq!(strip_list_marker("3.5 inch screens?"), "3.5 inch screens?");
        assert_eq!(strip_list_marker("2)fast shipping"), "2)fast shipping");
        assert_eq!(strip_list_marker("-20% discount codes?"), "-20% discount codes?");
        assert_eq!(strip_list_marker("3. 5 inch screens?"), "5 inch screens?");
    }

    #[test]
    fn test_prompt_mentions_count_and_query() {
        let prompt = expansion_prompt("refunds", 3);
        assert!(prompt.contains("Generate 3 different versions"));
        assert!(prompt.ends_with("Original question: refunds"));
    }
}
