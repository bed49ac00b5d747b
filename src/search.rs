//! Retrieval test commands.
//!
//! `ragchat search` runs one query against the index and prints what came
//! back, with scores, so thresholds can be tuned. `ragchat retrieve` runs the
//! full multi-query pipeline and shows the variants searched, which passages
//! survived, and the context the model would be given.

use anyhow::{bail, Result};
use ragchat_core::context::assemble;
use ragchat_core::store::VectorIndex;
use ragchat_core::ScoredPassage;

use crate::config::Config;
use crate::engine;

/// Default threshold for `ragchat search`; stricter than chat retrieval.
pub const DEFAULT_SEARCH_THRESHOLD: f32 = 0.7;
pub const DEFAULT_SEARCH_LIMIT: usize = 5;

const PREVIEW_CHARS: usize = 200;

pub async fn run_search(
    config: &Config,
    query: &str,
    threshold: Option<f32>,
    limit: Option<usize>,
) -> Result<()> {
    if query.trim().is_empty() {
        println!("No results.");
        return Ok(());
    }

    let threshold = threshold.unwrap_or(DEFAULT_SEARCH_THRESHOLD);
    if !(0.0..=1.0).contains(&threshold) {
        bail!("--threshold must be between 0 and 1, got {}", threshold);
    }
    let limit = limit.unwrap_or(DEFAULT_SEARCH_LIMIT);
    if limit == 0 {
        bail!("--limit must be >= 1");
    }

    let index = engine::open_index(config).await?;
    let hits = index.search(query, limit, threshold).await;
    index.close().await;
    let hits = hits?;

    println!("Query: {}", query);
    println!("Threshold: {}  Limit: {}", threshold, limit);
    println!();

    if hits.is_empty() {
        println!("No results above threshold.");
        return Ok(());
    }

    for (i, hit) in hits.iter().enumerate() {
        print_hit(i + 1, hit);
    }
    Ok(())
}

/// `ragchat retrieve`: run the multi-query pipeline and show its work.
pub async fn run_retrieve(config: &Config, query: &str) -> Result<()> {
    let index = engine::open_index(config).await?;
    let retriever = engine::build_retriever(config, index.clone())?;
    let result = retriever.retrieve(query).await;
    index.close().await;
    let result = result?;

    println!("Variants:");
    for (i, variant) in result.variants.iter().enumerate() {
        let tag = if i == 0 { " (original)" } else { "" };
        println!("  {}. {}{}", i + 1, variant, tag);
    }
    if result.used_fallback {
        println!(
            "  (no hits at {}; widened to {})",
            config.retrieval.relevance_threshold, config.retrieval.fallback_threshold
        );
    }
    println!();

    if result.is_empty() {
        println!("No relevant passages.");
        return Ok(());
    }

    println!("Passages:");
    for (i, hit) in result.iter().enumerate() {
        print_hit(i + 1, hit);
    }

    println!("Context:");
    println!("{}", assemble(&result));
    Ok(())
}

fn print_hit(rank: usize, hit: &ScoredPassage) {
    println!("{}. [{}] {}", rank, hit.formatted_score(), hit.origin());
    println!("    id: {}", hit.source_id());
    println!("    preview: \"{}\"", preview(&hit.passage.text, PREVIEW_CHARS));
    println!();
}

/// Single-line excerpt of at most `max` characters, with `...` when cut.
fn preview(text: &str, max: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max {
        return flat;
    }
    let cut: String = flat.chars().take(max).collect();
    format!("{}...", cut.trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_flattens_whitespace() {
        assert_eq!(preview("Refunds\n\n  take  five days.", 200), "Refunds take five days.");
    }

    #[test]
    fn test_preview_truncates_on_char_boundary() {
        let text = "é".repeat(10);
        assert_eq!(preview(&text, 4), "éééé...");
    }
}
