//! Renders a ranked [`RetrievalResult`] into one prompt block.

use crate::retrieve::RetrievalResult;

/// Render each entry as a provenance header followed by its text.
///
/// Headers look like `[Document 1 — pricing.txt (relevance: 0.912)]`.
/// Entries keep the result's order and are separated by a blank line.
/// An empty result renders as an empty string.
pub fn assemble(result: &RetrievalResult) -> String {
    result
        .iter()
        .enumerate()
        .map(|(i, entry)| {
            format!(
                "[Document {} — {} (relevance: {})]\n{}",
                i + 1,
                entry.origin(),
                entry.formatted_score(),
                entry.passage.text
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}
