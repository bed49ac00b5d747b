//! Recursive character chunker.
//!
//! Splits document text into overlapping [`Passage`]s no longer than
//! `chunk_size` characters, preferring paragraph, then line, then word
//! boundaries, and only splitting inside a word as a last resort.
//!
//! Each passage receives a deterministic id derived from its origin file,
//! its position, and a SHA-256 hash of its text, so re-ingesting an
//! unchanged document yields the same ids and can be deduplicated on upsert.
//!
//! # Algorithm
//!
//! 1. Pick the first separator in `["\n\n", "\n", " ", ""]` that occurs in
//!    the text (`""` splits into characters).
//! 2. Split on it. Pieces shorter than `chunk_size` are queued for merging;
//!    longer pieces are split recursively with the remaining separators.
//! 3. Merge queued pieces greedily, re-joined with the separator, flushing a
//!    chunk whenever the next piece would overflow `chunk_size`.
//! 4. After a flush, drop pieces from the front of the window until at most
//!    `chunk_overlap` characters remain; those carry over into the next chunk.
//!
//! # Example
//!
//! ```rust
//! use ragchat_core::chunk::chunk_document;
//!
//! let passages = chunk_document("faq.txt", "Hello world.\n\nSecond paragraph.", 1000, 200);
//! assert_eq!(passages.len(), 1);
//! assert_eq!(passages[0].position, 0);
//! assert!(passages[0].source_id.starts_with("faq.txt:0:"));
//! ```

use sha2::{Digest, Sha256};

use crate::models::Passage;

/// Separators tried in order, coarsest first.
const SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

/// Hex characters of the content hash kept in a passage id.
const ID_HASH_LEN: usize = 12;

/// Split `text` into passages for `origin`.
///
/// Empty or whitespace-only text yields no passages. Positions are
/// contiguous from 0.
pub fn chunk_document(origin: &str, text: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<Passage> {
    split_text(text, chunk_size, chunk_overlap)
        .into_iter()
        .enumerate()
        .map(|(position, chunk)| Passage {
            source_id: passage_id(origin, position, &chunk),
            origin: origin.to_string(),
            position,
            text: chunk,
        })
        .collect()
}

/// Deterministic passage id: `"{origin}:{position}:{hash12}"`.
pub fn passage_id(origin: &str, position: usize, text: &str) -> String {
    let hash = content_hash(text);
    format!("{}:{}:{}", origin, position, &hash[..ID_HASH_LEN])
}

/// Full SHA-256 hex digest of `text`.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Split text into trimmed chunks of at most `chunk_size` characters.
pub fn split_text(text: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<String> {
    let chunk_size = chunk_size.max(1);
    let chunk_overlap = chunk_overlap.min(chunk_size - 1);
    split_recursive(text, &SEPARATORS, chunk_size, chunk_overlap)
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn split_recursive(text: &str, separators: &[&str], chunk_size: usize, overlap: usize) -> Vec<String> {
    let sep_idx = separators
        .iter()
        .position(|s| s.is_empty() || text.contains(s))
        .unwrap_or(separators.len() - 1);
    let separator = separators[sep_idx];
    let remaining = &separators[sep_idx + 1..];

    let pieces: Vec<String> = if separator.is_empty() {
        text.chars().map(|c| c.to_string()).collect()
    } else {
        text.split(separator)
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect()
    };

    let mut chunks = Vec::new();
    let mut pending: Vec<String> = Vec::new();

    for piece in pieces {
        if char_len(&piece) < chunk_size {
            pending.push(piece);
            continue;
        }
        if !pending.is_empty() {
            chunks.extend(merge_pieces(&pending, separator, chunk_size, overlap));
            pending.clear();
        }
        if remaining.is_empty() {
            let trimmed = piece.trim();
            if !trimmed.is_empty() {
                chunks.push(trimmed.to_string());
            }
        } else {
            chunks.extend(split_recursive(&piece, remaining, chunk_size, overlap));
        }
    }
    if !pending.is_empty() {
        chunks.extend(merge_pieces(&pending, separator, chunk_size, overlap));
    }
    chunks
}

fn merge_pieces(pieces: &[String], separator: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let sep_len = char_len(separator);
    let mut chunks = Vec::new();
    let mut window: Vec<&str> = Vec::new();
    let mut total = 0usize;

    for piece in pieces {
        let len = char_len(piece);
        let joiner = if window.is_empty() { 0 } else { sep_len };

        if total + len + joiner > chunk_size && !window.is_empty() {
            push_trimmed(&mut chunks, &window.join(separator));

            while !window.is_empty()
                && (total > overlap
                    || total + len + if window.is_empty() { 0 } else { sep_len } > chunk_size)
            {
                let head = char_len(window[0]);
                total -= head + if window.len() > 1 { sep_len } else { 0 };
                window.remove(0);
            }
        }

        total += len + if window.is_empty() { 0 } else { sep_len };
        window.push(piece);
    }

    if !window.is_empty() {
        push_trimmed(&mut chunks, &window.join(separator));
    }
    chunks
}

fn push_trimmed(chunks: &mut Vec<String>, chunk: &str) {
    let trimmed = chunk.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_text_single_chunk() {
        let passages = chunk_document("a.txt", "Hello, world!", 1000, 200);
        assert_eq!(passages.len(), 1);
        assert_eq!(passages[0].text, "Hello, world!");
        assert_eq!(passages[0].origin, "a.txt");
    }

    #[test]
    fn test_empty_text_no_chunks() {
        assert!(chunk_document("a.txt", "", 1000, 200).is_empty());
        assert!(chunk_document("a.txt", "  \n\n  ", 1000, 200).is_empty());
    }

    #[test]
    fn test_chunks_respect_size() {
        let para = "word ".repeat(60);
        let text = format!("{}\n\n{}\n\n{}", para, para, para);
        for chunk in split_text(&text, 100, 20) {
            assert!(char_len(&chunk) <= 100, "chunk too long: {}", char_len(&chunk));
        }
    }

    #[test]
    fn test_paragraphs_merged_until_full() {
        let text = "aaaa\n\nbbbb\n\ncccc";
        let chunks = split_text(text, 10, 0);
        assert_eq!(chunks, vec!["aaaa\n\nbbbb", "cccc"]);
    }

    #[test]
    fn test_overlap_carries_words() {
        let chunks = split_text("one two three four five six", 13, 5);
        assert!(chunks.len() > 1);
        for pair in chunks.windows(2) {
            let last_word = pair[0].split(' ').last().unwrap();
            assert!(pair[1].starts_with(last_word), "{:?}", pair);
        }
    }

    #[test]
    fn test_unbroken_text_hard_split() {
        let text = "x".repeat(25);
        let chunks = split_text(&text, 10, 0);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[2], "xxxxx");
    }

    #[test]
    fn test_multibyte_characters() {
        let text = "é".repeat(30);
        let chunks = split_text(&text, 10, 2);
        assert!(chunks.iter().all(|c| char_len(c) <= 10));
    }

    #[test]
    fn test_positions_contiguous_and_ids_stable() {
        let text = "alpha beta gamma\n\ndelta epsilon\n\nzeta eta theta";
        let first = chunk_document("doc.txt", text, 20, 0);
        let second = chunk_document("doc.txt", text, 20, 0);
        assert!(first.len() > 1);
        for (i, p) in first.iter().enumerate() {
            assert_eq!(p.position, i);
        }
        assert_eq!(first, second);
    }

    #[test]
    fn test_passage_id_changes_with_content() {
        let a = passage_id("doc.txt", 0, "old text");
        let b = passage_id("doc.txt", 0, "new text");
        assert_ne!(a, b);
        assert!(a.starts_with("doc.txt:0:"));
        assert_eq!(a.len(), "doc.txt:0:".len() + ID_HASH_LEN);
    }
}
