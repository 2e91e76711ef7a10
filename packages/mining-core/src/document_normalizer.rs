//! DocumentTextNormalizer: bounded-memory chunking for large raw document
//! text (PDF/flipbook sources routed through `documentMiner`), so the
//! normalizer never holds an entire multi-hundred-page document string in
//! memory at once. Each chunk is normalized independently and candidates
//! are merged by email, matching the aggregator's own email-keyed merge
//! rule rather than inventing a second dedup strategy.

use std::collections::HashMap;

use crate::domain::UnifiedContactCandidate;
use crate::normalizer::{self, MinerOutput, NormalizeResult, NormalizeStats};

/// Chunk boundary, chosen to keep a single chunk comfortably under the
/// working set of a single `normalize()` call while still giving the
/// email-context regex (radius 50) room on both sides of a chunk split.
pub const CHUNK_SIZE_CHARS: usize = 50_000;
const CHUNK_OVERLAP_CHARS: usize = 200;

fn chunk_text(text: &str) -> Vec<&str> {
    if text.len() <= CHUNK_SIZE_CHARS {
        return vec![text];
    }
    let bytes = text.as_bytes();
    let mut chunks = Vec::new();
    let mut start = 0usize;
    while start < bytes.len() {
        let mut end = (start + CHUNK_SIZE_CHARS).min(bytes.len());
        while end < bytes.len() && !text.is_char_boundary(end) {
            end += 1;
        }
        chunks.push(&text[start..end]);
        if end == bytes.len() {
            break;
        }
        start = end.saturating_sub(CHUNK_OVERLAP_CHARS);
        while start > 0 && !text.is_char_boundary(start) {
            start -= 1;
        }
    }
    chunks
}

/// Normalize a large document's text in bounded chunks, merging candidates
/// across chunk boundaries by email so overlap-induced duplicates collapse
/// into one candidate instead of two.
pub fn normalize_document(text: &str, page_title: Option<&str>) -> NormalizeResult {
    let mut by_email: HashMap<String, UnifiedContactCandidate> = HashMap::new();
    let mut stats = NormalizeStats::default();
    let mut errors = Vec::new();

    for chunk in chunk_text(text) {
        let result = normalizer::normalize(&MinerOutput {
            text: chunk.to_string(),
            html: None,
            page_title: page_title.map(|t| t.to_string()),
        });
        stats.emails_seen += result.stats.emails_seen;
        stats.emails_rejected += result.stats.emails_rejected;
        errors.extend(result.errors);

        for candidate in result.candidates {
            by_email
                .entry(candidate.email.to_lowercase())
                .and_modify(|existing| {
                    existing.affiliations.extend(candidate.affiliations.clone());
                    if existing.first_name.is_none() {
                        existing.first_name = candidate.first_name.clone();
                    }
                    if existing.last_name.is_none() {
                        existing.last_name = candidate.last_name.clone();
                    }
                })
                .or_insert(candidate);
        }
    }

    stats.candidates_produced = by_email.len();
    NormalizeResult {
        success: true,
        candidates: by_email.into_values().collect(),
        stats,
        errors,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_a_single_chunk() {
        assert_eq!(chunk_text("hello world").len(), 1);
    }

    #[test]
    fn long_text_is_split_into_overlapping_chunks() {
        let text = "x".repeat(CHUNK_SIZE_CHARS * 2 + 10);
        let chunks = chunk_text(&text);
        assert!(chunks.len() >= 2);
    }

    #[test]
    fn merges_duplicate_email_across_chunks() {
        let email_block = "Contact us at ada@acme.com for more info. ";
        let text = format!("{}{}", email_block.repeat(1), " ".repeat(CHUNK_SIZE_CHARS) + email_block);
        let result = normalize_document(&text, None);
        let matches = result
            .candidates
            .iter()
            .filter(|c| c.email == "ada@acme.com")
            .count();
        assert_eq!(matches, 1);
    }
}
