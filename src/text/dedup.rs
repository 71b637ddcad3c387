//! Paragraph-level dedup for long-text mode.
//!
//! Drops near-duplicate paragraphs from a freshly sanitized chunk before it
//! is merged into a very large accumulated document. Comparison happens on
//! alphanumeric-only content; a paragraph is a duplicate if it is contained
//! in (or contains) one of the last few accepted paragraphs, if its
//! similarity to one of them reaches the threshold, or if its fingerprint
//! was already accepted. Fingerprint collisions count as duplicates, an
//! accepted low-probability false positive.

use std::collections::HashSet;

use crate::text::similarity;
use crate::util::simplify_alphanumeric;

/// Tuning knobs for paragraph dedup.
#[derive(Debug, Clone)]
pub struct DedupOptions {
    /// How many trailing accepted paragraphs each candidate is compared to.
    pub window: usize,
    /// Similarity at or above which a paragraph is dropped.
    pub similarity_threshold: f64,
    /// Paragraphs with fewer alphanumeric chars than this are dropped outright.
    pub min_alnum: usize,
}

impl Default for DedupOptions {
    fn default() -> Self {
        Self {
            window: 5,
            similarity_threshold: 0.8,
            min_alnum: 5,
        }
    }
}

fn fingerprint(simplified: &str) -> blake3::Hash {
    blake3::hash(simplified.as_bytes())
}

/// Remove near-duplicate paragraphs from `chunk`.
///
/// Splits on blank lines, falling back to single newlines when that yields
/// a single paragraph. Surviving paragraphs are rejoined with blank-line
/// separators; output length never exceeds input length.
pub fn dedup_paragraphs(chunk: &str, opts: &DedupOptions) -> String {
    let mut paragraphs: Vec<&str> = chunk.split("\n\n").collect();
    if paragraphs.len() <= 1 {
        paragraphs = chunk.split('\n').collect();
    }

    let mut accepted: Vec<&str> = Vec::new();
    let mut accepted_simplified: Vec<String> = Vec::new();
    let mut seen: HashSet<blake3::Hash> = HashSet::new();

    for paragraph in paragraphs {
        let simplified = simplify_alphanumeric(paragraph);
        if simplified.chars().count() < opts.min_alnum {
            continue;
        }

        let hash = fingerprint(&simplified);
        let mut duplicate = seen.contains(&hash);

        if !duplicate {
            let window_start = accepted_simplified.len().saturating_sub(opts.window);
            for prior in &accepted_simplified[window_start..] {
                if prior.contains(simplified.as_str()) || simplified.contains(prior.as_str()) {
                    duplicate = true;
                    break;
                }
                if similarity::score(&simplified, prior) >= opts.similarity_threshold {
                    duplicate = true;
                    break;
                }
            }
        }

        if !duplicate {
            accepted.push(paragraph);
            accepted_simplified.push(simplified);
            seen.insert(hash);
        }
    }

    accepted.join("\n\n")
}
