//! Repeated-phrase suppression for model text.
//!
//! The live models sometimes restate a sentence within one turn. Text is
//! split into sentences, each sentence is normalised, and a sentence is
//! dropped when it is contained in, contains, or closely overlaps a sentence
//! already kept.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

use super::messages::Part;

static SENTENCE_SPLIT: Lazy<Regex> = Lazy::new(|| {
    // Sentence terminators followed by whitespace, or hard line breaks.
    Regex::new(r"[.!?]+\s+|\n+").expect("valid regex")
});

static NON_ALPHANUMERIC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^\p{L}\p{N}\s]").expect("valid regex"));

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Lowercase, strip everything but letters, digits and whitespace (in any
/// script), collapse whitespace runs.
pub fn normalize(text: &str) -> String {
    let lower = text.to_lowercase();
    let stripped = NON_ALPHANUMERIC.replace_all(&lower, " ");
    WHITESPACE.replace_all(stripped.trim(), " ").into_owned()
}

/// Split text into sentences, keeping each sentence's terminator.
pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    for m in SENTENCE_SPLIT.find_iter(text) {
        let sentence = text[start..m.end()].trim();
        if !sentence.is_empty() {
            sentences.push(sentence);
        }
        start = m.end();
    }
    let tail = text[start..].trim();
    if !tail.is_empty() {
        sentences.push(tail);
    }
    sentences
}

/// Token-set Jaccard similarity of two normalised strings.
pub fn jaccard(a: &str, b: &str) -> f32 {
    let left: HashSet<&str> = a.split(' ').filter(|t| !t.is_empty()).collect();
    let right: HashSet<&str> = b.split(' ').filter(|t| !t.is_empty()).collect();
    if left.is_empty() && right.is_empty() {
        return 1.0;
    }
    let intersection = left.intersection(&right).count() as f32;
    let union = left.union(&right).count() as f32;
    intersection / union
}

/// Tracks the sentences kept so far in one frame.
#[derive(Debug)]
pub struct PhraseFilter {
    threshold: f32,
    kept: Vec<String>,
}

impl PhraseFilter {
    pub fn new(threshold: f32) -> Self {
        Self {
            threshold,
            kept: Vec::new(),
        }
    }

    fn is_repeat(&self, normalized: &str) -> bool {
        self.kept.iter().any(|kept| {
            let padded_kept = format!(" {kept} ");
            let padded_new = format!(" {normalized} ");
            padded_kept.contains(&padded_new)
                || padded_new.contains(&padded_kept)
                || jaccard(kept, normalized) > self.threshold
        })
    }

    /// Return `text` without sentences that repeat earlier ones.
    pub fn filter_text(&mut self, text: &str) -> String {
        let mut out: Vec<&str> = Vec::new();
        for sentence in split_sentences(text) {
            let normalized = normalize(sentence);
            // nothing to compare, e.g. an emoji or bare punctuation
            if normalized.is_empty() {
                out.push(sentence);
                continue;
            }
            if self.is_repeat(&normalized) {
                tracing::debug!(sentence, "Suppressing repeated phrase");
                continue;
            }
            self.kept.push(normalized);
            out.push(sentence);
        }
        out.join(" ")
    }
}

/// Apply suppression across the text parts of one frame.
///
/// Parts whose text is emptied by suppression are removed; parts without
/// text pass through untouched.
pub fn suppress_repeats(parts: Vec<Part>, threshold: f32) -> Vec<Part> {
    let mut filter = PhraseFilter::new(threshold);
    parts
        .into_iter()
        .filter_map(|mut part| match part.text.take() {
            Some(text) => {
                let filtered = filter.filter_text(&text);
                if filtered.is_empty() {
                    None
                } else {
                    part.text = Some(filtered);
                    Some(part)
                }
            }
            None => Some(part),
        })
        .collect()
}
