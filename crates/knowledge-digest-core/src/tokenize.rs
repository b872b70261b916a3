//! Tokenizer and Jaccard similarity.
//!
//! Text is lower-cased, URLs and HTML tags are dropped, and every
//! character that is not a letter, digit, or whitespace becomes a
//! separator. Runs of CJK characters stay together as a single token;
//! they are not split further. Tokens shorter than two characters are
//! discarded.

use regex::Regex;
use std::collections::BTreeSet;
use std::sync::OnceLock;

/// Minimum token length in characters.
const MIN_TOKEN_CHARS: usize = 2;

fn markup_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"https?://\S+|<[^>\n]*>").expect("valid markup regex"))
}

/// Turn text into a set of comparable tokens.
pub fn tokenize(text: &str) -> BTreeSet<String> {
    let lowered = text.to_lowercase();
    let without_markup = markup_regex().replace_all(&lowered, " ");

    let cleaned: String = without_markup
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c.is_whitespace() {
                c
            } else {
                ' '
            }
        })
        .collect();

    cleaned
        .split_whitespace()
        .filter(|t| t.chars().count() >= MIN_TOKEN_CHARS)
        .map(str::to_string)
        .collect()
}

/// Jaccard similarity `|a ∩ b| / |a ∪ b|`; 0 when either set is empty.
pub fn similarity(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.len() + b.len() - intersection;
    intersection as f64 / union as f64
}

/// Convenience wrapper: tokenize both texts and compare.
pub fn text_similarity(a: &str, b: &str) -> f64 {
    similarity(&tokenize(a), &tokenize(b))
}
