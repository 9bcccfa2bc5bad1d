//! Term extraction
//!
//! Turns a free-text request into the keywords used for source resolution.

use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashSet;

/// Tokens shorter than this are dropped.
pub const MIN_TERM_LENGTH: usize = 4;

lazy_static! {
    static ref TOKEN: Regex = Regex::new(r"[\p{L}\p{N}_]+").unwrap();
    static ref STOP_WORDS: HashSet<&'static str> = [
        // common English
        "about", "above", "after", "again", "against", "also", "been", "before", "being",
        "below", "between", "both", "does", "doing", "down", "during", "each", "from",
        "further", "have", "having", "here", "into", "just", "more", "most", "only", "other",
        "over", "same", "some", "such", "than", "that", "their", "them", "then", "there",
        "these", "they", "this", "those", "through", "under", "until", "very", "were", "what",
        "when", "where", "which", "while", "whom", "with", "would", "your", "yours", "could",
        "should", "will", "shall", "might", "must", "many", "much", "every", "across", "within",
        // request phrasing
        "show", "display", "give", "tell", "please", "want", "need", "like", "list", "find",
        "using", "based", "data", "dataset",
        // presentation words carry no data signal
        "chart", "plot", "graph", "visualize", "visualise", "table", "report",
    ]
    .into_iter()
    .collect();
}

/// Extract lowercase significant terms from `query`.
///
/// Order of first occurrence is preserved and duplicates are kept.
pub fn extract_terms(query: &str) -> Vec<String> {
    let lowered = query.to_lowercase();
    TOKEN
        .find_iter(&lowered)
        .map(|m| m.as_str())
        .filter(|token| token.chars().count() >= MIN_TERM_LENGTH)
        .filter(|token| !STOP_WORDS.contains(token))
        .map(|token| token.to_string())
        .collect()
}

/// Lowercase word tokens without any filtering.
pub fn tokenize(query: &str) -> Vec<String> {
    let lowered = query.to_lowercase();
    TOKEN
        .find_iter(&lowered)
        .map(|m| m.as_str().to_string())
        .collect()
}
