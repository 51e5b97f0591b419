//! Tokenization shared by the hashing embedder and the lexical cross-encoder.

use std::collections::HashSet;
use std::sync::LazyLock;

use crate::hashing::normalize_text;

/// Default character budget for text handed to an embedding backend.
pub const DEFAULT_MAX_TEXT_CHARS: usize = 512;

static STOP_WORDS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "a", "an", "the", "is", "are", "was", "were", "be", "been", "being", "have", "has",
        "had", "do", "does", "did", "will", "would", "could", "should", "may", "might", "must",
        "shall", "can", "need", "dare", "ought", "used", "to", "of", "in", "for", "on", "with",
        "at", "by", "from", "as", "into", "through", "during", "before", "after", "above",
        "below", "between", "under", "again", "further", "then", "once", "here", "there",
        "when", "where", "why", "how", "all", "each", "few", "more", "most", "other", "some",
        "such", "no", "nor", "not", "only", "own", "same", "so", "than", "too", "very", "just",
        "and", "but", "if", "or", "because", "until", "while", "what", "which", "who", "whom",
        "this", "that", "these", "those", "am", "it", "its",
    ]
    .into_iter()
    .collect()
});

pub fn is_stop_word(word: &str) -> bool {
    STOP_WORDS.contains(word)
}

/// Lower-cased alphanumeric tokens with stop words removed, in input order.
pub fn content_tokens(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty() && !is_stop_word(w))
        .map(str::to_string)
        .collect()
}

/// Cuts `text` to at most `max_chars` characters, appending `"..."` when cut.
///
/// Never splits a UTF-8 code point.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}...", &text[..byte_idx]),
        None => text.to_string(),
    }
}

/// Whitespace-normalizes and length-limits text before embedding.
pub fn preprocess(text: &str, max_chars: usize) -> String {
    truncate_chars(&normalize_text(text), max_chars)
}
