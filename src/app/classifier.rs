//! Profanity classifier.
//!
//! The word list is loaded once per process from an embedded file and
//! exposed as a stateless lookup. Matching is case-insensitive on
//! alphanumeric word boundaries, so punctuation around a word does not
//! hide it.

use std::collections::HashSet;
use std::sync::OnceLock;

const WORD_LIST: &str = include_str!("../../data/profanity_words.txt");

/// Verdict of a moderated write. A flagged item is persisted with
/// `is_blocked = true` before the request is rejected, so the row is
/// carried alongside the verdict either way.
#[derive(Debug)]
pub enum Screened<T> {
    Clean(T),
    Flagged(T),
}

fn disallowed_words() -> &'static HashSet<&'static str> {
    static WORDS: OnceLock<HashSet<&'static str>> = OnceLock::new();
    WORDS.get_or_init(|| {
        WORD_LIST
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect()
    })
}

/// Whether the text contains a disallowed term.
pub fn contains_disallowed(text: &str) -> bool {
    let words = disallowed_words();
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .any(|token| words.contains(token.to_lowercase().as_str()))
}
