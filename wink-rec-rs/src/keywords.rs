//! Keyword sets and the ordered per-session history built from them.

use serde::{Deserialize, Serialize};

pub const MIN_TOKEN_LEN: usize = 2;
pub const MAX_TOKEN_LEN: usize = 20;

const STOP_WORDS: &[&str] = &[
    "the", "and", "with", "for", "that", "this", "from", "into", "are", "was", "were", "has",
    "have", "his", "her", "its", "their", "there", "then", "than", "very", "some", "while",
];

/// One turn's mood/subject/style terms: lowercase alphabetic tokens of 2–20
/// characters, in extraction order, without duplicates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct KeywordSet(Vec<String>);

impl KeywordSet {
    /// Lowercase and trim `tokens`, dropping anything that is not a valid keyword.
    pub fn new<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut out: Vec<String> = Vec::new();
        for t in tokens {
            let t = t.as_ref().trim().to_lowercase();
            if is_valid_token(&t) && !out.contains(&t) {
                out.push(t);
            }
        }
        Self(out)
    }

    /// Split a comma- or whitespace-separated list, e.g. from a CLI flag.
    pub fn parse(list: &str) -> Self {
        Self::new(list.split(|c: char| c == ',' || c.is_whitespace()))
    }

    pub fn tokens(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Space-joined text handed to the embedding provider.
    pub fn joined(&self) -> String {
        self.0.join(" ")
    }
}

impl From<Vec<String>> for KeywordSet {
    fn from(v: Vec<String>) -> Self {
        Self::new(v)
    }
}

impl From<KeywordSet> for Vec<String> {
    fn from(k: KeywordSet) -> Self {
        k.0
    }
}

fn is_valid_token(t: &str) -> bool {
    let n = t.chars().count();
    (MIN_TOKEN_LEN..=MAX_TOKEN_LEN).contains(&n) && t.chars().all(|c| c.is_ascii_lowercase())
}

/// Heuristic keyword extraction for when no language model is available:
/// letters only, words longer than two characters, stop words removed,
/// first `k` distinct words.
pub fn extract_fallback(text: &str, k: usize) -> KeywordSet {
    let cleaned: String = text
        .chars()
        .map(|c| if c.is_ascii_alphabetic() { c } else { ' ' })
        .collect();
    let words = cleaned
        .split_whitespace()
        .map(|w| w.to_lowercase())
        .filter(|w| w.len() > 2 && !STOP_WORDS.contains(&w.as_str()));
    let mut set = KeywordSet::new(words);
    set.0.truncate(k);
    set
}

/// Chronological keyword sets of one session; index `i` is older than `i + 1`.
/// Append-only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionHistory(Vec<KeywordSet>);

impl SessionHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, set: KeywordSet) {
        self.0.push(set);
    }

    pub fn latest(&self) -> Option<&KeywordSet> {
        self.0.last()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, KeywordSet> {
        self.0.iter()
    }
}

impl FromIterator<KeywordSet> for SessionHistory {
    fn from_iter<T: IntoIterator<Item = KeywordSet>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a SessionHistory {
    type Item = &'a KeywordSet;
    type IntoIter = std::slice::Iter<'a, KeywordSet>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
