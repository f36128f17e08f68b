//! Inverted lexical index over ingest tables. Tokens are lowercased
//! `[a-z0-9_]{2,}`; posting lists are sorted by row index for
//! byte-identical serialization. Per spec.md §4.16/§4.17.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Extract tokens from `text` in scan order, deduplicated per call site is
/// left to the caller (callers usually want all occurrences recorded once
/// per row, not once per token occurrence).
pub fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    for ch in text.to_lowercase().chars() {
        if ch.is_ascii_alphanumeric() || ch == '_' {
            current.push(ch);
        } else if !current.is_empty() {
            if current.len() >= 2 {
                tokens.push(std::mem::take(&mut current));
            } else {
                current.clear();
            }
        }
    }
    if current.len() >= 2 {
        tokens.push(current);
    }
    tokens
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LexicalIndex {
    /// token -> sorted, deduplicated row indices.
    pub postings: BTreeMap<String, Vec<u64>>,
}

impl LexicalIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index one row's combined `text ⊕ label ⊕ type` content. Rows may be
    /// added in any order; posting lists stay sorted and deduplicated.
    pub fn add_row(&mut self, row_idx: u64, combined_text: &str) {
        for token in tokenize(combined_text) {
            let postings = self.postings.entry(token).or_default();
            match postings.binary_search(&row_idx) {
                Ok(_) => {}
                Err(pos) => postings.insert(pos, row_idx),
            }
        }
    }

    pub fn build<'a, I: IntoIterator<Item = (u64, &'a str)>>(rows: I) -> Self {
        let mut index = LexicalIndex::new();
        for (row_idx, text) in rows {
            index.add_row(row_idx, text);
        }
        index
    }

    /// Token-overlap score per row index, for rows matching at least one
    /// query token.
    pub fn score(&self, query_tokens: &[String]) -> BTreeMap<u64, u64> {
        let mut scores: BTreeMap<u64, u64> = BTreeMap::new();
        for token in query_tokens {
            if let Some(rows) = self.postings.get(token) {
                for row in rows {
                    *scores.entry(*row).or_insert(0) += 1;
                }
            }
        }
        scores
    }
}
