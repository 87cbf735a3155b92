//! Hash pseudo-tokenizer.
//!
//! Words are mapped to ids by hashing, not by a learned vocabulary. The scheme
//! is versioned: vectors built with one scheme are not comparable with vectors
//! built by another, so the scheme name is persisted next to the index.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::SemdexError;

pub const PAD_ID: i64 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TokenizerScheme {
    /// Lowercase, strip punctuation, FNV-1a into `1..vocab_size`.
    #[default]
    #[serde(rename = "hash-v1")]
    HashV1,
}

impl TokenizerScheme {
    pub fn name(&self) -> &'static str {
        match self {
            TokenizerScheme::HashV1 => "hash-v1",
        }
    }
}

impl fmt::Display for TokenizerScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TokenizerScheme {
    type Err = SemdexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hash-v1" | "hash_v1" | "hashv1" => Ok(TokenizerScheme::HashV1),
            other => Err(SemdexError::InvalidArgument(format!(
                "unknown tokenizer scheme '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HashTokenizer {
    scheme: TokenizerScheme,
    vocab_size: usize,
}

impl HashTokenizer {
    pub fn new(scheme: TokenizerScheme, vocab_size: usize) -> Self {
        Self {
            scheme,
            vocab_size: vocab_size.max(2),
        }
    }

    pub fn scheme(&self) -> TokenizerScheme {
        self.scheme
    }

    /// Ids for every word in `text`, unpadded and untruncated.
    pub fn tokenize(&self, text: &str) -> Vec<i64> {
        match self.scheme {
            TokenizerScheme::HashV1 => normalize_words(text)
                .split_whitespace()
                .map(|word| self.word_id(word))
                .collect(),
        }
    }

    /// Ids truncated or right-padded with [`PAD_ID`] to exactly `length`.
    pub fn encode(&self, text: &str, length: usize) -> Vec<i64> {
        fit_to_length(self.tokenize(text), length)
    }

    fn word_id(&self, word: &str) -> i64 {
        let bucket = fnv1a(word.as_bytes()) as usize % (self.vocab_size - 1);
        (bucket + 1) as i64
    }
}

fn fit_to_length(mut ids: Vec<i64>, length: usize) -> Vec<i64> {
    ids.truncate(length);
    ids.resize(length, PAD_ID);
    ids
}

fn normalize_words(text: &str) -> String {
    text.chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

fn fnv1a(data: &[u8]) -> u32 {
    let mut hash: u32 = 2166136261;
    for &byte in data {
        hash ^= byte as u32;
        hash = hash.wrapping_mul(16777619);
    }
    hash
}
