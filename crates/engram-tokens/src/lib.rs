//! # engram-tokens
//!
//! Token counting for the memory store. Uses the cl100k BPE via
//! tiktoken-rs with a blake3-keyed cache; degrades to a whitespace word
//! count when the tokenizer cannot be constructed. Counting never fails.

use moka::sync::Cache;
use tiktoken_rs::CoreBPE;

/// Default number of cached counts.
const DEFAULT_CACHE_SIZE: u64 = 10_000;

/// Counts tokens for node content and context assembly.
pub struct TokenCounter {
    bpe: Option<CoreBPE>,
    cache: Cache<String, usize>,
}

impl TokenCounter {
    /// Build a counter with the given cache capacity.
    pub fn new(cache_size: u64) -> Self {
        let bpe = match tiktoken_rs::cl100k_base() {
            Ok(bpe) => Some(bpe),
            Err(e) => {
                tracing::warn!(error = %e, "cl100k tokenizer unavailable, using word-count fallback");
                None
            }
        };
        Self {
            bpe,
            cache: Cache::new(cache_size),
        }
    }

    /// Count tokens without touching the cache.
    pub fn count(&self, text: &str) -> usize {
        match &self.bpe {
            Some(bpe) => bpe.encode_with_special_tokens(text).len(),
            None => text.split_whitespace().count(),
        }
    }

    /// Count tokens through the blake3-keyed cache.
    pub fn count_cached(&self, text: &str) -> usize {
        let key = blake3::hash(text.as_bytes()).to_hex().to_string();
        if let Some(count) = self.cache.get(&key) {
            return count;
        }
        let count = self.count(text);
        self.cache.insert(key, count);
        count
    }
}

impl Default for TokenCounter {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_SIZE)
    }
}

impl engram_core::traits::TokenCounter for TokenCounter {
    fn count(&self, text: &str) -> usize {
        self.count_cached(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_counts_zero() {
        let counter = TokenCounter::default();
        assert_eq!(counter.count(""), 0);
    }

    #[test]
    fn counts_are_positive_for_text() {
        let counter = TokenCounter::default();
        assert!(counter.count("PostgreSQL is great") > 0);
    }

    #[test]
    fn cached_path_matches_uncached() {
        let counter = TokenCounter::default();
        let text = "the quick brown fox jumps over the lazy dog";
        assert_eq!(counter.count(text), counter.count_cached(text));
        // Second hit comes from the cache.
        assert_eq!(counter.count(text), counter.count_cached(text));
    }
}
