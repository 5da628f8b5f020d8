//! Offline tag extraction: frequent non-stopword tokens become flat tags.

use std::collections::HashMap;

use engram_core::errors::EngramResult;
use engram_core::traits::{TagExtractor, TagPayload};

/// How many tags the fallback emits at most.
const MAX_TAGS: usize = 5;

/// Tokens shorter than this never become tags.
const MIN_TOKEN_LEN: usize = 3;

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "are", "but", "not", "you", "all", "can", "had", "her", "was", "one",
    "our", "out", "has", "have", "this", "that", "with", "from", "they", "will", "what", "when",
    "where", "which", "their", "there", "about", "would", "could", "should", "been", "were",
    "into", "than", "then", "them", "these", "those", "some", "such", "very", "just", "over",
];

pub struct KeywordTagExtractor;

impl TagExtractor for KeywordTagExtractor {
    fn extract(&self, text: &str, existing_sample: &[String]) -> EngramResult<TagPayload> {
        let mut counts: HashMap<String, usize> = HashMap::new();
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .map(|t| t.to_lowercase())
            .filter(|t| t.len() >= MIN_TOKEN_LEN && !STOPWORDS.contains(&t.as_str()))
        {
            *counts.entry(token).or_default() += 1;
        }

        let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
        // Prefer tokens that already exist as tag roots, then frequency,
        // then alphabetical for determinism.
        ranked.sort_by(|a, b| {
            let a_known = existing_sample.iter().any(|t| t.starts_with(&a.0));
            let b_known = existing_sample.iter().any(|t| t.starts_with(&b.0));
            b_known
                .cmp(&a_known)
                .then(b.1.cmp(&a.1))
                .then(a.0.cmp(&b.0))
        });

        Ok(TagPayload::List(
            ranked.into_iter().take(MAX_TAGS).map(|(t, _)| t).collect(),
        ))
    }

    fn name(&self) -> &str {
        "keyword-fallback"
    }
}
