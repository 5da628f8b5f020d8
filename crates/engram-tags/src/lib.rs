//! # engram-tags
//!
//! The tag ontology. Tags are colon-delimited hierarchical labels, e.g.
//! `database:postgresql:performance`: lowercase alphanumerics (hyphens
//! allowed below the root), at most four levels. This crate normalises
//! and validates extractor output and parses hierarchies; the extractor
//! itself is called through the `tags` circuit breaker.

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;

use engram_core::constants::MAX_TAG_DEPTH;
use engram_core::errors::EngramResult;
use engram_core::traits::{TagExtractor, TagPayload};
use engram_providers::{service, BreakerRegistry, CircuitBreaker};

/// The shape every stored tag must match.
static TAG_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9]+(:[a-z0-9-]+){0,3}$").expect("tag pattern compiles"));

/// A tag split into its hierarchy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagHierarchy {
    pub root: String,
    /// Everything above the leaf, `None` for a root-level tag.
    pub parent: Option<String>,
    pub levels: Vec<String>,
    pub depth: usize,
}

/// Lowercase and trim a raw tag.
pub fn normalise(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Whether a (already normalised) tag is storable.
pub fn is_valid(tag: &str, max_depth: usize) -> bool {
    TAG_PATTERN.is_match(tag) && tag.split(':').count() <= max_depth.min(MAX_TAG_DEPTH)
}

/// Normalise an extractor payload into the surviving tags, in order,
/// deduplicated. Invalid tags are dropped, not errors: extractor output
/// is untrusted.
pub fn normalise_payload(payload: &TagPayload, max_depth: usize) -> Vec<String> {
    let raw: Vec<String> = match payload {
        TagPayload::List(tags) => tags.clone(),
        TagPayload::Delimited(s) => s
            .split([',', ';', '\n'])
            .map(|t| t.to_string())
            .collect(),
    };

    let mut seen = std::collections::HashSet::new();
    let mut tags = Vec::new();
    for candidate in raw {
        let tag = normalise(&candidate);
        if tag.is_empty() {
            continue;
        }
        if !is_valid(&tag, max_depth) {
            tracing::debug!(tag = %tag, "dropping invalid tag from extractor");
            continue;
        }
        if seen.insert(tag.clone()) {
            tags.push(tag);
        }
    }
    tags
}

/// Split a valid tag into root, parent path, levels, and depth.
/// Returns `None` for malformed input.
pub fn parse_hierarchy(tag: &str) -> Option<TagHierarchy> {
    if !TAG_PATTERN.is_match(tag) {
        return None;
    }
    let levels: Vec<String> = tag.split(':').map(|s| s.to_string()).collect();
    let depth = levels.len();
    let parent = if depth > 1 {
        Some(levels[..depth - 1].join(":"))
    } else {
        None
    };
    Some(TagHierarchy {
        root: levels[0].clone(),
        parent,
        levels,
        depth,
    })
}

/// Breaker-gated tag extraction plus post-processing.
pub struct TagService {
    extractor: Arc<dyn TagExtractor>,
    breaker: Arc<CircuitBreaker>,
    max_depth: usize,
}

impl TagService {
    pub fn new(
        extractor: Arc<dyn TagExtractor>,
        breakers: &BreakerRegistry,
        max_depth: usize,
    ) -> Self {
        Self {
            extractor,
            breaker: breakers.get(service::TAGS),
            max_depth: max_depth.min(MAX_TAG_DEPTH),
        }
    }

    /// Call the extractor under the `tags` breaker and return only the
    /// tags that survive validation.
    pub fn extract(&self, text: &str, existing_sample: &[String]) -> EngramResult<Vec<String>> {
        let payload = self
            .breaker
            .call(|| self.extractor.extract(text, existing_sample))?;
        Ok(normalise_payload(&payload, self.max_depth))
    }

    pub fn extractor_name(&self) -> &str {
        self.extractor.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_tags_pass() {
        for tag in [
            "database",
            "database:postgresql",
            "database:postgresql:performance",
            "a:b-c:d2:e-f",
            "x9",
        ] {
            assert!(is_valid(tag, 4), "{tag} should be valid");
        }
    }

    #[test]
    fn invalid_tags_fail() {
        for tag in [
            "",
            "Database",
            "data base",
            "-leading:hyphen-in-root",
            "db:",
            ":db",
            "a:b:c:d:e",
            "tag_with_underscore",
        ] {
            assert!(!is_valid(tag, 4), "{tag} should be invalid");
        }
    }

    #[test]
    fn max_depth_caps_below_pattern_limit() {
        assert!(is_valid("a:b", 2));
        assert!(!is_valid("a:b:c", 2));
    }

    #[test]
    fn delimited_payload_is_split_and_filtered() {
        let payload =
            TagPayload::Delimited("Database:PostgreSQL, BAD TAG!, ops:deploy\nops:deploy".into());
        assert_eq!(
            normalise_payload(&payload, 4),
            vec!["database:postgresql".to_string(), "ops:deploy".to_string()]
        );
    }

    #[test]
    fn list_payload_preserves_order_and_dedups() {
        let payload = TagPayload::List(vec![
            "beta".into(),
            "alpha".into(),
            "beta".into(),
            "Not Valid".into(),
        ]);
        assert_eq!(
            normalise_payload(&payload, 4),
            vec!["beta".to_string(), "alpha".to_string()]
        );
    }

    #[test]
    fn hierarchy_of_leaf_tag() {
        let h = parse_hierarchy("database:postgresql:performance").unwrap();
        assert_eq!(h.root, "database");
        assert_eq!(h.parent.as_deref(), Some("database:postgresql"));
        assert_eq!(h.depth, 3);
        assert_eq!(h.levels.len(), 3);
    }

    #[test]
    fn hierarchy_of_root_tag() {
        let h = parse_hierarchy("database").unwrap();
        assert_eq!(h.root, "database");
        assert_eq!(h.parent, None);
        assert_eq!(h.depth, 1);
    }

    #[test]
    fn hierarchy_rejects_malformed() {
        assert!(parse_hierarchy("Not A Tag").is_none());
    }
}
