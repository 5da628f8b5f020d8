//! Composite relevance scoring.
//!
//! Four normalised signals, weighted (weights sum to 1.0, enforced at
//! configuration load), rescaled to [0, 10] for the returned value.

use chrono::{DateTime, Utc};

use engram_core::config::RelevanceConfig;
use engram_core::constants::{ACCESS_SATURATION, RELEVANCE_SCALE};
use engram_core::models::Node;

/// The individual signals feeding a composite score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RelevanceSignals {
    /// Precomputed cosine similarity, 0 when absent.
    pub semantic: f64,
    /// Jaccard overlap of query tags and node tags, 0 when the query
    /// carries no tags.
    pub tag: f64,
    /// `2^(-age_hours / half_life_hours)`.
    pub recency: f64,
    /// `min(1, ln(1 + access_count) / ln(1 + saturation))`.
    pub access: f64,
}

/// Score one node. Returns the composite in [0, 10] and its signals.
pub fn score(
    node: &Node,
    node_tags: &[String],
    query_tags: &[String],
    similarity: Option<f64>,
    now: DateTime<Utc>,
    config: &RelevanceConfig,
) -> (f64, RelevanceSignals) {
    let semantic = similarity.unwrap_or(0.0).clamp(0.0, 1.0);
    let tag = jaccard(query_tags, node_tags);

    let age_hours = (now - node.last_accessed).num_minutes().max(0) as f64 / 60.0;
    let recency = (-age_hours / config.recency_half_life_hours).exp2();

    let access = ((1.0 + node.access_count.max(0) as f64).ln()
        / (1.0 + ACCESS_SATURATION as f64).ln())
    .min(1.0);

    let signals = RelevanceSignals {
        semantic,
        tag,
        recency,
        access,
    };
    let composite = config.semantic_weight * semantic
        + config.tag_weight * tag
        + config.recency_weight * recency
        + config.access_weight * access;

    (composite * RELEVANCE_SCALE, signals)
}

/// `|intersection| / |union|`, 0 when the query tag set is empty.
fn jaccard(query_tags: &[String], node_tags: &[String]) -> f64 {
    if query_tags.is_empty() {
        return 0.0;
    }
    let query: std::collections::HashSet<&str> = query_tags.iter().map(|s| s.as_str()).collect();
    let node: std::collections::HashSet<&str> = node_tags.iter().map(|s| s.as_str()).collect();
    let intersection = query.intersection(&node).count();
    let union = query.union(&node).count();
    if union == 0 {
        return 0.0;
    }
    intersection as f64 / union as f64
}
