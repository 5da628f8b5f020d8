use serde::{Deserialize, Serialize};

use super::node::Node;

/// Search method selected by a recall.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchStrategy {
    Vector,
    Fulltext,
    Hybrid,
    Relevance,
}

impl SearchStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchStrategy::Vector => "vector",
            SearchStrategy::Fulltext => "fulltext",
            SearchStrategy::Hybrid => "hybrid",
            SearchStrategy::Relevance => "relevance",
        }
    }
}

/// One search result. The score fields are populated per strategy:
/// `similarity` by vector and hybrid search, `rank` by full-text search,
/// `relevance` by the composite scorer (scaled to [0,10]).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub node: Node,
    pub similarity: Option<f64>,
    pub rank: Option<f64>,
    pub relevance: Option<f64>,
    /// Tags batch-loaded for relevance scoring; empty otherwise.
    pub tags: Vec<String>,
}

impl SearchHit {
    pub fn from_node(node: Node) -> Self {
        Self {
            node,
            similarity: None,
            rank: None,
            relevance: None,
            tags: Vec::new(),
        }
    }
}
