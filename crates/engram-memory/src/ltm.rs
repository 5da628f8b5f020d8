//! Long-term memory: the durable side of the two-tier engine.
//!
//! Owns the storage engine and the query cache; implements node CRUD with
//! content-hash deduplication, the four search strategies, the composite
//! relevance scorer, the robot registry, and access tracking. Thread-safe
//! through the storage driver's pool.

use std::sync::Arc;

use chrono::Utc;

use engram_core::config::{Config, EmbeddingConfig, RelevanceConfig};
use engram_core::constants::{DEFAULT_HYBRID_PREFILTER_LIMIT, MAX_CONTENT_BYTES};
use engram_core::errors::{EngramError, EngramResult};
use engram_core::models::{
    Node, Operation, OperationLogEntry, Robot, RobotNode, SearchHit, Timeframe,
};
use engram_core::traits::EmbeddingProvider;
use engram_providers::{service, BreakerRegistry};
use engram_storage::engine::{AddOutcome, StoreCounts};
use engram_storage::predicates::{sanitise_embedding, sanitise_fts_match};
use engram_storage::queries::node_crud::NewNode;
use engram_storage::StorageEngine;

use crate::query_cache::{CacheStats, QueryCache};
use crate::relevance;

/// How many candidates the relevance strategy oversamples before scoring.
const RELEVANCE_OVERSAMPLE: usize = 3;

/// Store-wide statistics.
#[derive(Debug, Clone, Copy)]
pub struct LtmStats {
    pub counts: StoreCounts,
    pub cache: CacheStats,
}

pub struct LongTermMemory {
    engine: Arc<StorageEngine>,
    cache: QueryCache,
    embedder: Arc<dyn EmbeddingProvider>,
    breakers: Arc<BreakerRegistry>,
    relevance: RelevanceConfig,
    embedding: EmbeddingConfig,
}

impl LongTermMemory {
    pub fn new(
        engine: Arc<StorageEngine>,
        embedder: Arc<dyn EmbeddingProvider>,
        breakers: Arc<BreakerRegistry>,
        config: &Config,
    ) -> Self {
        Self {
            engine,
            cache: QueryCache::new(
                config.cache.size,
                std::time::Duration::from_secs(config.cache.ttl_s),
            ),
            embedder,
            breakers,
            relevance: config.relevance.clone(),
            embedding: config.embedding.clone(),
        }
    }

    /// The underlying storage engine (shared with the channel and jobs).
    pub fn engine(&self) -> &Arc<StorageEngine> {
        &self.engine
    }

    // ── Node CRUD ────────────────────────────────────────────────────────

    /// Content-hash deduplicated insert; links (or increments) the
    /// robot↔node edge. Clears the query cache.
    pub fn add(
        &self,
        content: &str,
        token_count: i64,
        robot_id: i64,
        embedding: Option<&[f32]>,
        metadata: serde_json::Map<String, serde_json::Value>,
    ) -> EngramResult<AddOutcome> {
        let canonical = Node::canonicalise(content);
        if canonical.is_empty() {
            return Err(EngramError::InvalidInput("content is empty".to_string()));
        }
        if canonical.len() > MAX_CONTENT_BYTES {
            return Err(EngramError::InvalidInput(format!(
                "content of {} bytes exceeds the {MAX_CONTENT_BYTES} byte limit",
                canonical.len()
            )));
        }
        if token_count < 0 {
            return Err(EngramError::InvalidInput(
                "token_count must be non-negative".to_string(),
            ));
        }
        if let Some(vector) = embedding {
            if vector.len() != self.embedding.dimensions {
                return Err(EngramError::InvalidInput(format!(
                    "embedding has {} dimensions, model dimension is {}",
                    vector.len(),
                    self.embedding.dimensions
                )));
            }
        }

        let content_hash = Node::compute_content_hash(&canonical);
        let outcome = self.engine.add_node(
            &NewNode {
                content: &canonical,
                content_hash: &content_hash,
                token_count,
                metadata: &metadata,
                embedding,
            },
            robot_id,
        )?;
        self.cache.clear();
        tracing::debug!(
            node_id = outcome.node.id,
            is_new = outcome.is_new,
            robot_id,
            "node added"
        );
        Ok(outcome)
    }

    /// Fetch a node, bumping access statistics as a side effect.
    pub fn retrieve(
        &self,
        node_id: i64,
        include_deleted: bool,
        robot_id: Option<i64>,
    ) -> EngramResult<Node> {
        if self.engine.get_node(node_id, include_deleted)?.is_none() {
            return Err(EngramError::node_not_found(node_id));
        }
        let node = self
            .engine
            .touch_access(node_id, include_deleted)?
            .ok_or_else(|| EngramError::node_not_found(node_id))?;
        self.engine.log_operation(
            Operation::Retrieve,
            Some(node_id),
            robot_id,
            &serde_json::json!({}),
        )?;
        Ok(node)
    }

    /// Soft (default) or hard delete. Hard deletion cascades tags and
    /// edges and nulls audit references. Clears the query cache.
    pub fn delete(&self, node_id: i64, robot_id: Option<i64>, soft: bool) -> EngramResult<()> {
        self.engine.forget_node(node_id, robot_id, soft)?;
        self.cache.clear();
        Ok(())
    }

    /// Clear a soft delete. Clears the query cache.
    pub fn restore(&self, node_id: i64, robot_id: Option<i64>) -> EngramResult<Node> {
        let node = self.engine.restore_node(node_id, robot_id)?;
        self.cache.clear();
        Ok(node)
    }

    pub fn exists(&self, node_id: i64) -> EngramResult<bool> {
        self.engine.node_exists(node_id)
    }

    pub fn get_node_tags(&self, node_id: i64) -> EngramResult<Vec<String>> {
        self.engine.node_tags(node_id)
    }

    pub fn batch_load_node_tags(
        &self,
        node_ids: &[i64],
    ) -> EngramResult<std::collections::HashMap<i64, Vec<String>>> {
        self.engine.batch_node_tags(node_ids)
    }

    /// Persist validated tags for a node. Invalid tags are an error here,
    /// unlike extractor output which is filtered upstream.
    pub fn add_tags(&self, node_id: i64, tags: &[String]) -> EngramResult<usize> {
        let mut normalised = Vec::with_capacity(tags.len());
        for raw in tags {
            let tag = engram_tags::normalise(raw);
            if !engram_tags::is_valid(&tag, engram_core::constants::MAX_TAG_DEPTH) {
                return Err(EngramError::InvalidInput(format!("malformed tag: {raw}")));
            }
            normalised.push(tag);
        }
        if !self.engine.node_exists(node_id)? {
            return Err(EngramError::node_not_found(node_id));
        }
        let inserted = self.engine.insert_tags(node_id, &normalised)?;
        self.cache.clear();
        Ok(inserted)
    }

    /// Persist an enrichment embedding (idempotent). Clears the cache so
    /// vector searches see the new vector.
    pub fn set_embedding(&self, node_id: i64, embedding: &[f32]) -> EngramResult<()> {
        if embedding.len() != self.embedding.dimensions {
            return Err(EngramError::EmbeddingError(format!(
                "provider returned {} dimensions, expected {}",
                embedding.len(),
                self.embedding.dimensions
            )));
        }
        if !self.engine.set_embedding(node_id, embedding)? {
            return Err(EngramError::node_not_found(node_id));
        }
        self.cache.clear();
        Ok(())
    }

    /// Bulk access tracking. Clears the query cache.
    pub fn track_access(&self, node_ids: &[i64]) -> EngramResult<usize> {
        let updated = self.engine.track_access(node_ids)?;
        if updated > 0 {
            self.cache.clear();
        }
        Ok(updated)
    }

    // ── Robots & edges ───────────────────────────────────────────────────

    /// Idempotent on name: an existing robot with this name is returned
    /// rather than duplicated.
    pub fn register_robot(&self, name: &str) -> EngramResult<Robot> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(EngramError::InvalidInput("robot name is empty".to_string()));
        }
        self.engine.register_robot(trimmed)
    }

    pub fn get_robot(&self, robot_id: i64) -> EngramResult<Robot> {
        self.engine
            .get_robot(robot_id)?
            .ok_or_else(|| EngramError::robot_not_found(robot_id))
    }

    pub fn link_robot_to_node(
        &self,
        robot_id: i64,
        node_id: i64,
        in_working_memory: bool,
    ) -> EngramResult<RobotNode> {
        let edge = self.engine.link_robot_to_node(robot_id, node_id)?;
        if in_working_memory {
            self.engine
                .set_in_working_memory(robot_id, &[node_id], true)?;
        }
        self.engine
            .get_edge(robot_id, node_id)?
            .ok_or_else(|| EngramError::node_not_found(edge.node_id))
    }

    pub fn mark_evicted(&self, robot_id: i64, node_ids: &[i64]) -> EngramResult<usize> {
        self.engine.mark_evicted(robot_id, node_ids)
    }

    /// Ensure edges exist and set their working-memory flags, without
    /// counting a remember.
    pub fn promote_to_working_memory(
        &self,
        robot_id: i64,
        node_ids: &[i64],
    ) -> EngramResult<usize> {
        self.engine.promote_to_working_memory(robot_id, node_ids)
    }

    pub fn set_in_working_memory(
        &self,
        robot_id: i64,
        node_ids: &[i64],
        in_working_memory: bool,
    ) -> EngramResult<usize> {
        self.engine
            .set_in_working_memory(robot_id, node_ids, in_working_memory)
    }

    pub fn wm_node_ids(&self, robot_id: i64) -> EngramResult<Vec<i64>> {
        self.engine.wm_node_ids(robot_id)
    }

    pub fn get_edge(&self, robot_id: i64, node_id: i64) -> EngramResult<Option<RobotNode>> {
        self.engine.get_edge(robot_id, node_id)
    }

    // ── Search ───────────────────────────────────────────────────────────

    /// Embed a query under the `embedding` breaker and pad it to the
    /// maximum indexed dimension.
    pub fn embed_query(&self, query: &str) -> EngramResult<Vec<f32>> {
        let breaker = self.breakers.get(service::EMBEDDING);
        let raw = breaker.call(|| self.embedder.embed(query))?;
        if raw.len() != self.embedding.dimensions {
            return Err(EngramError::EmbeddingError(format!(
                "provider returned {} dimensions, expected {}",
                raw.len(),
                self.embedding.dimensions
            )));
        }
        sanitise_embedding(&raw, self.embedding.max_index_dimensions)
    }

    /// Vector search: embed the (cleaned) query, then nearest-neighbour
    /// over non-deleted nodes. `similarity` is cosine, descending.
    pub fn search(
        &self,
        timeframe: &Timeframe,
        query: &str,
        limit: usize,
        metadata: &serde_json::Map<String, serde_json::Value>,
    ) -> EngramResult<Vec<SearchHit>> {
        let key = QueryCache::fingerprint("vector", timeframe, query, &[], limit, metadata);
        if let Some(hits) = self.cache.get(&key) {
            return Ok(hits);
        }

        let embedding = self.embed_query(query)?;
        let rows = self
            .engine
            .search_vector(&embedding, timeframe, metadata, limit)?;
        let hits: Vec<SearchHit> = rows
            .into_iter()
            .map(|(node, similarity)| SearchHit {
                node,
                similarity: Some(similarity),
                rank: None,
                relevance: None,
                tags: Vec::new(),
            })
            .collect();
        self.cache.put(key, hits.clone());
        Ok(hits)
    }

    /// Full-text search ranked by the store's text-search function.
    pub fn search_fulltext(
        &self,
        timeframe: &Timeframe,
        query: &str,
        limit: usize,
        metadata: &serde_json::Map<String, serde_json::Value>,
    ) -> EngramResult<Vec<SearchHit>> {
        let key = QueryCache::fingerprint("fulltext", timeframe, query, &[], limit, metadata);
        if let Some(hits) = self.cache.get(&key) {
            return Ok(hits);
        }

        let Some(match_string) = sanitise_fts_match(query) else {
            return Ok(Vec::new());
        };
        let rows = self
            .engine
            .search_fulltext(&match_string, timeframe, metadata, limit)?;
        let hits: Vec<SearchHit> = rows
            .into_iter()
            .map(|(node, rank)| SearchHit {
                node,
                similarity: None,
                rank: Some(rank),
                relevance: None,
                tags: Vec::new(),
            })
            .collect();
        self.cache.put(key, hits.clone());
        Ok(hits)
    }

    /// Hybrid search: full-text prefilter, vector rerank. The query
    /// embedding may be supplied by the caller; otherwise it is computed
    /// here under the breaker.
    pub fn search_hybrid(
        &self,
        timeframe: &Timeframe,
        query: &str,
        limit: usize,
        embedding: Option<&[f32]>,
        prefilter_limit: Option<usize>,
        metadata: &serde_json::Map<String, serde_json::Value>,
    ) -> EngramResult<Vec<SearchHit>> {
        let prefilter = prefilter_limit.unwrap_or(DEFAULT_HYBRID_PREFILTER_LIMIT);
        let key = QueryCache::fingerprint("hybrid", timeframe, query, &[], limit, metadata);
        if let Some(hits) = self.cache.get(&key) {
            return Ok(hits);
        }

        let Some(match_string) = sanitise_fts_match(query) else {
            return Ok(Vec::new());
        };
        let query_embedding = match embedding {
            Some(vector) => sanitise_embedding(vector, self.embedding.max_index_dimensions)?,
            None => self.embed_query(query)?,
        };

        let rows = self.engine.search_hybrid(
            &match_string,
            &query_embedding,
            timeframe,
            metadata,
            prefilter,
            limit,
        )?;
        let hits: Vec<SearchHit> = rows
            .into_iter()
            .map(|(node, similarity)| SearchHit {
                node,
                similarity: Some(similarity),
                rank: None,
                relevance: None,
                tags: Vec::new(),
            })
            .collect();
        self.cache.put(key, hits.clone());
        Ok(hits)
    }

    /// Composite relevance search: vector candidates (when a query is
    /// given) or tag-scoped candidates, scored on semantic, tag, recency,
    /// and access signals, rescaled to [0, 10].
    pub fn search_with_relevance(
        &self,
        timeframe: &Timeframe,
        query: Option<&str>,
        query_tags: &[String],
        limit: usize,
        metadata: &serde_json::Map<String, serde_json::Value>,
    ) -> EngramResult<Vec<SearchHit>> {
        let key = QueryCache::fingerprint(
            "relevance",
            timeframe,
            query.unwrap_or(""),
            query_tags,
            limit,
            metadata,
        );
        if let Some(hits) = self.cache.get(&key) {
            return Ok(hits);
        }

        let oversample = limit.saturating_mul(RELEVANCE_OVERSAMPLE).max(limit);
        let candidates: Vec<(Node, Option<f64>)> = match query {
            Some(q) => {
                let embedding = self.embed_query(q)?;
                self.engine
                    .search_vector(&embedding, timeframe, metadata, oversample)?
                    .into_iter()
                    .map(|(node, similarity)| (node, Some(similarity)))
                    .collect()
            }
            None if !query_tags.is_empty() => self
                .engine
                .search_by_tags(query_tags, false, timeframe, oversample)?
                .into_iter()
                .map(|node| (node, None))
                .collect(),
            None => {
                return Err(EngramError::InvalidInput(
                    "relevance search needs a query or query tags".to_string(),
                ))
            }
        };

        let ids: Vec<i64> = candidates.iter().map(|(n, _)| n.id).collect();
        let mut tag_map = self.engine.batch_node_tags(&ids)?;
        let now = Utc::now();

        let mut hits: Vec<SearchHit> = candidates
            .into_iter()
            .map(|(node, similarity)| {
                let tags = tag_map.remove(&node.id).unwrap_or_default();
                let (relevance, _) = relevance::score(
                    &node,
                    &tags,
                    query_tags,
                    similarity,
                    now,
                    &self.relevance,
                );
                SearchHit {
                    node,
                    similarity,
                    rank: None,
                    relevance: Some(relevance),
                    tags,
                }
            })
            .collect();

        hits.sort_by(|a, b| {
            b.relevance
                .partial_cmp(&a.relevance)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.node.id.cmp(&b.node.id))
        });
        hits.truncate(limit);
        self.cache.put(key, hits.clone());
        Ok(hits)
    }

    /// ANY-of-tags (default) or all-of-tags node lookup.
    pub fn search_by_tags(
        &self,
        tags: &[String],
        match_all: bool,
        timeframe: &Timeframe,
        limit: usize,
    ) -> EngramResult<Vec<SearchHit>> {
        let normalised: Vec<String> = tags.iter().map(|t| engram_tags::normalise(t)).collect();
        let label = if match_all { "tags:all" } else { "tags:any" };
        let key =
            QueryCache::fingerprint(label, timeframe, "", &normalised, limit, &serde_json::Map::new());
        if let Some(hits) = self.cache.get(&key) {
            return Ok(hits);
        }

        let nodes = self
            .engine
            .search_by_tags(&normalised, match_all, timeframe, limit)?;
        let hits: Vec<SearchHit> = nodes.into_iter().map(SearchHit::from_node).collect();
        self.cache.put(key, hits.clone());
        Ok(hits)
    }

    /// Tags where at least one hierarchy level equals a lowercase word
    /// token of the query.
    pub fn find_query_matching_tags(&self, query: &str) -> EngramResult<Vec<String>> {
        let tokens: std::collections::HashSet<String> = query
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(|t| t.to_lowercase())
            .collect();
        if tokens.is_empty() {
            return Ok(Vec::new());
        }

        let known = self.engine.distinct_tags(1000)?;
        Ok(known
            .into_iter()
            .filter(|tag| tag.split(':').any(|level| tokens.contains(level)))
            .collect())
    }

    // ── Ontology ─────────────────────────────────────────────────────────

    pub fn ontology_structure(&self) -> EngramResult<Vec<(String, String)>> {
        self.engine.ontology_structure()
    }

    pub fn topic_relationships(&self) -> EngramResult<Vec<(String, String, i64)>> {
        self.engine.topic_relationships()
    }

    /// A sample of existing tag names for the extractor prompt.
    pub fn tag_sample(&self, limit: usize) -> EngramResult<Vec<String>> {
        self.engine.distinct_tags(limit)
    }

    // ── Audit & stats ────────────────────────────────────────────────────

    pub fn log_operation(
        &self,
        operation: Operation,
        node_id: Option<i64>,
        robot_id: Option<i64>,
        details: &serde_json::Value,
    ) -> EngramResult<i64> {
        self.engine
            .log_operation(operation, node_id, robot_id, details)
    }

    pub fn recent_operations(&self, limit: usize) -> EngramResult<Vec<OperationLogEntry>> {
        self.engine.recent_operations(limit)
    }

    pub fn stats(&self) -> EngramResult<LtmStats> {
        Ok(LtmStats {
            counts: self.engine.counts()?,
            cache: self.cache.stats(),
        })
    }

    pub fn breakers(&self) -> &Arc<BreakerRegistry> {
        &self.breakers
    }
}
