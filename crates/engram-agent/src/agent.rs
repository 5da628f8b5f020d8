//! The orchestrator: binds one robot identity to one working memory and
//! the shared long-term memory.
//!
//! `remember` flows LTM (hash upsert + edge) → WM (add, possibly evict)
//! → enrichment enqueue → `added` event. `recall` flows timeframe parse
//! → search → WM promotion → `added` events. Enrichment failures never
//! escape `remember`; a failed query embedding downgrades `recall` to
//! full-text instead of failing it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use engram_core::constants::CONFIRMED;
use engram_core::errors::{EngramError, EngramResult};
use engram_core::models::{
    Node, Operation, Robot, SearchHit, SearchStrategy, Timeframe, WmEventKind,
};
use engram_jobs::EnrichmentJob;
use engram_memory::{ContextStrategy, WmAdd, WorkingMemory};
use engram_channel::WmChannel;

use crate::store::Store;

/// Per-agent counters surfaced in status output.
#[derive(Debug, Clone, Copy, Default)]
pub struct AgentMetrics {
    /// Vector/hybrid recalls that fell back to full-text.
    pub search_downgrades: u64,
}

pub struct Agent {
    store: Arc<Store>,
    robot: Robot,
    wm: WorkingMemory,
    channel: Option<Arc<WmChannel>>,
    owns_channel: bool,
    downgrades: AtomicU64,
}

impl Agent {
    /// Register (or re-attach to) the robot named `name` on this store.
    /// `wm_max_tokens` overrides the configured working-memory budget.
    pub fn new(store: Arc<Store>, name: &str, wm_max_tokens: Option<usize>) -> EngramResult<Self> {
        let robot = store.ltm.register_robot(name)?;
        let max_tokens = wm_max_tokens.unwrap_or(store.config.working_memory.max_tokens);
        Ok(Self {
            store,
            robot,
            wm: WorkingMemory::new(max_tokens),
            channel: None,
            owns_channel: false,
            downgrades: AtomicU64::new(0),
        })
    }

    /// Attach a group channel. Owned channels are stopped by `shutdown`;
    /// a coordinator-owned channel is left alone.
    pub fn with_channel(mut self, channel: Arc<WmChannel>, owned: bool) -> Self {
        self.channel = Some(channel);
        self.owns_channel = owned;
        self
    }

    pub fn robot(&self) -> &Robot {
        &self.robot
    }

    pub fn robot_id(&self) -> i64 {
        self.robot.id
    }

    pub fn working_memory(&self) -> &WorkingMemory {
        &self.wm
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn metrics(&self) -> AgentMetrics {
        AgentMetrics {
            search_downgrades: self.downgrades.load(Ordering::Relaxed),
        }
    }

    // ── remember ─────────────────────────────────────────────────────────

    /// Persist content, pull it into working memory, enqueue enrichment,
    /// and announce the addition. Returns the node id.
    pub fn remember(
        &self,
        content: &str,
        metadata: serde_json::Map<String, serde_json::Value>,
        tags: &[String],
    ) -> EngramResult<i64> {
        let token_count = self.store.tokens.count_cached(content) as i64;
        let outcome = self
            .store
            .ltm
            .add(content, token_count, self.robot.id, None, metadata)?;
        let node = outcome.node;

        if !tags.is_empty() {
            self.store.ltm.add_tags(node.id, tags)?;
        }

        match self.wm.add(WmAdd {
            node_id: node.id,
            content: node.content.clone(),
            token_count: node.token_count.max(0) as usize,
            access_count: node.access_count,
            last_accessed: node.last_accessed,
            from_recall: false,
        }) {
            Ok(evicted) => {
                self.flush_evictions(&evicted)?;
                self.store
                    .ltm
                    .set_in_working_memory(self.robot.id, &[node.id], true)?;
            }
            // A node bigger than the whole budget stays durable but
            // uncached; the flag stays false so WM and edge agree.
            Err(EngramError::InvalidInput(reason)) => {
                tracing::debug!(node_id = node.id, reason = %reason, "node skipped working memory");
            }
            Err(e) => return Err(e),
        }

        for job in [
            EnrichmentJob::GenerateEmbedding { node_id: node.id },
            EnrichmentJob::GenerateTags { node_id: node.id },
        ] {
            // Enrichment never fails a remember; a dead backend only
            // delays enrichment until an operator replay.
            if let Err(e) = self.store.jobs.submit(job) {
                tracing::warn!(node_id = node.id, error = %e, "failed to enqueue enrichment");
            }
        }

        self.publish(WmEventKind::Added, Some(node.id));
        Ok(node.id)
    }

    // ── recall ───────────────────────────────────────────────────────────

    /// Search long-term memory and promote the hits into working memory.
    /// With `raw = true` the hits are returned without promotion.
    pub fn recall(
        &self,
        query: &str,
        timeframe: Option<Timeframe>,
        limit: usize,
        strategy: SearchStrategy,
        metadata: serde_json::Map<String, serde_json::Value>,
        raw: bool,
    ) -> EngramResult<Vec<SearchHit>> {
        // An explicit timeframe wins; otherwise parse one out of the
        // query text.
        let (cleaned, timeframe) = match timeframe {
            Some(tf) => (query.to_string(), tf),
            None => {
                let extraction = engram_temporal::extract_timeframe(query);
                (extraction.cleaned_query, extraction.timeframe)
            }
        };

        let ltm = &self.store.ltm;
        let hits = match strategy {
            SearchStrategy::Vector => self.with_fulltext_downgrade(
                strategy,
                ltm.search(&timeframe, &cleaned, limit, &metadata),
                &timeframe,
                &cleaned,
                limit,
                &metadata,
            )?,
            SearchStrategy::Fulltext => {
                ltm.search_fulltext(&timeframe, &cleaned, limit, &metadata)?
            }
            SearchStrategy::Hybrid => self.with_fulltext_downgrade(
                strategy,
                ltm.search_hybrid(&timeframe, &cleaned, limit, None, None, &metadata),
                &timeframe,
                &cleaned,
                limit,
                &metadata,
            )?,
            SearchStrategy::Relevance => {
                let query_tags = ltm.find_query_matching_tags(&cleaned)?;
                self.with_fulltext_downgrade(
                    strategy,
                    ltm.search_with_relevance(
                        &timeframe,
                        Some(&cleaned),
                        &query_tags,
                        limit,
                        &metadata,
                    ),
                    &timeframe,
                    &cleaned,
                    limit,
                    &metadata,
                )?
            }
        };

        ltm.log_operation(
            Operation::Recall,
            None,
            Some(self.robot.id),
            &serde_json::json!({
                "strategy": strategy.as_str(),
                "query": cleaned,
                "results": hits.len(),
            }),
        )?;

        if !raw {
            self.promote(&hits)?;
        }
        Ok(hits)
    }

    /// The downgrade policy: an embedding failure during the query
    /// embedding step falls back to full-text and records the downgrade.
    /// Breaker-open and query-timeout failures propagate.
    fn with_fulltext_downgrade(
        &self,
        strategy: SearchStrategy,
        result: EngramResult<Vec<SearchHit>>,
        timeframe: &Timeframe,
        query: &str,
        limit: usize,
        metadata: &serde_json::Map<String, serde_json::Value>,
    ) -> EngramResult<Vec<SearchHit>> {
        match result {
            Err(EngramError::EmbeddingError(reason)) => {
                self.downgrades.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    robot_id = self.robot.id,
                    strategy = strategy.as_str(),
                    reason = %reason,
                    "query embedding failed, downgrading to fulltext"
                );
                self.store
                    .ltm
                    .search_fulltext(timeframe, query, limit, metadata)
            }
            other => other,
        }
    }

    /// Promote hits into working memory, reconciling edges and flags and
    /// announcing each promotion.
    fn promote(&self, hits: &[SearchHit]) -> EngramResult<()> {
        if hits.is_empty() {
            return Ok(());
        }

        let mut promoted = Vec::with_capacity(hits.len());
        for hit in hits {
            let node = &hit.node;
            let evicted = self.wm.add(WmAdd {
                node_id: node.id,
                content: node.content.clone(),
                token_count: node.token_count.max(0) as usize,
                access_count: node.access_count,
                last_accessed: node.last_accessed,
                from_recall: true,
            });
            match evicted {
                Ok(evicted) => {
                    self.flush_evictions(&evicted)?;
                    promoted.push(node.id);
                }
                // A single oversize node must not fail the whole recall.
                Err(EngramError::InvalidInput(reason)) => {
                    tracing::debug!(node_id = node.id, reason = %reason, "hit skipped working memory");
                }
                Err(e) => return Err(e),
            }
        }

        if promoted.is_empty() {
            return Ok(());
        }
        self.store
            .ltm
            .promote_to_working_memory(self.robot.id, &promoted)?;
        self.store.ltm.track_access(&promoted)?;
        for node_id in promoted {
            self.publish(WmEventKind::Added, Some(node_id));
        }
        Ok(())
    }

    // ── node lifecycle ───────────────────────────────────────────────────

    /// Fetch one node, bumping its access statistics.
    pub fn retrieve(&self, node_id: i64) -> EngramResult<Node> {
        self.store.ltm.retrieve(node_id, false, Some(self.robot.id))
    }

    /// Soft delete by default. A hard delete requires the `CONFIRMED`
    /// sentinel and fails synchronously, with no side effects, without it.
    /// Forgetting publishes no event.
    pub fn forget(&self, node_id: i64, soft: bool, confirm: Option<&str>) -> EngramResult<()> {
        if !soft && confirm != Some(CONFIRMED) {
            return Err(EngramError::InvalidInput(
                "hard delete requires the CONFIRMED sentinel".to_string(),
            ));
        }
        self.store.ltm.delete(node_id, Some(self.robot.id), soft)?;
        if self.wm.remove(node_id).is_some() && soft {
            // Hard deletes cascade the edge away; soft deletes keep it
            // and need the flag cleared.
            self.store
                .ltm
                .set_in_working_memory(self.robot.id, &[node_id], false)?;
        }
        Ok(())
    }

    /// Clear a soft delete.
    pub fn restore(&self, node_id: i64) -> EngramResult<Node> {
        self.store.ltm.restore(node_id, Some(self.robot.id))
    }

    /// Assemble a context string from working memory.
    pub fn assemble_context(
        &self,
        strategy: ContextStrategy,
        max_tokens: Option<usize>,
    ) -> String {
        self.wm.assemble_context(strategy, max_tokens)
    }

    /// Stop the owned channel (if any). The store itself is shared and
    /// shut down by its owner.
    pub fn shutdown(&self) {
        if self.owns_channel {
            if let Some(channel) = &self.channel {
                channel.stop();
            }
        }
    }

    // ── peer-event application (group mirroring) ─────────────────────────

    /// Apply a peer's `added` event: mirror the node into this agent's
    /// working memory without publishing further events.
    pub(crate) fn apply_peer_added(&self, node_id: i64) -> EngramResult<()> {
        let Some(node) = self.store.engine.get_node(node_id, false)? else {
            return Ok(());
        };
        let evicted = self.wm.add(WmAdd {
            node_id: node.id,
            content: node.content,
            token_count: node.token_count.max(0) as usize,
            access_count: node.access_count,
            last_accessed: node.last_accessed,
            from_recall: true,
        });
        match evicted {
            Ok(evicted) => {
                if !evicted.is_empty() {
                    let ids: Vec<i64> = evicted.iter().map(|e| e.node_id).collect();
                    self.store.ltm.mark_evicted(self.robot.id, &ids)?;
                }
                self.store
                    .ltm
                    .promote_to_working_memory(self.robot.id, &[node_id])?;
            }
            Err(EngramError::InvalidInput(_)) => {}
            Err(e) => return Err(e),
        }
        Ok(())
    }

    /// Apply a peer's `evicted` event.
    pub(crate) fn apply_peer_evicted(&self, node_id: i64) -> EngramResult<()> {
        if self.wm.remove(node_id).is_some() {
            self.store
                .ltm
                .set_in_working_memory(self.robot.id, &[node_id], false)?;
        }
        Ok(())
    }

    /// Apply a peer's `cleared` event.
    pub(crate) fn apply_peer_cleared(&self) -> EngramResult<()> {
        self.wm.clear();
        self.store.engine.clear_working_memory_flags(self.robot.id)?;
        Ok(())
    }

    // ── internals ────────────────────────────────────────────────────────

    /// Persist evictions (flag + audit) and announce them.
    fn flush_evictions(&self, evicted: &[engram_memory::WmEntry]) -> EngramResult<()> {
        if evicted.is_empty() {
            return Ok(());
        }
        let ids: Vec<i64> = evicted.iter().map(|e| e.node_id).collect();
        self.store.ltm.mark_evicted(self.robot.id, &ids)?;
        for node_id in ids {
            self.publish(WmEventKind::Evicted, Some(node_id));
        }
        Ok(())
    }

    fn publish(&self, event: WmEventKind, node_id: Option<i64>) {
        if let Some(channel) = &self.channel {
            if let Err(e) = channel.notify(event, node_id, self.robot.id) {
                tracing::warn!(
                    robot_id = self.robot.id,
                    event = ?event,
                    error = %e,
                    "failed to publish working-memory event"
                );
            }
        }
    }
}
