//! StorageEngine — owns the connection pool and exposes every typed
//! operation the rest of the workspace performs against SQLite.
//!
//! Writes that span multiple statements run inside a transaction on the
//! single write connection. Reads go to the read pool in file-backed mode
//! and are routed through the writer for in-memory databases (whose read
//! pool connections would be isolated databases).

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use rusqlite::Connection;

use engram_core::config::DatabaseConfig;
use engram_core::errors::{EngramError, EngramResult};
use engram_core::models::{Node, Operation, OperationLogEntry, Robot, RobotNode, Timeframe};

use crate::migrations;
use crate::pool::ConnectionPool;
use crate::queries::{
    channel_ops, edge_ops, node_crud, node_search, oplog, robot_ops, tag_ops, vector_search,
};
use crate::to_storage_err;

/// Result of a dedup-aware node insertion.
#[derive(Debug, Clone)]
pub struct AddOutcome {
    pub node: Node,
    pub is_new: bool,
    pub edge: RobotNode,
}

/// Row counts for operator visibility.
#[derive(Debug, Clone, Copy, Default)]
pub struct StoreCounts {
    pub nodes: u64,
    pub robots: u64,
    pub edges: u64,
    pub tags: u64,
}

pub struct StorageEngine {
    pool: ConnectionPool,
    use_read_pool: bool,
}

impl StorageEngine {
    /// Open the engine per configuration. ":memory:" selects the
    /// in-memory mode used by tests.
    pub fn open(config: &DatabaseConfig) -> EngramResult<Self> {
        if config.path == ":memory:" {
            return Self::open_in_memory();
        }
        Self::open_at(
            Path::new(&config.path),
            config.pool_size,
            config.busy_timeout_ms,
            Duration::from_millis(config.query_timeout_ms),
        )
    }

    /// Open a file-backed engine.
    pub fn open_at(
        path: &Path,
        pool_size: usize,
        busy_timeout_ms: u64,
        query_timeout: Duration,
    ) -> EngramResult<Self> {
        let pool = ConnectionPool::open(path, pool_size, busy_timeout_ms, query_timeout)?;
        let engine = Self {
            pool,
            use_read_pool: true,
        };
        engine.initialize()?;
        Ok(engine)
    }

    /// Open an in-memory engine (for testing). All reads are routed
    /// through the writer.
    pub fn open_in_memory() -> EngramResult<Self> {
        let pool = ConnectionPool::open_in_memory(Duration::from_secs(30))?;
        let engine = Self {
            pool,
            use_read_pool: false,
        };
        engine.initialize()?;
        Ok(engine)
    }

    fn initialize(&self) -> EngramResult<()> {
        self.pool
            .writer
            .with_conn(|conn| migrations::run_migrations(conn))
    }

    /// Execute a read-only query on the best available connection.
    fn with_reader<F, T>(&self, f: F) -> EngramResult<T>
    where
        F: FnOnce(&Connection) -> EngramResult<T>,
    {
        if self.use_read_pool {
            self.pool.readers.with_conn(f)
        } else {
            self.pool.writer.with_conn(f)
        }
    }

    /// Execute a multi-statement write inside a transaction.
    fn in_transaction<F, T>(&self, f: F) -> EngramResult<T>
    where
        F: FnOnce(&Connection) -> EngramResult<T>,
    {
        self.pool.writer.with_conn(|conn| {
            let tx = conn
                .unchecked_transaction()
                .map_err(|e| to_storage_err(format!("begin: {e}")))?;
            match f(&tx) {
                Ok(value) => {
                    tx.commit()
                        .map_err(|e| to_storage_err(format!("commit: {e}")))?;
                    Ok(value)
                }
                Err(e) => {
                    let _ = tx.rollback();
                    Err(e)
                }
            }
        })
    }

    // ── Nodes ────────────────────────────────────────────────────────────

    /// Dedup-aware insertion: one transaction covering the node upsert,
    /// the robot↔node edge, and the audit row.
    pub fn add_node(
        &self,
        new: &node_crud::NewNode<'_>,
        robot_id: i64,
    ) -> EngramResult<AddOutcome> {
        self.in_transaction(|conn| {
            let (node, is_new) = node_crud::upsert_by_hash(conn, new)?;
            let edge = edge_ops::link(conn, robot_id, node.id)?;
            robot_ops::touch(conn, robot_id)?;
            oplog::append(
                conn,
                Operation::Add,
                Some(node.id),
                Some(robot_id),
                &serde_json::json!({ "is_new": is_new }),
            )?;
            Ok(AddOutcome { node, is_new, edge })
        })
    }

    pub fn get_node(&self, id: i64, include_deleted: bool) -> EngramResult<Option<Node>> {
        self.with_reader(|conn| node_crud::get_node(conn, id, include_deleted))
    }

    pub fn find_node_by_hash(&self, content_hash: &str) -> EngramResult<Option<Node>> {
        self.with_reader(|conn| node_crud::find_by_hash(conn, content_hash, false))
    }

    pub fn node_exists(&self, id: i64) -> EngramResult<bool> {
        self.with_reader(|conn| node_crud::exists(conn, id))
    }

    /// Access-tracking read: bumps access_count/last_accessed and returns
    /// the refreshed node.
    pub fn touch_access(&self, id: i64, include_deleted: bool) -> EngramResult<Option<Node>> {
        self.pool
            .writer
            .with_conn(|conn| node_crud::touch_access(conn, id, include_deleted))
    }

    pub fn track_access(&self, ids: &[i64]) -> EngramResult<usize> {
        self.pool
            .writer
            .with_conn(|conn| node_crud::track_access(conn, ids))
    }

    pub fn set_embedding(&self, node_id: i64, embedding: &[f32]) -> EngramResult<bool> {
        self.pool
            .writer
            .with_conn(|conn| node_crud::set_embedding(conn, node_id, embedding))
    }

    /// Forget a node. The audit row is committed before the delete runs
    /// (log-before-delete), so it survives a failed delete. Hard deletes
    /// cascade tags and edges; log rows keep a nulled node reference.
    pub fn forget_node(&self, id: i64, robot_id: Option<i64>, soft: bool) -> EngramResult<()> {
        // Soft forget needs a live node; hard forget also purges
        // soft-deleted rows.
        if self.get_node(id, !soft)?.is_none() {
            return Err(EngramError::node_not_found(id));
        }

        self.pool.writer.with_conn(|conn| {
            oplog::append(
                conn,
                Operation::Forget,
                Some(id),
                robot_id,
                &serde_json::json!({ "soft": soft }),
            )
        })?;

        let removed = self.pool.writer.with_conn(|conn| {
            if soft {
                node_crud::soft_delete(conn, id)
            } else {
                node_crud::hard_delete(conn, id)
            }
        })?;
        if !removed {
            return Err(EngramError::node_not_found(id));
        }
        Ok(())
    }

    /// Restore a soft-deleted node. Log-before-write, mirroring forget.
    pub fn restore_node(&self, id: i64, robot_id: Option<i64>) -> EngramResult<Node> {
        if self.get_node(id, true)?.is_none() {
            return Err(EngramError::node_not_found(id));
        }

        self.pool.writer.with_conn(|conn| {
            oplog::append(
                conn,
                Operation::Restore,
                Some(id),
                robot_id,
                &serde_json::json!({}),
            )
        })?;

        let restored = self
            .pool
            .writer
            .with_conn(|conn| node_crud::restore(conn, id))?;
        if !restored {
            return Err(EngramError::node_not_found(id));
        }
        self.get_node(id, false)?
            .ok_or_else(|| EngramError::node_not_found(id))
    }

    // ── Search ───────────────────────────────────────────────────────────

    pub fn search_vector(
        &self,
        query_embedding: &[f32],
        timeframe: &Timeframe,
        metadata: &serde_json::Map<String, serde_json::Value>,
        limit: usize,
    ) -> EngramResult<Vec<(Node, f64)>> {
        self.with_reader(|conn| {
            vector_search::search_vector(conn, query_embedding, timeframe, metadata, limit)
        })
    }

    pub fn search_fulltext(
        &self,
        match_string: &str,
        timeframe: &Timeframe,
        metadata: &serde_json::Map<String, serde_json::Value>,
        limit: usize,
    ) -> EngramResult<Vec<(Node, f64)>> {
        self.with_reader(|conn| {
            node_search::search_fulltext(conn, match_string, timeframe, metadata, limit)
        })
    }

    /// Hybrid search: full-text prefilter CTE, then vector rerank of the
    /// candidate set.
    pub fn search_hybrid(
        &self,
        match_string: &str,
        query_embedding: &[f32],
        timeframe: &Timeframe,
        metadata: &serde_json::Map<String, serde_json::Value>,
        prefilter_limit: usize,
        limit: usize,
    ) -> EngramResult<Vec<(Node, f64)>> {
        self.with_reader(|conn| {
            let candidates = node_search::fulltext_candidates(
                conn,
                match_string,
                timeframe,
                metadata,
                prefilter_limit,
            )?;
            vector_search::rerank_by_similarity(conn, &candidates, query_embedding, limit)
        })
    }

    // ── Tags ─────────────────────────────────────────────────────────────

    pub fn insert_tags(&self, node_id: i64, tags: &[String]) -> EngramResult<usize> {
        self.pool
            .writer
            .with_conn(|conn| tag_ops::insert_tags(conn, node_id, tags))
    }

    pub fn node_tags(&self, node_id: i64) -> EngramResult<Vec<String>> {
        self.with_reader(|conn| tag_ops::node_tags(conn, node_id))
    }

    pub fn batch_node_tags(&self, node_ids: &[i64]) -> EngramResult<HashMap<i64, Vec<String>>> {
        self.with_reader(|conn| tag_ops::batch_node_tags(conn, node_ids))
    }

    pub fn distinct_tags(&self, limit: usize) -> EngramResult<Vec<String>> {
        self.with_reader(|conn| tag_ops::distinct_tags(conn, limit))
    }

    pub fn search_by_tags(
        &self,
        tags: &[String],
        match_all: bool,
        timeframe: &Timeframe,
        limit: usize,
    ) -> EngramResult<Vec<Node>> {
        self.with_reader(|conn| tag_ops::search_by_tags(conn, tags, match_all, timeframe, limit))
    }

    pub fn ontology_structure(&self) -> EngramResult<Vec<(String, String)>> {
        self.with_reader(tag_ops::ontology_structure)
    }

    pub fn topic_relationships(&self) -> EngramResult<Vec<(String, String, i64)>> {
        self.with_reader(tag_ops::topic_relationships)
    }

    // ── Robots & edges ───────────────────────────────────────────────────

    pub fn register_robot(&self, name: &str) -> EngramResult<Robot> {
        self.pool
            .writer
            .with_conn(|conn| robot_ops::register(conn, name))
    }

    pub fn get_robot(&self, id: i64) -> EngramResult<Option<Robot>> {
        self.with_reader(|conn| robot_ops::get(conn, id))
    }

    pub fn link_robot_to_node(&self, robot_id: i64, node_id: i64) -> EngramResult<RobotNode> {
        self.pool
            .writer
            .with_conn(|conn| edge_ops::link(conn, robot_id, node_id))
    }

    pub fn get_edge(&self, robot_id: i64, node_id: i64) -> EngramResult<Option<RobotNode>> {
        self.with_reader(|conn| edge_ops::get(conn, robot_id, node_id))
    }

    /// Ensure edges exist and flag the nodes into working memory, without
    /// touching remember statistics. One transaction per batch.
    pub fn promote_to_working_memory(
        &self,
        robot_id: i64,
        node_ids: &[i64],
    ) -> EngramResult<usize> {
        if node_ids.is_empty() {
            return Ok(0);
        }
        self.in_transaction(|conn| {
            for node_id in node_ids {
                edge_ops::ensure(conn, robot_id, *node_id)?;
            }
            edge_ops::set_in_working_memory(conn, robot_id, node_ids, true)
        })
    }

    pub fn set_in_working_memory(
        &self,
        robot_id: i64,
        node_ids: &[i64],
        in_working_memory: bool,
    ) -> EngramResult<usize> {
        self.pool.writer.with_conn(|conn| {
            edge_ops::set_in_working_memory(conn, robot_id, node_ids, in_working_memory)
        })
    }

    /// Flip edges to evicted and audit each eviction, atomically.
    pub fn mark_evicted(&self, robot_id: i64, node_ids: &[i64]) -> EngramResult<usize> {
        if node_ids.is_empty() {
            return Ok(0);
        }
        self.in_transaction(|conn| {
            let updated = edge_ops::set_in_working_memory(conn, robot_id, node_ids, false)?;
            for node_id in node_ids {
                oplog::append(
                    conn,
                    Operation::Evict,
                    Some(*node_id),
                    Some(robot_id),
                    &serde_json::json!({}),
                )?;
            }
            Ok(updated)
        })
    }

    pub fn clear_working_memory_flags(&self, robot_id: i64) -> EngramResult<usize> {
        self.pool
            .writer
            .with_conn(|conn| edge_ops::clear_working_memory(conn, robot_id))
    }

    pub fn wm_node_ids(&self, robot_id: i64) -> EngramResult<Vec<i64>> {
        self.with_reader(|conn| edge_ops::wm_node_ids(conn, robot_id))
    }

    // ── Audit log ────────────────────────────────────────────────────────

    pub fn log_operation(
        &self,
        operation: Operation,
        node_id: Option<i64>,
        robot_id: Option<i64>,
        details: &serde_json::Value,
    ) -> EngramResult<i64> {
        self.pool
            .writer
            .with_conn(|conn| oplog::append(conn, operation, node_id, robot_id, details))
    }

    pub fn recent_operations(&self, limit: usize) -> EngramResult<Vec<OperationLogEntry>> {
        self.with_reader(|conn| oplog::recent(conn, limit))
    }

    // ── Channel & jobs ───────────────────────────────────────────────────

    pub fn publish_event(&self, channel: &str, payload: &str) -> EngramResult<i64> {
        self.pool
            .writer
            .with_conn(|conn| channel_ops::publish(conn, channel, payload))
    }

    pub fn events_after(&self, channel: &str, after_id: i64) -> EngramResult<Vec<(i64, String)>> {
        self.with_reader(|conn| channel_ops::events_after(conn, channel, after_id))
    }

    pub fn latest_event_id(&self, channel: &str) -> EngramResult<i64> {
        self.with_reader(|conn| channel_ops::latest_event_id(conn, channel))
    }

    pub fn enqueue_external_job(&self, job: &str) -> EngramResult<i64> {
        self.pool
            .writer
            .with_conn(|conn| channel_ops::enqueue_job(conn, job))
    }

    pub fn claim_external_jobs(&self, limit: usize) -> EngramResult<Vec<(i64, String)>> {
        self.pool
            .writer
            .with_conn(|conn| channel_ops::claim_jobs(conn, limit))
    }

    // ── Stats ────────────────────────────────────────────────────────────

    pub fn counts(&self) -> EngramResult<StoreCounts> {
        self.with_reader(|conn| {
            let count = |sql: &str| -> EngramResult<u64> {
                conn.query_row(sql, [], |row| row.get::<_, i64>(0))
                    .map(|v| v as u64)
                    .map_err(|e| to_storage_err(e.to_string()))
            };
            Ok(StoreCounts {
                nodes: count("SELECT COUNT(*) FROM nodes WHERE deleted_at IS NULL")?,
                robots: count("SELECT COUNT(*) FROM robots")?,
                edges: count("SELECT COUNT(*) FROM robot_nodes")?,
                tags: count("SELECT COUNT(*) FROM tags")?,
            })
        })
    }
}
