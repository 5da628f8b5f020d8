//! FTS5 full-text queries: ranked search and the hybrid prefilter stage.

use rusqlite::Connection;

use engram_core::errors::EngramResult;
use engram_core::models::{Node, Timeframe};

use super::node_crud::parse_node_row;
use crate::predicates::{metadata_predicate, timeframe_predicate};
use crate::to_storage_err;

/// Full-text search ranked by bm25. Returns (node, rank) pairs; smaller
/// rank values are better, matching the FTS5 convention.
pub fn search_fulltext(
    conn: &Connection,
    match_string: &str,
    timeframe: &Timeframe,
    metadata: &serde_json::Map<String, serde_json::Value>,
    limit: usize,
) -> EngramResult<Vec<(Node, f64)>> {
    let mut sql = String::from(
        "SELECT n.id, n.content, n.content_hash, n.token_count, n.embedding,
                n.embedding_dims, n.metadata, n.created_at, n.updated_at,
                n.last_accessed, n.access_count, n.deleted_at,
                bm25(nodes_fts) AS rank
         FROM nodes_fts fts
         JOIN nodes n ON n.id = fts.rowid
         WHERE nodes_fts MATCH ? AND n.deleted_at IS NULL",
    );
    let mut params: Vec<rusqlite::types::Value> =
        vec![rusqlite::types::Value::Text(match_string.to_string())];

    if let Some(p) = timeframe_predicate("n.created_at", timeframe) {
        sql.push_str(&format!(" AND {}", p.sql));
        params.extend(p.params);
    }
    if let Some(p) = metadata_predicate("n.metadata", metadata)? {
        sql.push_str(&format!(" AND {}", p.sql));
        params.extend(p.params);
    }
    sql.push_str(" ORDER BY rank LIMIT ?");
    params.push(rusqlite::types::Value::Integer(limit as i64));

    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| to_storage_err(e.to_string()))?;
    let rows = stmt
        .query_map(rusqlite::params_from_iter(params), |row| {
            let rank: f64 = row.get(12)?;
            Ok((parse_node_row(row), rank))
        })
        .map_err(|e| to_storage_err(e.to_string()))?;

    let mut results = Vec::new();
    for row in rows {
        let (node, rank) = row.map_err(|e| to_storage_err(e.to_string()))?;
        results.push((node?, rank));
    }
    Ok(results)
}

/// The hybrid prefilter: up to `prefilter_limit` candidate ids selected by
/// full-text match, best-ranked first. The caller reranks them by vector
/// distance.
pub fn fulltext_candidates(
    conn: &Connection,
    match_string: &str,
    timeframe: &Timeframe,
    metadata: &serde_json::Map<String, serde_json::Value>,
    prefilter_limit: usize,
) -> EngramResult<Vec<i64>> {
    let mut sql = String::from(
        "WITH candidates AS (
             SELECT n.id AS id, bm25(nodes_fts) AS rank
             FROM nodes_fts fts
             JOIN nodes n ON n.id = fts.rowid
             WHERE nodes_fts MATCH ? AND n.deleted_at IS NULL",
    );
    let mut params: Vec<rusqlite::types::Value> =
        vec![rusqlite::types::Value::Text(match_string.to_string())];

    if let Some(p) = timeframe_predicate("n.created_at", timeframe) {
        sql.push_str(&format!(" AND {}", p.sql));
        params.extend(p.params);
    }
    if let Some(p) = metadata_predicate("n.metadata", metadata)? {
        sql.push_str(&format!(" AND {}", p.sql));
        params.extend(p.params);
    }
    sql.push_str(
        " ORDER BY rank LIMIT ?
         )
         SELECT id FROM candidates",
    );
    params.push(rusqlite::types::Value::Integer(prefilter_limit as i64));

    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| to_storage_err(e.to_string()))?;
    let rows = stmt
        .query_map(rusqlite::params_from_iter(params), |row| {
            row.get::<_, i64>(0)
        })
        .map_err(|e| to_storage_err(e.to_string()))?;

    rows.collect::<Result<Vec<_>, _>>()
        .map_err(|e| to_storage_err(e.to_string()))
}
