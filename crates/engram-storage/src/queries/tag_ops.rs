//! Tag rows: insertion, lookup, batch loading, tag-scoped node search,
//! and the ontology views.

use std::collections::HashMap;

use chrono::Utc;
use rusqlite::{params, Connection};

use engram_core::errors::EngramResult;
use engram_core::models::{Node, Timeframe};

use super::node_crud::{parse_node_row, NODE_COLUMNS};
use crate::predicates::timeframe_predicate;
use crate::to_storage_err;

/// Insert tags for a node, ignoring duplicates. Returns how many rows
/// were actually inserted.
pub fn insert_tags(conn: &Connection, node_id: i64, tags: &[String]) -> EngramResult<usize> {
    let now = Utc::now().to_rfc3339();
    let mut inserted = 0;
    for tag in tags {
        inserted += conn
            .execute(
                "INSERT OR IGNORE INTO tags (node_id, tag, created_at) VALUES (?1, ?2, ?3)",
                params![node_id, tag, now],
            )
            .map_err(|e| to_storage_err(e.to_string()))?;
    }
    Ok(inserted)
}

/// All tags of one node, sorted.
pub fn node_tags(conn: &Connection, node_id: i64) -> EngramResult<Vec<String>> {
    let mut stmt = conn
        .prepare("SELECT tag FROM tags WHERE node_id = ?1 ORDER BY tag")
        .map_err(|e| to_storage_err(e.to_string()))?;
    let rows = stmt
        .query_map(params![node_id], |row| row.get::<_, String>(0))
        .map_err(|e| to_storage_err(e.to_string()))?;
    rows.collect::<Result<Vec<_>, _>>()
        .map_err(|e| to_storage_err(e.to_string()))
}

/// Tags for many nodes in one statement.
pub fn batch_node_tags(
    conn: &Connection,
    node_ids: &[i64],
) -> EngramResult<HashMap<i64, Vec<String>>> {
    let mut map: HashMap<i64, Vec<String>> = HashMap::new();
    if node_ids.is_empty() {
        return Ok(map);
    }
    let placeholders: Vec<&str> = node_ids.iter().map(|_| "?").collect();
    let sql = format!(
        "SELECT node_id, tag FROM tags WHERE node_id IN ({}) ORDER BY node_id, tag",
        placeholders.join(", ")
    );
    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| to_storage_err(e.to_string()))?;
    let rows = stmt
        .query_map(rusqlite::params_from_iter(node_ids.iter().copied()), |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
        })
        .map_err(|e| to_storage_err(e.to_string()))?;
    for row in rows {
        let (node_id, tag) = row.map_err(|e| to_storage_err(e.to_string()))?;
        map.entry(node_id).or_default().push(tag);
    }
    Ok(map)
}

/// A sample of distinct tag names, most-used first. Fed to the tag
/// extractor to encourage vocabulary reuse.
pub fn distinct_tags(conn: &Connection, limit: usize) -> EngramResult<Vec<String>> {
    let mut stmt = conn
        .prepare(
            "SELECT tag FROM tags GROUP BY tag ORDER BY COUNT(*) DESC, tag LIMIT ?1",
        )
        .map_err(|e| to_storage_err(e.to_string()))?;
    let rows = stmt
        .query_map(params![limit as i64], |row| row.get::<_, String>(0))
        .map_err(|e| to_storage_err(e.to_string()))?;
    rows.collect::<Result<Vec<_>, _>>()
        .map_err(|e| to_storage_err(e.to_string()))
}

/// Nodes carrying any of `tags` (default) or all of them
/// (`match_all = true`), newest first.
pub fn search_by_tags(
    conn: &Connection,
    tags: &[String],
    match_all: bool,
    timeframe: &Timeframe,
    limit: usize,
) -> EngramResult<Vec<Node>> {
    if tags.is_empty() {
        return Ok(Vec::new());
    }
    let placeholders: Vec<&str> = tags.iter().map(|_| "?").collect();
    let mut sql = format!(
        "SELECT {NODE_COLUMNS} FROM nodes
         WHERE deleted_at IS NULL AND id IN (
             SELECT node_id FROM tags WHERE tag IN ({})
             GROUP BY node_id{}
         )",
        placeholders.join(", "),
        if match_all {
            format!(" HAVING COUNT(DISTINCT tag) = {}", tags.len())
        } else {
            String::new()
        }
    );
    let mut params: Vec<rusqlite::types::Value> = tags
        .iter()
        .map(|t| rusqlite::types::Value::Text(t.clone()))
        .collect();

    if let Some(p) = timeframe_predicate("created_at", timeframe) {
        sql.push_str(&format!(" AND {}", p.sql));
        params.extend(p.params);
    }
    sql.push_str(" ORDER BY created_at DESC LIMIT ?");
    params.push(rusqlite::types::Value::Integer(limit as i64));

    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| to_storage_err(e.to_string()))?;
    let rows = stmt
        .query_map(rusqlite::params_from_iter(params), |row| {
            Ok(parse_node_row(row))
        })
        .map_err(|e| to_storage_err(e.to_string()))?;

    let mut results = Vec::new();
    for row in rows {
        results.push(row.map_err(|e| to_storage_err(e.to_string()))??);
    }
    Ok(results)
}

/// Rows of the `ontology_structure` view: (root, full path).
pub fn ontology_structure(conn: &Connection) -> EngramResult<Vec<(String, String)>> {
    let mut stmt = conn
        .prepare("SELECT root, path FROM ontology_structure ORDER BY root, path")
        .map_err(|e| to_storage_err(e.to_string()))?;
    let rows = stmt
        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))
        .map_err(|e| to_storage_err(e.to_string()))?;
    rows.collect::<Result<Vec<_>, _>>()
        .map_err(|e| to_storage_err(e.to_string()))
}

/// Rows of the `topic_relationships` view: tag pairs sharing >= 2 nodes.
pub fn topic_relationships(conn: &Connection) -> EngramResult<Vec<(String, String, i64)>> {
    let mut stmt = conn
        .prepare(
            "SELECT tag_a, tag_b, shared_nodes FROM topic_relationships
             ORDER BY shared_nodes DESC, tag_a, tag_b",
        )
        .map_err(|e| to_storage_err(e.to_string()))?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
            ))
        })
        .map_err(|e| to_storage_err(e.to_string()))?;
    rows.collect::<Result<Vec<_>, _>>()
        .map_err(|e| to_storage_err(e.to_string()))
}
