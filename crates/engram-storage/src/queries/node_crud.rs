//! Insert, dedup-upsert, get, delete, restore, and access tracking for nodes.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use engram_core::errors::EngramResult;
use engram_core::models::Node;

use super::vector_search::{bytes_to_f32_vec, f32_vec_to_bytes};
use crate::to_storage_err;

/// Column list shared by every node SELECT.
pub(crate) const NODE_COLUMNS: &str = "id, content, content_hash, token_count, embedding, \
     embedding_dims, metadata, created_at, updated_at, last_accessed, access_count, deleted_at";

/// Fields of a node about to be inserted.
pub struct NewNode<'a> {
    pub content: &'a str,
    pub content_hash: &'a str,
    pub token_count: i64,
    pub metadata: &'a serde_json::Map<String, serde_json::Value>,
    pub embedding: Option<&'a [f32]>,
}

/// Insert a node, or reuse the row carrying the same content hash.
/// Returns the node and whether it was newly created.
///
/// A soft-deleted row with the same hash is revived: content_hash is
/// unique, so remembering previously-forgotten content brings the old
/// node back rather than duplicating it.
pub fn upsert_by_hash(conn: &Connection, new: &NewNode<'_>) -> EngramResult<(Node, bool)> {
    if let Some(existing) = find_by_hash(conn, new.content_hash, true)? {
        let now = Utc::now().to_rfc3339();
        if existing.is_deleted() {
            conn.execute(
                "UPDATE nodes SET deleted_at = NULL, updated_at = ?2, last_accessed = ?2
                 WHERE id = ?1",
                params![existing.id, now],
            )
            .map_err(|e| to_storage_err(e.to_string()))?;
        } else {
            conn.execute(
                "UPDATE nodes SET last_accessed = ?2 WHERE id = ?1",
                params![existing.id, now],
            )
            .map_err(|e| to_storage_err(e.to_string()))?;
        }
        let node = get_node(conn, existing.id, false)?
            .ok_or_else(|| to_storage_err("node vanished during upsert"))?;
        return Ok((node, false));
    }

    let now = Utc::now().to_rfc3339();
    let metadata_json =
        serde_json::to_string(new.metadata).map_err(|e| to_storage_err(e.to_string()))?;
    let embedding_blob = new.embedding.map(f32_vec_to_bytes);
    let embedding_dims = new.embedding.map(|v| v.len() as i64);

    conn.execute(
        "INSERT INTO nodes (
            content, content_hash, token_count, embedding, embedding_dims,
            metadata, created_at, updated_at, last_accessed, access_count
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7, ?7, 0)",
        params![
            new.content,
            new.content_hash,
            new.token_count,
            embedding_blob,
            embedding_dims,
            metadata_json,
            now,
        ],
    )
    .map_err(|e| to_storage_err(e.to_string()))?;

    let id = conn.last_insert_rowid();
    let node =
        get_node(conn, id, false)?.ok_or_else(|| to_storage_err("node vanished after insert"))?;
    Ok((node, true))
}

/// Get a node by id. Soft-deleted rows are filtered out unless opted in.
pub fn get_node(conn: &Connection, id: i64, include_deleted: bool) -> EngramResult<Option<Node>> {
    let filter = if include_deleted {
        ""
    } else {
        " AND deleted_at IS NULL"
    };
    let sql = format!("SELECT {NODE_COLUMNS} FROM nodes WHERE id = ?1{filter}");
    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| to_storage_err(e.to_string()))?;
    let result = stmt
        .query_row(params![id], |row| Ok(parse_node_row(row)))
        .optional()
        .map_err(|e| to_storage_err(e.to_string()))?;
    result.transpose()
}

/// Look a node up by content hash.
pub fn find_by_hash(
    conn: &Connection,
    content_hash: &str,
    include_deleted: bool,
) -> EngramResult<Option<Node>> {
    let filter = if include_deleted {
        ""
    } else {
        " AND deleted_at IS NULL"
    };
    let sql = format!("SELECT {NODE_COLUMNS} FROM nodes WHERE content_hash = ?1{filter}");
    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| to_storage_err(e.to_string()))?;
    let result = stmt
        .query_row(params![content_hash], |row| Ok(parse_node_row(row)))
        .optional()
        .map_err(|e| to_storage_err(e.to_string()))?;
    result.transpose()
}

/// Whether a non-deleted node with this id exists.
pub fn exists(conn: &Connection, id: i64) -> EngramResult<bool> {
    let count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM nodes WHERE id = ?1 AND deleted_at IS NULL",
            params![id],
            |row| row.get(0),
        )
        .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(count > 0)
}

/// Bump access_count and last_accessed for one node, returning the
/// refreshed row.
pub fn touch_access(
    conn: &Connection,
    id: i64,
    include_deleted: bool,
) -> EngramResult<Option<Node>> {
    let rows = conn
        .execute(
            "UPDATE nodes SET access_count = access_count + 1, last_accessed = ?2
             WHERE id = ?1",
            params![id, Utc::now().to_rfc3339()],
        )
        .map_err(|e| to_storage_err(e.to_string()))?;
    if rows == 0 {
        return Ok(None);
    }
    get_node(conn, id, include_deleted)
}

/// Bulk access tracking: one statement per batch, not per node.
pub fn track_access(conn: &Connection, ids: &[i64]) -> EngramResult<usize> {
    if ids.is_empty() {
        return Ok(0);
    }
    let placeholders: Vec<&str> = ids.iter().map(|_| "?").collect();
    let sql = format!(
        "UPDATE nodes SET access_count = access_count + 1, last_accessed = ?1
         WHERE id IN ({})",
        placeholders.join(", ")
    );
    let mut values: Vec<rusqlite::types::Value> =
        vec![rusqlite::types::Value::Text(Utc::now().to_rfc3339())];
    values.extend(ids.iter().map(|id| rusqlite::types::Value::Integer(*id)));
    conn.execute(&sql, rusqlite::params_from_iter(values))
        .map_err(|e| to_storage_err(e.to_string()))
}

/// Set deleted_at on a node. Returns false when the id is unknown or
/// already deleted.
pub fn soft_delete(conn: &Connection, id: i64) -> EngramResult<bool> {
    let rows = conn
        .execute(
            "UPDATE nodes SET deleted_at = ?2, updated_at = ?2
             WHERE id = ?1 AND deleted_at IS NULL",
            params![id, Utc::now().to_rfc3339()],
        )
        .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(rows > 0)
}

/// Remove the node row entirely. Tags and edges cascade; operations_log
/// rows are retained with node_id nulled by the FK action.
pub fn hard_delete(conn: &Connection, id: i64) -> EngramResult<bool> {
    let rows = conn
        .execute("DELETE FROM nodes WHERE id = ?1", params![id])
        .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(rows > 0)
}

/// Clear deleted_at. Returns false when the id is unknown or not deleted.
pub fn restore(conn: &Connection, id: i64) -> EngramResult<bool> {
    let rows = conn
        .execute(
            "UPDATE nodes SET deleted_at = NULL, updated_at = ?2
             WHERE id = ?1 AND deleted_at IS NOT NULL",
            params![id, Utc::now().to_rfc3339()],
        )
        .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(rows > 0)
}

/// Persist an embedding for a node (idempotent upsert by node id).
pub fn set_embedding(conn: &Connection, id: i64, embedding: &[f32]) -> EngramResult<bool> {
    let rows = conn
        .execute(
            "UPDATE nodes SET embedding = ?2, embedding_dims = ?3, updated_at = ?4
             WHERE id = ?1",
            params![
                id,
                f32_vec_to_bytes(embedding),
                embedding.len() as i64,
                Utc::now().to_rfc3339(),
            ],
        )
        .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(rows > 0)
}

/// Parse a row from the nodes table, in `NODE_COLUMNS` order.
pub(crate) fn parse_node_row(row: &rusqlite::Row<'_>) -> EngramResult<Node> {
    let metadata_json: String = row.get(6).map_err(|e| to_storage_err(e.to_string()))?;
    let metadata: serde_json::Map<String, serde_json::Value> =
        serde_json::from_str(&metadata_json)
            .map_err(|e| to_storage_err(format!("parse metadata: {e}")))?;

    let embedding_blob: Option<Vec<u8>> = row.get(4).map_err(|e| to_storage_err(e.to_string()))?;
    let embedding_dims: Option<i64> = row.get(5).map_err(|e| to_storage_err(e.to_string()))?;
    let embedding = embedding_blob
        .map(|blob| bytes_to_f32_vec(&blob, embedding_dims.unwrap_or(0).max(0) as usize));

    let parse_dt = |s: &str| -> EngramResult<chrono::DateTime<chrono::Utc>> {
        chrono::DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&chrono::Utc))
            .map_err(|e| to_storage_err(format!("parse datetime '{s}': {e}")))
    };

    let created_at: String = row.get(7).map_err(|e| to_storage_err(e.to_string()))?;
    let updated_at: String = row.get(8).map_err(|e| to_storage_err(e.to_string()))?;
    let last_accessed: String = row.get(9).map_err(|e| to_storage_err(e.to_string()))?;
    let deleted_at: Option<String> = row.get(11).map_err(|e| to_storage_err(e.to_string()))?;

    Ok(Node {
        id: row.get(0).map_err(|e| to_storage_err(e.to_string()))?,
        content: row.get(1).map_err(|e| to_storage_err(e.to_string()))?,
        content_hash: row.get(2).map_err(|e| to_storage_err(e.to_string()))?,
        token_count: row.get(3).map_err(|e| to_storage_err(e.to_string()))?,
        embedding,
        metadata,
        created_at: parse_dt(&created_at)?,
        updated_at: parse_dt(&updated_at)?,
        last_accessed: parse_dt(&last_accessed)?,
        access_count: row.get(10).map_err(|e| to_storage_err(e.to_string()))?,
        deleted_at: deleted_at.as_deref().map(parse_dt).transpose()?,
    })
}
