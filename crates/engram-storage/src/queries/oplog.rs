//! The append-only operations log.

use chrono::Utc;
use rusqlite::{params, Connection};

use engram_core::errors::EngramResult;
use engram_core::models::{Operation, OperationLogEntry};

use crate::to_storage_err;

/// Append one audit row.
pub fn append(
    conn: &Connection,
    operation: Operation,
    node_id: Option<i64>,
    robot_id: Option<i64>,
    details: &serde_json::Value,
) -> EngramResult<i64> {
    conn.execute(
        "INSERT INTO operations_log (ts, operation, node_id, robot_id, details)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            Utc::now().to_rfc3339(),
            operation.as_str(),
            node_id,
            robot_id,
            serde_json::to_string(details).map_err(|e| to_storage_err(e.to_string()))?,
        ],
    )
    .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(conn.last_insert_rowid())
}

/// Most recent audit rows, newest first.
pub fn recent(conn: &Connection, limit: usize) -> EngramResult<Vec<OperationLogEntry>> {
    let mut stmt = conn
        .prepare(
            "SELECT id, ts, operation, node_id, robot_id, details
             FROM operations_log ORDER BY id DESC LIMIT ?1",
        )
        .map_err(|e| to_storage_err(e.to_string()))?;
    let rows = stmt
        .query_map(params![limit as i64], |row| Ok(parse_log_row(row)))
        .map_err(|e| to_storage_err(e.to_string()))?;

    let mut results = Vec::new();
    for row in rows {
        results.push(row.map_err(|e| to_storage_err(e.to_string()))??);
    }
    Ok(results)
}

fn parse_log_row(row: &rusqlite::Row<'_>) -> EngramResult<OperationLogEntry> {
    let ts: String = row.get(1).map_err(|e| to_storage_err(e.to_string()))?;
    let op_str: String = row.get(2).map_err(|e| to_storage_err(e.to_string()))?;
    let details_json: String = row.get(5).map_err(|e| to_storage_err(e.to_string()))?;

    Ok(OperationLogEntry {
        id: row.get(0).map_err(|e| to_storage_err(e.to_string()))?,
        ts: chrono::DateTime::parse_from_rfc3339(&ts)
            .map(|dt| dt.with_timezone(&chrono::Utc))
            .map_err(|e| to_storage_err(format!("parse datetime '{ts}': {e}")))?,
        operation: Operation::parse(&op_str)
            .ok_or_else(|| to_storage_err(format!("unknown operation '{op_str}'")))?,
        node_id: row.get(3).map_err(|e| to_storage_err(e.to_string()))?,
        robot_id: row.get(4).map_err(|e| to_storage_err(e.to_string()))?,
        details: serde_json::from_str(&details_json)
            .map_err(|e| to_storage_err(format!("parse details: {e}")))?,
    })
}
