//! Robot registry rows.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use engram_core::errors::EngramResult;
use engram_core::models::Robot;

use crate::to_storage_err;

/// Register a robot by name, reusing the existing row when the name is
/// already known (registration is idempotent on name).
pub fn register(conn: &Connection, name: &str) -> EngramResult<Robot> {
    if let Some(robot) = find_by_name(conn, name)? {
        touch(conn, robot.id)?;
        return get(conn, robot.id)?.ok_or_else(|| to_storage_err("robot vanished during touch"));
    }

    let now = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO robots (name, metadata, created_at, last_active)
         VALUES (?1, '{}', ?2, ?2)",
        params![name, now],
    )
    .map_err(|e| to_storage_err(e.to_string()))?;
    let id = conn.last_insert_rowid();
    get(conn, id)?.ok_or_else(|| to_storage_err("robot vanished after insert"))
}

pub fn get(conn: &Connection, id: i64) -> EngramResult<Option<Robot>> {
    let mut stmt = conn
        .prepare("SELECT id, name, metadata, created_at, last_active FROM robots WHERE id = ?1")
        .map_err(|e| to_storage_err(e.to_string()))?;
    let result = stmt
        .query_row(params![id], |row| Ok(parse_robot_row(row)))
        .optional()
        .map_err(|e| to_storage_err(e.to_string()))?;
    result.transpose()
}

pub fn find_by_name(conn: &Connection, name: &str) -> EngramResult<Option<Robot>> {
    let mut stmt = conn
        .prepare(
            "SELECT id, name, metadata, created_at, last_active FROM robots
             WHERE name = ?1 ORDER BY id LIMIT 1",
        )
        .map_err(|e| to_storage_err(e.to_string()))?;
    let result = stmt
        .query_row(params![name], |row| Ok(parse_robot_row(row)))
        .optional()
        .map_err(|e| to_storage_err(e.to_string()))?;
    result.transpose()
}

/// Refresh last_active.
pub fn touch(conn: &Connection, id: i64) -> EngramResult<()> {
    conn.execute(
        "UPDATE robots SET last_active = ?2 WHERE id = ?1",
        params![id, Utc::now().to_rfc3339()],
    )
    .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(())
}

fn parse_robot_row(row: &rusqlite::Row<'_>) -> EngramResult<Robot> {
    let metadata_json: String = row.get(2).map_err(|e| to_storage_err(e.to_string()))?;
    let metadata = serde_json::from_str(&metadata_json)
        .map_err(|e| to_storage_err(format!("parse robot metadata: {e}")))?;
    let parse_dt = |s: &str| -> EngramResult<chrono::DateTime<chrono::Utc>> {
        chrono::DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&chrono::Utc))
            .map_err(|e| to_storage_err(format!("parse datetime '{s}': {e}")))
    };
    let created_at: String = row.get(3).map_err(|e| to_storage_err(e.to_string()))?;
    let last_active: String = row.get(4).map_err(|e| to_storage_err(e.to_string()))?;
    Ok(Robot {
        id: row.get(0).map_err(|e| to_storage_err(e.to_string()))?,
        name: row.get(1).map_err(|e| to_storage_err(e.to_string()))?,
        metadata,
        created_at: parse_dt(&created_at)?,
        last_active: parse_dt(&last_active)?,
    })
}
