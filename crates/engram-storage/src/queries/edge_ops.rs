//! robot_nodes edges: per-(robot, node) statistics and the working-memory
//! flag that mirrors each robot's hot cache.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use engram_core::errors::EngramResult;
use engram_core::models::RobotNode;

use crate::to_storage_err;

/// Create the edge or increment its remember statistics.
pub fn link(conn: &Connection, robot_id: i64, node_id: i64) -> EngramResult<RobotNode> {
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO robot_nodes (
            robot_id, node_id, first_remembered_at, last_remembered_at,
            remember_count, in_working_memory
         ) VALUES (?1, ?2, ?3, ?3, 1, 0)
         ON CONFLICT(robot_id, node_id) DO UPDATE SET
            remember_count = remember_count + 1,
            last_remembered_at = excluded.last_remembered_at",
        params![robot_id, node_id, now],
    )
    .map_err(|e| to_storage_err(e.to_string()))?;
    get(conn, robot_id, node_id)?.ok_or_else(|| to_storage_err("edge vanished after link"))
}

/// Make sure the edge exists without touching remember statistics.
/// Used when a recall promotes a node the robot never remembered itself.
pub fn ensure(conn: &Connection, robot_id: i64, node_id: i64) -> EngramResult<()> {
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO robot_nodes (
            robot_id, node_id, first_remembered_at, last_remembered_at,
            remember_count, in_working_memory
         ) VALUES (?1, ?2, ?3, ?3, 1, 0)
         ON CONFLICT(robot_id, node_id) DO NOTHING",
        params![robot_id, node_id, now],
    )
    .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(())
}

pub fn get(conn: &Connection, robot_id: i64, node_id: i64) -> EngramResult<Option<RobotNode>> {
    let mut stmt = conn
        .prepare(
            "SELECT robot_id, node_id, first_remembered_at, last_remembered_at,
                    remember_count, in_working_memory
             FROM robot_nodes WHERE robot_id = ?1 AND node_id = ?2",
        )
        .map_err(|e| to_storage_err(e.to_string()))?;
    let result = stmt
        .query_row(params![robot_id, node_id], |row| Ok(parse_edge_row(row)))
        .optional()
        .map_err(|e| to_storage_err(e.to_string()))?;
    result.transpose()
}

/// Flip the working-memory flag for a batch of nodes of one robot.
/// Returns the number of edges updated.
pub fn set_in_working_memory(
    conn: &Connection,
    robot_id: i64,
    node_ids: &[i64],
    in_working_memory: bool,
) -> EngramResult<usize> {
    if node_ids.is_empty() {
        return Ok(0);
    }
    let placeholders: Vec<&str> = node_ids.iter().map(|_| "?").collect();
    let sql = format!(
        "UPDATE robot_nodes SET in_working_memory = ?1
         WHERE robot_id = ?2 AND node_id IN ({})",
        placeholders.join(", ")
    );
    let mut values: Vec<rusqlite::types::Value> = vec![
        rusqlite::types::Value::Integer(in_working_memory as i64),
        rusqlite::types::Value::Integer(robot_id),
    ];
    values.extend(
        node_ids
            .iter()
            .map(|id| rusqlite::types::Value::Integer(*id)),
    );
    conn.execute(&sql, rusqlite::params_from_iter(values))
        .map_err(|e| to_storage_err(e.to_string()))
}

/// Clear the working-memory flag on every edge of one robot. Returns the
/// number of edges cleared.
pub fn clear_working_memory(conn: &Connection, robot_id: i64) -> EngramResult<usize> {
    conn.execute(
        "UPDATE robot_nodes SET in_working_memory = 0
         WHERE robot_id = ?1 AND in_working_memory = 1",
        params![robot_id],
    )
    .map_err(|e| to_storage_err(e.to_string()))
}

/// Node ids currently flagged as in this robot's working memory.
pub fn wm_node_ids(conn: &Connection, robot_id: i64) -> EngramResult<Vec<i64>> {
    let mut stmt = conn
        .prepare(
            "SELECT node_id FROM robot_nodes
             WHERE robot_id = ?1 AND in_working_memory = 1
             ORDER BY node_id",
        )
        .map_err(|e| to_storage_err(e.to_string()))?;
    let rows = stmt
        .query_map(params![robot_id], |row| row.get::<_, i64>(0))
        .map_err(|e| to_storage_err(e.to_string()))?;
    rows.collect::<Result<Vec<_>, _>>()
        .map_err(|e| to_storage_err(e.to_string()))
}

fn parse_edge_row(row: &rusqlite::Row<'_>) -> EngramResult<RobotNode> {
    let parse_dt = |s: &str| -> EngramResult<chrono::DateTime<chrono::Utc>> {
        chrono::DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&chrono::Utc))
            .map_err(|e| to_storage_err(format!("parse datetime '{s}': {e}")))
    };
    let first: String = row.get(2).map_err(|e| to_storage_err(e.to_string()))?;
    let last: String = row.get(3).map_err(|e| to_storage_err(e.to_string()))?;
    Ok(RobotNode {
        robot_id: row.get(0).map_err(|e| to_storage_err(e.to_string()))?,
        node_id: row.get(1).map_err(|e| to_storage_err(e.to_string()))?,
        first_remembered_at: parse_dt(&first)?,
        last_remembered_at: parse_dt(&last)?,
        remember_count: row.get(4).map_err(|e| to_storage_err(e.to_string()))?,
        in_working_memory: row.get::<_, i64>(5).map_err(|e| to_storage_err(e.to_string()))? != 0,
    })
}
