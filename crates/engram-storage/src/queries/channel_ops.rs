//! The channel event log backing pub/sub, and the external job queue.

use chrono::Utc;
use rusqlite::{params, Connection};

use engram_core::errors::EngramResult;

use crate::to_storage_err;

/// Append a payload to a channel. Returns the event id.
pub fn publish(conn: &Connection, channel: &str, payload: &str) -> EngramResult<i64> {
    conn.execute(
        "INSERT INTO channel_events (channel, payload, created_at) VALUES (?1, ?2, ?3)",
        params![channel, payload, Utc::now().to_rfc3339()],
    )
    .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(conn.last_insert_rowid())
}

/// Events on a channel with id greater than `after_id`, oldest first.
pub fn events_after(
    conn: &Connection,
    channel: &str,
    after_id: i64,
) -> EngramResult<Vec<(i64, String)>> {
    let mut stmt = conn
        .prepare(
            "SELECT id, payload FROM channel_events
             WHERE channel = ?1 AND id > ?2 ORDER BY id",
        )
        .map_err(|e| to_storage_err(e.to_string()))?;
    let rows = stmt
        .query_map(params![channel, after_id], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
        })
        .map_err(|e| to_storage_err(e.to_string()))?;
    rows.collect::<Result<Vec<_>, _>>()
        .map_err(|e| to_storage_err(e.to_string()))
}

/// Highest event id currently on a channel (0 when empty). Listeners
/// start from here so only new notifications are delivered.
pub fn latest_event_id(conn: &Connection, channel: &str) -> EngramResult<i64> {
    conn.query_row(
        "SELECT COALESCE(MAX(id), 0) FROM channel_events WHERE channel = ?1",
        params![channel],
        |row| row.get(0),
    )
    .map_err(|e| to_storage_err(e.to_string()))
}

/// Serialise a job reference for the host process to drain.
pub fn enqueue_job(conn: &Connection, job: &str) -> EngramResult<i64> {
    conn.execute(
        "INSERT INTO job_queue (job, created_at) VALUES (?1, ?2)",
        params![job, Utc::now().to_rfc3339()],
    )
    .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(conn.last_insert_rowid())
}

/// Claim up to `limit` unclaimed jobs, oldest first. Claiming marks them
/// so a concurrent drainer does not pick them up again.
pub fn claim_jobs(conn: &Connection, limit: usize) -> EngramResult<Vec<(i64, String)>> {
    let mut stmt = conn
        .prepare(
            "SELECT id, job FROM job_queue
             WHERE claimed_at IS NULL ORDER BY id LIMIT ?1",
        )
        .map_err(|e| to_storage_err(e.to_string()))?;
    let rows = stmt
        .query_map(params![limit as i64], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
        })
        .map_err(|e| to_storage_err(e.to_string()))?;
    let jobs: Vec<(i64, String)> = rows
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| to_storage_err(e.to_string()))?;

    let now = Utc::now().to_rfc3339();
    for (id, _) in &jobs {
        conn.execute(
            "UPDATE job_queue SET claimed_at = ?2 WHERE id = ?1",
            params![id, now],
        )
        .map_err(|e| to_storage_err(e.to_string()))?;
    }
    Ok(jobs)
}
