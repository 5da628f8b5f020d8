//! v003: channel event log (pub/sub over the shared primary) and the
//! external job queue.

use rusqlite::Connection;

use engram_core::errors::EngramResult;

use crate::to_storage_err;

pub fn migrate(conn: &Connection) -> EngramResult<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS channel_events (
            id         INTEGER PRIMARY KEY AUTOINCREMENT,
            channel    TEXT NOT NULL,
            payload    TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_channel_events_channel
            ON channel_events(channel, id);

        CREATE TABLE IF NOT EXISTS job_queue (
            id         INTEGER PRIMARY KEY AUTOINCREMENT,
            job        TEXT NOT NULL,
            created_at TEXT NOT NULL,
            claimed_at TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_job_queue_unclaimed
            ON job_queue(claimed_at) WHERE claimed_at IS NULL;
        ",
    )
    .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(())
}
