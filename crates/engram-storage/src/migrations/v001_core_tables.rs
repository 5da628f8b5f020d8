//! v001: core tables — nodes, robots, robot_nodes, tags, operations_log.

use rusqlite::Connection;

use engram_core::errors::EngramResult;

use crate::to_storage_err;

pub fn migrate(conn: &Connection) -> EngramResult<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS nodes (
            id             INTEGER PRIMARY KEY AUTOINCREMENT,
            content        TEXT NOT NULL,
            content_hash   TEXT NOT NULL UNIQUE,
            token_count    INTEGER NOT NULL DEFAULT 0,
            embedding      BLOB,
            embedding_dims INTEGER,
            metadata       TEXT NOT NULL DEFAULT '{}',
            created_at     TEXT NOT NULL,
            updated_at     TEXT NOT NULL,
            last_accessed  TEXT NOT NULL,
            access_count   INTEGER NOT NULL DEFAULT 0,
            deleted_at     TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_nodes_created_at ON nodes(created_at);
        CREATE INDEX IF NOT EXISTS idx_nodes_deleted_at ON nodes(deleted_at);

        CREATE TABLE IF NOT EXISTS robots (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            name        TEXT NOT NULL,
            metadata    TEXT NOT NULL DEFAULT '{}',
            created_at  TEXT NOT NULL,
            last_active TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_robots_name ON robots(name);

        CREATE TABLE IF NOT EXISTS robot_nodes (
            robot_id            INTEGER NOT NULL REFERENCES robots(id) ON DELETE CASCADE,
            node_id             INTEGER NOT NULL REFERENCES nodes(id) ON DELETE CASCADE,
            first_remembered_at TEXT NOT NULL,
            last_remembered_at  TEXT NOT NULL,
            remember_count      INTEGER NOT NULL DEFAULT 1,
            in_working_memory   INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (robot_id, node_id)
        );

        CREATE INDEX IF NOT EXISTS idx_robot_nodes_robot ON robot_nodes(robot_id);

        CREATE TABLE IF NOT EXISTS tags (
            id         INTEGER PRIMARY KEY AUTOINCREMENT,
            node_id    INTEGER NOT NULL REFERENCES nodes(id) ON DELETE CASCADE,
            tag        TEXT NOT NULL,
            created_at TEXT NOT NULL,
            UNIQUE (node_id, tag)
        );

        CREATE INDEX IF NOT EXISTS idx_tags_tag ON tags(tag);

        CREATE TABLE IF NOT EXISTS operations_log (
            id       INTEGER PRIMARY KEY AUTOINCREMENT,
            ts       TEXT NOT NULL,
            operation TEXT NOT NULL,
            node_id  INTEGER REFERENCES nodes(id) ON DELETE SET NULL,
            robot_id INTEGER REFERENCES robots(id) ON DELETE SET NULL,
            details  TEXT NOT NULL DEFAULT '{}'
        );

        CREATE INDEX IF NOT EXISTS idx_oplog_ts ON operations_log(ts);
        ",
    )
    .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(())
}
