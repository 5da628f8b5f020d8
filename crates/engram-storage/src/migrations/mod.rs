//! Versioned schema migrations, applied through a `schema_migrations`
//! ledger on every engine open.

mod v001_core_tables;
mod v002_search;
mod v003_channel_and_jobs;

use rusqlite::Connection;

use engram_core::errors::EngramResult;

use crate::to_storage_err;

/// All migrations in apply order.
const MIGRATIONS: &[(u32, fn(&Connection) -> EngramResult<()>)] = &[
    (1, v001_core_tables::migrate),
    (2, v002_search::migrate),
    (3, v003_channel_and_jobs::migrate),
];

/// Apply any migration newer than the ledger's high-water mark.
pub fn run_migrations(conn: &Connection) -> EngramResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version    INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL
        )",
    )
    .map_err(|e| to_storage_err(e.to_string()))?;

    let current: u32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .map_err(|e| to_storage_err(e.to_string()))?;

    for (version, migrate) in MIGRATIONS {
        if *version <= current {
            continue;
        }
        tracing::info!(version, "applying migration");
        migrate(conn)?;
        conn.execute(
            "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
            rusqlite::params![version, chrono::Utc::now().to_rfc3339()],
        )
        .map_err(|e| to_storage_err(e.to_string()))?;
    }
    Ok(())
}

/// Highest applied migration version.
pub fn schema_version(conn: &Connection) -> EngramResult<u32> {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )
    .map_err(|e| to_storage_err(e.to_string()))
}
