//! The single write connection, serialised behind a mutex.

use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use rusqlite::Connection;

use engram_core::errors::EngramResult;

use super::pragmas::apply_pragmas;
use crate::timeout::with_deadline;
use crate::to_storage_err;

/// Owns the one connection allowed to write. WAL mode lets readers proceed
/// while a write is in flight.
pub struct WriteConnection {
    conn: Mutex<Connection>,
    query_timeout: Duration,
}

impl WriteConnection {
    pub fn open(path: &Path, busy_timeout_ms: u64, query_timeout: Duration) -> EngramResult<Self> {
        let conn = Connection::open(path).map_err(|e| to_storage_err(e.to_string()))?;
        apply_pragmas(&conn, busy_timeout_ms)?;
        Ok(Self {
            conn: Mutex::new(conn),
            query_timeout,
        })
    }

    pub fn open_in_memory(query_timeout: Duration) -> EngramResult<Self> {
        let conn = Connection::open_in_memory().map_err(|e| to_storage_err(e.to_string()))?;
        apply_pragmas(&conn, 5_000)?;
        Ok(Self {
            conn: Mutex::new(conn),
            query_timeout,
        })
    }

    /// Execute a closure on the write connection with the statement
    /// deadline armed.
    pub fn with_conn<F, T>(&self, f: F) -> EngramResult<T>
    where
        F: FnOnce(&Connection) -> EngramResult<T>,
    {
        let guard = self
            .conn
            .lock()
            .map_err(|e| to_storage_err(format!("write connection lock poisoned: {e}")))?;
        with_deadline(&guard, self.query_timeout, f)
    }
}
