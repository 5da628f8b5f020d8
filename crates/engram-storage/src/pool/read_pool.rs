//! Pool of read-only connections, handed out round-robin. WAL keeps them
//! unblocked by the writer.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use rusqlite::Connection;

use engram_core::errors::EngramResult;

use super::pragmas::apply_read_pragmas;
use crate::timeout::with_deadline;
use crate::to_storage_err;

/// Upper bound on read connections regardless of configuration.
const MAX_POOL_SIZE: usize = 8;

pub struct ReadPool {
    connections: Vec<Mutex<Connection>>,
    next: AtomicUsize,
    query_timeout: Duration,
}

impl ReadPool {
    pub fn open(
        path: &Path,
        pool_size: usize,
        busy_timeout_ms: u64,
        query_timeout: Duration,
    ) -> EngramResult<Self> {
        let size = pool_size.clamp(1, MAX_POOL_SIZE);
        let mut connections = Vec::with_capacity(size);
        for _ in 0..size {
            let conn = Connection::open_with_flags(
                path,
                rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY
                    | rusqlite::OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )
            .map_err(|e| to_storage_err(e.to_string()))?;
            apply_read_pragmas(&conn, busy_timeout_ms)?;
            connections.push(Mutex::new(conn));
        }
        Ok(Self {
            connections,
            next: AtomicUsize::new(0),
            query_timeout,
        })
    }

    /// In-memory pool used only to keep `ConnectionPool` uniform; the
    /// engine never routes reads here in in-memory mode.
    pub(crate) fn open_in_memory(query_timeout: Duration) -> EngramResult<Self> {
        let conn = Connection::open_in_memory().map_err(|e| to_storage_err(e.to_string()))?;
        Ok(Self {
            connections: vec![Mutex::new(conn)],
            next: AtomicUsize::new(0),
            query_timeout,
        })
    }

    /// Execute a closure on the next read connection (round-robin), with
    /// the statement deadline armed.
    pub fn with_conn<F, T>(&self, f: F) -> EngramResult<T>
    where
        F: FnOnce(&Connection) -> EngramResult<T>,
    {
        let idx = self.next.fetch_add(1, Ordering::Relaxed) % self.connections.len();
        let guard = self.connections[idx]
            .lock()
            .map_err(|e| to_storage_err(format!("read pool lock poisoned: {e}")))?;
        with_deadline(&guard, self.query_timeout, f)
    }

    pub fn size(&self) -> usize {
        self.connections.len()
    }
}
