//! Connection pool managing the writer and the read connections.

pub mod pragmas;
pub mod read_pool;
pub mod write_connection;

use std::path::{Path, PathBuf};
use std::time::Duration;

use engram_core::errors::EngramResult;

pub use read_pool::ReadPool;
pub use write_connection::WriteConnection;

/// The single write connection plus the read pool.
pub struct ConnectionPool {
    pub writer: WriteConnection,
    pub readers: ReadPool,
    pub db_path: Option<PathBuf>,
}

impl ConnectionPool {
    /// Open a pool for the given database file.
    pub fn open(
        path: &Path,
        pool_size: usize,
        busy_timeout_ms: u64,
        query_timeout: Duration,
    ) -> EngramResult<Self> {
        let writer = WriteConnection::open(path, busy_timeout_ms, query_timeout)?;
        let readers = ReadPool::open(path, pool_size, busy_timeout_ms, query_timeout)?;
        Ok(Self {
            writer,
            readers,
            db_path: Some(path.to_path_buf()),
        })
    }

    /// Open an in-memory pool (for testing). In-memory read connections
    /// would be isolated databases, so only the writer is usable; the
    /// engine routes all reads through it.
    pub fn open_in_memory(query_timeout: Duration) -> EngramResult<Self> {
        let writer = WriteConnection::open_in_memory(query_timeout)?;
        // A read handle is still constructed so the struct shape is uniform,
        // pointing at its own private database. The engine never uses it in
        // in-memory mode.
        let readers = ReadPool::open_in_memory(query_timeout)?;
        Ok(Self {
            writer,
            readers,
            db_path: None,
        })
    }
}
