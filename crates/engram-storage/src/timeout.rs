//! Per-statement deadlines via the SQLite progress handler.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rusqlite::Connection;

use engram_core::errors::{EngramError, EngramResult};

/// How many VM ops between progress-handler invocations.
const PROGRESS_GRANULARITY: i32 = 4096;

/// Run `f` with a statement deadline armed on `conn`.
///
/// When the deadline fires, the in-flight statement is interrupted and the
/// resulting error is rewritten to `QueryTimeout`. A zero timeout disables
/// the deadline.
pub fn with_deadline<T>(
    conn: &Connection,
    timeout: Duration,
    f: impl FnOnce(&Connection) -> EngramResult<T>,
) -> EngramResult<T> {
    if timeout.is_zero() {
        return f(conn);
    }

    let fired = Arc::new(AtomicBool::new(false));
    let deadline = Instant::now() + timeout;
    let flag = Arc::clone(&fired);
    conn.progress_handler(
        PROGRESS_GRANULARITY,
        Some(move || {
            if Instant::now() >= deadline {
                flag.store(true, Ordering::SeqCst);
                true
            } else {
                false
            }
        }),
    );

    let result = f(conn);
    conn.progress_handler(PROGRESS_GRANULARITY, None::<fn() -> bool>);

    match result {
        Err(_) if fired.load(Ordering::SeqCst) => Err(EngramError::QueryTimeout {
            timeout_ms: timeout.as_millis() as u64,
        }),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fast_statement_passes() {
        let conn = Connection::open_in_memory().unwrap();
        let result = with_deadline(&conn, Duration::from_secs(5), |conn| {
            conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
                .map_err(|e| EngramError::DatabaseError(e.to_string()))
        });
        assert_eq!(result.unwrap(), 1);
    }

    #[test]
    fn expired_deadline_yields_query_timeout() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (x INTEGER)").unwrap();
        // A deadline already in the past fires on the first progress check.
        let result = with_deadline(&conn, Duration::from_nanos(1), |conn| {
            // Recursive CTE grinds through enough VM ops to hit the handler.
            conn.query_row(
                "WITH RECURSIVE c(n) AS (SELECT 1 UNION ALL SELECT n + 1 FROM c WHERE n < 1000000)
                 SELECT count(*) FROM c",
                [],
                |row| row.get::<_, i64>(0),
            )
            .map_err(|e| EngramError::DatabaseError(e.to_string()))
        });
        assert!(matches!(result, Err(EngramError::QueryTimeout { .. })));
    }
}
