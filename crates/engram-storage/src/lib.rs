//! # engram-storage
//!
//! SQLite persistence for the memory store: a pooled connection layer
//! (single writer + read-only pool, WAL), versioned migrations, predicate
//! and sanitiser helpers, and typed query modules. `StorageEngine` is the
//! only entry point the rest of the workspace uses.

pub mod engine;
pub mod migrations;
pub mod pool;
pub mod predicates;
pub mod queries;
pub mod timeout;

pub use engine::StorageEngine;
pub use pool::ConnectionPool;

use engram_core::errors::EngramError;

/// Map an arbitrary storage failure message into the shared error type.
pub(crate) fn to_storage_err(message: impl Into<String>) -> EngramError {
    EngramError::DatabaseError(message.into())
}
