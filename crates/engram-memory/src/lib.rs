//! # engram-memory
//!
//! The two-tier memory engine: a durable content-addressed long-term
//! store with vector/full-text/hybrid/relevance retrieval, and the
//! token-budgeted per-agent working memory.

pub mod ltm;
pub mod query_cache;
pub mod relevance;
pub mod wm;

pub use ltm::{LongTermMemory, LtmStats};
pub use query_cache::{CacheStats, QueryCache};
pub use relevance::RelevanceSignals;
pub use wm::{ContextStrategy, EntrySource, WmAdd, WmEntry, WorkingMemory};
