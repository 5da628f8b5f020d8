//! Shared test helpers for the workspace's integration suites.

use std::sync::Arc;

use engram_agent::Store;
use engram_core::config::{Config, JobBackendKind};

/// A config wired for tests: in-memory database, deterministic fallback
/// providers, small embedding dimensions, inline jobs.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.database.path = ":memory:".to_string();
    config.embedding.provider = "fallback".to_string();
    config.embedding.dimensions = 64;
    config.embedding.max_index_dimensions = 128;
    config.tag.provider = "fallback".to_string();
    config.job.backend = JobBackendKind::Inline;
    config.working_memory.max_tokens = 1024;
    config
}

/// Same, but file-backed inside the given tempdir (needed whenever a
/// channel listener must observe another connection's writes).
pub fn test_config_at(dir: &tempfile::TempDir) -> Config {
    let mut config = test_config();
    config.database.path = dir
        .path()
        .join("engram-test.db")
        .to_string_lossy()
        .into_owned();
    config
}

/// Install a test subscriber once, honouring `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Open a store over the in-memory test config.
pub fn open_store() -> Arc<Store> {
    init_tracing();
    Store::open(test_config()).expect("test store opens")
}

/// Open a file-backed store for channel tests.
pub fn open_store_at(dir: &tempfile::TempDir) -> Arc<Store> {
    init_tracing();
    Store::open(test_config_at(dir)).expect("test store opens")
}

/// Empty metadata map shorthand.
pub fn no_metadata() -> serde_json::Map<String, serde_json::Value> {
    serde_json::Map::new()
}
