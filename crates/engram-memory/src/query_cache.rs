//! Bounded query-result cache with per-entry TTL.
//!
//! Keys are blake3 fingerprints of the canonicalised search request.
//! Every LTM mutation clears the whole cache, so a hit is never stale.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use moka::sync::Cache;

use engram_core::models::{SearchHit, Timeframe};

pub struct QueryCache {
    cache: Cache<String, Vec<SearchHit>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

/// Hit/miss counters snapshot.
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

impl QueryCache {
    pub fn new(size: u64, ttl: Duration) -> Self {
        Self {
            cache: Cache::builder()
                .max_capacity(size)
                .time_to_live(ttl)
                .build(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Deterministic fingerprint of a search request. The label carries
    /// the strategy plus any variant (e.g. "tags:all").
    pub fn fingerprint(
        strategy: &str,
        timeframe: &Timeframe,
        query: &str,
        tags: &[String],
        limit: usize,
        metadata: &serde_json::Map<String, serde_json::Value>,
    ) -> String {
        // serde_json::Map preserves insertion order, so metadata keys are
        // sorted into a canonical form first.
        let mut meta_pairs: Vec<(&String, &serde_json::Value)> = metadata.iter().collect();
        meta_pairs.sort_by_key(|(k, _)| k.as_str());

        let canonical = serde_json::json!({
            "strategy": strategy,
            "timeframe": timeframe
                .intervals()
                .iter()
                .map(|i| [i.start.to_rfc3339(), i.end.to_rfc3339()])
                .collect::<Vec<_>>(),
            "query": query,
            "tags": tags,
            "limit": limit,
            "metadata": meta_pairs
                .iter()
                .map(|(k, v)| (k.as_str(), (*v).clone()))
                .collect::<Vec<_>>(),
        });
        blake3::hash(canonical.to_string().as_bytes())
            .to_hex()
            .to_string()
    }

    /// Cloned results on hit.
    pub fn get(&self, key: &str) -> Option<Vec<SearchHit>> {
        match self.cache.get(key) {
            Some(hits) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(hits)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn put(&self, key: String, results: Vec<SearchHit>) {
        self.cache.insert(key, results);
    }

    /// Invalidate everything. Called after every mutation.
    pub fn clear(&self) {
        self.cache.invalidate_all();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}
