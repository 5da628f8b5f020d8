//! One circuit breaker per named service, shared by everything that talks
//! to that service through the same store.

use std::sync::Arc;

use dashmap::DashMap;

use engram_core::config::CircuitBreakerConfig;

use crate::breaker::{BreakerStats, CircuitBreaker};

/// Well-known service names.
pub mod service {
    pub const EMBEDDING: &str = "embedding";
    pub const TAGS: &str = "tags";
    pub const PROPOSITIONS: &str = "propositions";
}

/// Keyed collection of breakers. Lookup creates the breaker on first use,
/// so every caller naming the same service shares the same state machine.
pub struct BreakerRegistry {
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    config: CircuitBreakerConfig,
}

impl BreakerRegistry {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            breakers: DashMap::new(),
            config,
        }
    }

    /// Get (or lazily create) the breaker for a service name.
    pub fn get(&self, service: &str) -> Arc<CircuitBreaker> {
        self.breakers
            .entry(service.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(service, self.config.clone())))
            .clone()
    }

    /// Stats for every breaker created so far.
    pub fn stats(&self) -> Vec<BreakerStats> {
        let mut stats: Vec<BreakerStats> =
            self.breakers.iter().map(|entry| entry.stats()).collect();
        stats.sort_by(|a, b| a.service.cmp(&b.service));
        stats
    }
}
