//! # engram-providers
//!
//! Concrete implementations of the embedding and tag-extraction callables,
//! plus the circuit breakers that gate every call to them. Providers are
//! selected at configuration load; a deterministic offline fallback exists
//! for both callables so the store works without network access.

pub mod breaker;
pub mod embedding;
pub mod registry;
pub mod tags;

pub use breaker::{BreakerStats, CircuitBreaker, CircuitState};
pub use embedding::create_embedding_provider;
pub use registry::{service, BreakerRegistry};
pub use tags::create_tag_extractor;
