//! Per-section configuration structs with their defaults.

use serde::{Deserialize, Serialize};

/// SQLite storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database file path. ":memory:" opens an in-memory store.
    pub path: String,
    /// Number of read-only connections in the pool.
    pub pool_size: usize,
    /// Per-statement deadline. Exceeding it yields `QueryTimeout`.
    pub query_timeout_ms: u64,
    /// How long a connection waits on a locked database before failing.
    pub busy_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "engram.db".to_string(),
            pool_size: 4,
            query_timeout_ms: 30_000,
            busy_timeout_ms: 5_000,
        }
    }
}

/// Embedding callable settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// "openai" (any OpenAI-compatible endpoint) or "fallback".
    pub provider: String,
    pub model: String,
    /// Model output dimension.
    pub dimensions: usize,
    /// Store-side maximum indexed dimension; vectors are right-padded with
    /// zeros up to this length.
    pub max_index_dimensions: usize,
    pub timeout_ms: u64,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "fallback".to_string(),
            model: "text-embedding-3-small".to_string(),
            dimensions: 1536,
            max_index_dimensions: 2048,
            timeout_ms: 30_000,
            base_url: None,
            api_key: None,
        }
    }
}

/// Tag extractor settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TagConfig {
    /// "openai" or "fallback".
    pub provider: String,
    pub model: String,
    pub timeout_ms: u64,
    /// Maximum tag hierarchy depth. Capped at 4.
    pub max_depth: usize,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
}

impl Default for TagConfig {
    fn default() -> Self {
        Self {
            provider: "fallback".to_string(),
            model: "gpt-4o-mini".to_string(),
            timeout_ms: 30_000,
            max_depth: 4,
            base_url: None,
            api_key: None,
        }
    }
}

/// Circuit breaker thresholds, shared by all named services.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before the breaker opens.
    pub failure_threshold: usize,
    /// Wall-clock seconds an open breaker waits before half-open.
    pub reset_timeout_s: u64,
    /// Probe calls allowed in half-open state.
    pub half_open_max_calls: usize,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout_s: 60,
            half_open_max_calls: 3,
        }
    }
}

/// Composite relevance scorer weights. Must sum to 1.0.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelevanceConfig {
    pub semantic_weight: f64,
    pub tag_weight: f64,
    pub recency_weight: f64,
    pub access_weight: f64,
    /// Half-life of the recency signal: `2^(-age_hours / half_life_hours)`.
    pub recency_half_life_hours: f64,
}

impl Default for RelevanceConfig {
    fn default() -> Self {
        Self {
            semantic_weight: 0.5,
            tag_weight: 0.3,
            recency_weight: 0.1,
            access_weight: 0.1,
            recency_half_life_hours: 168.0,
        }
    }
}

/// Working-memory budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkingMemoryConfig {
    pub max_tokens: usize,
}

impl Default for WorkingMemoryConfig {
    fn default() -> Self {
        Self { max_tokens: 8192 }
    }
}

/// Query-result cache bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum cached search results.
    pub size: u64,
    /// Per-entry time to live, in seconds.
    pub ttl_s: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            size: 1000,
            ttl_s: 300,
        }
    }
}

/// Enrichment job dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobBackendKind {
    /// Execute on the caller's thread; `remember` returns after the job.
    Inline,
    /// Bounded in-process worker pool.
    Thread,
    /// Serialise the job reference into the `job_queue` table for the host
    /// process to drain.
    External,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JobConfig {
    pub backend: JobBackendKind,
    /// Worker count for the thread backend.
    pub thread_workers: usize,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            backend: JobBackendKind::Inline,
            thread_workers: 4,
        }
    }
}

/// Telemetry toggle. The wiring itself lives outside the core.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub enabled: bool,
}
