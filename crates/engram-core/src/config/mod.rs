//! Layered configuration.
//!
//! A single `Config` value is assembled from, in order of increasing
//! precedence: built-in defaults, the per-user file
//! (`~/.config/engram/config.toml`), the per-project file (`./engram.toml`),
//! the local override file (`./engram.local.toml`), `ENGRAM_*` environment
//! variables, and programmatic overrides. Constructors receive the value
//! explicitly; there is no process-global configuration.

mod sections;

use std::path::{Path, PathBuf};

pub use sections::{
    CacheConfig, CircuitBreakerConfig, DatabaseConfig, EmbeddingConfig, JobBackendKind, JobConfig,
    RelevanceConfig, TagConfig, TelemetryConfig, WorkingMemoryConfig,
};

use serde::{Deserialize, Serialize};

use crate::errors::{EngramError, EngramResult};

/// Tolerance for the relevance-weight sum check.
const WEIGHT_SUM_TOLERANCE: f64 = 1e-9;

/// The complete configuration object passed into every constructor.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub embedding: EmbeddingConfig,
    pub tag: TagConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub relevance: RelevanceConfig,
    pub working_memory: WorkingMemoryConfig,
    pub cache: CacheConfig,
    pub job: JobConfig,
    pub telemetry: TelemetryConfig,
}

impl Config {
    /// Load the layered configuration from the standard locations and the
    /// environment, then validate it.
    pub fn load() -> EngramResult<Self> {
        Self::load_with_overrides(|_| {})
    }

    /// Like [`Config::load`], with a final programmatic override step.
    pub fn load_with_overrides(overrides: impl FnOnce(&mut Config)) -> EngramResult<Self> {
        let mut value = toml::Value::try_from(Config::default())
            .map_err(|e| EngramError::InvalidInput(format!("default config: {e}")))?;

        for path in Self::layer_paths() {
            if path.is_file() {
                merge_file(&mut value, &path)?;
            }
        }

        let mut config: Config = value
            .try_into()
            .map_err(|e| EngramError::InvalidInput(format!("config: {e}")))?;

        config.apply_env();
        overrides(&mut config);
        config.validate()?;
        Ok(config)
    }

    /// Parse a single TOML file over the defaults (no user/project layers).
    /// Used by tests and embedding hosts with a fixed config location.
    pub fn from_file(path: &Path) -> EngramResult<Self> {
        let mut value = toml::Value::try_from(Config::default())
            .map_err(|e| EngramError::InvalidInput(format!("default config: {e}")))?;
        merge_file(&mut value, path)?;
        let mut config: Config = value
            .try_into()
            .map_err(|e| EngramError::InvalidInput(format!("config: {e}")))?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Standard file layers in increasing precedence.
    fn layer_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();
        if let Ok(home) = std::env::var("HOME") {
            paths.push(
                PathBuf::from(home)
                    .join(".config")
                    .join("engram")
                    .join("config.toml"),
            );
        }
        paths.push(PathBuf::from("engram.toml"));
        paths.push(PathBuf::from("engram.local.toml"));
        paths
    }

    /// Overlay recognised `ENGRAM_*` environment variables.
    fn apply_env(&mut self) {
        let get = |key: &str| std::env::var(key).ok().filter(|v| !v.is_empty());

        if let Some(v) = get("ENGRAM_DATABASE_PATH") {
            self.database.path = v;
        }
        if let Some(v) = get("ENGRAM_DATABASE_POOL_SIZE").and_then(|v| v.parse().ok()) {
            self.database.pool_size = v;
        }
        if let Some(v) = get("ENGRAM_DATABASE_QUERY_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
            self.database.query_timeout_ms = v;
        }
        if let Some(v) = get("ENGRAM_EMBEDDING_PROVIDER") {
            self.embedding.provider = v;
        }
        if let Some(v) = get("ENGRAM_EMBEDDING_MODEL") {
            self.embedding.model = v;
        }
        if let Some(v) = get("ENGRAM_EMBEDDING_DIMENSIONS").and_then(|v| v.parse().ok()) {
            self.embedding.dimensions = v;
        }
        if let Some(v) = get("ENGRAM_EMBEDDING_BASE_URL") {
            self.embedding.base_url = Some(v);
        }
        if let Some(v) = get("ENGRAM_EMBEDDING_API_KEY") {
            self.embedding.api_key = Some(v);
        }
        if let Some(v) = get("ENGRAM_TAG_PROVIDER") {
            self.tag.provider = v;
        }
        if let Some(v) = get("ENGRAM_TAG_MODEL") {
            self.tag.model = v;
        }
        if let Some(v) = get("ENGRAM_WORKING_MEMORY_MAX_TOKENS").and_then(|v| v.parse().ok()) {
            self.working_memory.max_tokens = v;
        }
        if let Some(v) = get("ENGRAM_CACHE_SIZE").and_then(|v| v.parse().ok()) {
            self.cache.size = v;
        }
        if let Some(v) = get("ENGRAM_CACHE_TTL_S").and_then(|v| v.parse().ok()) {
            self.cache.ttl_s = v;
        }
        if let Some(v) = get("ENGRAM_JOB_BACKEND") {
            match v.as_str() {
                "inline" => self.job.backend = JobBackendKind::Inline,
                "thread" => self.job.backend = JobBackendKind::Thread,
                "external" => self.job.backend = JobBackendKind::External,
                other => tracing::warn!(backend = other, "unrecognised ENGRAM_JOB_BACKEND"),
            }
        }
        if let Some(v) = get("ENGRAM_TELEMETRY_ENABLED").and_then(|v| v.parse().ok()) {
            self.telemetry.enabled = v;
        }
    }

    /// Reject configurations that would violate store invariants.
    pub fn validate(&self) -> EngramResult<()> {
        let r = &self.relevance;
        let sum = r.semantic_weight + r.tag_weight + r.recency_weight + r.access_weight;
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(EngramError::InvalidInput(format!(
                "relevance weights must sum to 1.0, got {sum}"
            )));
        }
        for (name, w) in [
            ("semantic_weight", r.semantic_weight),
            ("tag_weight", r.tag_weight),
            ("recency_weight", r.recency_weight),
            ("access_weight", r.access_weight),
        ] {
            if !(0.0..=1.0).contains(&w) {
                return Err(EngramError::InvalidInput(format!(
                    "relevance {name} out of range: {w}"
                )));
            }
        }
        if r.recency_half_life_hours <= 0.0 {
            return Err(EngramError::InvalidInput(
                "recency_half_life_hours must be positive".to_string(),
            ));
        }
        if self.database.pool_size == 0 {
            return Err(EngramError::InvalidInput(
                "database.pool_size must be at least 1".to_string(),
            ));
        }
        if self.embedding.dimensions == 0
            || self.embedding.dimensions > self.embedding.max_index_dimensions
        {
            return Err(EngramError::InvalidInput(format!(
                "embedding.dimensions {} must be in 1..={}",
                self.embedding.dimensions, self.embedding.max_index_dimensions
            )));
        }
        if self.tag.max_depth == 0 || self.tag.max_depth > crate::constants::MAX_TAG_DEPTH {
            return Err(EngramError::InvalidInput(format!(
                "tag.max_depth {} must be in 1..={}",
                self.tag.max_depth,
                crate::constants::MAX_TAG_DEPTH
            )));
        }
        if self.circuit_breaker.failure_threshold == 0
            || self.circuit_breaker.half_open_max_calls == 0
        {
            return Err(EngramError::InvalidInput(
                "circuit breaker thresholds must be at least 1".to_string(),
            ));
        }
        if self.working_memory.max_tokens == 0 {
            return Err(EngramError::InvalidInput(
                "working_memory.max_tokens must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Parse `path` and deep-merge it over `base`.
fn merge_file(base: &mut toml::Value, path: &Path) -> EngramResult<()> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| EngramError::InvalidInput(format!("read {}: {e}", path.display())))?;
    let overlay: toml::Value = text
        .parse()
        .map_err(|e| EngramError::InvalidInput(format!("parse {}: {e}", path.display())))?;
    merge_toml(base, overlay);
    tracing::debug!(path = %path.display(), "merged config layer");
    Ok(())
}

/// Recursive table merge; overlay scalars win.
fn merge_toml(base: &mut toml::Value, overlay: toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base_table), toml::Value::Table(overlay_table)) => {
            for (key, value) in overlay_table {
                match base_table.get_mut(&key) {
                    Some(existing) => merge_toml(existing, value),
                    None => {
                        base_table.insert(key, value);
                    }
                }
            }
        }
        (base_slot, overlay_value) => *base_slot = overlay_value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_validate() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn default_weights_sum_to_one() {
        let r = RelevanceConfig::default();
        let sum = r.semantic_weight + r.tag_weight + r.recency_weight + r.access_weight;
        assert!((sum - 1.0).abs() < WEIGHT_SUM_TOLERANCE);
    }

    #[test]
    fn bad_weights_rejected() {
        let mut config = Config::default();
        config.relevance.semantic_weight = 0.9;
        assert!(matches!(
            config.validate(),
            Err(EngramError::InvalidInput(_))
        ));
    }

    #[test]
    fn partial_file_preserves_other_sections() {
        let mut file = tempfile::NamedTempFile::with_suffix(".toml").unwrap();
        writeln!(file, "[database]\npath = \"/tmp/custom.db\"").unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.database.path, "/tmp/custom.db");
        // Untouched sections keep their defaults.
        assert_eq!(config.cache.size, 1000);
        assert_eq!(config.working_memory.max_tokens, 8192);
    }

    #[test]
    fn zero_pool_size_rejected() {
        let mut config = Config::default();
        config.database.pool_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn dimensions_cannot_exceed_index_max() {
        let mut config = Config::default();
        config.embedding.dimensions = 4096;
        config.embedding.max_index_dimensions = 2048;
        assert!(config.validate().is_err());
    }
}
