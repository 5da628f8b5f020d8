//! Enrichment job definitions.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A unit of background enrichment, parametrised by node id. Serialisable
/// so the external backend can hand it to a host-drained queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EnrichmentJob {
    /// Compute and persist the node's embedding.
    GenerateEmbedding { node_id: i64 },
    /// Extract, validate, and persist hierarchical tags.
    GenerateTags { node_id: i64 },
}

impl EnrichmentJob {
    pub fn node_id(&self) -> i64 {
        match self {
            EnrichmentJob::GenerateEmbedding { node_id } => *node_id,
            EnrichmentJob::GenerateTags { node_id } => *node_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            EnrichmentJob::GenerateEmbedding { .. } => "generate_embedding",
            EnrichmentJob::GenerateTags { .. } => "generate_tags",
        }
    }
}

/// How a job run ended. Breaker-open is not an error: the node is simply
/// enriched later via an operator-driven replay, so the caller need not
/// re-enqueue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Success,
    Error,
    CircuitOpen,
}

/// Duration and outcome of one executed job.
#[derive(Debug, Clone)]
pub struct JobReport {
    pub job: EnrichmentJob,
    pub outcome: JobOutcome,
    pub duration: Duration,
}
