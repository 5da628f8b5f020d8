//! Executes enrichment jobs against the store.

use std::sync::Arc;
use std::time::Instant;

use engram_core::errors::{EngramError, EngramResult};
use engram_core::traits::EmbeddingProvider;
use engram_memory::LongTermMemory;
use engram_providers::{service, BreakerRegistry};
use engram_tags::TagService;

use crate::job::{EnrichmentJob, JobOutcome, JobReport};

/// How many existing tag names the extractor sees as vocabulary.
const TAG_SAMPLE_SIZE: usize = 20;

/// Runs jobs. Never returns an error to the submitter: failures are
/// logged and folded into the report, and a breaker-open counts as a
/// quiet success so callers do not re-enqueue.
pub struct JobRunner {
    ltm: Arc<LongTermMemory>,
    embedder: Arc<dyn EmbeddingProvider>,
    tag_service: Arc<TagService>,
    breakers: Arc<BreakerRegistry>,
}

impl JobRunner {
    pub fn new(
        ltm: Arc<LongTermMemory>,
        embedder: Arc<dyn EmbeddingProvider>,
        tag_service: Arc<TagService>,
        breakers: Arc<BreakerRegistry>,
    ) -> Self {
        Self {
            ltm,
            embedder,
            tag_service,
            breakers,
        }
    }

    /// Execute a job and report duration and outcome.
    pub fn run(&self, job: EnrichmentJob) -> JobReport {
        let started = Instant::now();
        let result = match job {
            EnrichmentJob::GenerateEmbedding { node_id } => self.generate_embedding(node_id),
            EnrichmentJob::GenerateTags { node_id } => self.generate_tags(node_id),
        };

        let outcome = match result {
            Ok(()) => JobOutcome::Success,
            Err(EngramError::CircuitBreakerOpen { service }) => {
                tracing::info!(
                    kind = job.kind(),
                    node_id = job.node_id(),
                    service = %service,
                    "enrichment deferred, circuit open"
                );
                JobOutcome::CircuitOpen
            }
            Err(e) => {
                tracing::warn!(
                    kind = job.kind(),
                    node_id = job.node_id(),
                    error = %e,
                    "enrichment job failed"
                );
                JobOutcome::Error
            }
        };

        let report = JobReport {
            job,
            outcome,
            duration: started.elapsed(),
        };
        tracing::debug!(
            kind = job.kind(),
            node_id = job.node_id(),
            outcome = ?report.outcome,
            duration_ms = report.duration.as_millis() as u64,
            "enrichment job finished"
        );
        report
    }

    fn generate_embedding(&self, node_id: i64) -> EngramResult<()> {
        let Some(node) = self.ltm.engine().get_node(node_id, false)? else {
            // Forgotten before the job ran; nothing to enrich.
            return Ok(());
        };
        let breaker = self.breakers.get(service::EMBEDDING);
        let embedding = breaker.call(|| self.embedder.embed(&node.content))?;
        self.ltm.set_embedding(node_id, &embedding)
    }

    fn generate_tags(&self, node_id: i64) -> EngramResult<()> {
        let Some(node) = self.ltm.engine().get_node(node_id, false)? else {
            return Ok(());
        };
        let sample = self.ltm.tag_sample(TAG_SAMPLE_SIZE)?;
        // The service runs the extractor under the `tags` breaker and
        // keeps only valid tags.
        let tags = self.tag_service.extract(&node.content, &sample)?;
        if tags.is_empty() {
            return Ok(());
        }
        self.ltm.add_tags(node_id, &tags)?;
        Ok(())
    }
}
