//! Integration tests: enrichment through each backend.

use std::sync::Arc;

use engram_core::config::Config;
use engram_core::errors::{EngramError, EngramResult};
use engram_core::traits::EmbeddingProvider;
use engram_jobs::{
    EnrichmentJob, ExternalBackend, InlineBackend, JobBackend, JobOutcome, JobRunner,
};
use engram_memory::LongTermMemory;
use engram_providers::{create_embedding_provider, create_tag_extractor, BreakerRegistry};
use engram_storage::StorageEngine;
use engram_tags::TagService;

struct FailingEmbedder;

impl EmbeddingProvider for FailingEmbedder {
    fn embed(&self, _text: &str) -> EngramResult<Vec<f32>> {
        Err(EngramError::EmbeddingError("provider down".to_string()))
    }

    fn dimensions(&self) -> usize {
        64
    }

    fn name(&self) -> &str {
        "failing"
    }
}

struct Fixture {
    ltm: Arc<LongTermMemory>,
    runner: Arc<JobRunner>,
    engine: Arc<StorageEngine>,
}

fn fixture(embedder: Arc<dyn EmbeddingProvider>) -> Fixture {
    let mut config = Config::default();
    config.database.path = ":memory:".to_string();
    config.embedding.dimensions = 64;
    config.embedding.max_index_dimensions = 128;
    config.circuit_breaker.failure_threshold = 3;

    let engine = Arc::new(StorageEngine::open(&config.database).unwrap());
    let breakers = Arc::new(BreakerRegistry::new(config.circuit_breaker.clone()));
    let ltm = Arc::new(LongTermMemory::new(
        Arc::clone(&engine),
        Arc::clone(&embedder),
        Arc::clone(&breakers),
        &config,
    ));
    let tag_service = Arc::new(TagService::new(
        create_tag_extractor(&config.tag).unwrap(),
        &breakers,
        config.tag.max_depth,
    ));
    let runner = Arc::new(JobRunner::new(
        Arc::clone(&ltm),
        embedder,
        tag_service,
        breakers,
    ));
    Fixture {
        ltm,
        runner,
        engine,
    }
}

fn remember(f: &Fixture, content: &str) -> i64 {
    let robot = f.ltm.register_robot("r").unwrap();
    f.ltm
        .add(content, 4, robot.id, None, serde_json::Map::new())
        .unwrap()
        .node
        .id
}

#[test]
fn inline_backend_embeds_before_returning() {
    let mut config = Config::default();
    config.embedding.dimensions = 64;
    let embedder = create_embedding_provider(&config.embedding).unwrap();
    let f = fixture(embedder);
    let node_id = remember(&f, "postgres memory settings");

    let backend = InlineBackend::new(Arc::clone(&f.runner));
    backend
        .submit(EnrichmentJob::GenerateEmbedding { node_id })
        .unwrap();

    let node = f.engine.get_node(node_id, false).unwrap().unwrap();
    let embedding = node.embedding.expect("embedding persisted inline");
    assert_eq!(embedding.len(), 64);
}

#[test]
fn tag_job_persists_only_valid_tags() {
    let mut config = Config::default();
    config.embedding.dimensions = 64;
    let embedder = create_embedding_provider(&config.embedding).unwrap();
    let f = fixture(embedder);
    let node_id = remember(&f, "postgres replication postgres failover replication");

    let report = f.runner.run(EnrichmentJob::GenerateTags { node_id });
    assert_eq!(report.outcome, JobOutcome::Success);

    let tags = f.ltm.get_node_tags(node_id).unwrap();
    assert!(!tags.is_empty());
    for tag in &tags {
        assert!(engram_tags::is_valid(tag, 4), "bad tag persisted: {tag}");
    }
}

#[test]
fn jobs_are_idempotent() {
    let mut config = Config::default();
    config.embedding.dimensions = 64;
    let embedder = create_embedding_provider(&config.embedding).unwrap();
    let f = fixture(embedder);
    let node_id = remember(&f, "idempotent enrichment");

    for _ in 0..3 {
        let report = f.runner.run(EnrichmentJob::GenerateTags { node_id });
        assert_eq!(report.outcome, JobOutcome::Success);
    }
    let tags = f.ltm.get_node_tags(node_id).unwrap();
    let mut dedup = tags.clone();
    dedup.dedup();
    assert_eq!(tags, dedup);
}

#[test]
fn breaker_open_reports_circuit_open_not_error() {
    let f = fixture(Arc::new(FailingEmbedder));
    let node_id = remember(&f, "never embedded");

    // Three failures trip the breaker (threshold 3)...
    for _ in 0..3 {
        let report = f.runner.run(EnrichmentJob::GenerateEmbedding { node_id });
        assert_eq!(report.outcome, JobOutcome::Error);
    }
    // ...after which jobs are deferred without error.
    let report = f.runner.run(EnrichmentJob::GenerateEmbedding { node_id });
    assert_eq!(report.outcome, JobOutcome::CircuitOpen);
}

#[test]
fn external_backend_round_trips_through_queue() {
    let mut config = Config::default();
    config.embedding.dimensions = 64;
    let embedder = create_embedding_provider(&config.embedding).unwrap();
    let f = fixture(embedder);
    let node_id = remember(&f, "queued for the host");

    let backend = ExternalBackend::new(Arc::clone(&f.engine));
    backend
        .submit(EnrichmentJob::GenerateEmbedding { node_id })
        .unwrap();

    // Nothing persisted until the host drains.
    assert!(f
        .engine
        .get_node(node_id, false)
        .unwrap()
        .unwrap()
        .embedding
        .is_none());

    let reports = backend.drain(&f.runner, 10).unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].outcome, JobOutcome::Success);
    assert!(f
        .engine
        .get_node(node_id, false)
        .unwrap()
        .unwrap()
        .embedding
        .is_some());

    // The queue is empty after the drain.
    assert!(backend.drain(&f.runner, 10).unwrap().is_empty());
}

#[test]
fn job_on_forgotten_node_is_a_no_op_success() {
    let mut config = Config::default();
    config.embedding.dimensions = 64;
    let embedder = create_embedding_provider(&config.embedding).unwrap();
    let f = fixture(embedder);
    let node_id = remember(&f, "gone before enrichment");
    f.ltm.delete(node_id, None, true).unwrap();

    let report = f.runner.run(EnrichmentJob::GenerateEmbedding { node_id });
    assert_eq!(report.outcome, JobOutcome::Success);
}
