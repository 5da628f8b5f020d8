//! The shared backbone behind every agent of one store: storage engine,
//! long-term memory, providers, breakers, token counter, and the job
//! backend. Group members share a `Store`; working memories stay private
//! to their agents.

use std::sync::Arc;

use engram_core::config::Config;
use engram_core::errors::EngramResult;
use engram_core::traits::EmbeddingProvider;
use engram_jobs::{create_backend, JobBackend, JobRunner};
use engram_memory::LongTermMemory;
use engram_providers::{create_embedding_provider, create_tag_extractor, BreakerRegistry};
use engram_storage::StorageEngine;
use engram_tags::TagService;
use engram_tokens::TokenCounter;

pub struct Store {
    pub(crate) config: Config,
    pub(crate) engine: Arc<StorageEngine>,
    pub(crate) ltm: Arc<LongTermMemory>,
    pub(crate) breakers: Arc<BreakerRegistry>,
    pub(crate) embedder: Arc<dyn EmbeddingProvider>,
    pub(crate) tag_service: Arc<TagService>,
    pub(crate) runner: Arc<JobRunner>,
    pub(crate) jobs: Arc<dyn JobBackend>,
    pub(crate) tokens: Arc<TokenCounter>,
}

impl Store {
    /// Wire the full stack from a validated configuration.
    pub fn open(config: Config) -> EngramResult<Arc<Self>> {
        config.validate()?;

        let engine = Arc::new(StorageEngine::open(&config.database)?);
        let breakers = Arc::new(BreakerRegistry::new(config.circuit_breaker.clone()));
        let embedder = create_embedding_provider(&config.embedding)?;
        let ltm = Arc::new(LongTermMemory::new(
            Arc::clone(&engine),
            Arc::clone(&embedder),
            Arc::clone(&breakers),
            &config,
        ));
        let tag_service = Arc::new(TagService::new(
            create_tag_extractor(&config.tag)?,
            &breakers,
            config.tag.max_depth,
        ));
        let runner = Arc::new(JobRunner::new(
            Arc::clone(&ltm),
            Arc::clone(&embedder),
            Arc::clone(&tag_service),
            Arc::clone(&breakers),
        ));
        let jobs = create_backend(
            config.job.backend,
            Arc::clone(&runner),
            Arc::clone(&engine),
            config.job.thread_workers,
        );

        tracing::info!(
            db = %config.database.path,
            embedding_provider = embedder.name(),
            job_backend = ?config.job.backend,
            "store opened"
        );

        Ok(Arc::new(Self {
            config,
            engine,
            ltm,
            breakers,
            embedder,
            tag_service,
            runner,
            jobs,
            tokens: Arc::new(TokenCounter::default()),
        }))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn ltm(&self) -> &Arc<LongTermMemory> {
        &self.ltm
    }

    pub fn engine(&self) -> &Arc<StorageEngine> {
        &self.engine
    }

    pub fn breakers(&self) -> &Arc<BreakerRegistry> {
        &self.breakers
    }

    /// The job runner, for hosts draining an external queue.
    pub fn job_runner(&self) -> &Arc<JobRunner> {
        &self.runner
    }

    /// Stats for every circuit breaker created so far.
    pub fn breaker_stats(&self) -> Vec<engram_providers::BreakerStats> {
        self.breakers.stats()
    }

    /// Release the job workers. Call once, when the process is done with
    /// every agent of this store.
    pub fn shutdown(&self) {
        self.jobs.shutdown();
    }
}
