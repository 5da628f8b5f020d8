//! # engram-jobs
//!
//! Background enrichment: embedding and tag-extraction jobs keyed by node
//! id, executed through a pluggable backend (inline, thread pool, or an
//! external queue). Jobs are idempotent and report duration plus outcome;
//! a breaker-open outcome is a quiet success so submitters never retry.

pub mod backend;
pub mod job;
pub mod runner;

pub use backend::{
    create_backend, ExternalBackend, InlineBackend, JobBackend, ThreadPoolBackend,
};
pub use job::{EnrichmentJob, JobOutcome, JobReport};
pub use runner::JobRunner;
