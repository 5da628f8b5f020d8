//! Pluggable job dispatch: inline, bounded thread pool, or an external
//! queue the host process drains. Whatever the backend, a submitted job
//! executes at least once; jobs are idempotent upserts.

use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use engram_core::config::JobBackendKind;
use engram_core::errors::{EngramError, EngramResult};
use engram_storage::StorageEngine;

use crate::job::{EnrichmentJob, JobReport};
use crate::runner::JobRunner;

/// Dispatch capability.
pub trait JobBackend: Send + Sync {
    /// Hand a job to the backend. Inline executes before returning;
    /// the others return immediately.
    fn submit(&self, job: EnrichmentJob) -> EngramResult<()>;

    /// Release workers and queued state. Idempotent.
    fn shutdown(&self);
}

/// Executes the job synchronously on the caller's thread. Guaranteed to
/// finish before `remember` returns.
pub struct InlineBackend {
    runner: Arc<JobRunner>,
}

impl InlineBackend {
    pub fn new(runner: Arc<JobRunner>) -> Self {
        Self { runner }
    }
}

impl JobBackend for InlineBackend {
    fn submit(&self, job: EnrichmentJob) -> EngramResult<()> {
        self.runner.run(job);
        Ok(())
    }

    fn shutdown(&self) {}
}

/// Bounded in-process worker pool over an mpsc channel.
pub struct ThreadPoolBackend {
    sender: Mutex<Option<mpsc::SyncSender<EnrichmentJob>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

/// Submission queue depth before `submit` blocks.
const QUEUE_DEPTH: usize = 256;

impl ThreadPoolBackend {
    pub fn new(runner: Arc<JobRunner>, workers: usize) -> Self {
        let (sender, receiver) = mpsc::sync_channel::<EnrichmentJob>(QUEUE_DEPTH);
        let receiver = Arc::new(Mutex::new(receiver));

        let worker_count = workers.max(1);
        let mut handles = Vec::with_capacity(worker_count);
        for index in 0..worker_count {
            let receiver = Arc::clone(&receiver);
            let runner = Arc::clone(&runner);
            handles.push(
                std::thread::Builder::new()
                    .name(format!("engram-job-{index}"))
                    .spawn(move || loop {
                        let job = {
                            let guard = receiver.lock().unwrap();
                            guard.recv()
                        };
                        match job {
                            Ok(job) => {
                                runner.run(job);
                            }
                            // Channel closed: pool is shutting down.
                            Err(_) => break,
                        }
                    })
                    .expect("spawn job worker"),
            );
        }

        Self {
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(handles),
        }
    }
}

impl JobBackend for ThreadPoolBackend {
    fn submit(&self, job: EnrichmentJob) -> EngramResult<()> {
        let guard = self.sender.lock().unwrap();
        match guard.as_ref() {
            Some(sender) => sender
                .send(job)
                .map_err(|_| EngramError::InvalidInput("job pool is shut down".to_string())),
            None => Err(EngramError::InvalidInput(
                "job pool is shut down".to_string(),
            )),
        }
    }

    fn shutdown(&self) {
        // Dropping the sender closes the channel; workers drain what is
        // queued and exit.
        self.sender.lock().unwrap().take();
        let mut workers = self.workers.lock().unwrap();
        for handle in workers.drain(..) {
            let _ = handle.join();
        }
    }
}

impl Drop for ThreadPoolBackend {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Serialises the job reference into the `job_queue` table; the host
/// process drains it with [`ExternalBackend::drain`].
pub struct ExternalBackend {
    engine: Arc<StorageEngine>,
}

impl ExternalBackend {
    pub fn new(engine: Arc<StorageEngine>) -> Self {
        Self { engine }
    }

    /// Claim up to `limit` queued jobs and run them. Returns the reports.
    pub fn drain(&self, runner: &JobRunner, limit: usize) -> EngramResult<Vec<JobReport>> {
        let claimed = self.engine.claim_external_jobs(limit)?;
        let mut reports = Vec::with_capacity(claimed.len());
        for (queue_id, payload) in claimed {
            match serde_json::from_str::<EnrichmentJob>(&payload) {
                Ok(job) => reports.push(runner.run(job)),
                Err(e) => {
                    tracing::warn!(queue_id, error = %e, "dropping malformed queued job");
                }
            }
        }
        Ok(reports)
    }
}

impl JobBackend for ExternalBackend {
    fn submit(&self, job: EnrichmentJob) -> EngramResult<()> {
        let payload = serde_json::to_string(&job)
            .map_err(|e| EngramError::InvalidInput(format!("serialise job: {e}")))?;
        self.engine.enqueue_external_job(&payload)?;
        Ok(())
    }

    fn shutdown(&self) {}
}

/// Build the configured backend.
pub fn create_backend(
    kind: JobBackendKind,
    runner: Arc<JobRunner>,
    engine: Arc<StorageEngine>,
    thread_workers: usize,
) -> Arc<dyn JobBackend> {
    match kind {
        JobBackendKind::Inline => Arc::new(InlineBackend::new(runner)),
        JobBackendKind::Thread => Arc::new(ThreadPoolBackend::new(runner, thread_workers)),
        JobBackendKind::External => Arc::new(ExternalBackend::new(engine)),
    }
}
