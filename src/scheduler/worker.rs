//! Single-consumer worker loop.
//!
//! The worker polls the queue, drives each job through
//! `queued -> running -> {completed | failed}`, runs its items batch by batch
//! and keeps the experiment run and progress records current. Any error that
//! escapes a job fails the job and its run; the loop itself keeps going.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::aggregate::{aggregate, metrics_json, RunMetrics};
use super::batch::{batch_ranges, BatchExecutor};
use super::job::{Job, JobStatus};
use super::queue::{JobQueue, QueueError};
use crate::metrics::MetricsCollector;
use crate::storage::{RunStatus, RunStore, StoreError};

/// Errors that abort a whole job.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Experiment run {0} not found")]
    RunNotFound(Uuid),

    #[error("Job {0} has no dataset items")]
    EmptyDataset(Uuid),

    /// The run was cancelled before the job started.
    #[error("Experiment run {0} was cancelled")]
    RunCancelled(Uuid),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),
}

/// Configuration for the worker loop.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Sleep between polls when the queue is empty.
    pub poll_interval: Duration,
    /// Sleep after a failed dequeue.
    pub failure_backoff: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            failure_backoff: Duration::from_secs(5),
        }
    }
}

impl WorkerConfig {
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_failure_backoff(mut self, backoff: Duration) -> Self {
        self.failure_backoff = backoff;
        self
    }
}

/// Worker that evaluates queued jobs one at a time.
pub struct EvaluationWorker {
    id: String,
    queue: JobQueue,
    store: Arc<dyn RunStore>,
    executor: BatchExecutor,
    config: WorkerConfig,
    running: Arc<AtomicBool>,
    metrics: MetricsCollector,
}

impl EvaluationWorker {
    pub fn new(
        queue: JobQueue,
        store: Arc<dyn RunStore>,
        executor: BatchExecutor,
        config: WorkerConfig,
    ) -> Self {
        Self {
            id: format!("worker-{}", std::process::id()),
            queue,
            store,
            executor,
            config,
            running: Arc::new(AtomicBool::new(true)),
            metrics: MetricsCollector::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Ask the loop to exit. Observed between dequeue attempts; a job in
    /// progress runs to completion first.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Main worker loop. Returns once [`stop`](Self::stop) has been called.
    pub async fn run(&self) {
        info!(worker_id = %self.id, queue = %self.queue.queue_name(), "Worker started");

        while self.is_running() {
            match self.poll_once().await {
                Ok(true) => {}
                Ok(false) => {
                    debug!(worker_id = %self.id, "No jobs available");
                    tokio::time::sleep(self.config.poll_interval).await;
                }
                Err(e) => {
                    error!(worker_id = %self.id, error = %e, "Failed to dequeue job");
                    tokio::time::sleep(self.config.failure_backoff).await;
                }
            }
        }

        info!(worker_id = %self.id, "Worker stopped");
    }

    /// Dequeue and process at most one job. Returns whether a job was taken.
    pub async fn poll_once(&self) -> Result<bool, QueueError> {
        match self.queue.dequeue().await? {
            Some(job) => {
                self.process_job(job).await;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Process one job to a terminal status and return that status.
    pub async fn process_job(&self, job: Job) -> JobStatus {
        let job_id = job.job_id;
        let run_id = job.experiment_run_id;
        let start_time = Instant::now();

        info!(
            worker_id = %self.id,
            job_id = %job_id,
            run_id = %run_id,
            items = job.total_items(),
            "Processing job"
        );
        self.metrics.job_started();

        let status = match self.execute_job(&job).await {
            Ok(metrics) => {
                if let Err(e) = self
                    .queue
                    .update_status(job_id, JobStatus::Completed, Some(100))
                    .await
                {
                    error!(job_id = %job_id, error = %e, "Failed to mark job completed");
                }
                info!(
                    worker_id = %self.id,
                    job_id = %job_id,
                    run_id = %run_id,
                    duration_ms = start_time.elapsed().as_millis() as u64,
                    success_rate = metrics.as_ref().map(|m| m.success_rate),
                    "Job completed"
                );
                JobStatus::Completed
            }
            Err(e) => {
                error!(
                    worker_id = %self.id,
                    job_id = %job_id,
                    run_id = %run_id,
                    error = %e,
                    "Job failed"
                );
                self.fail_job(&job, &e).await;
                JobStatus::Failed
            }
        };

        self.metrics
            .job_finished(status.as_str(), start_time.elapsed().as_secs_f64());
        status
    }

    async fn execute_job(&self, job: &Job) -> Result<Option<RunMetrics>, WorkerError> {
        let job_id = job.job_id;
        let run_id = job.experiment_run_id;

        self.queue
            .update_status(job_id, JobStatus::Running, Some(0))
            .await?;

        let run = self
            .store
            .get_run(run_id)
            .await?
            .ok_or(WorkerError::RunNotFound(run_id))?;
        if run.status == RunStatus::Cancelled {
            return Err(WorkerError::RunCancelled(run_id));
        }
        if job.dataset_items.is_empty() {
            return Err(WorkerError::EmptyDataset(job_id));
        }

        let total = job.total_items();
        self.store.mark_running(run_id, total as u64).await?;

        let mut all_results = Vec::with_capacity(total);
        let mut completed: u64 = 0;
        let mut failed: u64 = 0;
        let mut attempted: u64 = 0;

        for (start, end) in batch_ranges(total, job.execution_config.batch_size()) {
            let outcome = self
                .executor
                .run_batch(&job.dataset_items[start..end], job, start)
                .await;

            self.store.save_results(run_id, &outcome.results).await?;

            completed += outcome.results.len() as u64;
            failed += outcome.dropped as u64;
            attempted += outcome.attempted() as u64;
            self.store.update_counts(run_id, completed, failed).await?;

            let progress = self
                .queue
                .store_progress(run_id, attempted, total as u64)
                .await?;
            self.queue
                .update_status(job_id, JobStatus::Running, Some(progress.whole_percent()))
                .await?;

            info!(
                job_id = %job_id,
                run_id = %run_id,
                completed = attempted,
                total = total,
                dropped = outcome.dropped,
                "Batch finished"
            );
            all_results.extend(outcome.results);
        }

        let metrics = aggregate(&all_results);
        self.store
            .complete_run(run_id, metrics_json(metrics.as_ref()))
            .await?;

        Ok(metrics)
    }

    async fn fail_job(&self, job: &Job, cause: &WorkerError) {
        if let Err(e) = self
            .queue
            .update_status(job.job_id, JobStatus::Failed, None)
            .await
        {
            error!(job_id = %job.job_id, error = %e, "Failed to mark job failed");
        }

        // A cancelled or missing run keeps whatever state it has.
        if matches!(
            cause,
            WorkerError::RunCancelled(_) | WorkerError::RunNotFound(_)
        ) {
            return;
        }

        if let Err(e) = self
            .store
            .fail_run(job.experiment_run_id, &cause.to_string())
            .await
        {
            warn!(
                run_id = %job.experiment_run_id,
                error = %e,
                "Failed to mark run failed"
            );
        }
    }
}
