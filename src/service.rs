//! Caller-facing surface: submit jobs and query or cancel runs.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::scheduler::{
    EvaluationResult, JobQueue, JobReceipt, JobStatusView, JobSubmission, Progress, QueueError,
};
use crate::storage::{ExperimentRun, RunStatus, RunStore, StoreError};

/// Errors returned to callers of [`EvaluationService`].
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Experiment run {0} not found")]
    RunNotFound(Uuid),

    #[error("Job {0} not found")]
    JobNotFound(Uuid),

    /// Cancel was requested on a run that already finished.
    #[error("Experiment run {run_id} is already {status}; cannot cancel")]
    RunTerminal { run_id: Uuid, status: RunStatus },

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::RunNotFound(id) => ServiceError::RunNotFound(id),
            StoreError::RunTerminal { run_id, status } => {
                ServiceError::RunTerminal { run_id, status }
            }
            other => ServiceError::Store(other),
        }
    }
}

/// Ordered result rows of a run with its aggregated metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResults {
    pub run_id: Uuid,
    pub status: RunStatus,
    pub results: Vec<EvaluationResult>,
    /// `{}` until the run completes.
    pub metrics: serde_json::Value,
}

/// Job submission and run queries over a queue and a run store.
#[derive(Clone)]
pub struct EvaluationService {
    queue: JobQueue,
    store: Arc<dyn RunStore>,
}

impl EvaluationService {
    pub fn new(queue: JobQueue, store: Arc<dyn RunStore>) -> Self {
        Self { queue, store }
    }

    pub fn queue(&self) -> &JobQueue {
        &self.queue
    }

    /// Create a `pending` run for a later submission.
    pub async fn create_run(&self, name: &str) -> Result<ExperimentRun, ServiceError> {
        Ok(self.store.create_run(name).await?)
    }

    /// Queue a job against an existing run.
    pub async fn submit(&self, submission: JobSubmission) -> Result<JobReceipt, ServiceError> {
        let run_id = submission.experiment_run_id;
        if self.store.get_run(run_id).await?.is_none() {
            return Err(ServiceError::RunNotFound(run_id));
        }

        let receipt = self.queue.enqueue(submission).await?;
        tracing::info!(
            job_id = %receipt.job_id,
            run_id = %run_id,
            "Submitted evaluation job"
        );
        Ok(receipt)
    }

    pub async fn job_status(&self, job_id: Uuid) -> Result<JobStatusView, ServiceError> {
        self.queue
            .get_status(job_id)
            .await?
            .ok_or(ServiceError::JobNotFound(job_id))
    }

    /// Progress of a run.
    ///
    /// Reads the queue's progress record; a run that has none yet reports
    /// its stored counters instead.
    pub async fn run_progress(&self, run_id: Uuid) -> Result<Progress, ServiceError> {
        if let Some(progress) = self.queue.get_progress(run_id).await? {
            return Ok(progress);
        }

        let run = self
            .store
            .get_run(run_id)
            .await?
            .ok_or(ServiceError::RunNotFound(run_id))?;
        Ok(Progress::new(
            run.completed_items + run.failed_items,
            run.total_items,
        ))
    }

    /// One page of a run's results plus its metrics.
    pub async fn run_results(
        &self,
        run_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<RunResults, ServiceError> {
        let run = self
            .store
            .get_run(run_id)
            .await?
            .ok_or(ServiceError::RunNotFound(run_id))?;
        let results = self.store.list_results(run_id, limit, offset).await?;

        Ok(RunResults {
            run_id,
            status: run.status,
            results,
            metrics: run.metrics,
        })
    }

    /// Mark a run `cancelled`. Rejected once the run is terminal.
    ///
    /// A job already processing the run is not interrupted.
    pub async fn cancel_run(&self, run_id: Uuid) -> Result<ExperimentRun, ServiceError> {
        let run = self.store.cancel_run(run_id).await?;
        tracing::info!(run_id = %run_id, "Cancelled experiment run");
        Ok(run)
    }
}
