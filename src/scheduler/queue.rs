//! FIFO evaluation job queue with a status side-table.
//!
//! # Layout
//!
//! - `{queue_name}`: list of pending job ids. Enqueue pushes to the head,
//!   dequeue pops the tail, so ids come out in submission order.
//! - `job:{job_id}`: hash holding `job_id`, `experiment_run_id`, `status`,
//!   `created_at`, `progress` and the serialized job under `payload`.
//! - `progress:{run_id}`: hash holding `completed`, `total`, `percentage`.
//!
//! # Delivery
//!
//! At-most-once. A dequeued id is gone from the list; if the worker dies
//! while processing, the job stays `running` and is never redelivered.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use super::job::{Job, JobReceipt, JobStatus, JobStatusView, JobSubmission, Progress};
use super::store::QueueStore;

/// Default name of the pending-job list.
pub const DEFAULT_QUEUE_NAME: &str = "evaluation_jobs";

const JOB_KEY_PREFIX: &str = "job:";
const PROGRESS_KEY_PREFIX: &str = "progress:";

/// Errors that can occur during queue operations.
#[derive(Debug, Error)]
pub enum QueueError {
    /// Failed to connect to the backing store.
    #[error("Redis connection failed: {0}")]
    ConnectionFailed(String),

    /// Redis operation failed.
    #[error("Redis operation failed: {0}")]
    RedisError(#[from] redis::RedisError),

    /// Failed to serialize or deserialize job data.
    #[error("Serialization failed: {0}")]
    SerializationFailed(#[from] serde_json::Error),

    /// No job hash exists for this id.
    #[error("Job {0} not found")]
    JobNotFound(Uuid),

    /// A stored record is missing a field or holds an unparsable value.
    #[error("Corrupt queue record '{key}': {message}")]
    CorruptRecord { key: String, message: String },

    /// The job already reached a terminal status.
    #[error("Job {job_id} is already {status}")]
    TerminalStatus { job_id: Uuid, status: JobStatus },
}

/// Evaluation job queue over a [`QueueStore`].
#[derive(Clone)]
pub struct JobQueue {
    store: Arc<dyn QueueStore>,
    queue_name: String,
}

fn job_key(job_id: Uuid) -> String {
    format!("{}{}", JOB_KEY_PREFIX, job_id)
}

fn progress_key(run_id: Uuid) -> String {
    format!("{}{}", PROGRESS_KEY_PREFIX, run_id)
}

fn corrupt(key: &str, message: impl Into<String>) -> QueueError {
    QueueError::CorruptRecord {
        key: key.to_string(),
        message: message.into(),
    }
}

fn required<'a>(
    fields: &'a HashMap<String, String>,
    key: &str,
    field: &str,
) -> Result<&'a str, QueueError> {
    fields
        .get(field)
        .map(String::as_str)
        .ok_or_else(|| corrupt(key, format!("missing field '{}'", field)))
}

fn parse_status(key: &str, raw: &str) -> Result<JobStatus, QueueError> {
    raw.parse::<JobStatus>().map_err(|e| corrupt(key, e))
}

impl JobQueue {
    /// Creates a queue over `store` using the given list name.
    pub fn new(store: Arc<dyn QueueStore>, queue_name: impl Into<String>) -> Self {
        Self {
            store,
            queue_name: queue_name.into(),
        }
    }

    /// Returns the queue name.
    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    /// Enqueues a submission as a new `queued` job with a fresh id.
    ///
    /// The job hash is written before the id is pushed, so a dequeuer never
    /// sees an id without its payload.
    pub async fn enqueue(&self, submission: JobSubmission) -> Result<JobReceipt, QueueError> {
        let job = Job::from_submission(submission);
        let key = job_key(job.job_id);
        let payload = serde_json::to_string(&job)?;

        self.store
            .hash_set(
                &key,
                &[
                    ("job_id", job.job_id.to_string()),
                    ("experiment_run_id", job.experiment_run_id.to_string()),
                    ("status", job.status.to_string()),
                    ("created_at", job.created_at.to_rfc3339()),
                    ("payload", payload),
                ],
            )
            .await?;
        self.store
            .push_front(&self.queue_name, &job.job_id.to_string())
            .await?;

        tracing::debug!(job_id = %job.job_id, queue = %self.queue_name, "Enqueued job");
        Ok(job.receipt())
    }

    /// Pops the oldest pending job.
    ///
    /// Returns `Ok(None)` when the queue is empty; callers poll.
    pub async fn dequeue(&self) -> Result<Option<Job>, QueueError> {
        let Some(raw_id) = self.store.pop_back(&self.queue_name).await? else {
            return Ok(None);
        };

        let job_id = Uuid::parse_str(&raw_id)
            .map_err(|e| corrupt(&self.queue_name, format!("bad job id '{}': {}", raw_id, e)))?;
        let key = job_key(job_id);
        let fields = self.store.hash_get_all(&key).await?;
        if fields.is_empty() {
            return Err(QueueError::JobNotFound(job_id));
        }

        let mut job: Job = serde_json::from_str(required(&fields, &key, "payload")?)?;
        job.status = parse_status(&key, required(&fields, &key, "status")?)?;
        Ok(Some(job))
    }

    /// Sets a job's status, and its progress percentage when given.
    ///
    /// Terminal statuses are immutable: updating a `completed` or `failed`
    /// job is rejected with `QueueError::TerminalStatus`.
    pub async fn update_status(
        &self,
        job_id: Uuid,
        status: JobStatus,
        progress: Option<u8>,
    ) -> Result<(), QueueError> {
        let key = job_key(job_id);
        let fields = self.store.hash_get_all(&key).await?;
        if fields.is_empty() {
            return Err(QueueError::JobNotFound(job_id));
        }

        let current = parse_status(&key, required(&fields, &key, "status")?)?;
        if current.is_terminal() {
            return Err(QueueError::TerminalStatus {
                job_id,
                status: current,
            });
        }

        let mut updates = vec![
            ("status", status.to_string()),
            ("updated_at", Utc::now().to_rfc3339()),
        ];
        if let Some(pct) = progress {
            updates.push(("progress", pct.min(100).to_string()));
        }

        self.store.hash_set(&key, &updates).await
    }

    /// Returns the status view of a job, or `None` if it is unknown.
    pub async fn get_status(&self, job_id: Uuid) -> Result<Option<JobStatusView>, QueueError> {
        let key = job_key(job_id);
        let fields = self.store.hash_get_all(&key).await?;
        if fields.is_empty() {
            return Ok(None);
        }

        let status = parse_status(&key, required(&fields, &key, "status")?)?;
        let created_at = DateTime::parse_from_rfc3339(required(&fields, &key, "created_at")?)
            .map_err(|e| corrupt(&key, e.to_string()))?
            .with_timezone(&Utc);
        let progress = match fields.get("progress") {
            Some(raw) => Some(
                raw.parse::<u8>()
                    .map_err(|e| corrupt(&key, format!("bad progress '{}': {}", raw, e)))?,
            ),
            None => None,
        };

        Ok(Some(JobStatusView {
            job_id,
            status,
            progress,
            created_at,
        }))
    }

    /// Overwrites the progress record of a run.
    pub async fn store_progress(
        &self,
        run_id: Uuid,
        completed: u64,
        total: u64,
    ) -> Result<Progress, QueueError> {
        let progress = Progress::new(completed, total);
        self.store
            .hash_set(
                &progress_key(run_id),
                &[
                    ("completed", progress.completed.to_string()),
                    ("total", progress.total.to_string()),
                    ("percentage", progress.percentage.to_string()),
                    ("updated_at", Utc::now().to_rfc3339()),
                ],
            )
            .await?;
        Ok(progress)
    }

    /// Reads the progress record of a run, or `None` if none was stored.
    pub async fn get_progress(&self, run_id: Uuid) -> Result<Option<Progress>, QueueError> {
        let key = progress_key(run_id);
        let fields = self.store.hash_get_all(&key).await?;
        if fields.is_empty() {
            return Ok(None);
        }

        let parse = |field: &str| -> Result<u64, QueueError> {
            let raw = required(&fields, &key, field)?;
            raw.parse::<u64>()
                .map_err(|e| corrupt(&key, format!("bad {} '{}': {}", field, raw, e)))
        };

        Ok(Some(Progress::new(parse("completed")?, parse("total")?)))
    }

    /// Number of jobs waiting to be dequeued.
    pub async fn len(&self) -> Result<usize, QueueError> {
        self.store.list_len(&self.queue_name).await
    }

    /// Returns whether no jobs are waiting.
    pub async fn is_empty(&self) -> Result<bool, QueueError> {
        Ok(self.len().await? == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluators::EvaluatorConfig;
    use crate::llm::PromptConfig;
    use crate::scheduler::job::{DatasetItem, ExecutionConfig};
    use crate::scheduler::store::MemoryQueueStore;
    use serde_json::Map;

    fn queue() -> (JobQueue, Arc<MemoryQueueStore>) {
        let store = Arc::new(MemoryQueueStore::new());
        (JobQueue::new(store.clone(), DEFAULT_QUEUE_NAME), store)
    }

    fn submission(expected: &str) -> JobSubmission {
        JobSubmission {
            experiment_run_id: Uuid::new_v4(),
            dataset_items: vec![DatasetItem::new(Map::new(), expected)],
            prompt_config: PromptConfig::new("t", "gpt-4"),
            evaluators: vec![EvaluatorConfig::new("exact_match")],
            execution_config: ExecutionConfig::default(),
        }
    }

    #[test]
    fn test_queue_error_display() {
        let err = QueueError::ConnectionFailed("timeout".to_string());
        assert!(err.to_string().contains("timeout"));

        let id = Uuid::new_v4();
        let err = QueueError::JobNotFound(id);
        assert!(err.to_string().contains("not found"));

        let err = QueueError::TerminalStatus {
            job_id: id,
            status: JobStatus::Completed,
        };
        assert!(err.to_string().ends_with("is already completed"));
    }

    #[tokio::test]
    async fn test_fifo_order() {
        let (queue, _) = queue();
        let j1 = queue.enqueue(submission("1")).await.unwrap();
        let j2 = queue.enqueue(submission("2")).await.unwrap();
        let j3 = queue.enqueue(submission("3")).await.unwrap();
        assert_eq!(queue.len().await.unwrap(), 3);

        for expected in [j1.job_id, j2.job_id, j3.job_id] {
            let job = queue.dequeue().await.unwrap().expect("job should be present");
            assert_eq!(job.job_id, expected);
        }
        assert!(queue.dequeue().await.unwrap().is_none());
        assert!(queue.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn test_enqueue_receipt_and_status() {
        let (queue, _) = queue();
        let sub = submission("x");
        let run_id = sub.experiment_run_id;
        let receipt = queue.enqueue(sub).await.unwrap();

        assert_eq!(receipt.status, JobStatus::Queued);
        assert_eq!(receipt.experiment_run_id, run_id);

        let view = queue.get_status(receipt.job_id).await.unwrap().unwrap();
        assert_eq!(view.status, JobStatus::Queued);
        assert_eq!(view.progress, None);
        assert_eq!(view.created_at, receipt.created_at);
    }

    #[tokio::test]
    async fn test_dequeued_payload_round_trips() {
        let (queue, _) = queue();
        let sub = submission("payload");
        let receipt = queue.enqueue(sub.clone()).await.unwrap();

        let job = queue.dequeue().await.unwrap().unwrap();
        assert_eq!(job.job_id, receipt.job_id);
        assert_eq!(job.dataset_items, sub.dataset_items);
        assert_eq!(job.prompt_config, sub.prompt_config);
    }

    #[tokio::test]
    async fn test_status_transitions_and_terminal_immutability() {
        let (queue, _) = queue();
        let receipt = queue.enqueue(submission("x")).await.unwrap();

        queue
            .update_status(receipt.job_id, JobStatus::Running, None)
            .await
            .unwrap();
        queue
            .update_status(receipt.job_id, JobStatus::Running, Some(50))
            .await
            .unwrap();
        let view = queue.get_status(receipt.job_id).await.unwrap().unwrap();
        assert_eq!(view.status, JobStatus::Running);
        assert_eq!(view.progress, Some(50));

        queue
            .update_status(receipt.job_id, JobStatus::Completed, Some(100))
            .await
            .unwrap();
        let err = queue
            .update_status(receipt.job_id, JobStatus::Failed, None)
            .await
            .unwrap_err();
        assert!(matches!(err, QueueError::TerminalStatus { .. }));

        let view = queue.get_status(receipt.job_id).await.unwrap().unwrap();
        assert_eq!(view.status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn test_unknown_job() {
        let (queue, _) = queue();
        let id = Uuid::new_v4();
        assert!(queue.get_status(id).await.unwrap().is_none());
        assert!(matches!(
            queue.update_status(id, JobStatus::Running, None).await,
            Err(QueueError::JobNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_dequeue_missing_payload() {
        let (queue, store) = queue();
        let id = Uuid::new_v4();
        store
            .push_front(DEFAULT_QUEUE_NAME, &id.to_string())
            .await
            .unwrap();

        let err = queue.dequeue().await.unwrap_err();
        assert!(matches!(err, QueueError::JobNotFound(found) if found == id));
    }

    #[tokio::test]
    async fn test_progress_overwrite() {
        let (queue, _) = queue();
        let run_id = Uuid::new_v4();
        assert!(queue.get_progress(run_id).await.unwrap().is_none());

        queue.store_progress(run_id, 5, 10).await.unwrap();
        queue.store_progress(run_id, 10, 10).await.unwrap();

        let progress = queue.get_progress(run_id).await.unwrap().unwrap();
        assert_eq!(progress, Progress::new(10, 10));
        assert_eq!(progress.percentage, 100.0);

        queue.store_progress(run_id, 0, 0).await.unwrap();
        let progress = queue.get_progress(run_id).await.unwrap().unwrap();
        assert_eq!(progress.percentage, 0.0);
    }
}
