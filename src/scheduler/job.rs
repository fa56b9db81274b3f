//! Job definitions for the evaluation scheduler.
//!
//! - `Job`: one evaluation request as stored in the queue
//! - `JobSubmission` / `JobReceipt`: what callers send and get back
//! - `JobStatus` / `JobStatusView`: lifecycle state as seen by pollers
//! - `EvaluationResult`: the per-item outcome persisted for a run
//! - `Progress`: the per-run progress record

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

use crate::evaluators::{EvaluatorConfig, ScoreRecord};
use crate::llm::PromptConfig;

/// Default number of items evaluated concurrently.
const DEFAULT_PARALLEL_WORKERS: usize = 5;

/// Default per-item model call timeout.
const DEFAULT_TIMEOUT_SECONDS: u64 = 30;

/// One evaluation unit. Identity is its position in the job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetItem {
    #[serde(default)]
    pub input: Map<String, Value>,
    #[serde(alias = "expected")]
    pub expected_output: String,
}

impl DatasetItem {
    pub fn new(input: Map<String, Value>, expected_output: impl Into<String>) -> Self {
        Self {
            input,
            expected_output: expected_output.into(),
        }
    }
}

/// Execution limits for a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Upper bound on each model invocation.
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    /// Batch size; items within a batch run concurrently.
    #[serde(default = "default_parallel_workers")]
    pub parallel_workers: usize,
}

fn default_timeout_seconds() -> u64 {
    DEFAULT_TIMEOUT_SECONDS
}

fn default_parallel_workers() -> usize {
    DEFAULT_PARALLEL_WORKERS
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
            parallel_workers: DEFAULT_PARALLEL_WORKERS,
        }
    }
}

impl ExecutionConfig {
    pub fn with_parallel_workers(mut self, workers: usize) -> Self {
        self.parallel_workers = workers;
        self
    }

    pub fn with_timeout_seconds(mut self, seconds: u64) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    /// Batch size, never below 1.
    pub fn batch_size(&self) -> usize {
        self.parallel_workers.max(1)
    }

    /// Per-item model timeout; `None` when set to 0.
    pub fn model_timeout(&self) -> Option<Duration> {
        (self.timeout_seconds > 0).then(|| Duration::from_secs(self.timeout_seconds))
    }
}

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    /// Terminal states never change again.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(JobStatus::Queued),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(format!("unknown job status '{}'", other)),
        }
    }
}

/// What a caller submits to start an evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSubmission {
    pub experiment_run_id: Uuid,
    pub dataset_items: Vec<DatasetItem>,
    pub prompt_config: PromptConfig,
    #[serde(default)]
    pub evaluators: Vec<EvaluatorConfig>,
    #[serde(default)]
    pub execution_config: ExecutionConfig,
}

/// A queued evaluation job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub job_id: Uuid,
    pub experiment_run_id: Uuid,
    pub dataset_items: Vec<DatasetItem>,
    pub prompt_config: PromptConfig,
    pub evaluators: Vec<EvaluatorConfig>,
    pub execution_config: ExecutionConfig,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
}

impl Job {
    /// Build a fresh `queued` job with a new id.
    pub fn from_submission(submission: JobSubmission) -> Self {
        Self {
            job_id: Uuid::new_v4(),
            experiment_run_id: submission.experiment_run_id,
            dataset_items: submission.dataset_items,
            prompt_config: submission.prompt_config,
            evaluators: submission.evaluators,
            execution_config: submission.execution_config,
            status: JobStatus::Queued,
            created_at: Utc::now(),
        }
    }

    pub fn total_items(&self) -> usize {
        self.dataset_items.len()
    }

    pub fn receipt(&self) -> JobReceipt {
        JobReceipt {
            job_id: self.job_id,
            status: self.status,
            experiment_run_id: self.experiment_run_id,
            created_at: self.created_at,
        }
    }
}

/// Returned to the submitter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobReceipt {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub experiment_run_id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// Job state as seen by a status poller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatusView {
    pub job_id: Uuid,
    pub status: JobStatus,
    /// Percentage of items attempted, once the job has started.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    pub created_at: DateTime<Utc>,
}

/// Per-run progress, overwritten after every batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    pub completed: u64,
    pub total: u64,
    pub percentage: f64,
}

impl Progress {
    pub fn new(completed: u64, total: u64) -> Self {
        let percentage = if total == 0 {
            0.0
        } else {
            completed as f64 / total as f64 * 100.0
        };
        Self {
            completed,
            total,
            percentage,
        }
    }

    /// Percentage rounded down to a whole number, capped at 100.
    pub fn whole_percent(&self) -> u8 {
        self.percentage.clamp(0.0, 100.0) as u8
    }
}

/// Outcome of evaluating one dataset item. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub input_data: Map<String, Value>,
    pub expected_output: String,
    pub actual_output: Option<String>,
    /// Score per evaluator name.
    pub custom_metrics: BTreeMap<String, ScoreRecord>,
    pub latency_ms: f64,
    pub cost_usd: f64,
    pub tokens_used: u32,
    pub is_success: bool,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}
