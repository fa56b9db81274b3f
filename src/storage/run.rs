//! Experiment run records and the store contract the worker relies on.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

use crate::scheduler::EvaluationResult;

/// Default page size for result listings.
pub const DEFAULT_RESULTS_LIMIT: i64 = 100;

/// Errors that can occur during run store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Connection to the database failed.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Query execution failed.
    #[error("Query failed: {0}")]
    QueryFailed(#[from] sqlx::Error),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Migration error.
    #[error("Migration error: {0}")]
    Migration(#[from] super::migrations::MigrationError),

    #[error("Experiment run {0} not found")]
    RunNotFound(Uuid),

    #[error("Experiment run {run_id} is already {status}")]
    RunTerminal { run_id: Uuid, status: RunStatus },

    /// A stored row holds a value this crate cannot interpret.
    #[error("Corrupt record: {0}")]
    CorruptRecord(String),
}

/// Lifecycle state of an experiment run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RunStatus::Completed | RunStatus::Failed | RunStatus::Cancelled
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RunStatus::Pending),
            "running" => Ok(RunStatus::Running),
            "completed" => Ok(RunStatus::Completed),
            "failed" => Ok(RunStatus::Failed),
            "cancelled" => Ok(RunStatus::Cancelled),
            other => Err(StoreError::CorruptRecord(format!(
                "unknown run status '{}'",
                other
            ))),
        }
    }
}

/// An experiment run as persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentRun {
    pub id: Uuid,
    pub name: String,
    pub status: RunStatus,
    pub total_items: u64,
    /// Result rows persisted so far.
    pub completed_items: u64,
    /// Items dropped without a result row.
    pub failed_items: u64,
    /// Aggregated metrics; `{}` until the run completes.
    pub metrics: serde_json::Value,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ExperimentRun {
    /// A fresh `pending` run.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            status: RunStatus::Pending,
            total_items: 0,
            completed_items: 0,
            failed_items: 0,
            metrics: serde_json::json!({}),
            error_message: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }
}

/// Persistence for runs and their per-item results.
///
/// Every method is a single short operation; no transaction spans a job.
#[async_trait]
pub trait RunStore: Send + Sync {
    /// Create a new `pending` run.
    async fn create_run(&self, name: &str) -> Result<ExperimentRun, StoreError>;

    async fn get_run(&self, run_id: Uuid) -> Result<Option<ExperimentRun>, StoreError>;

    /// Mark the run `running`, stamp `started_at`, fix `total_items` and
    /// reset the counters.
    async fn mark_running(&self, run_id: Uuid, total_items: u64) -> Result<(), StoreError>;

    /// Overwrite the progress counters.
    async fn update_counts(
        &self,
        run_id: Uuid,
        completed_items: u64,
        failed_items: u64,
    ) -> Result<(), StoreError>;

    /// Append result rows, preserving slice order.
    async fn save_results(
        &self,
        run_id: Uuid,
        results: &[EvaluationResult],
    ) -> Result<(), StoreError>;

    /// Mark the run `completed` with its final metrics.
    async fn complete_run(&self, run_id: Uuid, metrics: serde_json::Value)
        -> Result<(), StoreError>;

    /// Mark the run `failed` with an error message.
    async fn fail_run(&self, run_id: Uuid, error: &str) -> Result<(), StoreError>;

    /// Mark the run `cancelled` unless it is already terminal.
    async fn cancel_run(&self, run_id: Uuid) -> Result<ExperimentRun, StoreError>;

    /// Result rows in insertion order.
    async fn list_results(
        &self,
        run_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<EvaluationResult>, StoreError>;
}
