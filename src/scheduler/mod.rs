//! Evaluation job pipeline: queue, batch executor, aggregator and worker.
//!
//! - **JobQueue**: FIFO job list plus per-job status hashes, over Redis or memory
//! - **BatchExecutor**: runs one batch of items concurrently, one task per item
//! - **aggregate**: rolls per-item results into run-level metrics
//! - **EvaluationWorker**: polls the queue and drives jobs to a terminal status
//!
//! # Architecture
//!
//! ```text
//!    ┌──────────────┐      ┌──────────────┐      ┌──────────────────┐
//!    │  Submitter   │─────▶│   JobQueue   │─────▶│ EvaluationWorker │
//!    │ (CLI/service)│      │ (Redis list) │      └────────┬─────────┘
//!    └──────────────┘      └──────────────┘               │ batches
//!                                                         ▼
//!                                  ┌────────────────────────────────────┐
//!                                  │ BatchExecutor: model + evaluators  │
//!                                  └────────────────┬───────────────────┘
//!                                                   ▼
//!                                       RunStore (results, counts, metrics)
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use evalforge::scheduler::{EvaluationWorker, JobQueue, RedisQueueStore, WorkerConfig};
//! use std::sync::Arc;
//!
//! let store = RedisQueueStore::connect("redis://localhost:6379").await?;
//! let queue = JobQueue::new(Arc::new(store), "evaluation_jobs");
//! let worker = EvaluationWorker::new(queue, run_store, executor, WorkerConfig::default());
//! worker.run().await;
//! ```
//!
//! # Delivery
//!
//! At-most-once. A job whose worker dies mid-flight stays `running`.

pub mod aggregate;
pub mod batch;
pub mod job;
pub mod queue;
pub mod store;
pub mod worker;

pub use aggregate::{aggregate, metrics_json, EvaluatorStats, RunMetrics};
pub use batch::{batch_ranges, BatchExecutor, BatchOutcome};
pub use job::{
    DatasetItem, EvaluationResult, ExecutionConfig, Job, JobReceipt, JobStatus, JobStatusView,
    JobSubmission, Progress,
};
pub use queue::{JobQueue, QueueError, DEFAULT_QUEUE_NAME};
pub use store::{MemoryQueueStore, QueueStore, RedisQueueStore};
pub use worker::{EvaluationWorker, WorkerConfig, WorkerError};
