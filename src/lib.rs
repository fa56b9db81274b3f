//! evalforge: queued evaluation of LLM prompts against datasets.
//!
//! A submitted job names an experiment run, a dataset, a prompt/model
//! configuration and a set of evaluators. A worker dequeues it, calls the
//! model once per item in bounded concurrent batches, scores every output,
//! and records per-item results and run-level metrics.

pub mod cli;
pub mod config;
pub mod error;
pub mod evaluators;
pub mod llm;
pub mod metrics;
pub mod scheduler;
pub mod service;
pub mod storage;

pub use config::{AppConfig, ConfigError};
pub use error::{EvaluatorError, LlmError};
pub use evaluators::{Evaluator, EvaluatorConfig, EvaluatorRegistry, ScoreRecord};
pub use llm::{InvocationResult, LlmProvider, ModelInvoker, PromptConfig};
pub use scheduler::{
    aggregate, BatchExecutor, EvaluationResult, EvaluationWorker, Job, JobQueue, JobStatus,
    JobSubmission, RunMetrics,
};
pub use service::{EvaluationService, RunResults, ServiceError};
pub use storage::{ExperimentRun, RunStatus, RunStore};
