//! Prometheus metrics for the evaluation pipeline.
//!
//! ```ignore
//! use evalforge::metrics::{init_metrics, export_metrics, MetricsCollector, ItemOutcome};
//!
//! init_metrics().expect("Failed to initialize metrics");
//!
//! let collector = MetricsCollector::new();
//! collector.record_items(ItemOutcome::Success, 5);
//!
//! let metrics_text = export_metrics();
//! ```

pub mod collectors;
pub mod prometheus;

pub use collectors::{ItemOutcome, MetricsCollector};
pub use prometheus::{export_metrics, init_metrics};

pub use prometheus::{
    EVALUATOR_ERRORS_TOTAL, ITEMS_TOTAL, JOBS_IN_PROGRESS, JOBS_TOTAL, JOB_DURATION,
    MODEL_LATENCY, MODEL_REQUESTS_TOTAL, MODEL_TOKENS_TOTAL, REGISTRY,
};
