//! High-level recording interface over the raw Prometheus statics.
//!
//! Every method is a no-op when `init_metrics()` has not been called, so
//! library code can record unconditionally and tests need no setup.

use super::prometheus::{
    EVALUATOR_ERRORS_TOTAL, ITEMS_TOTAL, JOBS_IN_PROGRESS, JOBS_TOTAL, JOB_DURATION,
    MODEL_LATENCY, MODEL_REQUESTS_TOTAL, MODEL_TOKENS_TOTAL,
};

/// Outcome label for a processed dataset item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOutcome {
    /// Model call succeeded and evaluators ran.
    Success,
    /// Model call failed; a failed result row was recorded.
    ModelError,
    /// The item task died and no row was recorded.
    Dropped,
}

impl ItemOutcome {
    fn label(self) -> &'static str {
        match self {
            ItemOutcome::Success => "success",
            ItemOutcome::ModelError => "model_error",
            ItemOutcome::Dropped => "dropped",
        }
    }
}

/// Metrics collector for recording evalforge operational metrics.
#[derive(Debug, Clone, Default)]
pub struct MetricsCollector;

impl MetricsCollector {
    pub fn new() -> Self {
        Self
    }

    /// Mark a job as started.
    pub fn job_started(&self) {
        if let Some(gauge) = JOBS_IN_PROGRESS.get() {
            gauge.inc();
        }
    }

    /// Record a job reaching a terminal status.
    pub fn job_finished(&self, status: &str, duration_secs: f64) {
        if let Some(gauge) = JOBS_IN_PROGRESS.get() {
            gauge.dec();
        }

        if let Some(jobs_total) = JOBS_TOTAL.get() {
            jobs_total.with_label_values(&[status]).inc();
        }

        if let Some(job_duration) = JOB_DURATION.get() {
            job_duration
                .with_label_values(&[status])
                .observe(duration_secs);
        }

        tracing::trace!(status = status, duration_secs = duration_secs, "Recorded job metric");
    }

    /// Record `count` items with the same outcome.
    pub fn record_items(&self, outcome: ItemOutcome, count: usize) {
        if count == 0 {
            return;
        }
        if let Some(items_total) = ITEMS_TOTAL.get() {
            items_total
                .with_label_values(&[outcome.label()])
                .inc_by(count as f64);
        }
    }

    /// Record an evaluator producing an error record.
    pub fn record_evaluator_error(&self, evaluator: &str) {
        if let Some(errors) = EVALUATOR_ERRORS_TOTAL.get() {
            errors.with_label_values(&[evaluator]).inc();
        }
    }

    /// Record a model invocation.
    pub fn record_model_call(&self, provider: &str, success: bool, latency_secs: f64, tokens: u32) {
        let status = if success { "success" } else { "failure" };

        if let Some(requests) = MODEL_REQUESTS_TOTAL.get() {
            requests.with_label_values(&[provider, status]).inc();
        }

        if let Some(latency) = MODEL_LATENCY.get() {
            latency.with_label_values(&[provider]).observe(latency_secs);
        }

        if tokens > 0 {
            if let Some(tokens_total) = MODEL_TOKENS_TOTAL.get() {
                tokens_total
                    .with_label_values(&[provider])
                    .inc_by(f64::from(tokens));
            }
        }
    }
}
