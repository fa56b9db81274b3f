//! Prometheus metrics registration and export.
//!
//! This module defines all Prometheus metrics used by evalforge and provides
//! functions for initializing, registering, and exporting metrics.

use prometheus::{CounterVec, Encoder, Gauge, HistogramVec, Opts, Registry, TextEncoder};
use std::sync::OnceLock;

/// Global Prometheus registry for all evalforge metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

/// Total number of jobs finished, labeled by final status.
pub static JOBS_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Job processing duration in seconds.
pub static JOB_DURATION: OnceLock<HistogramVec> = OnceLock::new();

/// Number of jobs currently being processed.
pub static JOBS_IN_PROGRESS: OnceLock<Gauge> = OnceLock::new();

/// Total dataset items processed, labeled by outcome (success/model_error/dropped).
pub static ITEMS_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Total evaluator error records, labeled by evaluator name.
pub static EVALUATOR_ERRORS_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Total model invocations, labeled by provider and status.
pub static MODEL_REQUESTS_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Model invocation latency in seconds, labeled by provider.
pub static MODEL_LATENCY: OnceLock<HistogramVec> = OnceLock::new();

/// Total tokens consumed, labeled by provider.
pub static MODEL_TOKENS_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Initialize all metrics and register them with the registry.
///
/// Call once at startup. Later calls build a fresh registry but leave the
/// statics from the first call in place.
///
/// # Errors
///
/// Returns a `prometheus::Error` if metric registration fails.
pub fn init_metrics() -> Result<(), prometheus::Error> {
    let registry = Registry::new();

    // Job metrics
    let jobs_total = CounterVec::new(
        Opts::new("evalforge_jobs_total", "Total number of evaluation jobs finished"),
        &["status"],
    )?;

    let job_duration = HistogramVec::new(
        prometheus::HistogramOpts::new(
            "evalforge_job_duration_seconds",
            "Evaluation job duration in seconds",
        )
        .buckets(vec![1.0, 5.0, 30.0, 60.0, 300.0, 900.0, 3600.0]),
        &["status"],
    )?;

    let jobs_in_progress = Gauge::new(
        "evalforge_jobs_in_progress",
        "Number of jobs currently being processed",
    )?;

    // Item metrics
    let items_total = CounterVec::new(
        Opts::new("evalforge_items_total", "Total dataset items processed"),
        &["outcome"],
    )?;

    let evaluator_errors_total = CounterVec::new(
        Opts::new(
            "evalforge_evaluator_errors_total",
            "Total evaluator runs that produced an error record",
        ),
        &["evaluator"],
    )?;

    // Model metrics
    let model_requests_total = CounterVec::new(
        Opts::new("evalforge_model_requests_total", "Total model invocations"),
        &["provider", "status"],
    )?;

    let model_latency = HistogramVec::new(
        prometheus::HistogramOpts::new(
            "evalforge_model_latency_seconds",
            "Model invocation latency in seconds",
        )
        .buckets(vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0]),
        &["provider"],
    )?;

    let model_tokens_total = CounterVec::new(
        Opts::new("evalforge_model_tokens_total", "Total tokens consumed"),
        &["provider"],
    )?;

    registry.register(Box::new(jobs_total.clone()))?;
    registry.register(Box::new(job_duration.clone()))?;
    registry.register(Box::new(jobs_in_progress.clone()))?;
    registry.register(Box::new(items_total.clone()))?;
    registry.register(Box::new(evaluator_errors_total.clone()))?;
    registry.register(Box::new(model_requests_total.clone()))?;
    registry.register(Box::new(model_latency.clone()))?;
    registry.register(Box::new(model_tokens_total.clone()))?;

    // If any of these fail, metrics were already initialized (idempotent)
    let _ = REGISTRY.set(registry);
    let _ = JOBS_TOTAL.set(jobs_total);
    let _ = JOB_DURATION.set(job_duration);
    let _ = JOBS_IN_PROGRESS.set(jobs_in_progress);
    let _ = ITEMS_TOTAL.set(items_total);
    let _ = EVALUATOR_ERRORS_TOTAL.set(evaluator_errors_total);
    let _ = MODEL_REQUESTS_TOTAL.set(model_requests_total);
    let _ = MODEL_LATENCY.set(model_latency);
    let _ = MODEL_TOKENS_TOTAL.set(model_tokens_total);

    tracing::info!("Prometheus metrics initialized successfully");

    Ok(())
}

/// Export all registered metrics in Prometheus text format.
///
/// Returns a comment line instead of metrics if the registry has not been
/// initialized or encoding fails.
pub fn export_metrics() -> String {
    let Some(registry) = REGISTRY.get() else {
        return "# Metrics not initialized. Call init_metrics() first.\n".to_string();
    };

    let encoder = TextEncoder::new();
    let metric_families = registry.gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return format!("# Error encoding metrics: {}\n", e);
    }

    String::from_utf8(buffer)
        .unwrap_or_else(|e| format!("# Error converting metrics to UTF-8: {}\n", e))
}
