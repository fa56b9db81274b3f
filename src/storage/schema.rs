//! Database schema constants.
//!
//! Each constant is a single SQL statement; the migration runner applies them
//! in the order returned by [`all_schema_statements`].

/// Experiment runs: one row per run, updated by the worker.
pub const CREATE_EXPERIMENT_RUNS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS experiment_runs (
    id UUID PRIMARY KEY,
    name VARCHAR(255) NOT NULL,
    status VARCHAR(20) NOT NULL,
    total_items BIGINT NOT NULL DEFAULT 0,
    completed_items BIGINT NOT NULL DEFAULT 0,
    failed_items BIGINT NOT NULL DEFAULT 0,
    metrics JSONB NOT NULL DEFAULT '{}'::jsonb,
    error_message TEXT,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    started_at TIMESTAMPTZ,
    completed_at TIMESTAMPTZ
)
"#;

/// Per-item evaluation results. `seq` preserves insertion order.
pub const CREATE_EVALUATION_RESULTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS evaluation_results (
    seq BIGSERIAL PRIMARY KEY,
    run_id UUID NOT NULL REFERENCES experiment_runs(id) ON DELETE CASCADE,
    input_data JSONB NOT NULL,
    expected_output TEXT NOT NULL,
    actual_output TEXT,
    custom_metrics JSONB NOT NULL DEFAULT '{}'::jsonb,
    latency_ms DOUBLE PRECISION NOT NULL,
    cost_usd DOUBLE PRECISION NOT NULL,
    tokens_used BIGINT NOT NULL DEFAULT 0,
    is_success BOOLEAN NOT NULL,
    error_message TEXT,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

pub const CREATE_RESULTS_RUN_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_evaluation_results_run_id ON evaluation_results(run_id, seq)";

pub const CREATE_RUNS_STATUS_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_experiment_runs_status ON experiment_runs(status)";

/// Returns all schema creation statements in the correct order.
pub fn all_schema_statements() -> Vec<&'static str> {
    vec![
        CREATE_EXPERIMENT_RUNS_TABLE,
        CREATE_EVALUATION_RESULTS_TABLE,
        CREATE_RESULTS_RUN_INDEX,
        CREATE_RUNS_STATUS_INDEX,
    ]
}
