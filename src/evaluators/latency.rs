//! Scores how far an item's model latency stays under a bound.
//!
//! `score = 1 - (t / max) * 0.5` inside the bound, so the range is
//! `[0.5, 1.0]`; anything over `max_latency_ms` scores `0.0`.

use async_trait::async_trait;
use serde_json::json;

use super::{EvaluationContext, Evaluator, ScoreRecord};
use crate::error::EvaluatorError;

pub const NAME: &str = "latency";

const DEFAULT_MAX_LATENCY_MS: f64 = 5000.0;

#[derive(Debug, Clone, Copy, Default)]
pub struct LatencyEvaluator;

/// Shared scoring curve for latency and cost.
pub(crate) fn bounded_score(value: f64, max: f64) -> (f64, bool) {
    if value <= max {
        (1.0 - (value / max) * 0.5, true)
    } else {
        (0.0, false)
    }
}

/// Reject non-positive bounds, which would make the curve meaningless.
pub(crate) fn positive_bound(key: &str, value: f64) -> Result<f64, EvaluatorError> {
    if value > 0.0 && value.is_finite() {
        Ok(value)
    } else {
        Err(EvaluatorError::InvalidConfig {
            key: key.to_string(),
            message: format!("must be a positive number, got {}", value),
        })
    }
}

#[async_trait]
impl Evaluator for LatencyEvaluator {
    async fn evaluate(&self, ctx: &EvaluationContext) -> Result<ScoreRecord, EvaluatorError> {
        let elapsed = ctx
            .execution_time_ms
            .ok_or(EvaluatorError::MissingExecutionTime)?;
        let max = positive_bound(
            "max_latency_ms",
            ctx.config_f64("max_latency_ms", DEFAULT_MAX_LATENCY_MS)?,
        )?;

        let (score, passed) = bounded_score(elapsed, max);

        Ok(ScoreRecord::new(score, passed).with_details(json!({
            "execution_time_ms": elapsed,
            "max_latency_ms": max,
        })))
    }
}
