//! Scores an item's estimated model cost against a budget.
//!
//! Same curve as the latency evaluator, over `cost_usd` and `max_cost_usd`.

use async_trait::async_trait;
use serde_json::json;

use super::latency::{bounded_score, positive_bound};
use super::{EvaluationContext, Evaluator, ScoreRecord};
use crate::error::EvaluatorError;

pub const NAME: &str = "cost";

const DEFAULT_MAX_COST_USD: f64 = 0.10;

#[derive(Debug, Clone, Copy, Default)]
pub struct CostEvaluator;

#[async_trait]
impl Evaluator for CostEvaluator {
    async fn evaluate(&self, ctx: &EvaluationContext) -> Result<ScoreRecord, EvaluatorError> {
        let cost = ctx.cost_usd.ok_or(EvaluatorError::MissingCost)?;
        let max = positive_bound(
            "max_cost_usd",
            ctx.config_f64("max_cost_usd", DEFAULT_MAX_COST_USD)?,
        )?;

        let (score, passed) = bounded_score(cost, max);

        Ok(ScoreRecord::new(score, passed).with_details(json!({
            "cost_usd": cost,
            "max_cost_usd": max,
        })))
    }
}
