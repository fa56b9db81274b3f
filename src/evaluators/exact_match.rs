//! String equality after optional whitespace and case normalization.
//!
//! Config:
//! - `case_sensitive` (bool, default `false`)
//! - `strip_whitespace` (bool, default `true`) trims both ends before comparing

use async_trait::async_trait;
use serde_json::json;

use super::{EvaluationContext, Evaluator, ScoreRecord};
use crate::error::EvaluatorError;

pub const NAME: &str = "exact_match";

#[derive(Debug, Clone, Copy, Default)]
pub struct ExactMatchEvaluator;

fn strip(text: &str, enabled: bool) -> &str {
    if enabled {
        text.trim()
    } else {
        text
    }
}

fn fold_case(text: &str, case_sensitive: bool) -> String {
    if case_sensitive {
        text.to_string()
    } else {
        text.to_lowercase()
    }
}

#[async_trait]
impl Evaluator for ExactMatchEvaluator {
    async fn evaluate(&self, ctx: &EvaluationContext) -> Result<ScoreRecord, EvaluatorError> {
        let case_sensitive = ctx.config_bool("case_sensitive", false)?;
        let strip_whitespace = ctx.config_bool("strip_whitespace", true)?;

        // Details report the stripped text in its original case.
        let expected = strip(&ctx.expected_output, strip_whitespace);
        let actual = strip(&ctx.actual_output, strip_whitespace);
        let matched = fold_case(expected, case_sensitive) == fold_case(actual, case_sensitive);
        let score = if matched { 1.0 } else { 0.0 };

        Ok(ScoreRecord::new(score, matched).with_details(json!({
            "case_sensitive": case_sensitive,
            "strip_whitespace": strip_whitespace,
            "expected": expected,
            "actual": actual,
            "matched": matched,
        })))
    }
}
