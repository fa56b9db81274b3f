//! Rolls per-item results into run-level metrics.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::job::EvaluationResult;

/// Score distribution of one evaluator across a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluatorStats {
    pub avg_score: f64,
    pub min_score: f64,
    pub max_score: f64,
}

/// Summary metrics for a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetrics {
    pub total_items: usize,
    pub successful_items: usize,
    pub failed_items: usize,
    /// `successful / total`.
    pub success_rate: f64,
    /// Mean over successful items only.
    pub avg_latency_ms: f64,
    /// Sum over successful items only.
    pub total_cost_usd: f64,
    pub evaluator_scores: BTreeMap<String, EvaluatorStats>,
}

/// Aggregate a run's results. Returns `None` for an empty slice, which is
/// persisted as an empty metrics object.
pub fn aggregate(results: &[EvaluationResult]) -> Option<RunMetrics> {
    if results.is_empty() {
        return None;
    }

    let successful: Vec<&EvaluationResult> = results.iter().filter(|r| r.is_success).collect();
    let total_items = results.len();
    let successful_items = successful.len();

    let avg_latency_ms = if successful.is_empty() {
        0.0
    } else {
        successful.iter().map(|r| r.latency_ms).sum::<f64>() / successful_items as f64
    };
    let total_cost_usd = successful.iter().map(|r| r.cost_usd).sum();

    let mut scores: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
    for result in &successful {
        for (name, record) in &result.custom_metrics {
            scores.entry(name.as_str()).or_default().push(record.score);
        }
    }

    let evaluator_scores = scores
        .into_iter()
        .map(|(name, values)| {
            let stats = EvaluatorStats {
                avg_score: values.iter().sum::<f64>() / values.len() as f64,
                min_score: values.iter().copied().fold(f64::INFINITY, f64::min),
                max_score: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            };
            (name.to_string(), stats)
        })
        .collect();

    Some(RunMetrics {
        total_items,
        successful_items,
        failed_items: total_items - successful_items,
        success_rate: successful_items as f64 / total_items as f64,
        avg_latency_ms,
        total_cost_usd,
        evaluator_scores,
    })
}

/// JSON form stored on the run: the metrics object, or `{}` when empty.
pub fn metrics_json(metrics: Option<&RunMetrics>) -> serde_json::Value {
    metrics
        .and_then(|m| serde_json::to_value(m).ok())
        .unwrap_or_else(|| serde_json::json!({}))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluators::ScoreRecord;
    use chrono::Utc;
    use serde_json::{json, Map};

    fn result(success: bool, latency: f64, cost: f64, scores: &[(&str, f64)]) -> EvaluationResult {
        EvaluationResult {
            input_data: Map::new(),
            expected_output: "e".to_string(),
            actual_output: success.then(|| "a".to_string()),
            custom_metrics: scores
                .iter()
                .map(|(name, score)| (name.to_string(), ScoreRecord::new(*score, *score >= 0.5)))
                .collect(),
            latency_ms: latency,
            cost_usd: cost,
            tokens_used: 0,
            is_success: success,
            error_message: (!success).then(|| "boom".to_string()),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_empty_results() {
        assert!(aggregate(&[]).is_none());
        assert_eq!(metrics_json(None), json!({}));
    }

    #[test]
    fn test_all_failed() {
        let metrics = aggregate(&[result(false, 0.0, 0.0, &[]), result(false, 0.0, 0.0, &[])])
            .unwrap();
        assert_eq!(metrics.total_items, 2);
        assert_eq!(metrics.failed_items, 2);
        assert_eq!(metrics.success_rate, 0.0);
        assert_eq!(metrics.avg_latency_ms, 0.0);
        assert!(metrics.evaluator_scores.is_empty());
    }

    #[test]
    fn test_mixed_results() {
        let metrics = aggregate(&[
            result(true, 100.0, 0.01, &[("exact_match", 1.0), ("latency", 0.9)]),
            result(true, 300.0, 0.03, &[("exact_match", 0.0)]),
            result(false, 0.0, 0.0, &[]),
            result(false, 999.0, 5.0, &[("exact_match", 1.0)]),
        ])
        .unwrap();

        assert_eq!(metrics.total_items, 4);
        assert_eq!(metrics.successful_items, 2);
        assert_eq!(metrics.failed_items, 2);
        assert_eq!(metrics.success_rate, 0.5);
        assert_eq!(metrics.avg_latency_ms, 200.0);
        assert!((metrics.total_cost_usd - 0.04).abs() < 1e-12);

        let exact = &metrics.evaluator_scores["exact_match"];
        assert_eq!(exact.avg_score, 0.5);
        assert_eq!(exact.min_score, 0.0);
        assert_eq!(exact.max_score, 1.0);

        let latency = &metrics.evaluator_scores["latency"];
        assert_eq!(latency.avg_score, 0.9);
        assert_eq!(latency.min_score, 0.9);
    }

    #[test]
    fn test_metrics_json_shape() {
        let metrics = aggregate(&[result(true, 10.0, 0.0, &[("cost", 1.0)])]).unwrap();
        let value = metrics_json(Some(&metrics));
        assert_eq!(value["success_rate"], 1.0);
        assert_eq!(value["evaluator_scores"]["cost"]["max_score"], 1.0);
    }
}
