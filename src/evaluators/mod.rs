//! Pluggable scoring for model outputs.
//!
//! An [`Evaluator`] compares one item's expected and actual output (optionally
//! using its latency and cost) and returns a [`ScoreRecord`]. Evaluators are
//! looked up by name in an [`EvaluatorRegistry`], which is built once at
//! startup and shared with the worker.
//!
//! The registry is the error boundary for scoring: an unknown name, an
//! evaluator error, or an evaluator panic all become an error-shaped
//! `ScoreRecord` instead of failing the item.

pub mod cost;
pub mod embeddings;
pub mod exact_match;
pub mod latency;
pub mod llm_judge;
pub mod semantic;

use async_trait::async_trait;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use crate::error::EvaluatorError;
use crate::llm::ModelInvoker;
use crate::metrics::MetricsCollector;

pub use cost::CostEvaluator;
pub use embeddings::{cosine_similarity, EmbeddingProvider, HashEmbedder, OpenAiEmbedder};
pub use exact_match::ExactMatchEvaluator;
pub use latency::LatencyEvaluator;
pub use llm_judge::LlmJudgeEvaluator;
pub use semantic::SemanticSimilarityEvaluator;

/// Names an evaluator and its per-invocation parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluatorConfig {
    pub name: String,
    #[serde(default)]
    pub config: Map<String, Value>,
}

impl EvaluatorConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            config: Map::new(),
        }
    }

    /// Set one config parameter.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }
}

/// The universal per-evaluator, per-item result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreRecord {
    pub score: f64,
    pub passed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ScoreRecord {
    pub fn new(score: f64, passed: bool) -> Self {
        Self {
            score,
            passed,
            details: None,
            error: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Zero-score failed record carrying an error message.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            score: 0.0,
            passed: false,
            details: None,
            error: Some(message.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Everything an evaluator may look at for one item.
#[derive(Debug, Clone, Default)]
pub struct EvaluationContext {
    pub input: Map<String, Value>,
    pub expected_output: String,
    pub actual_output: String,
    pub execution_time_ms: Option<f64>,
    pub cost_usd: Option<f64>,
    /// Parameters from the job's `EvaluatorConfig`.
    pub config: Map<String, Value>,
}

impl EvaluationContext {
    pub fn new(expected_output: impl Into<String>, actual_output: impl Into<String>) -> Self {
        Self {
            expected_output: expected_output.into(),
            actual_output: actual_output.into(),
            ..Self::default()
        }
    }

    pub fn with_input(mut self, input: Map<String, Value>) -> Self {
        self.input = input;
        self
    }

    pub fn with_execution_time_ms(mut self, ms: f64) -> Self {
        self.execution_time_ms = Some(ms);
        self
    }

    pub fn with_cost_usd(mut self, cost: f64) -> Self {
        self.cost_usd = Some(cost);
        self
    }

    pub fn with_config(mut self, config: Map<String, Value>) -> Self {
        self.config = config;
        self
    }

    /// Numeric config value, or `default` when absent.
    pub fn config_f64(&self, key: &str, default: f64) -> Result<f64, EvaluatorError> {
        match self.config.get(key) {
            None | Some(Value::Null) => Ok(default),
            Some(value) => value.as_f64().ok_or_else(|| EvaluatorError::InvalidConfig {
                key: key.to_string(),
                message: format!("expected a number, got {}", value),
            }),
        }
    }

    /// Boolean config value, or `default` when absent.
    pub fn config_bool(&self, key: &str, default: bool) -> Result<bool, EvaluatorError> {
        match self.config.get(key) {
            None | Some(Value::Null) => Ok(default),
            Some(value) => value.as_bool().ok_or_else(|| EvaluatorError::InvalidConfig {
                key: key.to_string(),
                message: format!("expected a boolean, got {}", value),
            }),
        }
    }

    /// String config value; empty strings count as absent.
    pub fn config_str(&self, key: &str) -> Result<Option<&str>, EvaluatorError> {
        match self.config.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) if s.is_empty() => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.as_str())),
            Some(value) => Err(EvaluatorError::InvalidConfig {
                key: key.to_string(),
                message: format!("expected a string, got {}", value),
            }),
        }
    }
}

/// A scoring function over one item.
#[async_trait]
pub trait Evaluator: Send + Sync {
    async fn evaluate(&self, ctx: &EvaluationContext) -> Result<ScoreRecord, EvaluatorError>;
}

/// Name-to-evaluator lookup table.
#[derive(Clone, Default)]
pub struct EvaluatorRegistry {
    evaluators: HashMap<String, Arc<dyn Evaluator>>,
    metrics: MetricsCollector,
}

impl EvaluatorRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding the five built-in evaluators.
    pub fn with_builtins(invoker: Arc<ModelInvoker>, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        let mut registry = Self::new();
        registry.register(exact_match::NAME, Arc::new(ExactMatchEvaluator));
        registry.register(
            semantic::NAME,
            Arc::new(SemanticSimilarityEvaluator::new(embedder)),
        );
        registry.register(llm_judge::NAME, Arc::new(LlmJudgeEvaluator::new(invoker)));
        registry.register(latency::NAME, Arc::new(LatencyEvaluator));
        registry.register(cost::NAME, Arc::new(CostEvaluator));
        registry
    }

    /// Install or replace the evaluator served under `name`.
    pub fn register(&mut self, name: impl Into<String>, evaluator: Arc<dyn Evaluator>) {
        self.evaluators.insert(name.into(), evaluator);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.evaluators.contains_key(name)
    }

    /// Registered evaluator names, sorted.
    pub fn available(&self) -> Vec<String> {
        let mut names: Vec<String> = self.evaluators.keys().cloned().collect();
        names.sort();
        names
    }

    /// Score one item with the evaluator registered under `name`.
    ///
    /// Never fails: every problem is reported through `ScoreRecord::error`.
    pub async fn run(&self, name: &str, ctx: &EvaluationContext) -> ScoreRecord {
        let Some(evaluator) = self.evaluators.get(name) else {
            self.metrics.record_evaluator_error(name);
            return ScoreRecord::error(EvaluatorError::NotFound(name.to_string()).to_string());
        };

        let outcome = AssertUnwindSafe(evaluator.evaluate(ctx))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(EvaluatorError::Panicked(panic_message(&*panic))));

        match outcome {
            Ok(record) => {
                if record.is_error() {
                    self.metrics.record_evaluator_error(name);
                }
                record
            }
            Err(e) => {
                self.metrics.record_evaluator_error(name);
                tracing::debug!(evaluator = name, error = %e, "Evaluator returned an error");
                ScoreRecord::error(e.to_string())
            }
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct PanickingEvaluator;

    #[async_trait]
    impl Evaluator for PanickingEvaluator {
        async fn evaluate(&self, _ctx: &EvaluationContext) -> Result<ScoreRecord, EvaluatorError> {
            panic!("scorer exploded");
        }
    }

    struct LengthEvaluator;

    #[async_trait]
    impl Evaluator for LengthEvaluator {
        async fn evaluate(&self, ctx: &EvaluationContext) -> Result<ScoreRecord, EvaluatorError> {
            let ok = ctx.actual_output.len() <= ctx.config_f64("max_len", 10.0)? as usize;
            Ok(ScoreRecord::new(if ok { 1.0 } else { 0.0 }, ok))
        }
    }

    fn registry() -> EvaluatorRegistry {
        EvaluatorRegistry::with_builtins(
            Arc::new(ModelInvoker::new()),
            Arc::new(HashEmbedder::default()),
        )
    }

    #[test]
    fn test_builtins_registered() {
        assert_eq!(
            registry().available(),
            vec!["cost", "exact_match", "latency", "llm_judge", "semantic_similarity"]
        );
    }

    #[tokio::test]
    async fn test_unknown_evaluator_returns_error_record() {
        let record = registry()
            .run("bleu", &EvaluationContext::new("a", "a"))
            .await;
        assert_eq!(record, ScoreRecord::error("Evaluator 'bleu' not found"));
    }

    #[tokio::test]
    async fn test_panicking_evaluator_is_contained() {
        let mut registry = registry();
        registry.register("boom", Arc::new(PanickingEvaluator));

        let record = registry.run("boom", &EvaluationContext::new("a", "b")).await;
        assert_eq!(record.score, 0.0);
        assert!(!record.passed);
        assert_eq!(
            record.error.as_deref(),
            Some("Evaluator panicked: scorer exploded")
        );
    }

    #[tokio::test]
    async fn test_custom_registration_overwrites() {
        let mut registry = EvaluatorRegistry::new();
        registry.register("len", Arc::new(PanickingEvaluator));
        registry.register("len", Arc::new(LengthEvaluator));

        let ctx = EvaluationContext::new("", "short");
        assert!(registry.run("len", &ctx).await.passed);

        let ctx = ctx.with_config(json!({"max_len": "ten"}).as_object().cloned().unwrap());
        let record = registry.run("len", &ctx).await;
        assert!(record.error.unwrap().contains("max_len"));
    }

    #[test]
    fn test_score_record_serialization_skips_empty_fields() {
        let json = serde_json::to_value(ScoreRecord::new(1.0, true)).unwrap();
        assert_eq!(json, json!({"score": 1.0, "passed": true}));

        let json = serde_json::to_value(ScoreRecord::error("nope")).unwrap();
        assert_eq!(json, json!({"score": 0.0, "passed": false, "error": "nope"}));
    }

    #[test]
    fn test_evaluator_config_from_json() {
        let config: EvaluatorConfig = serde_json::from_value(json!({"name": "exact_match"})).unwrap();
        assert!(config.config.is_empty());

        let config = EvaluatorConfig::new("latency").with("max_latency_ms", 100);
        assert_eq!(config.config["max_latency_ms"], json!(100));
    }

    #[test]
    fn test_config_str_treats_empty_as_absent() {
        let ctx = EvaluationContext::default()
            .with_config(json!({"api_key": "", "model": "m"}).as_object().cloned().unwrap());
        assert_eq!(ctx.config_str("api_key").unwrap(), None);
        assert_eq!(ctx.config_str("model").unwrap(), Some("m"));
        assert_eq!(ctx.config_str("missing").unwrap(), None);
    }
}
