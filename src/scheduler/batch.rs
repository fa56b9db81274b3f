//! Concurrent execution of one batch of dataset items.
//!
//! Every item in a batch runs as its own tokio task: model invocation, then
//! all configured evaluators concurrently. The batch waits for every task
//! and returns results in submission order. Handled failures (model errors,
//! evaluator errors) are encoded in the result; a task that dies outright is
//! logged and counted as dropped without affecting its siblings.

use chrono::Utc;
use futures::future::join_all;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use super::job::{DatasetItem, EvaluationResult, Job};
use crate::evaluators::{EvaluationContext, EvaluatorConfig, EvaluatorRegistry};
use crate::llm::{InvocationResult, ModelInvoker, PromptConfig};
use crate::metrics::{ItemOutcome, MetricsCollector};

/// Results of one batch.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    /// One result per surviving item, in submission order.
    pub results: Vec<EvaluationResult>,
    /// Items whose task died before producing a result.
    pub dropped: usize,
}

impl BatchOutcome {
    /// Items accounted for, with or without a result.
    pub fn attempted(&self) -> usize {
        self.results.len() + self.dropped
    }
}

/// Runs batches of items against a model and a set of evaluators.
#[derive(Clone)]
pub struct BatchExecutor {
    invoker: Arc<ModelInvoker>,
    registry: Arc<EvaluatorRegistry>,
    metrics: MetricsCollector,
}

impl BatchExecutor {
    pub fn new(invoker: Arc<ModelInvoker>, registry: Arc<EvaluatorRegistry>) -> Self {
        Self {
            invoker,
            registry,
            metrics: MetricsCollector::new(),
        }
    }

    pub fn registry(&self) -> &EvaluatorRegistry {
        &self.registry
    }

    /// Evaluate `items` concurrently under `job`'s configuration.
    ///
    /// `first_index` is the position of `items[0]` in the job, used for logs.
    pub async fn run_batch(
        &self,
        items: &[DatasetItem],
        job: &Job,
        first_index: usize,
    ) -> BatchOutcome {
        let prompt = Arc::new(job.prompt_config.clone());
        let evaluators = Arc::new(job.evaluators.clone());
        let timeout = job.execution_config.model_timeout();

        let handles: Vec<_> = items
            .iter()
            .cloned()
            .map(|item| {
                let executor = self.clone();
                let prompt = Arc::clone(&prompt);
                let evaluators = Arc::clone(&evaluators);
                tokio::spawn(async move {
                    executor
                        .evaluate_item(item, &prompt, &evaluators, timeout)
                        .await
                })
            })
            .collect();

        let mut outcome = BatchOutcome::default();
        for (offset, joined) in join_all(handles).await.into_iter().enumerate() {
            match joined {
                Ok(result) => outcome.results.push(result),
                Err(e) => {
                    outcome.dropped += 1;
                    tracing::warn!(
                        job_id = %job.job_id,
                        item_index = first_index + offset,
                        error = %e,
                        "Item task failed; dropping item from batch"
                    );
                }
            }
        }

        let successes = outcome.results.iter().filter(|r| r.is_success).count();
        self.metrics.record_items(ItemOutcome::Success, successes);
        self.metrics
            .record_items(ItemOutcome::ModelError, outcome.results.len() - successes);
        self.metrics.record_items(ItemOutcome::Dropped, outcome.dropped);

        outcome
    }

    /// Invoke the model for one item and score its output.
    pub async fn evaluate_item(
        &self,
        item: DatasetItem,
        prompt: &PromptConfig,
        evaluators: &[EvaluatorConfig],
        timeout: Option<Duration>,
    ) -> EvaluationResult {
        let output = match self.invoker.invoke(prompt, &item.input, timeout).await {
            InvocationResult::Success(output) => output,
            InvocationResult::Failure(failure) => {
                return EvaluationResult {
                    input_data: item.input,
                    expected_output: item.expected_output,
                    actual_output: None,
                    custom_metrics: BTreeMap::new(),
                    latency_ms: 0.0,
                    cost_usd: 0.0,
                    tokens_used: 0,
                    is_success: false,
                    error_message: Some(failure.error),
                    created_at: Utc::now(),
                };
            }
        };

        let base = EvaluationContext::new(item.expected_output.clone(), output.output.clone())
            .with_input(item.input.clone())
            .with_execution_time_ms(output.execution_time_ms)
            .with_cost_usd(output.cost_usd);

        let scores = join_all(evaluators.iter().map(|evaluator| {
            let ctx = base.clone().with_config(evaluator.config.clone());
            async move {
                let record = self.registry.run(&evaluator.name, &ctx).await;
                (evaluator.name.clone(), record)
            }
        }))
        .await;

        EvaluationResult {
            input_data: item.input,
            expected_output: item.expected_output,
            actual_output: Some(output.output),
            custom_metrics: scores.into_iter().collect(),
            latency_ms: output.execution_time_ms,
            cost_usd: output.cost_usd,
            tokens_used: output.tokens_used,
            is_success: true,
            error_message: None,
            created_at: Utc::now(),
        }
    }
}

/// Split `total` items into `(start, end)` ranges of at most `batch_size`.
pub fn batch_ranges(total: usize, batch_size: usize) -> Vec<(usize, usize)> {
    let size = batch_size.max(1);
    (0..total)
        .step_by(size)
        .map(|start| (start, (start + size).min(total)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{EvaluatorError, LlmError};
    use crate::evaluators::{Evaluator, HashEmbedder, ScoreRecord};
    use crate::llm::{Choice, GenerationRequest, GenerationResponse, LlmProvider, Message, Usage};
    use crate::scheduler::job::{ExecutionConfig, JobSubmission};
    use async_trait::async_trait;
    use serde_json::{json, Map, Value};
    use uuid::Uuid;

    /// Echoes the rendered prompt; fails on "FAIL", panics on "PANIC".
    struct ScriptedProvider;

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        async fn generate(
            &self,
            request: GenerationRequest,
        ) -> Result<GenerationResponse, LlmError> {
            let prompt = request.messages[0].content.clone();
            if prompt == "PANIC" {
                panic!("provider crashed");
            }
            if prompt == "FAIL" {
                return Err(LlmError::RequestFailed("upstream 503".to_string()));
            }
            Ok(GenerationResponse {
                id: "scripted".to_string(),
                model: request.model,
                choices: vec![Choice {
                    index: 0,
                    message: Message::assistant(prompt),
                    finish_reason: "stop".to_string(),
                }],
                usage: Usage {
                    prompt_tokens: 10,
                    completion_tokens: 10,
                    total_tokens: 20,
                },
            })
        }
    }

    struct AlwaysErrors;

    #[async_trait]
    impl Evaluator for AlwaysErrors {
        async fn evaluate(&self, _ctx: &EvaluationContext) -> Result<ScoreRecord, EvaluatorError> {
            Err(EvaluatorError::Embedding("offline".to_string()))
        }
    }

    fn executor() -> BatchExecutor {
        let invoker =
            Arc::new(ModelInvoker::new().with_provider("openai", Arc::new(ScriptedProvider)));
        let mut registry =
            EvaluatorRegistry::with_builtins(invoker.clone(), Arc::new(HashEmbedder::default()));
        registry.register("always_errors", Arc::new(AlwaysErrors));
        BatchExecutor::new(invoker, Arc::new(registry))
    }

    fn item(text: &str, expected: &str) -> DatasetItem {
        let input: Map<String, Value> = json!({"text": text}).as_object().cloned().unwrap_or_default();
        DatasetItem::new(input, expected)
    }

    fn job(items: Vec<DatasetItem>, evaluators: Vec<EvaluatorConfig>) -> Job {
        Job::from_submission(JobSubmission {
            experiment_run_id: Uuid::new_v4(),
            dataset_items: items,
            prompt_config: PromptConfig::new("{text}", "gpt-4"),
            evaluators,
            execution_config: ExecutionConfig::default(),
        })
    }

    #[tokio::test]
    async fn test_results_in_submission_order() {
        let items: Vec<_> = (0..5).map(|i| item(&format!("a{}", i), "x")).collect();
        let job = job(items.clone(), vec![]);

        let outcome = executor().run_batch(&items, &job, 0).await;
        assert_eq!(outcome.dropped, 0);
        let outputs: Vec<_> = outcome
            .results
            .iter()
            .map(|r| r.actual_output.clone().unwrap_or_default())
            .collect();
        assert_eq!(outputs, vec!["a0", "a1", "a2", "a3", "a4"]);
    }

    #[tokio::test]
    async fn test_model_failure_skips_evaluators() {
        let items = vec![item("Paris", "Paris"), item("FAIL", "Paris")];
        let job = job(items.clone(), vec![EvaluatorConfig::new("exact_match")]);

        let outcome = executor().run_batch(&items, &job, 0).await;
        assert_eq!(outcome.results.len(), 2);

        let ok = &outcome.results[0];
        assert!(ok.is_success);
        assert_eq!(ok.custom_metrics["exact_match"].score, 1.0);
        assert!((ok.cost_usd - 0.0006).abs() < 1e-12);

        let failed = &outcome.results[1];
        assert!(!failed.is_success);
        assert!(failed.custom_metrics.is_empty());
        assert_eq!(failed.latency_ms, 0.0);
        assert_eq!(failed.cost_usd, 0.0);
        assert!(failed.error_message.as_deref().unwrap().contains("upstream 503"));
    }

    #[tokio::test]
    async fn test_evaluator_error_does_not_fail_item() {
        let items = vec![item("yes", "yes")];
        let job = job(
            items.clone(),
            vec![
                EvaluatorConfig::new("always_errors"),
                EvaluatorConfig::new("exact_match"),
                EvaluatorConfig::new("nonexistent"),
            ],
        );

        let outcome = executor().run_batch(&items, &job, 0).await;
        let result = &outcome.results[0];
        assert!(result.is_success);
        assert!(result.custom_metrics["always_errors"].is_error());
        assert!(result.custom_metrics["exact_match"].passed);
        assert_eq!(
            result.custom_metrics["nonexistent"].error.as_deref(),
            Some("Evaluator 'nonexistent' not found")
        );
    }

    #[tokio::test]
    async fn test_panicking_task_is_dropped() {
        let items = vec![item("one", "one"), item("PANIC", "x"), item("three", "three")];
        let job = job(items.clone(), vec![EvaluatorConfig::new("exact_match")]);

        let outcome = executor().run_batch(&items, &job, 10).await;
        assert_eq!(outcome.dropped, 1);
        assert_eq!(outcome.results.len(), 2);
        assert_eq!(outcome.attempted(), 3);
        assert_eq!(outcome.results[0].actual_output.as_deref(), Some("one"));
        assert_eq!(outcome.results[1].actual_output.as_deref(), Some("three"));
    }

    #[tokio::test]
    async fn test_latency_and_cost_evaluators_see_measurements() {
        let items = vec![item("x", "x")];
        let job = job(
            items.clone(),
            vec![EvaluatorConfig::new("latency"), EvaluatorConfig::new("cost")],
        );

        let result = &executor().run_batch(&items, &job, 0).await.results[0];
        assert!(result.custom_metrics["latency"].passed);
        assert!(result.custom_metrics["cost"].passed);
        assert!(result.custom_metrics["latency"].error.is_none());
    }

    #[test]
    fn test_batch_ranges() {
        assert!(batch_ranges(0, 5).is_empty());
        assert_eq!(batch_ranges(5, 5), vec![(0, 5)]);
        assert_eq!(batch_ranges(7, 3), vec![(0, 3), (3, 6), (6, 7)]);
        assert_eq!(batch_ranges(2, 0), vec![(0, 1), (1, 2)]);
    }
}
