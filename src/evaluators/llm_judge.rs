//! Asks a judge model to grade the actual output against the expected one.
//!
//! Config:
//! - `api_key` (required) credential passed to the judge provider
//! - `judge_model` (default `gpt-3.5-turbo`)
//! - `judge_provider` (default `openai`)
//! - `threshold` (default 0.7)
//!
//! The reply is parsed as a float and clamped to `[0, 1]`; an unparsable
//! reply scores `0.0`.

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;

use super::{EvaluationContext, Evaluator, ScoreRecord};
use crate::error::EvaluatorError;
use crate::llm::{InvocationResult, ModelInvoker, PromptConfig};

pub const NAME: &str = "llm_judge";

const DEFAULT_JUDGE_MODEL: &str = "gpt-3.5-turbo";
const DEFAULT_JUDGE_PROVIDER: &str = "openai";
const DEFAULT_THRESHOLD: f64 = 0.7;
const JUDGE_TEMPERATURE: f64 = 0.1;
const JUDGE_MAX_TOKENS: u32 = 10;
const JUDGE_TIMEOUT: Duration = Duration::from_secs(30);

pub struct LlmJudgeEvaluator {
    invoker: Arc<ModelInvoker>,
}

impl LlmJudgeEvaluator {
    pub fn new(invoker: Arc<ModelInvoker>) -> Self {
        Self { invoker }
    }
}

fn judge_prompt(input: &Map<String, Value>, expected: &str, actual: &str) -> String {
    format!(
        "Evaluate the quality of this response on a scale of 0-1:\n\n\
         Question/Input: {}\n\
         Expected Answer: {}\n\
         Actual Answer: {}\n\n\
         Consider:\n\
         - Accuracy and correctness\n\
         - Completeness of the response\n\
         - Relevance to the question\n\
         - Clarity and coherence\n\n\
         Provide only a number between 0 and 1 as your response.",
        Value::Object(input.clone()),
        expected,
        actual
    )
}

/// Parse the judge's reply; anything that is not a finite number scores 0.
fn parse_score(reply: &str) -> f64 {
    reply
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|s| s.is_finite())
        .map(|s| s.clamp(0.0, 1.0))
        .unwrap_or(0.0)
}

#[async_trait]
impl Evaluator for LlmJudgeEvaluator {
    async fn evaluate(&self, ctx: &EvaluationContext) -> Result<ScoreRecord, EvaluatorError> {
        let api_key = ctx
            .config_str("api_key")?
            .ok_or(EvaluatorError::MissingApiKey)?;
        let judge_model = ctx.config_str("judge_model")?.unwrap_or(DEFAULT_JUDGE_MODEL);
        let judge_provider = ctx
            .config_str("judge_provider")?
            .unwrap_or(DEFAULT_JUDGE_PROVIDER);
        let threshold = ctx.config_f64("threshold", DEFAULT_THRESHOLD)?;

        let config = PromptConfig::new(String::new(), judge_model)
            .with_provider(judge_provider)
            .with_temperature(JUDGE_TEMPERATURE)
            .with_max_tokens(JUDGE_MAX_TOKENS);
        let prompt = judge_prompt(&ctx.input, &ctx.expected_output, &ctx.actual_output);

        let reply = match self
            .invoker
            .invoke_prompt(&config, prompt, Some(api_key), Some(JUDGE_TIMEOUT))
            .await
        {
            InvocationResult::Success(out) => out.output,
            InvocationResult::Failure(fail) => return Err(EvaluatorError::Judge(fail.error)),
        };

        let score = parse_score(&reply);

        Ok(ScoreRecord::new(score, score >= threshold).with_details(json!({
            "judge_model": judge_model,
            "threshold": threshold,
            "raw_response": reply.trim(),
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LlmError;
    use crate::llm::{Choice, GenerationRequest, GenerationResponse, LlmProvider, Message, Usage};
    use std::sync::Mutex;

    struct FixedJudge {
        reply: String,
        seen: Mutex<Vec<GenerationRequest>>,
    }

    impl FixedJudge {
        fn new(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: reply.to_string(),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl LlmProvider for FixedJudge {
        async fn generate(
            &self,
            request: GenerationRequest,
        ) -> Result<GenerationResponse, LlmError> {
            self.seen.lock().unwrap().push(request.clone());
            Ok(GenerationResponse {
                id: "judge".to_string(),
                model: request.model,
                choices: vec![Choice {
                    index: 0,
                    message: Message::assistant(self.reply.clone()),
                    finish_reason: "stop".to_string(),
                }],
                usage: Usage::default(),
            })
        }
    }

    fn ctx(config: Value) -> EvaluationContext {
        EvaluationContext::new("Paris", "Paris, France")
            .with_config(config.as_object().cloned().unwrap_or_default())
    }

    fn evaluator(judge: Arc<FixedJudge>) -> LlmJudgeEvaluator {
        LlmJudgeEvaluator::new(Arc::new(ModelInvoker::new().with_provider("openai", judge)))
    }

    #[tokio::test]
    async fn test_missing_api_key() {
        let judge = FixedJudge::new("0.9");
        let err = evaluator(judge.clone())
            .evaluate(&ctx(json!({})))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "API key required for LLM judge evaluator");
        assert!(judge.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_judge_score_and_request_shape() {
        let judge = FixedJudge::new(" 0.85\n");
        let record = evaluator(judge.clone())
            .evaluate(&ctx(json!({"api_key": "sk-judge"})))
            .await
            .unwrap();

        assert!((record.score - 0.85).abs() < 1e-12);
        assert!(record.passed);
        assert_eq!(record.details.unwrap()["raw_response"], "0.85");

        let seen = judge.seen.lock().unwrap();
        assert_eq!(seen[0].model, "gpt-3.5-turbo");
        assert_eq!(seen[0].temperature, Some(0.1));
        assert_eq!(seen[0].max_tokens, Some(10));
        assert_eq!(seen[0].api_key.as_deref(), Some("sk-judge"));
        assert!(seen[0].messages[0].content.contains("Actual Answer: Paris, France"));
    }

    #[tokio::test]
    async fn test_unparsable_reply_scores_zero() {
        let record = evaluator(FixedJudge::new("Excellent!"))
            .evaluate(&ctx(json!({"api_key": "sk"})))
            .await
            .unwrap();
        assert_eq!(record.score, 0.0);
        assert!(!record.passed);
        assert!(record.error.is_none());
    }

    #[tokio::test]
    async fn test_unknown_judge_provider_is_error() {
        let err = evaluator(FixedJudge::new("1"))
            .evaluate(&ctx(json!({"api_key": "sk", "judge_provider": "cohere"})))
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "LLM judge evaluation failed: Unsupported provider: cohere"
        );
    }

    #[test]
    fn test_parse_score_clamps() {
        assert_eq!(parse_score("1.7"), 1.0);
        assert_eq!(parse_score("-0.2"), 0.0);
        assert_eq!(parse_score("0.5"), 0.5);
        assert_eq!(parse_score("NaN"), 0.0);
        assert_eq!(parse_score(""), 0.0);
    }
}
