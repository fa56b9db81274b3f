//! Error types shared across the evaluation pipeline.
//!
//! Subsystem-specific errors live next to the code that raises them
//! (`QueueError`, `StoreError`, `WorkerError`, `ServiceError`, `ConfigError`).
//! This module holds the two that cross module boundaries:
//! - Model provider interactions (`LlmError`)
//! - Evaluator failures (`EvaluatorError`)

use thiserror::Error;

/// Errors that can occur while calling a model provider.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("{provider} API key not configured")]
    MissingApiKey { provider: String },

    #[error("Unsupported provider: {0}")]
    UnsupportedProvider(String),

    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("Failed to parse LLM response: {0}")]
    ParseError(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("{provider} API error ({code}): {message}")]
    ApiError {
        provider: String,
        code: u16,
        message: String,
    },

    #[error("Prompt template error: {0}")]
    Template(String),

    #[error("Model invocation timed out after {0}s")]
    Timeout(u64),
}

/// Errors raised inside an evaluator.
///
/// These never escape the evaluator registry; they are converted into an
/// error-shaped `ScoreRecord` for the item being scored.
#[derive(Debug, Error)]
pub enum EvaluatorError {
    #[error("Evaluator '{0}' not found")]
    NotFound(String),

    #[error("Execution time not provided")]
    MissingExecutionTime,

    #[error("Cost not provided")]
    MissingCost,

    #[error("API key required for LLM judge evaluator")]
    MissingApiKey,

    #[error("Invalid evaluator config '{key}': {message}")]
    InvalidConfig { key: String, message: String },

    #[error("Semantic similarity computation failed: {0}")]
    Embedding(String),

    #[error("LLM judge evaluation failed: {0}")]
    Judge(String),

    #[error("Evaluator panicked: {0}")]
    Panicked(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_llm_error_display() {
        let err = LlmError::MissingApiKey {
            provider: "OpenAI".to_string(),
        };
        assert_eq!(err.to_string(), "OpenAI API key not configured");

        let err = LlmError::UnsupportedProvider("cohere".to_string());
        assert!(err.to_string().contains("cohere"));

        let err = LlmError::Timeout(30);
        assert!(err.to_string().contains("30s"));
    }

    #[test]
    fn test_evaluator_error_messages() {
        assert_eq!(
            EvaluatorError::NotFound("bleu".to_string()).to_string(),
            "Evaluator 'bleu' not found"
        );
        assert_eq!(
            EvaluatorError::MissingExecutionTime.to_string(),
            "Execution time not provided"
        );
        assert_eq!(
            EvaluatorError::MissingApiKey.to_string(),
            "API key required for LLM judge evaluator"
        );
    }

    #[test]
    fn test_judge_error_carries_provider_message() {
        let cause = LlmError::RequestFailed("connection refused".to_string());
        let err = EvaluatorError::Judge(cause.to_string());
        assert!(err.to_string().starts_with("LLM judge evaluation failed"));
        assert!(err.to_string().contains("connection refused"));
    }
}
