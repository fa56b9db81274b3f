//! Cosine similarity between embeddings of the expected and actual output.
//!
//! Config: `threshold` (default 0.8). The score is the raw similarity.
//! Two blank outputs are identical and score 1.0 without an embedding call.

use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

use super::embeddings::{cosine_similarity, EmbeddingProvider};
use super::{EvaluationContext, Evaluator, ScoreRecord};
use crate::error::EvaluatorError;

pub const NAME: &str = "semantic_similarity";

const DEFAULT_THRESHOLD: f64 = 0.8;

pub struct SemanticSimilarityEvaluator {
    embedder: Arc<dyn EmbeddingProvider>,
}

impl SemanticSimilarityEvaluator {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self { embedder }
    }
}

#[async_trait]
impl Evaluator for SemanticSimilarityEvaluator {
    async fn evaluate(&self, ctx: &EvaluationContext) -> Result<ScoreRecord, EvaluatorError> {
        let threshold = ctx.config_f64("threshold", DEFAULT_THRESHOLD)?;

        if ctx.expected_output.trim().is_empty() && ctx.actual_output.trim().is_empty() {
            return Ok(similarity_record(1.0, threshold));
        }

        let texts = [ctx.expected_output.clone(), ctx.actual_output.clone()];
        let vectors = self.embedder.embed(&texts).await?;
        let [expected, actual] = vectors.as_slice() else {
            return Err(EvaluatorError::Embedding(format!(
                "expected 2 embeddings, got {}",
                vectors.len()
            )));
        };

        let similarity = cosine_similarity(expected, actual)?;
        Ok(similarity_record(similarity, threshold))
    }
}

fn similarity_record(similarity: f64, threshold: f64) -> ScoreRecord {
    ScoreRecord::new(similarity, similarity >= threshold).with_details(json!({
        "similarity": similarity,
        "threshold": threshold,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluators::HashEmbedder;
    use ndarray::Array1;

    struct BrokenEmbedder;

    #[async_trait]
    impl EmbeddingProvider for BrokenEmbedder {
        async fn embed(&self, _texts: &[String]) -> Result<Vec<Array1<f64>>, EvaluatorError> {
            Err(EvaluatorError::Embedding("model unavailable".to_string()))
        }
    }

    #[tokio::test]
    async fn test_identical_outputs_pass() {
        let evaluator = SemanticSimilarityEvaluator::new(Arc::new(HashEmbedder::default()));
        let record = evaluator
            .evaluate(&EvaluationContext::new("Paris is lovely", "Paris is lovely"))
            .await
            .unwrap();
        assert!((record.score - 1.0).abs() < 1e-9);
        assert!(record.passed);
        assert_eq!(record.details.unwrap()["threshold"], 0.8);
    }

    #[tokio::test]
    async fn test_unrelated_outputs_fail() {
        let evaluator = SemanticSimilarityEvaluator::new(Arc::new(HashEmbedder::default()));
        let record = evaluator
            .evaluate(&EvaluationContext::new(
                "The mitochondria is the powerhouse of the cell",
                "Stock prices fell sharply on Tuesday",
            ))
            .await
            .unwrap();
        assert!(record.score < 0.8);
        assert!(!record.passed);
    }

    #[tokio::test]
    async fn test_blank_outputs_are_identical() {
        let evaluator = SemanticSimilarityEvaluator::new(Arc::new(HashEmbedder::default()));
        for (expected, actual) in [("", ""), ("  ", "\n")] {
            let record = evaluator
                .evaluate(&EvaluationContext::new(expected, actual))
                .await
                .unwrap();
            assert_eq!(record.score, 1.0);
            assert!(record.passed);
        }

        // Skips the embedder entirely.
        let evaluator = SemanticSimilarityEvaluator::new(Arc::new(BrokenEmbedder));
        assert!(evaluator
            .evaluate(&EvaluationContext::new("", " "))
            .await
            .unwrap()
            .passed);
    }

    #[tokio::test]
    async fn test_one_blank_side_scores_zero() {
        let evaluator = SemanticSimilarityEvaluator::new(Arc::new(HashEmbedder::default()));
        let record = evaluator
            .evaluate(&EvaluationContext::new("", "Paris"))
            .await
            .unwrap();
        assert_eq!(record.score, 0.0);
        assert!(!record.passed);
    }

    #[tokio::test]
    async fn test_embedding_failure_is_error() {
        let evaluator = SemanticSimilarityEvaluator::new(Arc::new(BrokenEmbedder));
        let err = evaluator
            .evaluate(&EvaluationContext::new("a", "b"))
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Semantic similarity computation failed: model unavailable"
        );
    }
}
