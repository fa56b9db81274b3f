//! Text embeddings for the semantic similarity evaluator.
//!
//! Two backends implement [`EmbeddingProvider`]:
//! - [`HashEmbedder`]: deterministic, local, hashed word and character-trigram
//!   features. Needs no network and is the default.
//! - [`OpenAiEmbedder`]: an OpenAI-compatible `/embeddings` endpoint.

use async_trait::async_trait;
use ndarray::Array1;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::Duration;

use crate::error::EvaluatorError;

/// Default embedding dimension for hashed embeddings.
const DEFAULT_DIMENSION: usize = 256;

/// Default model for the remote embedder.
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Turns texts into vectors, one per input, in input order.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Array1<f64>>, EvaluatorError>;
}

/// Hash-based bag-of-features embedder.
///
/// Half of the dimensions hold word frequencies, a quarter hold character
/// trigram counts, and the tail holds a few length statistics. The vector is
/// L2-normalized. Text is lowercased first.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimension: usize,
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_DIMENSION)
    }
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Embed a single text. Empty text yields the zero vector.
    pub fn embed_text(&self, text: &str) -> Array1<f64> {
        let mut embedding = Array1::zeros(self.dimension);

        if text.trim().is_empty() {
            return embedding;
        }

        let lowered = text.to_lowercase();

        let words: Vec<&str> = lowered.split_whitespace().collect();
        let word_dim = self.dimension / 2;
        for word in &words {
            let pos = hash_to_index(word, word_dim);
            embedding[pos] += 1.0 / words.len() as f64;
        }

        let trigram_offset = word_dim;
        let trigram_dim = self.dimension / 4;
        let chars: Vec<char> = lowered.chars().collect();
        for window in chars.windows(3) {
            let trigram: String = window.iter().collect();
            let pos = trigram_offset + hash_to_index(&trigram, trigram_dim);
            embedding[pos] += 1.0;
        }

        let stats_offset = trigram_offset + trigram_dim;
        let remaining = self.dimension.saturating_sub(stats_offset);
        if remaining > 0 {
            embedding[stats_offset] = (text.len() as f64 / 1000.0).min(1.0);
        }
        if remaining > 1 {
            embedding[stats_offset + 1] = (words.len() as f64 / 200.0).min(1.0);
        }

        normalize(&mut embedding);
        embedding
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Array1<f64>>, EvaluatorError> {
        if self.dimension < 4 {
            return Err(EvaluatorError::Embedding(format!(
                "embedding dimension {} is too small",
                self.dimension
            )));
        }
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }
}

fn hash_to_index(input: &str, max_index: usize) -> usize {
    if max_index == 0 {
        return 0;
    }
    let hash_bytes = Sha256::digest(input.as_bytes());
    let hash_val = u32::from_be_bytes([hash_bytes[0], hash_bytes[1], hash_bytes[2], hash_bytes[3]]);
    hash_val as usize % max_index
}

fn normalize(v: &mut Array1<f64>) {
    let norm: f64 = v.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm > 1e-10 {
        v.mapv_inplace(|x| x / norm);
    }
}

/// Cosine similarity in `[-1, 1]`; `0.0` when either vector has zero norm.
pub fn cosine_similarity(a: &Array1<f64>, b: &Array1<f64>) -> Result<f64, EvaluatorError> {
    if a.len() != b.len() {
        return Err(EvaluatorError::Embedding(format!(
            "embedding lengths differ ({} vs {})",
            a.len(),
            b.len()
        )));
    }

    let dot_product = a.dot(b);
    let norm_a = a.dot(a).sqrt();
    let norm_b = b.dot(b).sqrt();

    if norm_a < 1e-10 || norm_b < 1e-10 {
        return Ok(0.0);
    }

    Ok(dot_product / (norm_a * norm_b))
}

/// Client for an OpenAI-compatible embeddings endpoint.
pub struct OpenAiEmbedder {
    api_base: String,
    api_key: String,
    model: String,
    http_client: Client,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingDatum {
    index: usize,
    embedding: Vec<f64>,
}

impl OpenAiEmbedder {
    pub fn new(
        api_base: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self, EvaluatorError> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| EvaluatorError::Embedding(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            api_base: api_base.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            http_client,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Array1<f64>>, EvaluatorError> {
        let url = format!("{}/embeddings", self.api_base);
        let response = self
            .http_client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&EmbeddingRequest {
                model: &self.model,
                input: texts,
            })
            .send()
            .await
            .map_err(|e| EvaluatorError::Embedding(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EvaluatorError::Embedding(format!(
                "embeddings API returned {}: {}",
                status.as_u16(),
                body
            )));
        }

        let mut parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| EvaluatorError::Embedding(format!("invalid embeddings response: {}", e)))?;

        if parsed.data.len() != texts.len() {
            return Err(EvaluatorError::Embedding(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                parsed.data.len()
            )));
        }

        parsed.data.sort_by_key(|d| d.index);
        Ok(parsed
            .data
            .into_iter()
            .map(|d| Array1::from_vec(d.embedding))
            .collect())
    }
}
