//! Process configuration read from the environment.

use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::llm::{ANTHROPIC_API_BASE, OPENAI_API_BASE};
use crate::scheduler::DEFAULT_QUEUE_NAME;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable has an invalid value.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Which embedding backend `semantic_similarity` uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmbeddingBackend {
    /// Local hashed n-gram vectors; no network.
    #[default]
    Hash,
    /// OpenAI-compatible `/embeddings` endpoint.
    OpenAi,
}

impl FromStr for EmbeddingBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "hash" => Ok(EmbeddingBackend::Hash),
            "openai" => Ok(EmbeddingBackend::OpenAi),
            other => Err(format!("expected 'hash' or 'openai', got '{}'", other)),
        }
    }
}

/// Configuration shared by the worker and the submission commands.
#[derive(Debug, Clone)]
pub struct AppConfig {
    // Backends
    pub redis_url: String,
    pub database_url: String,
    pub queue_name: String,

    // Worker loop
    pub poll_interval: Duration,
    pub failure_backoff: Duration,

    // Providers
    pub openai_api_key: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub openai_api_base: String,
    pub anthropic_api_base: String,
    /// HTTP timeout for provider requests.
    pub request_timeout: Duration,
    pub embeddings: EmbeddingBackend,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            database_url: "postgres://localhost/evalforge".to_string(),
            queue_name: DEFAULT_QUEUE_NAME.to_string(),
            poll_interval: Duration::from_millis(1000),
            failure_backoff: Duration::from_millis(5000),
            openai_api_key: None,
            anthropic_api_key: None,
            openai_api_base: OPENAI_API_BASE.to_string(),
            anthropic_api_base: ANTHROPIC_API_BASE.to_string(),
            request_timeout: Duration::from_secs(30),
            embeddings: EmbeddingBackend::Hash,
        }
    }
}

impl AppConfig {
    /// Creates configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `REDIS_URL`: queue backend (default: redis://localhost:6379)
    /// - `DATABASE_URL`: run store (default: postgres://localhost/evalforge)
    /// - `EVALFORGE_QUEUE_NAME`: pending-job list (default: evaluation_jobs)
    /// - `EVALFORGE_POLL_INTERVAL_MS`: empty-queue sleep (default: 1000)
    /// - `EVALFORGE_FAILURE_BACKOFF_MS`: sleep after a dequeue error (default: 5000)
    /// - `OPENAI_API_KEY`, `ANTHROPIC_API_KEY`: provider credentials (optional)
    /// - `OPENAI_API_BASE`, `ANTHROPIC_API_BASE`: provider endpoints
    /// - `EVALFORGE_REQUEST_TIMEOUT_SECS`: provider HTTP timeout (default: 30)
    /// - `EVALFORGE_EMBEDDINGS`: `hash` or `openai` (default: hash)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) over an arbitrary lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(val) = lookup("REDIS_URL") {
            config.redis_url = val;
        }
        if let Some(val) = lookup("DATABASE_URL") {
            config.database_url = val;
        }
        if let Some(val) = lookup("EVALFORGE_QUEUE_NAME") {
            config.queue_name = val;
        }

        if let Some(val) = lookup("EVALFORGE_POLL_INTERVAL_MS") {
            let ms: u64 = parse_env_value(&val, "EVALFORGE_POLL_INTERVAL_MS")?;
            config.poll_interval = Duration::from_millis(ms);
        }
        if let Some(val) = lookup("EVALFORGE_FAILURE_BACKOFF_MS") {
            let ms: u64 = parse_env_value(&val, "EVALFORGE_FAILURE_BACKOFF_MS")?;
            config.failure_backoff = Duration::from_millis(ms);
        }

        config.openai_api_key = lookup("OPENAI_API_KEY").filter(|k| !k.trim().is_empty());
        config.anthropic_api_key = lookup("ANTHROPIC_API_KEY").filter(|k| !k.trim().is_empty());
        if let Some(val) = lookup("OPENAI_API_BASE") {
            config.openai_api_base = val;
        }
        if let Some(val) = lookup("ANTHROPIC_API_BASE") {
            config.anthropic_api_base = val;
        }

        if let Some(val) = lookup("EVALFORGE_REQUEST_TIMEOUT_SECS") {
            let secs: u64 = parse_env_value(&val, "EVALFORGE_REQUEST_TIMEOUT_SECS")?;
            config.request_timeout = Duration::from_secs(secs);
        }
        if let Some(val) = lookup("EVALFORGE_EMBEDDINGS") {
            config.embeddings = val.parse().map_err(|message| ConfigError::InvalidValue {
                key: "EVALFORGE_EMBEDDINGS".to_string(),
                message,
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue_name.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "queue_name cannot be empty".to_string(),
            ));
        }

        if self.poll_interval.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "poll_interval must be greater than 0".to_string(),
            ));
        }

        if self.request_timeout.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "request_timeout must be greater than 0".to_string(),
            ));
        }

        if self.embeddings == EmbeddingBackend::OpenAi && self.openai_api_key.is_none() {
            return Err(ConfigError::ValidationFailed(
                "openai embeddings require OPENAI_API_KEY".to_string(),
            ));
        }

        Ok(())
    }
}

/// Parse an environment variable value into the target type.
fn parse_env_value<T: FromStr>(value: &str, key: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("could not parse '{}'", value),
    })
}
