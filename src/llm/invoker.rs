//! Model invocation adapter.
//!
//! `ModelInvoker` renders a prompt template against one dataset item, routes
//! the call to the provider named in the `PromptConfig`, times it, estimates
//! its cost, and folds every outcome into an [`InvocationResult`]. It never
//! returns an error: provider failures, timeouts, template errors and
//! unsupported providers are all encoded as [`InvocationResult::Failure`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::LlmError;
use crate::llm::cost::estimate_cost_usd;
use crate::llm::prompt::render_template;
use crate::llm::provider::{GenerationRequest, LlmProvider, Message};
use crate::metrics::MetricsCollector;

/// Prompt and model settings attached to a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptConfig {
    /// Template rendered once per dataset item.
    pub template: String,
    /// Model identifier passed to the provider.
    pub model: String,
    /// Provider name (`openai` or `anthropic`).
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_provider() -> String {
    "openai".to_string()
}

fn default_temperature() -> f64 {
    0.7
}

fn default_max_tokens() -> u32 {
    1000
}

impl PromptConfig {
    /// Create a config with default provider, temperature and max tokens.
    pub fn new(template: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            model: model.into(),
            provider: default_provider(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = provider.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// A successful model call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelOutput {
    pub output: String,
    pub execution_time_ms: f64,
    /// Estimated from the static pricing table.
    pub cost_usd: f64,
    pub tokens_used: u32,
    pub model: String,
    pub provider: String,
}

/// A failed model call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelFailure {
    pub error: String,
    pub execution_time_ms: f64,
    pub model: String,
    pub provider: String,
}

/// Uniform outcome of one model invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InvocationResult {
    Success(ModelOutput),
    Failure(ModelFailure),
}

impl InvocationResult {
    pub fn is_success(&self) -> bool {
        matches!(self, InvocationResult::Success(_))
    }

    pub fn execution_time_ms(&self) -> f64 {
        match self {
            InvocationResult::Success(out) => out.execution_time_ms,
            InvocationResult::Failure(fail) => fail.execution_time_ms,
        }
    }
}

/// Routes prompts to registered providers by name.
#[derive(Clone, Default)]
pub struct ModelInvoker {
    providers: HashMap<String, Arc<dyn LlmProvider>>,
    metrics: MetricsCollector,
}

impl ModelInvoker {
    /// Create an invoker with no providers registered.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the provider served under `name`.
    pub fn with_provider(mut self, name: impl Into<String>, provider: Arc<dyn LlmProvider>) -> Self {
        self.register(name, provider);
        self
    }

    pub fn register(&mut self, name: impl Into<String>, provider: Arc<dyn LlmProvider>) {
        self.providers.insert(name.into(), provider);
    }

    /// Names of registered providers, sorted.
    pub fn provider_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.providers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Render the job's template against `input` and call the model.
    pub async fn invoke(
        &self,
        config: &PromptConfig,
        input: &Map<String, Value>,
        timeout: Option<Duration>,
    ) -> InvocationResult {
        match render_template(&config.template, input) {
            Ok(prompt) => self.invoke_prompt(config, prompt, None, timeout).await,
            Err(e) => failure(config, e, 0.0),
        }
    }

    /// Send an already rendered prompt. `credential` overrides the provider's
    /// configured API key for this call only.
    pub async fn invoke_prompt(
        &self,
        config: &PromptConfig,
        prompt: String,
        credential: Option<&str>,
        timeout: Option<Duration>,
    ) -> InvocationResult {
        let Some(provider) = self.providers.get(&config.provider) else {
            return failure(
                config,
                LlmError::UnsupportedProvider(config.provider.clone()),
                0.0,
            );
        };

        let mut request = GenerationRequest::new(config.model.clone(), vec![Message::user(prompt)])
            .with_temperature(config.temperature)
            .with_max_tokens(config.max_tokens);
        if let Some(key) = credential {
            request = request.with_api_key(key);
        }

        let start = Instant::now();
        let outcome = match timeout {
            Some(limit) => match tokio::time::timeout(limit, provider.generate(request)).await {
                Ok(result) => result,
                Err(_) => Err(LlmError::Timeout(limit.as_secs())),
            },
            None => provider.generate(request).await,
        };
        let elapsed = start.elapsed();
        let execution_time_ms = elapsed.as_secs_f64() * 1000.0;

        match outcome {
            Ok(response) => {
                let tokens_used = response.usage.total_tokens;
                self.metrics.record_model_call(
                    &config.provider,
                    true,
                    elapsed.as_secs_f64(),
                    tokens_used,
                );

                InvocationResult::Success(ModelOutput {
                    output: response.first_content().unwrap_or_default().to_string(),
                    execution_time_ms,
                    cost_usd: estimate_cost_usd(&config.provider, &config.model, tokens_used),
                    tokens_used,
                    model: config.model.clone(),
                    provider: config.provider.clone(),
                })
            }
            Err(e) => {
                self.metrics
                    .record_model_call(&config.provider, false, elapsed.as_secs_f64(), 0);
                tracing::debug!(
                    provider = %config.provider,
                    model = %config.model,
                    error = %e,
                    "Model invocation failed"
                );
                failure(config, e, execution_time_ms)
            }
        }
    }
}

fn failure(config: &PromptConfig, error: LlmError, execution_time_ms: f64) -> InvocationResult {
    InvocationResult::Failure(ModelFailure {
        error: error.to_string(),
        execution_time_ms,
        model: config.model.clone(),
        provider: config.provider.clone(),
    })
}
