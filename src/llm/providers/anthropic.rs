//! Anthropic messages API provider.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::LlmError;
use crate::llm::provider::{
    Choice, GenerationRequest, GenerationResponse, LlmProvider, Message, Usage,
};

/// Default Anthropic API endpoint.
pub const ANTHROPIC_API_BASE: &str = "https://api.anthropic.com/v1";

/// API version header value.
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// The messages API requires `max_tokens`.
const DEFAULT_MAX_TOKENS: u32 = 1000;

const PROVIDER_NAME: &str = "Anthropic";

/// Client for the Anthropic messages API.
pub struct AnthropicProvider {
    api_base: String,
    api_key: Option<String>,
    http_client: Client,
}

impl AnthropicProvider {
    /// Create a new provider against the given base URL.
    pub fn new(api_base: impl Into<String>, api_key: Option<String>) -> Result<Self, LlmError> {
        Self::with_timeout(api_base, api_key, Duration::from_secs(REQUEST_TIMEOUT_SECS))
    }

    /// Create a new provider with a custom request timeout.
    pub fn with_timeout(
        api_base: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, LlmError> {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LlmError::RequestFailed(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            api_base: api_base.into().trim_end_matches('/').to_string(),
            api_key,
            http_client,
        })
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }
}

#[derive(Debug, Serialize)]
struct ApiRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    id: String,
    model: String,
    content: Vec<ContentBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
    usage: ApiUsage,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    input_tokens: u32,
    output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// Split system messages out; the messages API carries them in a top-level field.
fn split_system(messages: Vec<Message>) -> (Option<String>, Vec<Message>) {
    let (system, rest): (Vec<Message>, Vec<Message>) =
        messages.into_iter().partition(|m| m.role == "system");

    let system = if system.is_empty() {
        None
    } else {
        Some(
            system
                .into_iter()
                .map(|m| m.content)
                .collect::<Vec<_>>()
                .join("\n\n"),
        )
    };

    (system, rest)
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, LlmError> {
        let api_key = request
            .api_key
            .clone()
            .or_else(|| self.api_key.clone())
            .ok_or_else(|| LlmError::MissingApiKey {
                provider: PROVIDER_NAME.to_string(),
            })?;

        let (system, messages) = split_system(request.messages);
        let api_request = ApiRequest {
            model: request.model,
            max_tokens: request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            system,
            messages,
            temperature: request.temperature,
        };

        let url = format!("{}/messages", self.api_base);

        let http_response = self
            .http_client
            .post(&url)
            .header("Content-Type", "application/json")
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&api_request)
            .send()
            .await
            .map_err(|e| LlmError::RequestFailed(e.to_string()))?;

        let status = http_response.status();

        if !status.is_success() {
            let status_code = status.as_u16();
            let error_text = http_response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error response".to_string());

            let message = serde_json::from_str::<ApiErrorResponse>(&error_text)
                .map(|r| r.error.message)
                .unwrap_or(error_text);

            if status_code == 429 {
                return Err(LlmError::RateLimited(message));
            }

            return Err(LlmError::ApiError {
                provider: PROVIDER_NAME.to_string(),
                code: status_code,
                message,
            });
        }

        let api_response: ApiResponse = http_response
            .json()
            .await
            .map_err(|e| LlmError::ParseError(format!("Failed to parse API response: {}", e)))?;

        let text = api_response
            .content
            .iter()
            .find(|block| block.kind == "text")
            .and_then(|block| block.text.clone())
            .ok_or_else(|| LlmError::ParseError("Response contained no text block".to_string()))?;

        let prompt_tokens = api_response.usage.input_tokens;
        let completion_tokens = api_response.usage.output_tokens;

        Ok(GenerationResponse {
            id: api_response.id,
            model: api_response.model,
            choices: vec![Choice {
                index: 0,
                message: Message::assistant(text),
                finish_reason: api_response.stop_reason.unwrap_or_default(),
            }],
            usage: Usage {
                prompt_tokens,
                completion_tokens,
                total_tokens: prompt_tokens + completion_tokens,
            },
        })
    }
}
