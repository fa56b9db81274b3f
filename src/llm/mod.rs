//! Model invocation for evaluation jobs.
//!
//! Providers implement [`LlmProvider`]; [`ModelInvoker`] routes a job's
//! [`PromptConfig`] to the provider it names and normalizes the outcome into
//! an [`InvocationResult`].
//!
//! ```ignore
//! use evalforge::llm::{ModelInvoker, PromptConfig, providers::OpenAiProvider};
//! use std::sync::Arc;
//!
//! let openai = OpenAiProvider::new(OPENAI_API_BASE, Some(key))?;
//! let invoker = ModelInvoker::new().with_provider("openai", Arc::new(openai));
//!
//! let config = PromptConfig::new("Capital of {country}?", "gpt-4");
//! let result = invoker.invoke(&config, &input, None).await;
//! ```

pub mod cost;
pub mod invoker;
pub mod prompt;
pub mod provider;
pub mod providers;

pub use cost::{estimate_cost_usd, price_per_1k};
pub use invoker::{InvocationResult, ModelFailure, ModelInvoker, ModelOutput, PromptConfig};
pub use prompt::render_template;
pub use provider::{Choice, GenerationRequest, GenerationResponse, LlmProvider, Message, Usage};
pub use providers::{AnthropicProvider, OpenAiProvider, ANTHROPIC_API_BASE, OPENAI_API_BASE};
