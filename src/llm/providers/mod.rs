//! HTTP model providers.

pub mod anthropic;
pub mod openai;

pub use anthropic::{AnthropicProvider, ANTHROPIC_API_BASE};
pub use openai::{OpenAiProvider, OPENAI_API_BASE};
