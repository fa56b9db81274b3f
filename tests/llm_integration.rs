//! Integration tests for the HTTP model providers.
//!
//! These tests make real API calls.
//! Run with: OPENAI_API_KEY=... ANTHROPIC_API_KEY=... cargo test --test llm_integration -- --ignored

use std::sync::Arc;

use evalforge::evaluators::{EvaluationContext, EvaluatorRegistry, HashEmbedder};
use evalforge::llm::{
    AnthropicProvider, GenerationRequest, InvocationResult, LlmProvider, Message, ModelInvoker,
    OpenAiProvider, PromptConfig, ANTHROPIC_API_BASE, OPENAI_API_BASE,
};
use serde_json::json;

fn env_key(name: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| panic!("{} must be set for integration tests", name))
}

fn openai() -> OpenAiProvider {
    OpenAiProvider::new(OPENAI_API_BASE, Some(env_key("OPENAI_API_KEY"))).expect("client")
}

fn anthropic() -> AnthropicProvider {
    AnthropicProvider::new(ANTHROPIC_API_BASE, Some(env_key("ANTHROPIC_API_KEY"))).expect("client")
}

#[tokio::test]
#[ignore] // Run with: cargo test --test llm_integration -- --ignored
async fn test_openai_generation() {
    let request = GenerationRequest::new(
        "gpt-3.5-turbo",
        vec![
            Message::system("You are a helpful assistant. Reply concisely."),
            Message::user("What is 2 + 2? Reply with just the number."),
        ],
    )
    .with_max_tokens(10)
    .with_temperature(0.0);

    let response = openai().generate(request).await;
    assert!(response.is_ok(), "Generation failed: {:?}", response.err());

    let response = response.expect("Should have response");
    let content = response.first_content().expect("Should have content");
    assert!(content.contains('4'), "Response should contain '4', got: {}", content);
    assert!(response.usage.total_tokens > 0, "Should have token usage");
}

#[tokio::test]
#[ignore]
async fn test_anthropic_generation_with_system_prompt() {
    let request = GenerationRequest::new(
        "claude-3-haiku-20240307",
        vec![
            Message::system("Answer with a single word."),
            Message::user("What is the capital of France?"),
        ],
    )
    .with_max_tokens(10)
    .with_temperature(0.0);

    let response = anthropic().generate(request).await.expect("generation");
    let content = response.first_content().expect("Should have content");
    assert!(content.contains("Paris"), "got: {}", content);
    assert!(response.usage.total_tokens > 0);
}

#[tokio::test]
#[ignore]
async fn test_invoker_prices_real_call() {
    let invoker = ModelInvoker::new().with_provider("openai", Arc::new(openai()));
    let config = PromptConfig::new("Reply with the word {word} only.", "gpt-3.5-turbo")
        .with_temperature(0.0)
        .with_max_tokens(5);
    let input = json!({"word": "banana"}).as_object().cloned().unwrap_or_default();

    match invoker.invoke(&config, &input, None).await {
        InvocationResult::Success(output) => {
            assert!(output.output.to_lowercase().contains("banana"));
            assert!(output.tokens_used > 0);
            assert!(output.cost_usd > 0.0);
            assert!(output.execution_time_ms > 0.0);
        }
        InvocationResult::Failure(failure) => panic!("invocation failed: {}", failure.error),
    }
}

#[tokio::test]
#[ignore]
async fn test_llm_judge_scores_correct_answer() {
    let invoker = Arc::new(ModelInvoker::new().with_provider(
        "openai",
        Arc::new(OpenAiProvider::new(OPENAI_API_BASE, None).expect("client")),
    ));
    let registry = EvaluatorRegistry::with_builtins(invoker, Arc::new(HashEmbedder::default()));

    let mut config = serde_json::Map::new();
    config.insert("api_key".to_string(), json!(env_key("OPENAI_API_KEY")));
    let ctx = EvaluationContext::new("Paris", "The capital of France is Paris.")
        .with_config(config);

    let record = registry.run("llm_judge", &ctx).await;
    assert!(record.error.is_none(), "judge failed: {:?}", record.error);
    assert!(record.score >= 0.7, "score {}", record.score);
    assert!(record.passed);
}
