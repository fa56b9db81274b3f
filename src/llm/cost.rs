//! Static per-model pricing used to estimate the cost of a model call.
//!
//! These figures are a best-effort *estimate*: a flat USD rate per 1K total
//! tokens, looked up by exact model name with a per-provider fallback. They
//! do not distinguish input and output tokens and are not billing truth.
//! Unknown providers estimate to zero.

/// Price entry: model name and USD per 1K tokens.
type PriceEntry = (&'static str, f64);

const TOKENS_PER_UNIT: f64 = 1000.0;

const OPENAI_PRICES: &[PriceEntry] = &[
    ("gpt-4", 0.03),
    ("gpt-4-turbo", 0.01),
    ("gpt-3.5-turbo", 0.002),
    ("gpt-3.5-turbo-16k", 0.003),
];
const OPENAI_DEFAULT: f64 = 0.002;

const ANTHROPIC_PRICES: &[PriceEntry] = &[
    ("claude-3-opus-20240229", 0.015),
    ("claude-3-sonnet-20240229", 0.003),
    ("claude-3-haiku-20240307", 0.00025),
];
const ANTHROPIC_DEFAULT: f64 = 0.003;

/// USD per 1K tokens for `model` under `provider`, if the provider is priced.
pub fn price_per_1k(provider: &str, model: &str) -> Option<f64> {
    let (table, default) = match provider {
        "openai" => (OPENAI_PRICES, OPENAI_DEFAULT),
        "anthropic" => (ANTHROPIC_PRICES, ANTHROPIC_DEFAULT),
        _ => return None,
    };

    Some(
        table
            .iter()
            .find(|(name, _)| *name == model)
            .map(|(_, price)| *price)
            .unwrap_or(default),
    )
}

/// Estimated USD cost of a call that consumed `tokens` total tokens.
pub fn estimate_cost_usd(provider: &str, model: &str, tokens: u32) -> f64 {
    price_per_1k(provider, model)
        .map(|price| f64::from(tokens) / TOKENS_PER_UNIT * price)
        .unwrap_or(0.0)
}
