//! Model-name normalization and the payment-required fallback.

use tracing::warn;

use super::openrouter::{OpenRouterClient, ProviderError};
use super::types::{ChatMessage, CompletionOutcome};

/// Model used when the input is blank or no alias matches.
pub const DEFAULT_MODEL: &str = "openai/gpt-4o-mini";
/// Model substituted when the primary reports payment required.
pub const FALLBACK_MODEL: &str = "openai/gpt-4o-mini";

/// Short aliases accepted from the UI and settings, mapped to
/// provider-qualified names.
const MODEL_ALIASES: &[(&str, &str)] = &[
    ("gpt-4", "openai/gpt-4o-mini"),
    ("gpt4", "openai/gpt-4o-mini"),
    ("gpt-4o", "openai/gpt-4o"),
    ("gpt-4o-mini", "openai/gpt-4o-mini"),
    ("gpt-4.1-mini", "openai/gpt-4.1-mini"),
    ("claude", "anthropic/claude-3.5-sonnet"),
    ("claude-3.5-sonnet", "anthropic/claude-3.5-sonnet"),
    ("claude-3-haiku", "anthropic/claude-3-haiku"),
    ("llama", "meta-llama/llama-3.1-8b-instruct"),
];

/// Normalize a user- or settings-supplied model identifier to a
/// provider-qualified name. Never fails: unknown input degrades to
/// [`DEFAULT_MODEL`]. Input already containing `/` passes through unchanged.
pub fn normalize_model(input: &str) -> String {
    let raw = input.trim();
    if raw.is_empty() {
        return DEFAULT_MODEL.to_string();
    }
    if raw.contains('/') {
        return raw.to_string();
    }

    let key = raw.to_lowercase();
    MODEL_ALIASES
        .iter()
        .find(|(alias, _)| *alias == key)
        .map(|(_, qualified)| (*qualified).to_string())
        .unwrap_or_else(|| DEFAULT_MODEL.to_string())
}

/// Attempt a completion with `model`; on payment required (HTTP 402) retry
/// once with `fallback_model`. A single-level fallback, not a retry loop:
/// every other failure, including a second failure on the fallback,
/// propagates verbatim.
pub async fn complete_with_fallback(
    client: &OpenRouterClient,
    model: &str,
    fallback_model: &str,
    messages: &[ChatMessage],
) -> Result<CompletionOutcome, ProviderError> {
    match client.chat(model, messages).await {
        Ok(reply) => Ok(CompletionOutcome {
            reply,
            used_model: model.to_string(),
            fallback_used: false,
        }),
        Err(err) if err.is_payment_required() => {
            warn!("model {} reported payment required, retrying with {}", model, fallback_model);
            let reply = client.chat(fallback_model, messages).await?;
            Ok(CompletionOutcome {
                reply,
                used_model: fallback_model.to_string(),
                fallback_used: true,
            })
        }
        Err(err) => Err(err),
    }
}
