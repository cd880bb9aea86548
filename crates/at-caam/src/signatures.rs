//! Provider-specific rate-limit signature sets (SPEC_FULL.md §4.D).

use crate::types::Provider;

fn signatures_for(provider: Provider) -> &'static [&'static str] {
    match provider {
        Provider::Claude => &["rate_limit_error", "overloaded_error", "rate limit", "429"],
        Provider::Codex => &["rate_limit_exceeded", "too many requests", "429"],
        Provider::Gemini => &["resource_exhausted", "quota exceeded", "429"],
    }
}

/// Case-insensitive substring match against the provider's signature set.
pub fn is_rate_limit_error(provider: Provider, text: &str) -> bool {
    let lower = text.to_lowercase();
    signatures_for(provider)
        .iter()
        .any(|sig| lower.contains(&sig.to_lowercase()))
}
