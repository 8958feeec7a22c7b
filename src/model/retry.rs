//! Retry-without-reasoning heuristic.
//!
//! Providers reject unknown reasoning parameters with free-form error text whose
//! wording is not a stable contract. This predicate is a compatibility shim: it
//! matches token lists against the error detail and nothing more.

use crate::model::error::ModelError;
use crate::model::types::GenerationSettings;

/// Tokens suggesting the failure concerns a reasoning-related parameter.
pub const REASONING_TOKENS: &[&str] = &[
    "reasoning_effort",
    "include_reasoning",
    "reasoning",
    "thinking",
];

/// Tokens suggesting a parameter was rejected.
pub const REJECTION_TOKENS: &[&str] = &[
    "unknown",
    "unrecognized",
    "unsupported",
    "invalid",
    "not allowed",
    "additional properties",
    "not supported",
];

/// True when `detail` mentions a reasoning parameter and a rejection (case-insensitive).
pub fn is_reasoning_parameter_rejection(detail: &str) -> bool {
    let lower = detail.to_ascii_lowercase();
    let mentions_reasoning = REASONING_TOKENS.iter().any(|token| lower.contains(token));
    let mentions_rejection = REJECTION_TOKENS.iter().any(|token| lower.contains(token));
    mentions_reasoning && mentions_rejection
}

/// Whether a failed attempt made with `settings` earns the single reasoning-off retry.
pub fn should_retry_without_reasoning(settings: &GenerationSettings, error: &ModelError) -> bool {
    if !settings.reasoning_effort.is_enabled() {
        return false;
    }
    error.detail().is_some_and(is_reasoning_parameter_rejection)
}
