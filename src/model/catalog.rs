//! Model catalog - reasoning-capability detection and per-family defaults.
//!
//! Detection combines an explicit allow-list with model-id prefix heuristics.
//! Model ids may carry a vendor prefix (`openai/o3-mini` on routers), which is
//! ignored for matching.

use crate::model::provider::ProviderId;

/// Models known to be reasoning-capable regardless of prefix rules.
const REASONING_ALLOW_LIST: &[&str] = &[
    "o1",
    "o1-mini",
    "o1-preview",
    "o3",
    "o3-mini",
    "o4-mini",
    "deepseek-reasoner",
    "deepseek-r1",
    "claude-3-7-sonnet",
    "claude-sonnet-4",
    "claude-opus-4",
    "sonar-reasoning",
    "sonar-reasoning-pro",
    "sonar-deep-research",
    "magistral-small",
    "magistral-medium",
    "qwq-32b",
];

const OPENAI_REASONING_PREFIXES: &[&str] = &["o1", "o3", "o4", "gpt-5"];

/// Reasoning-model metadata lookups.
pub struct ModelCatalog;

impl ModelCatalog {
    /// Whether `model` is a reasoning model, by allow-list or prefix heuristic.
    pub fn is_reasoning_model(model: &str) -> bool {
        let id = bare_model_id(model);
        if REASONING_ALLOW_LIST.iter().any(|known| id.starts_with(known)) {
            return true;
        }
        Self::is_openai_reasoning_model(model)
            || id.contains("-r1")
            || id.contains("reasoner")
            || id.starts_with("magistral")
            || id.contains("thinking")
    }

    /// OpenAI o-series and gpt-5 family. These reject custom temperatures.
    pub fn is_openai_reasoning_model(model: &str) -> bool {
        let id = bare_model_id(model);
        OPENAI_REASONING_PREFIXES
            .iter()
            .any(|prefix| id == *prefix || id.starts_with(&format!("{prefix}-")))
    }

    /// Legacy o1 models that refuse a `system` role.
    pub fn rejects_system_role(model: &str) -> bool {
        let id = bare_model_id(model);
        ["o1-mini", "o1-preview"]
            .iter()
            .any(|legacy| id == *legacy || id.starts_with(&format!("{legacy}-")))
    }

    pub fn is_deepseek_reasoner(model: &str) -> bool {
        let id = bare_model_id(model);
        id.contains("reasoner") || id.contains("-r1") || id == "r1"
    }

    pub fn is_magistral(model: &str) -> bool {
        bare_model_id(model).starts_with("magistral")
    }

    pub fn is_perplexity_deep_research(model: &str) -> bool {
        bare_model_id(model).contains("deep-research")
    }

    /// Fallback model when a service leaves the model blank.
    pub fn default_model_for_provider(provider: ProviderId) -> &'static str {
        match provider.adapter_family() {
            ProviderId::OpenAi => "gpt-4o-mini",
            ProviderId::Anthropic => "claude-sonnet-4-20250514",
            ProviderId::DeepSeek => "deepseek-chat",
            ProviderId::OpenRouter => "openai/gpt-4o-mini",
            ProviderId::Perplexity => "sonar",
            ProviderId::Mistral => "mistral-small-latest",
            ProviderId::Ollama => "llama3.1",
            _ => "gpt-4o-mini",
        }
    }
}

fn bare_model_id(model: &str) -> String {
    let trimmed = model.trim();
    let id = trimmed.rsplit('/').next().unwrap_or(trimmed);
    id.to_ascii_lowercase()
}
