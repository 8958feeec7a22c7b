//! Provider adapters.
//!
//! Each adapter supplies only the request shape and response/delta parsing for its
//! family; transport, status mapping, retry and reasoning bracketing come from the
//! request engine.

pub mod anthropic;
pub mod deepseek;
pub mod mistral;
pub mod ollama;
pub mod openai_compat;
pub mod openrouter;
pub mod perplexity;

pub use anthropic::AnthropicAdapter;
pub use deepseek::DeepSeekAdapter;
pub use mistral::MistralAdapter;
pub use ollama::OllamaAdapter;
pub use openai_compat::OpenAiCompatAdapter;
pub use openrouter::OpenRouterAdapter;
pub use perplexity::PerplexityAdapter;

use crate::config::ServiceConfig;
use crate::model::catalog::ModelCatalog;
use crate::model::provider::ProviderId;

/// Configured model, or the family default when the service leaves it blank.
pub(crate) fn resolve_model(service: &ServiceConfig, provider: ProviderId) -> String {
    let model = service.model.trim();
    if model.is_empty() {
        ModelCatalog::default_model_for_provider(provider).to_string()
    } else {
        model.to_string()
    }
}
