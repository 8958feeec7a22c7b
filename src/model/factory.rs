use std::str::FromStr;
use std::sync::Arc;

use crate::config::ServiceConfig;
use crate::model::error::ModelError;
use crate::model::provider::ProviderId;
use crate::model::providers::{
    AnthropicAdapter, DeepSeekAdapter, MistralAdapter, OllamaAdapter, OpenAiCompatAdapter,
    OpenRouterAdapter, PerplexityAdapter,
};
use crate::model::traits::ProviderAdapter;

/// Resolves a configured provider identity to its adapter. Unknown identities are a
/// configuration error; there is no fallback provider.
pub fn create_adapter(provider: &str) -> Result<Arc<dyn ProviderAdapter>, ModelError> {
    let id = ProviderId::from_str(provider).map_err(ModelError::Configuration)?;
    Ok(adapter_for(id))
}

pub fn adapter_for_service(service: &ServiceConfig) -> Result<Arc<dyn ProviderAdapter>, ModelError> {
    create_adapter(&service.provider)
}

pub fn adapter_for(provider: ProviderId) -> Arc<dyn ProviderAdapter> {
    let adapter: Arc<dyn ProviderAdapter> = match provider.adapter_family() {
        ProviderId::Anthropic => Arc::new(AnthropicAdapter),
        ProviderId::DeepSeek => Arc::new(DeepSeekAdapter),
        ProviderId::OpenRouter => Arc::new(OpenRouterAdapter),
        ProviderId::Perplexity => Arc::new(PerplexityAdapter),
        ProviderId::Mistral => Arc::new(MistralAdapter),
        ProviderId::Ollama => Arc::new(OllamaAdapter),
        // OpenAI itself plus every family that inherits its adapter.
        _ => Arc::new(OpenAiCompatAdapter::new(provider)),
    };

    adapter
}
