//! Perplexity Sonar.
//!
//! The API rejects histories that do not strictly alternate user and assistant
//! turns after the system prompt. Answers cite web sources through a top-level
//! `citations` list, which is rendered as a numbered sources footer.

use crate::config::ServiceConfig;
use crate::model::catalog::ModelCatalog;
use crate::model::error::ModelError;
use crate::model::provider::ProviderId;
use crate::model::providers::openai_compat::{
    decode_chunk, parse_completion, wire_messages, ChatCompletionRequest,
};
use crate::model::providers::resolve_model;
use crate::model::shared::{enforce_alternation, sanitize_history};
use crate::model::traits::ProviderAdapter;
use crate::model::transport::HttpRequest;
use crate::model::types::{
    ChatMessage, DeltaParse, GenerationSettings, ParsedResponse, ToolDescriptor,
};

#[derive(Debug, Default, Clone, Copy)]
pub struct PerplexityAdapter;

impl ProviderAdapter for PerplexityAdapter {
    fn id(&self) -> ProviderId {
        ProviderId::Perplexity
    }

    fn build_request(
        &self,
        service: &ServiceConfig,
        messages: &[ChatMessage],
        _tools: Option<&[ToolDescriptor]>,
        settings: &GenerationSettings,
        streaming: bool,
    ) -> Result<HttpRequest, ModelError> {
        let base = service.resolved_base_url(self.id().default_base_url())?;
        let model = resolve_model(service, self.id());

        let history = enforce_alternation(sanitize_history(messages));
        let mut body = ChatCompletionRequest::new(model.clone(), wire_messages(&history), streaming);
        body.temperature = Some(settings.temperature);
        body.max_tokens = settings.max_tokens;
        if settings.reasoning_effort.is_enabled() && ModelCatalog::is_perplexity_deep_research(&model)
        {
            body.reasoning_effort = Some(settings.reasoning_effort.as_str().to_string());
        }

        Ok(HttpRequest::post(format!("{base}/chat/completions"), body.to_value()?)
            .bearer(&service.api_key))
    }

    fn parse_response(&self, body: &[u8]) -> Option<ParsedResponse> {
        let completion = parse_completion(body)?;
        let citations = completion.citations.clone().unwrap_or_default();
        let mut parsed = completion.into_parsed()?;
        if let Some(footer) = sources_footer(&citations) {
            parsed.text = Some(format!("{}{footer}", parsed.text.unwrap_or_default()));
        }
        Some(parsed)
    }

    /// Citations repeat on every chunk; they are rendered once, on the chunk that
    /// carries the finish reason.
    fn parse_delta(&self, payload: Option<&str>) -> DeltaParse {
        let Some(payload) = payload else {
            return DeltaParse::done();
        };
        let chunk = match decode_chunk(payload) {
            Ok(Some(chunk)) => chunk,
            Ok(None) => return DeltaParse::default(),
            Err(failed) => return failed,
        };

        let footer = chunk
            .finish_reason()
            .and_then(|_| sources_footer(chunk.citations.as_deref().unwrap_or_default()));
        let mut delta = chunk.into_delta();
        if let Some(footer) = footer {
            let text = delta.text.take().unwrap_or_default();
            delta.text = Some(format!("{text}{footer}"));
        }
        delta
    }
}

fn sources_footer(citations: &[String]) -> Option<String> {
    if citations.is_empty() {
        return None;
    }
    let lines: Vec<String> = citations
        .iter()
        .enumerate()
        .map(|(i, url)| format!("[{}] {url}", i + 1))
        .collect();
    Some(format!("\n\nSources:\n{}", lines.join("\n")))
}
