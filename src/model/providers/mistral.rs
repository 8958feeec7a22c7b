//! Mistral chat completions.
//!
//! Magistral models think when asked through `prompt_mode: "reasoning"` and return
//! their trace as typed `thinking` chunks inside an array-valued `content`.

use serde_json::Value;

use crate::config::ServiceConfig;
use crate::model::catalog::ModelCatalog;
use crate::model::error::ModelError;
use crate::model::provider::ProviderId;
use crate::model::providers::openai_compat::{
    parse_chat_delta, parse_completion, wire_messages, ChatCompletionRequest,
};
use crate::model::providers::resolve_model;
use crate::model::traits::ProviderAdapter;
use crate::model::transport::HttpRequest;
use crate::model::types::{
    ChatMessage, DeltaParse, GenerationSettings, ParsedResponse, ToolDescriptor,
};

#[derive(Debug, Default, Clone, Copy)]
pub struct MistralAdapter;

impl ProviderAdapter for MistralAdapter {
    fn id(&self) -> ProviderId {
        ProviderId::Mistral
    }

    fn build_request(
        &self,
        service: &ServiceConfig,
        messages: &[ChatMessage],
        tools: Option<&[ToolDescriptor]>,
        settings: &GenerationSettings,
        streaming: bool,
    ) -> Result<HttpRequest, ModelError> {
        let base = service.resolved_base_url(self.id().default_base_url())?;
        let model = resolve_model(service, self.id());

        let mut body = ChatCompletionRequest::new(model.clone(), wire_messages(messages), streaming);
        body.with_tools(tools);
        body.temperature = Some(settings.temperature);
        body.max_tokens = settings.max_tokens;
        if settings.reasoning_effort.is_enabled() && ModelCatalog::is_magistral(&model) {
            body.extra.insert(
                "prompt_mode".to_string(),
                Value::String("reasoning".to_string()),
            );
        }

        Ok(HttpRequest::post(format!("{base}/chat/completions"), body.to_value()?)
            .bearer(&service.api_key))
    }

    fn parse_response(&self, body: &[u8]) -> Option<ParsedResponse> {
        parse_completion(body)?.into_parsed()
    }

    fn parse_delta(&self, payload: Option<&str>) -> DeltaParse {
        parse_chat_delta(payload)
    }
}
