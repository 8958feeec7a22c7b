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

/// DeepSeek chat completions. Reasoner models always think and reject sampling
/// parameters, so temperature is omitted for them and no effort field is sent.
#[derive(Debug, Default, Clone, Copy)]
pub struct DeepSeekAdapter;

impl ProviderAdapter for DeepSeekAdapter {
    fn id(&self) -> ProviderId {
        ProviderId::DeepSeek
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
        body.max_tokens = settings.max_tokens;
        if !ModelCatalog::is_deepseek_reasoner(&model) {
            body.temperature = Some(settings.temperature);
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
