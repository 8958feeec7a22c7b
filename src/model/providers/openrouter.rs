//! OpenRouter: chat completions plus a unified `reasoning` request object.
//!
//! Reasoning comes back either as a `reasoning` string or as a `reasoning_details`
//! array of typed entries; both normalize to the reasoning tag. Errors raised after
//! the stream has started arrive as an `error` object inside a data event.

use serde_json::{json, Value};

use crate::config::ServiceConfig;
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

const APP_TITLE: &str = "Chorus";
const APP_REFERER: &str = "https://github.com/chorus-chat/chorus";

#[derive(Debug, Default, Clone, Copy)]
pub struct OpenRouterAdapter;

impl ProviderAdapter for OpenRouterAdapter {
    fn id(&self) -> ProviderId {
        ProviderId::OpenRouter
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

        let mut body = ChatCompletionRequest::new(model, wire_messages(messages), streaming);
        body.with_tools(tools);
        body.temperature = Some(settings.temperature);
        body.max_tokens = settings.max_tokens;
        if settings.reasoning_effort.is_enabled() {
            body.extra.insert(
                "reasoning".to_string(),
                json!({ "effort": settings.reasoning_effort.as_str() }),
            );
            body.extra
                .insert("include_reasoning".to_string(), Value::Bool(true));
        }

        Ok(
            HttpRequest::post(format!("{base}/chat/completions"), body.to_value()?)
                .bearer(&service.api_key)
                .header("HTTP-Referer", APP_REFERER)
                .header("X-Title", APP_TITLE),
        )
    }

    fn parse_response(&self, body: &[u8]) -> Option<ParsedResponse> {
        parse_completion(body)?.into_parsed()
    }

    fn parse_delta(&self, payload: Option<&str>) -> DeltaParse {
        parse_chat_delta(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::types::ReasoningEffort;

    #[test]
    fn reasoning_object_and_attribution_headers() {
        let request = OpenRouterAdapter
            .build_request(
                &ServiceConfig::new("router", "openrouter", "deepseek/deepseek-r1")
                    .with_api_key("or-key"),
                &[ChatMessage::user("hi")],
                None,
                &GenerationSettings::default().with_reasoning(ReasoningEffort::Low),
                true,
            )
            .unwrap();
        assert_eq!(request.url, "https://openrouter.ai/api/v1/chat/completions");
        assert_eq!(request.header_value("X-Title"), Some(APP_TITLE));
        assert_eq!(request.header_value("HTTP-Referer"), Some(APP_REFERER));
        let body = request.body.unwrap();
        assert_eq!(body["reasoning"]["effort"], "low");
        assert_eq!(body["include_reasoning"], true);
        assert!(body.get("reasoning_effort").is_none());
    }

    #[test]
    fn reasoning_off_sends_no_reasoning_fields() {
        let body = OpenRouterAdapter
            .build_request(
                &ServiceConfig::new("router", "openrouter", "openai/gpt-4o"),
                &[ChatMessage::user("hi")],
                None,
                &GenerationSettings::default(),
                false,
            )
            .unwrap()
            .body
            .unwrap();
        assert!(body.get("reasoning").is_none());
        assert!(body.get("include_reasoning").is_none());
    }

    #[test]
    fn reasoning_details_are_normalized() {
        let parsed = OpenRouterAdapter.parse_delta(Some(
            r#"{"choices":[{"delta":{"content":"","reasoning_details":[
                {"type":"reasoning.text","text":"step one"},
                {"type":"reasoning.encrypted","data":"opaque"}]}}]}"#,
        ));
        assert_eq!(parsed.reasoning.as_deref(), Some("step one"));
    }

    #[test]
    fn mid_stream_error_terminates() {
        let parsed = OpenRouterAdapter.parse_delta(Some(
            r#"{"id":"gen-1","error":{"code":502,"message":"Provider returned error"},"choices":[]}"#,
        ));
        assert!(parsed.is_final);
        assert_eq!(
            parsed.error,
            Some(ModelError::Server {
                status: 502,
                body: "Provider returned error".to_string()
            })
        );
    }
}
