//! Ollama native chat API (`/api/chat`).
//!
//! Streams newline-delimited JSON rather than SSE, ends with `"done": true`, and
//! returns tool calls whole and without ids, so ids are synthesized by position.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::ServiceConfig;
use crate::model::error::ModelError;
use crate::model::provider::ProviderId;
use crate::model::providers::openai_compat::{wire_tools, WireTool};
use crate::model::providers::resolve_model;
use crate::model::shared::sanitize_history;
use crate::model::sse::StreamFormat;
use crate::model::traits::ProviderAdapter;
use crate::model::transport::HttpRequest;
use crate::model::types::{
    ChatMessage, DeltaParse, GenerationSettings, ModelDescriptor, ParsedResponse, ToolCall,
    ToolCallFragment, ToolDescriptor,
};

#[derive(Debug, Default, Clone, Copy)]
pub struct OllamaAdapter;

impl ProviderAdapter for OllamaAdapter {
    fn id(&self) -> ProviderId {
        ProviderId::Ollama
    }

    fn stream_format(&self) -> StreamFormat {
        StreamFormat::JsonLines
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
        let body = OllamaChatRequest {
            model: resolve_model(service, self.id()),
            messages: sanitize_history(messages)
                .into_iter()
                .map(OllamaMessage::from)
                .collect(),
            stream: streaming,
            think: settings.reasoning_effort.is_enabled().then_some(true),
            tools: wire_tools(tools),
            options: OllamaOptions {
                temperature: settings.temperature,
                num_predict: settings.max_tokens,
            },
        };

        Ok(HttpRequest::post(format!("{base}/api/chat"), serde_json::to_value(&body)?)
            .bearer(&service.api_key))
    }

    fn parse_response(&self, body: &[u8]) -> Option<ParsedResponse> {
        let response: OllamaChatResponse = serde_json::from_slice(body).ok()?;
        if let Some(error) = response.error {
            tracing::debug!("ollama returned an error body with success status: {error}");
            return None;
        }
        let message = response.message?;
        Some(ParsedResponse {
            text: non_empty(message.content),
            reasoning: message.thinking.and_then(non_empty),
            role: message.role,
            tool_calls: message
                .tool_calls
                .unwrap_or_default()
                .into_iter()
                .enumerate()
                .map(|(index, call)| call.into_call(index))
                .collect(),
        })
    }

    fn parse_delta(&self, payload: Option<&str>) -> DeltaParse {
        let Some(payload) = payload else {
            return DeltaParse::done();
        };
        if payload.trim().is_empty() {
            return DeltaParse::default();
        }
        let line: OllamaChatResponse = match serde_json::from_str(payload) {
            Ok(line) => line,
            Err(error) => {
                return DeltaParse::failed(ModelError::Decode(format!("ollama stream line: {error}")))
            }
        };
        if let Some(error) = line.error {
            return DeltaParse::failed(ModelError::Unknown(error));
        }

        let mut delta = DeltaParse {
            is_final: line.done,
            ..DeltaParse::default()
        };
        if let Some(message) = line.message {
            delta.text = non_empty(message.content);
            delta.reasoning = message.thinking.and_then(non_empty);
            // Each line restarts numbering at zero; ids come from the accumulator.
            delta.tool_calls = message
                .tool_calls
                .unwrap_or_default()
                .into_iter()
                .enumerate()
                .map(|(index, call)| {
                    let call = call.into_call(index);
                    ToolCallFragment {
                        index,
                        id: None,
                        call_type: Some(call.call_type),
                        name: Some(call.function.name),
                        arguments: Some(call.function.arguments),
                        whole: true,
                    }
                })
                .collect();
        }
        delta
    }

    fn build_models_request(&self, service: &ServiceConfig) -> Result<HttpRequest, ModelError> {
        let base = service.resolved_base_url(self.id().default_base_url())?;
        Ok(HttpRequest::get(format!("{base}/api/tags")).bearer(&service.api_key))
    }

    fn parse_models(&self, body: &[u8]) -> Option<Vec<ModelDescriptor>> {
        #[derive(Deserialize)]
        struct Tags {
            models: Vec<Tag>,
        }
        #[derive(Deserialize)]
        struct Tag {
            name: String,
        }

        let tags: Tags = serde_json::from_slice(body).ok()?;
        Some(
            tags.models
                .into_iter()
                .map(|tag| ModelDescriptor::new(tag.name))
                .collect(),
        )
    }
}

#[derive(Debug, Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    think: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<WireTool>>,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

#[derive(Debug, Serialize)]
struct OllamaMessage {
    role: &'static str,
    content: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<OllamaToolCallOut>,
}

#[derive(Debug, Serialize)]
struct OllamaToolCallOut {
    function: OllamaFunctionOut,
}

#[derive(Debug, Serialize)]
struct OllamaFunctionOut {
    name: String,
    arguments: Value,
}

impl From<ChatMessage> for OllamaMessage {
    fn from(message: ChatMessage) -> Self {
        Self {
            role: message.role.as_str(),
            content: message.content,
            // Ollama takes arguments as an object, not a JSON string.
            tool_calls: message
                .tool_calls
                .into_iter()
                .map(|call| OllamaToolCallOut {
                    function: OllamaFunctionOut {
                        arguments: serde_json::from_str(&call.function.arguments)
                            .unwrap_or_else(|_| Value::Object(serde_json::Map::new())),
                        name: call.function.name,
                    },
                })
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    #[serde(default)]
    message: Option<OllamaResponseMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OllamaResponseMessage {
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    content: String,
    #[serde(default)]
    thinking: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<OllamaToolCallIn>>,
}

#[derive(Debug, Deserialize)]
struct OllamaToolCallIn {
    function: OllamaFunctionIn,
}

#[derive(Debug, Deserialize)]
struct OllamaFunctionIn {
    name: String,
    #[serde(default)]
    arguments: Value,
}

impl OllamaToolCallIn {
    fn into_call(self, index: usize) -> ToolCall {
        let arguments = match self.function.arguments {
            Value::Null => "{}".to_string(),
            Value::String(raw) => raw,
            other => other.to_string(),
        };
        ToolCall::function(format!("call_{index}"), self.function.name, arguments)
    }
}

fn non_empty(value: String) -> Option<String> {
    (!value.is_empty()).then_some(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::types::ReasoningEffort;

    #[test]
    fn native_chat_request_shape() {
        let request = OllamaAdapter
            .build_request(
                &ServiceConfig::new("local", "ollama", "qwen3"),
                &[ChatMessage::user("hi")],
                None,
                &GenerationSettings::default().with_reasoning(ReasoningEffort::Low),
                true,
            )
            .unwrap();
        assert_eq!(request.url, "http://localhost:11434/api/chat");
        assert_eq!(request.header_value("authorization"), None);
        let body = request.body.unwrap();
        assert_eq!(body["think"], true);
        assert_eq!(body["stream"], true);
        assert!(body["options"]["temperature"].is_number());
    }

    #[test]
    fn stream_lines_carry_thinking_content_and_done() {
        let adapter = OllamaAdapter;
        let thinking = adapter.parse_delta(Some(
            r#"{"model":"qwen3","message":{"role":"assistant","content":"","thinking":"Let"},"done":false}"#,
        ));
        assert_eq!(thinking.reasoning.as_deref(), Some("Let"));
        assert_eq!(thinking.text, None);

        let last = adapter.parse_delta(Some(
            r#"{"model":"qwen3","message":{"role":"assistant","content":""},"done":true,"done_reason":"stop"}"#,
        ));
        assert!(last.is_final);
        assert!(last.error.is_none());
    }

    #[test]
    fn tool_calls_get_synthesized_ids() {
        let parsed = OllamaAdapter
            .parse_response(
                br#"{"message":{"role":"assistant","content":"","tool_calls":[
                    {"function":{"name":"weather","arguments":{"city":"Oslo"}}}]},"done":true}"#,
            )
            .unwrap();
        assert_eq!(
            parsed.tool_calls,
            vec![ToolCall::function("call_0", "weather", r#"{"city":"Oslo"}"#)]
        );
    }

    #[test]
    fn error_line_fails_the_stream() {
        let parsed = OllamaAdapter.parse_delta(Some(r#"{"error":"model 'nope' not found"}"#));
        assert_eq!(
            parsed.error,
            Some(ModelError::Unknown("model 'nope' not found".to_string()))
        );
    }

    #[test]
    fn model_tags_are_listed() {
        let models = OllamaAdapter
            .parse_models(br#"{"models":[{"name":"llama3.1:8b","size":1},{"name":"qwen3"}]}"#)
            .unwrap();
        assert_eq!(models, vec![ModelDescriptor::new("llama3.1:8b"), ModelDescriptor::new("qwen3")]);
    }
}
