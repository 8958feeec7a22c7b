//! Anthropic Messages API.
//!
//! Differs from the chat-completions dialect in every layer: `x-api-key` auth with a
//! pinned API version, no `system` role in the message list (it is hoisted to a
//! top-level field), block-structured content, and typed stream events that end with
//! `message_stop` instead of a `[DONE]` sentinel.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::ServiceConfig;
use crate::model::catalog::ModelCatalog;
use crate::model::error::ModelError;
use crate::model::provider::ProviderId;
use crate::model::providers::openai_compat::REASONING_TEMPERATURE;
use crate::model::providers::resolve_model;
use crate::model::shared::{sanitize_history, split_system};
use crate::model::traits::ProviderAdapter;
use crate::model::transport::HttpRequest;
use crate::model::types::{
    ChatMessage, DeltaParse, GenerationSettings, ParsedResponse, ReasoningEffort, Role, ToolCall,
    ToolCallFragment, ToolDescriptor,
};

pub const API_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4096;

#[derive(Debug, Default, Clone, Copy)]
pub struct AnthropicAdapter;

impl AnthropicAdapter {
    fn authorize(request: HttpRequest, service: &ServiceConfig) -> HttpRequest {
        request
            .header("x-api-key", service.api_key.trim())
            .header("anthropic-version", API_VERSION)
    }
}

impl ProviderAdapter for AnthropicAdapter {
    fn id(&self) -> ProviderId {
        ProviderId::Anthropic
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
        let (system, messages) = anthropic_messages(messages);

        let budget = thinking_budget(settings.reasoning_effort)
            .filter(|_| ModelCatalog::is_reasoning_model(&model));
        let requested_max = settings.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS);
        let (temperature, max_tokens, thinking) = match budget {
            // max_tokens must exceed the thinking budget.
            Some(budget) => (
                REASONING_TEMPERATURE,
                requested_max.max(budget + DEFAULT_MAX_TOKENS),
                Some(ThinkingConfig {
                    kind: "enabled",
                    budget_tokens: budget,
                }),
            ),
            None => (settings.temperature, requested_max, None),
        };

        let body = MessagesRequest {
            model,
            max_tokens,
            system,
            messages,
            stream: streaming,
            temperature,
            thinking,
            tools: tools.filter(|tools| !tools.is_empty()).map(|tools| {
                tools
                    .iter()
                    .map(|tool| AnthropicTool {
                        name: tool.name.clone(),
                        description: tool.description.clone(),
                        input_schema: tool.input_schema.clone(),
                    })
                    .collect()
            }),
        };

        let request = HttpRequest::post(format!("{base}/messages"), serde_json::to_value(&body)?);
        Ok(Self::authorize(request, service))
    }

    fn parse_response(&self, body: &[u8]) -> Option<ParsedResponse> {
        let response: MessagesResponse = match serde_json::from_slice(body) {
            Ok(response) => response,
            Err(error) => {
                tracing::debug!("anthropic body did not parse: {error}");
                return None;
            }
        };

        let mut text = String::new();
        let mut reasoning = String::new();
        let mut tool_calls = Vec::new();
        for block in response.content {
            match block {
                ResponseBlock::Text { text: part } => text.push_str(&part),
                ResponseBlock::Thinking { thinking } => reasoning.push_str(&thinking),
                ResponseBlock::ToolUse { id, name, input } => {
                    tool_calls.push(ToolCall::function(id, name, input.to_string()))
                }
                ResponseBlock::Other => {}
            }
        }

        Some(ParsedResponse {
            text: (!text.is_empty()).then_some(text),
            reasoning: (!reasoning.is_empty()).then_some(reasoning),
            role: response.role,
            tool_calls,
        })
    }

    fn parse_delta(&self, payload: Option<&str>) -> DeltaParse {
        let Some(payload) = payload else {
            return DeltaParse::done();
        };
        if payload.trim().is_empty() {
            return DeltaParse::default();
        }
        let event: MessagesStreamEvent = match serde_json::from_str(payload) {
            Ok(event) => event,
            Err(error) => {
                return DeltaParse::failed(ModelError::Decode(format!(
                    "anthropic stream event: {error}"
                )))
            }
        };

        match event {
            MessagesStreamEvent::ContentBlockStart {
                index,
                content_block,
            } => match content_block {
                StartBlock::Text { text } => DeltaParse::text(text),
                StartBlock::Thinking { thinking } => DeltaParse::reasoning(thinking),
                StartBlock::ToolUse { id, name } => DeltaParse {
                    tool_calls: vec![ToolCallFragment {
                        index,
                        id: Some(id),
                        call_type: Some("function".to_string()),
                        name: Some(name),
                        ..ToolCallFragment::default()
                    }],
                    ..DeltaParse::default()
                },
                StartBlock::Other => DeltaParse::default(),
            },
            MessagesStreamEvent::ContentBlockDelta { index, delta } => match delta {
                BlockDelta::TextDelta { text } => DeltaParse::text(text),
                BlockDelta::ThinkingDelta { thinking } => DeltaParse::reasoning(thinking),
                BlockDelta::InputJsonDelta { partial_json } => DeltaParse {
                    tool_calls: vec![ToolCallFragment {
                        index,
                        arguments: Some(partial_json),
                        ..ToolCallFragment::default()
                    }],
                    ..DeltaParse::default()
                },
                BlockDelta::Other => DeltaParse::default(),
            },
            MessagesStreamEvent::MessageStop => DeltaParse::done(),
            MessagesStreamEvent::Error { error } => DeltaParse::failed(error.into_model_error()),
            MessagesStreamEvent::Other => DeltaParse::default(),
        }
    }

    fn build_models_request(&self, service: &ServiceConfig) -> Result<HttpRequest, ModelError> {
        let base = service.resolved_base_url(self.id().default_base_url())?;
        Ok(Self::authorize(
            HttpRequest::get(format!("{base}/models")),
            service,
        ))
    }
}

fn thinking_budget(effort: ReasoningEffort) -> Option<u32> {
    match effort {
        ReasoningEffort::Off => None,
        ReasoningEffort::Low => Some(1024),
        ReasoningEffort::Medium => Some(4096),
        ReasoningEffort::High => Some(16_384),
    }
}

/// Hoists system text and folds the history into block lists, merging adjacent
/// turns of the same role (tool results travel as user turns).
fn anthropic_messages(messages: &[ChatMessage]) -> (Option<String>, Vec<AnthropicMessage>) {
    let (system, rest) = split_system(&sanitize_history(messages));
    let mut out: Vec<AnthropicMessage> = Vec::with_capacity(rest.len());

    for message in rest {
        let (role, blocks) = match message.role {
            Role::Tool => (
                "user",
                vec![RequestBlock::ToolResult {
                    tool_use_id: message.tool_call_id.unwrap_or_default(),
                    content: message.content,
                }],
            ),
            Role::Assistant => {
                let mut blocks = text_block(message.content);
                for call in message.tool_calls {
                    let input = serde_json::from_str(&call.function.arguments)
                        .unwrap_or_else(|_| Value::Object(serde_json::Map::new()));
                    blocks.push(RequestBlock::ToolUse {
                        id: call.id,
                        name: call.function.name,
                        input,
                    });
                }
                ("assistant", blocks)
            }
            Role::User | Role::System => ("user", text_block(message.content)),
        };
        if blocks.is_empty() {
            continue;
        }
        match out.last_mut() {
            Some(last) if last.role == role => last.content.extend(blocks),
            _ => out.push(AnthropicMessage {
                role,
                content: blocks,
            }),
        }
    }

    (system, out)
}

fn text_block(text: String) -> Vec<RequestBlock> {
    if text.trim().is_empty() {
        Vec::new()
    } else {
        vec![RequestBlock::Text { text }]
    }
}

#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<AnthropicMessage>,
    stream: bool,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    thinking: Option<ThinkingConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<AnthropicTool>>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: &'static str,
    content: Vec<RequestBlock>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum RequestBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
    },
}

#[derive(Debug, Serialize)]
struct ThinkingConfig {
    #[serde(rename = "type")]
    kind: &'static str,
    budget_tokens: u32,
}

#[derive(Debug, Serialize)]
struct AnthropicTool {
    name: String,
    description: String,
    input_schema: Value,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    role: Option<String>,
    content: Vec<ResponseBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ResponseBlock {
    Text {
        text: String,
    },
    Thinking {
        thinking: String,
    },
    ToolUse {
        id: String,
        name: String,
        #[serde(default)]
        input: Value,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum MessagesStreamEvent {
    ContentBlockStart {
        index: usize,
        content_block: StartBlock,
    },
    ContentBlockDelta {
        index: usize,
        delta: BlockDelta,
    },
    MessageStop,
    Error {
        error: StreamErrorBody,
    },
    /// message_start, message_delta, content_block_stop, ping.
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StartBlock {
    Text {
        #[serde(default)]
        text: String,
    },
    Thinking {
        #[serde(default)]
        thinking: String,
    },
    ToolUse {
        id: String,
        name: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum BlockDelta {
    TextDelta {
        text: String,
    },
    ThinkingDelta {
        thinking: String,
    },
    InputJsonDelta {
        partial_json: String,
    },
    /// signature_delta and future delta kinds.
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct StreamErrorBody {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    message: String,
}

impl StreamErrorBody {
    fn into_model_error(self) -> ModelError {
        match self.kind.as_str() {
            "authentication_error" => ModelError::Unauthorized,
            "rate_limit_error" => ModelError::RateLimited,
            "overloaded_error" => ModelError::Server {
                status: 529,
                body: self.message,
            },
            "api_error" => ModelError::Server {
                status: 500,
                body: self.message,
            },
            "invalid_request_error" => ModelError::Server {
                status: 400,
                body: self.message,
            },
            _ => ModelError::Unknown(self.message),
        }
    }
}
