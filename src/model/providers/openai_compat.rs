//! OpenAI chat-completions dialect.
//!
//! Besides the OpenAI adapter itself, this module owns the wire types every
//! chat-completions-shaped provider shares. The response types accept the union of
//! the dialect's reasoning extensions (`reasoning_content`, `reasoning`,
//! `reasoning_details`, typed content chunks) so each adapter only adds what is
//! genuinely provider-specific.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::ServiceConfig;
use crate::model::catalog::ModelCatalog;
use crate::model::error::ModelError;
use crate::model::provider::ProviderId;
use crate::model::providers::resolve_model;
use crate::model::shared::sanitize_history;
use crate::model::traits::ProviderAdapter;
use crate::model::transport::HttpRequest;
use crate::model::types::{
    ChatMessage, DeltaParse, FunctionCall, GenerationSettings, ParsedResponse, Role, ToolCall,
    ToolCallFragment, ToolDescriptor,
};

/// Temperature reasoning models accept.
pub const REASONING_TEMPERATURE: f32 = 1.0;

/// Adapter for OpenAI and every provider that inherits its wire format unmodified.
#[derive(Debug, Clone, Copy)]
pub struct OpenAiCompatAdapter {
    provider: ProviderId,
}

impl OpenAiCompatAdapter {
    pub fn new(provider: ProviderId) -> Self {
        Self { provider }
    }
}

impl Default for OpenAiCompatAdapter {
    fn default() -> Self {
        Self::new(ProviderId::OpenAi)
    }
}

impl ProviderAdapter for OpenAiCompatAdapter {
    fn id(&self) -> ProviderId {
        self.provider
    }

    fn build_request(
        &self,
        service: &ServiceConfig,
        messages: &[ChatMessage],
        tools: Option<&[ToolDescriptor]>,
        settings: &GenerationSettings,
        streaming: bool,
    ) -> Result<HttpRequest, ModelError> {
        let base = service.resolved_base_url(self.provider.default_base_url())?;
        let model = resolve_model(service, self.provider);

        let mut wire = wire_messages(messages);
        if ModelCatalog::rejects_system_role(&model) {
            for message in &mut wire {
                if message.role == Role::System.as_str() {
                    message.role = Role::User.as_str().to_string();
                }
            }
        }

        let mut body = ChatCompletionRequest::new(model.clone(), wire, streaming);
        body.with_tools(tools);
        if ModelCatalog::is_openai_reasoning_model(&model) {
            body.temperature = Some(REASONING_TEMPERATURE);
            body.max_completion_tokens = settings.max_tokens;
        } else {
            body.temperature = Some(settings.temperature);
            body.max_tokens = settings.max_tokens;
        }
        if settings.reasoning_effort.is_enabled() {
            body.reasoning_effort = Some(settings.reasoning_effort.as_str().to_string());
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

// ---------------------------------------------------------------------------
// Request wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<WireMessage>,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_completion_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning_effort: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<WireTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<String>,
    /// Provider-specific top-level fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChatCompletionRequest {
    pub fn new(model: String, messages: Vec<WireMessage>, stream: bool) -> Self {
        Self {
            model,
            messages,
            stream,
            temperature: None,
            max_tokens: None,
            max_completion_tokens: None,
            reasoning_effort: None,
            tools: None,
            tool_choice: None,
            extra: Map::new(),
        }
    }

    pub fn with_tools(&mut self, tools: Option<&[ToolDescriptor]>) {
        self.tools = wire_tools(tools);
        if self.tools.is_some() {
            self.tool_choice = Some("auto".to_string());
        }
    }

    pub fn to_value(&self) -> Result<Value, ModelError> {
        Ok(serde_json::to_value(self)?)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WireMessage {
    pub role: String,
    pub content: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl From<ChatMessage> for WireMessage {
    fn from(message: ChatMessage) -> Self {
        Self {
            role: message.role.as_str().to_string(),
            content: message.content,
            tool_calls: message.tool_calls,
            tool_call_id: message.tool_call_id,
        }
    }
}

/// History in wire form, with previously rendered reasoning removed.
pub fn wire_messages(messages: &[ChatMessage]) -> Vec<WireMessage> {
    sanitize_history(messages)
        .into_iter()
        .map(WireMessage::from)
        .collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct WireTool {
    #[serde(rename = "type")]
    pub type_: String,
    pub function: WireFunction,
}

#[derive(Debug, Clone, Serialize)]
pub struct WireFunction {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

pub fn wire_tools(tools: Option<&[ToolDescriptor]>) -> Option<Vec<WireTool>> {
    let tools = tools.filter(|tools| !tools.is_empty())?;
    Some(
        tools
            .iter()
            .map(|tool| WireTool {
                type_: "function".to_string(),
                function: WireFunction {
                    name: tool.name.clone(),
                    description: tool.description.clone(),
                    parameters: tool.input_schema.clone(),
                },
            })
            .collect(),
    )
}

// ---------------------------------------------------------------------------
// Response wire types
// ---------------------------------------------------------------------------

/// One response body or one stream chunk; both share this shape.
#[derive(Debug, Deserialize)]
pub struct ChatCompletion {
    #[serde(default)]
    pub choices: Vec<Choice>,
    #[serde(default)]
    pub citations: Option<Vec<String>>,
    #[serde(default)]
    pub error: Option<WireError>,
}

#[derive(Debug, Deserialize)]
pub struct Choice {
    #[serde(default)]
    pub message: Option<ResponseMessage>,
    #[serde(default)]
    pub delta: Option<ResponseMessage>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ResponseMessage {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub content: Option<MessageContent>,
    #[serde(default)]
    pub reasoning_content: Option<String>,
    #[serde(default)]
    pub reasoning: Option<String>,
    #[serde(default)]
    pub reasoning_details: Option<Vec<ReasoningDetail>>,
    #[serde(default)]
    pub tool_calls: Option<Vec<WireToolCall>>,
}

/// Plain string content, or an array of typed chunks.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Chunks(Vec<ContentChunk>),
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentChunk {
    Text {
        #[serde(default)]
        text: String,
    },
    Thinking {
        #[serde(default)]
        thinking: Vec<ThinkingPart>,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
pub struct ThinkingPart {
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct ReasoningDetail {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct WireToolCall {
    #[serde(default)]
    pub index: Option<usize>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "type", default)]
    pub call_type: Option<String>,
    #[serde(default)]
    pub function: Option<WireFunctionCall>,
}

#[derive(Debug, Default, Deserialize)]
pub struct WireFunctionCall {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub arguments: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum WireError {
    Detailed {
        #[serde(default)]
        message: String,
        #[serde(default)]
        code: Option<Value>,
    },
    Message(String),
}

impl WireError {
    /// Numeric codes that look like HTTP statuses go through the status table.
    pub fn into_model_error(self) -> ModelError {
        match self {
            WireError::Detailed { message, code } => {
                let status = code
                    .as_ref()
                    .and_then(|code| {
                        code.as_u64()
                            .or_else(|| code.as_str().and_then(|s| s.parse().ok()))
                    })
                    .and_then(|code| u16::try_from(code).ok());
                status
                    .and_then(|status| ModelError::from_status(status, &message))
                    .unwrap_or(ModelError::Unknown(message))
            }
            WireError::Message(message) => ModelError::Unknown(message),
        }
    }
}

impl MessageContent {
    /// Splits into (answer text, thinking text).
    fn split(self) -> (Option<String>, Option<String>) {
        match self {
            MessageContent::Text(text) => (non_empty(text), None),
            MessageContent::Chunks(chunks) => {
                let mut text = String::new();
                let mut thinking = String::new();
                for chunk in chunks {
                    match chunk {
                        ContentChunk::Text { text: part } => text.push_str(&part),
                        ContentChunk::Thinking { thinking: parts } => {
                            for part in parts {
                                thinking.push_str(&part.text);
                            }
                        }
                        ContentChunk::Other => {}
                    }
                }
                (non_empty(text), non_empty(thinking))
            }
        }
    }
}

impl ResponseMessage {
    fn split(self) -> (Option<String>, Option<String>, Option<Vec<WireToolCall>>) {
        let (text, chunk_thinking) = self
            .content
            .map(MessageContent::split)
            .unwrap_or((None, None));
        let details = self.reasoning_details.and_then(|details| {
            let joined: String = details
                .into_iter()
                .filter(|detail| detail.kind != "reasoning.encrypted")
                .filter_map(|detail| detail.text.or(detail.summary))
                .collect();
            non_empty(joined)
        });
        let reasoning = self
            .reasoning_content
            .and_then(non_empty)
            .or(self.reasoning.and_then(non_empty))
            .or(details)
            .or(chunk_thinking);
        (text, reasoning, self.tool_calls)
    }

    pub fn into_parsed(self) -> ParsedResponse {
        let role = self.role.clone();
        let (text, reasoning, tool_calls) = self.split();
        ParsedResponse {
            text,
            reasoning,
            role,
            tool_calls: tool_calls
                .unwrap_or_default()
                .into_iter()
                .map(WireToolCall::into_call)
                .collect(),
        }
    }

    pub fn into_delta(self) -> DeltaParse {
        let (text, reasoning, tool_calls) = self.split();
        DeltaParse {
            text,
            reasoning,
            tool_calls: tool_calls
                .unwrap_or_default()
                .into_iter()
                .enumerate()
                .map(|(position, call)| call.into_fragment(position))
                .collect(),
            ..DeltaParse::default()
        }
    }
}

impl WireToolCall {
    pub fn into_call(self) -> ToolCall {
        let function = self.function.unwrap_or_default();
        ToolCall {
            id: self.id.unwrap_or_default(),
            call_type: self.call_type.unwrap_or_else(|| "function".to_string()),
            function: FunctionCall {
                name: function.name.unwrap_or_default(),
                arguments: function.arguments.unwrap_or_default(),
            },
        }
    }

    pub fn into_fragment(self, position: usize) -> ToolCallFragment {
        let function = self.function.unwrap_or_default();
        ToolCallFragment {
            index: self.index.unwrap_or(position),
            id: self.id,
            call_type: self.call_type,
            name: function.name,
            arguments: function.arguments,
            whole: false,
        }
    }
}

impl ChatCompletion {
    /// First choice of a complete body. `None` when the body carries no choice.
    pub fn into_parsed(self) -> Option<ParsedResponse> {
        let choice = self.choices.into_iter().next()?;
        let message = choice.message.or(choice.delta)?;
        Some(message.into_parsed())
    }

    pub fn finish_reason(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|choice| choice.finish_reason.as_deref())
    }

    pub fn into_delta(self) -> DeltaParse {
        if let Some(error) = self.error {
            return DeltaParse::failed(error.into_model_error());
        }
        let Some(choice) = self.choices.into_iter().next() else {
            return DeltaParse::default();
        };
        match choice.delta.or(choice.message) {
            Some(message) => message.into_delta(),
            None => DeltaParse::default(),
        }
    }
}

pub fn parse_completion(body: &[u8]) -> Option<ChatCompletion> {
    match serde_json::from_slice(body) {
        Ok(completion) => Some(completion),
        Err(error) => {
            tracing::debug!("chat completion body did not parse: {error}");
            None
        }
    }
}

/// Decodes one stream payload. Blank payloads decode to `None`; malformed JSON is a
/// terminal decode failure.
pub fn decode_chunk(payload: &str) -> Result<Option<ChatCompletion>, DeltaParse> {
    if payload.trim().is_empty() {
        return Ok(None);
    }
    serde_json::from_str(payload).map(Some).map_err(|error| {
        DeltaParse::failed(ModelError::Decode(format!("stream event: {error}")))
    })
}

pub fn parse_chat_delta(payload: Option<&str>) -> DeltaParse {
    let Some(payload) = payload else {
        return DeltaParse::done();
    };
    match decode_chunk(payload) {
        Ok(Some(chunk)) => chunk.into_delta(),
        Ok(None) => DeltaParse::default(),
        Err(failed) => failed,
    }
}

fn non_empty(value: String) -> Option<String> {
    (!value.is_empty()).then_some(value)
}
