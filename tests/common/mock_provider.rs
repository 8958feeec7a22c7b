// tests/common/mock_provider.rs
//! In-process provider that answers chat requests in the OpenAI and Anthropic dialects.

use std::sync::atomic::{AtomicUsize, Ordering};

use serde_json::{json, Value};

/// Model name that always answers 503.
pub const BROKEN_MODEL: &str = "broken-model";

pub struct MockProvider {
    requests: AtomicUsize,
}

pub struct MockReply {
    pub status: u16,
    pub chunks: Vec<String>,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            requests: AtomicUsize::new(0),
        }
    }

    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    /// The answer every dialect gives for `prompt`.
    pub fn answer_for(prompt: &str) -> String {
        format!("echo: {prompt}")
    }

    pub fn handle(&self, url: &str, body: Option<&Value>) -> MockReply {
        self.requests.fetch_add(1, Ordering::SeqCst);
        let Some(body) = body else {
            return MockReply {
                status: 405,
                chunks: vec!["method not allowed".to_string()],
            };
        };

        if body["model"].as_str() == Some(BROKEN_MODEL) {
            return MockReply {
                status: 503,
                chunks: vec!["upstream unavailable".to_string()],
            };
        }

        let streaming = body["stream"].as_bool().unwrap_or(false);
        let prompt = last_user_text(body);
        let answer = Self::answer_for(&prompt);

        if url.ends_with("/messages") {
            anthropic_reply(&answer, streaming)
        } else if url.ends_with("/chat/completions") {
            openai_reply(&answer, streaming)
        } else {
            MockReply {
                status: 404,
                chunks: vec![format!("no route for {url}")],
            }
        }
    }
}

fn last_user_text(body: &Value) -> String {
    let Some(messages) = body["messages"].as_array() else {
        return String::new();
    };
    let Some(last) = messages.iter().rev().find(|message| message["role"] == "user") else {
        return String::new();
    };
    match &last["content"] {
        Value::String(text) => text.clone(),
        Value::Array(blocks) => blocks
            .iter()
            .filter_map(|block| block["text"].as_str())
            .collect::<Vec<_>>()
            .join(""),
        _ => String::new(),
    }
}

/// Splits after every space so streams carry several fragments.
fn pieces(answer: &str) -> Vec<String> {
    answer
        .split_inclusive(' ')
        .map(str::to_string)
        .collect()
}

fn openai_reply(answer: &str, streaming: bool) -> MockReply {
    if !streaming {
        return MockReply {
            status: 200,
            chunks: vec![json!({
                "id": "chatcmpl-mock",
                "choices": [{
                    "index": 0,
                    "message": { "role": "assistant", "content": answer },
                    "finish_reason": "stop"
                }]
            })
            .to_string()],
        };
    }

    let mut chunks: Vec<String> = pieces(answer)
        .into_iter()
        .map(|piece| {
            format!(
                "data: {}\n\n",
                json!({ "choices": [{ "index": 0, "delta": { "content": piece } }] })
            )
        })
        .collect();
    chunks.push("data: [DONE]\n\n".to_string());
    MockReply {
        status: 200,
        chunks,
    }
}

fn anthropic_reply(answer: &str, streaming: bool) -> MockReply {
    if !streaming {
        return MockReply {
            status: 200,
            chunks: vec![json!({
                "id": "msg_mock",
                "type": "message",
                "role": "assistant",
                "content": [{ "type": "text", "text": answer }],
                "stop_reason": "end_turn"
            })
            .to_string()],
        };
    }

    let mut chunks = vec![format!(
        "event: content_block_start\ndata: {}\n\n",
        json!({ "type": "content_block_start", "index": 0, "content_block": { "type": "text", "text": "" } })
    )];
    chunks.extend(pieces(answer).into_iter().map(|piece| {
        format!(
            "event: content_block_delta\ndata: {}\n\n",
            json!({ "type": "content_block_delta", "index": 0, "delta": { "type": "text_delta", "text": piece } })
        )
    }));
    chunks.push("event: message_stop\ndata: {\"type\":\"message_stop\"}\n\n".to_string());
    MockReply {
        status: 200,
        chunks,
    }
}
