//! History helpers shared by provider adapters.
//!
//! Assistant turns in the history may still carry the reasoning block the engine
//! rendered earlier. Providers must never see that text again, and several of them
//! also impose ordering rules on roles.

use crate::model::types::{ChatMessage, Role};

const OPEN_TAG: &str = "<think>";
const CLOSE_TAG: &str = "</think>";

/// Removes every `<think>...</think>` block. An unterminated block swallows the rest.
pub fn strip_reasoning_block(text: &str) -> String {
    if !text.contains(OPEN_TAG) {
        return text.to_string();
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find(OPEN_TAG) {
        out.push_str(&rest[..start]);
        let after_open = &rest[start + OPEN_TAG.len()..];
        match after_open.find(CLOSE_TAG) {
            Some(end) => rest = &after_open[end + CLOSE_TAG.len()..],
            None => {
                rest = "";
                break;
            }
        }
    }
    out.push_str(rest);
    out.trim_start().to_string()
}

/// Copies the history with assistant reasoning blocks removed.
pub fn sanitize_history(messages: &[ChatMessage]) -> Vec<ChatMessage> {
    messages
        .iter()
        .map(|message| {
            if message.role == Role::Assistant {
                ChatMessage {
                    content: strip_reasoning_block(&message.content),
                    ..message.clone()
                }
            } else {
                message.clone()
            }
        })
        .collect()
}

/// Splits leading/embedded system turns off the history and joins their text.
pub fn split_system(messages: &[ChatMessage]) -> (Option<String>, Vec<ChatMessage>) {
    let mut system_parts = Vec::new();
    let mut rest = Vec::with_capacity(messages.len());
    for message in messages {
        if message.role == Role::System {
            if !message.content.trim().is_empty() {
                system_parts.push(message.content.trim().to_string());
            }
        } else {
            rest.push(message.clone());
        }
    }
    let system = (!system_parts.is_empty()).then(|| system_parts.join("\n\n"));
    (system, rest)
}

/// Joins adjacent plain-text turns that share a role. Turns carrying tool calls or
/// answering a tool call are kept separate.
pub fn merge_consecutive_roles(messages: Vec<ChatMessage>) -> Vec<ChatMessage> {
    let mut merged: Vec<ChatMessage> = Vec::with_capacity(messages.len());
    for message in messages {
        if let Some(last) = merged.last_mut() {
            if last.role == message.role && is_plain(last) && is_plain(&message) {
                if !message.content.is_empty() {
                    if !last.content.is_empty() {
                        last.content.push_str("\n\n");
                    }
                    last.content.push_str(&message.content);
                }
                continue;
            }
        }
        merged.push(message);
    }
    merged
}

/// System turns first, then strictly alternating user/assistant turns starting with user.
pub fn enforce_alternation(messages: Vec<ChatMessage>) -> Vec<ChatMessage> {
    let (system, rest) = split_system(&messages);
    let mut conversation: Vec<ChatMessage> = Vec::with_capacity(rest.len());
    for message in rest {
        let role = match message.role {
            Role::Tool => Role::User,
            other => other,
        };
        let message = ChatMessage {
            role,
            tool_calls: Vec::new(),
            tool_call_id: None,
            ..message
        };
        if conversation.is_empty() && role == Role::Assistant {
            continue;
        }
        conversation.push(message);
    }

    let mut out = Vec::with_capacity(conversation.len() + 1);
    if let Some(system) = system {
        out.push(ChatMessage::system(system));
    }
    out.extend(merge_consecutive_roles(conversation));
    out
}

fn is_plain(message: &ChatMessage) -> bool {
    message.tool_calls.is_empty() && message.tool_call_id.is_none()
}
