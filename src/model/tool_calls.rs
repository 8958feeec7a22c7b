//! Index-keyed accumulation of streamed tool-call fragments.

use std::collections::HashMap;

use crate::model::types::{FunctionCall, ToolCall, ToolCallFragment};

#[derive(Debug, Default)]
struct PartialCall {
    id: String,
    call_type: String,
    name: String,
    arguments: String,
}

/// Merges fragments that share an index: id and type arrive once, the name may be
/// repeated verbatim or split, and arguments arrive incrementally.
///
/// A fragment opens a new call instead of merging when it is marked whole or when
/// it brings a different id to an index that already has one. Servers that number
/// calls per delta reuse index 0 for every call.
#[derive(Debug, Default)]
pub struct ToolCallAccumulator {
    calls: Vec<PartialCall>,
    slots: HashMap<usize, usize>,
}

impl ToolCallAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    pub fn merge(&mut self, fragment: ToolCallFragment) {
        let slot = self.slot_for(&fragment);
        let entry = &mut self.calls[slot];

        if let Some(id) = fragment.id.filter(|id| !id.is_empty()) {
            entry.id = id;
        }
        if let Some(call_type) = fragment.call_type.filter(|t| !t.is_empty()) {
            entry.call_type = call_type;
        }
        if let Some(name) = fragment.name.filter(|name| !name.is_empty()) {
            if entry.name.is_empty() {
                entry.name = name;
            } else if entry.name != name {
                entry.name.push_str(&name);
            }
        }
        if let Some(arguments) = fragment.arguments {
            entry.arguments.push_str(&arguments);
        }
        if fragment.whole && entry.id.is_empty() {
            entry.id = format!("call_{slot}");
        }
    }

    fn slot_for(&mut self, fragment: &ToolCallFragment) -> usize {
        if !fragment.whole {
            if let Some(&slot) = self.slots.get(&fragment.index) {
                let current = &self.calls[slot].id;
                let new_id = fragment
                    .id
                    .as_deref()
                    .is_some_and(|id| !id.is_empty() && !current.is_empty() && id != current);
                if !new_id {
                    return slot;
                }
            }
        }
        self.calls.push(PartialCall::default());
        let slot = self.calls.len() - 1;
        self.slots.insert(fragment.index, slot);
        slot
    }

    /// Materializes the calls in the order they opened, dropping any without an id or name.
    pub fn finish(self) -> Vec<ToolCall> {
        let calls = self
            .calls
            .into_iter()
            .map(|partial| ToolCall {
                id: partial.id,
                call_type: if partial.call_type.trim().is_empty() {
                    "function".to_string()
                } else {
                    partial.call_type
                },
                function: FunctionCall {
                    name: partial.name,
                    arguments: partial.arguments,
                },
            })
            .collect();
        filter_complete(calls)
    }
}

/// Keeps only calls with non-empty id, type, and name.
pub fn filter_complete(calls: Vec<ToolCall>) -> Vec<ToolCall> {
    let total = calls.len();
    let complete: Vec<ToolCall> = calls.into_iter().filter(ToolCall::is_complete).collect();
    if complete.len() < total {
        tracing::warn!(
            "dropped {} incomplete tool call(s) missing id, type, or name",
            total - complete.len()
        );
    }
    complete
}
