//! Reasoning bracketing for the two content streams a reasoning model produces.

pub const REASONING_OPEN: &str = "<think>\n";
pub const REASONING_CLOSE: &str = "\n</think>\n\n";

/// Tracks whether the stream is inside a reasoning block and emits the markers.
///
/// Each call returns the text pieces to forward, in order. Markers are separate
/// pieces so callers that render them differently can tell them apart.
#[derive(Debug, Default)]
pub struct ReasoningBracket {
    open: bool,
}

impl ReasoningBracket {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn reasoning(&mut self, fragment: &str) -> Vec<String> {
        if fragment.is_empty() {
            return Vec::new();
        }
        let mut pieces = Vec::with_capacity(2);
        if !self.open {
            self.open = true;
            pieces.push(REASONING_OPEN.to_string());
        }
        pieces.push(fragment.to_string());
        pieces
    }

    pub fn content(&mut self, fragment: &str) -> Vec<String> {
        if fragment.is_empty() {
            return Vec::new();
        }
        let mut pieces = Vec::with_capacity(2);
        if let Some(close) = self.finish() {
            pieces.push(close);
        }
        pieces.push(fragment.to_string());
        pieces
    }

    /// Closing marker if a block is still open at termination.
    pub fn finish(&mut self) -> Option<String> {
        if self.open {
            self.open = false;
            Some(REASONING_CLOSE.to_string())
        } else {
            None
        }
    }
}

/// Wraps a complete reasoning trace and answer the way the streaming path renders them.
pub fn bracket_complete(reasoning: Option<&str>, text: Option<&str>) -> Option<String> {
    let reasoning = reasoning.filter(|r| !r.trim().is_empty());
    match (reasoning, text) {
        (Some(reasoning), text) => Some(format!(
            "{REASONING_OPEN}{reasoning}{REASONING_CLOSE}{}",
            text.unwrap_or("")
        )),
        (None, text) => text.map(str::to_string),
    }
}
