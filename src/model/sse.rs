//! Provider-agnostic event framing.
//!
//! Turns raw response bytes into logical event payloads before any adapter sees
//! them. Multi-line `data:` fields are joined with `\n` and only flushed on a blank
//! line, so JSON split across lines by a provider or proxy survives intact.

const DONE_SENTINEL: &str = "[DONE]";

/// How a provider frames its streamed body.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StreamFormat {
    #[default]
    ServerSentEvents,
    /// One JSON document per line (local model servers).
    JsonLines,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    Data(String),
    /// The literal `[DONE]` terminator.
    Done,
}

#[derive(Debug, Default)]
pub struct SseFramer {
    format: StreamFormat,
    pending_bytes: Vec<u8>,
    data_lines: Vec<String>,
}

impl SseFramer {
    pub fn new(format: StreamFormat) -> Self {
        Self {
            format,
            ..Self::default()
        }
    }

    /// Feeds one network read; returns every event completed by it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.pending_bytes.extend_from_slice(chunk);
        let mut events = Vec::new();

        while let Some(newline) = self.pending_bytes.iter().position(|byte| *byte == b'\n') {
            let mut line: Vec<u8> = self.pending_bytes.drain(..=newline).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            let line = String::from_utf8_lossy(&line);
            if let Some(event) = self.process_line(&line) {
                events.push(event);
            }
        }

        events
    }

    /// Flushes a trailing unterminated line and any buffered data at end of input.
    pub fn finish(&mut self) -> Vec<SseEvent> {
        let mut events = Vec::new();
        if !self.pending_bytes.is_empty() {
            let rest = std::mem::take(&mut self.pending_bytes);
            let line = String::from_utf8_lossy(&rest);
            let line = line.trim_end_matches('\r');
            if let Some(event) = self.process_line(line) {
                events.push(event);
            }
        }
        if let Some(event) = self.flush() {
            events.push(event);
        }
        events
    }

    fn process_line(&mut self, line: &str) -> Option<SseEvent> {
        if self.format == StreamFormat::JsonLines {
            let trimmed = line.trim();
            return (!trimmed.is_empty()).then(|| classify(trimmed.to_string()));
        }

        if line.is_empty() {
            return self.flush();
        }
        if line.starts_with(':') {
            return None;
        }
        if let Some(value) = line.strip_prefix("data:") {
            let value = value.strip_prefix(' ').unwrap_or(value);
            self.data_lines.push(value.to_string());
        }
        // event:, id:, retry: and unknown fields carry nothing adapters need.
        None
    }

    fn flush(&mut self) -> Option<SseEvent> {
        if self.data_lines.is_empty() {
            return None;
        }
        let payload = std::mem::take(&mut self.data_lines).join("\n");
        Some(classify(payload))
    }
}

fn classify(payload: String) -> SseEvent {
    if payload.trim() == DONE_SENTINEL {
        SseEvent::Done
    } else {
        SseEvent::Data(payload)
    }
}
