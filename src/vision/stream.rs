//! Parsing of the flow's streamed run output.
//!
//! The stream is newline-delimited JSON, one `{"event": ..., "data": ...}`
//! object per line, optionally prefixed with `data:` when relayed as
//! server-sent events.

use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Incremental text from a `token` event.
    Token(String),
    /// Full message text from an `add_message` event sent by the flow
    /// (sender `Machine`). Echoes of the user turn are ignored.
    Message(String),
    /// The flow finished.
    End,
    /// Any other event, or a line that is not an event at all.
    Ignored,
}

impl StreamEvent {
    /// Text to forward to the caller, if this event carries any.
    pub fn into_text(self) -> Option<String> {
        match self {
            StreamEvent::Token(text) | StreamEvent::Message(text) => Some(text),
            StreamEvent::End | StreamEvent::Ignored => None,
        }
    }
}

pub fn parse_event(line: &str) -> StreamEvent {
    let line = line.trim();
    let line = line.strip_prefix("data:").map(str::trim_start).unwrap_or(line);

    let Ok(event) = serde_json::from_str::<Value>(line) else {
        return StreamEvent::Ignored;
    };
    let data = &event["data"];
    let text = |field: &str| {
        data[field]
            .as_str()
            .filter(|t| !t.is_empty())
            .map(str::to_string)
    };

    match event["event"].as_str() {
        Some("token") => text("chunk").map_or(StreamEvent::Ignored, StreamEvent::Token),
        Some("add_message") if data["sender"].as_str() == Some("Machine") => {
            text("text").map_or(StreamEvent::Ignored, StreamEvent::Message)
        }
        Some("end") => StreamEvent::End,
        _ => StreamEvent::Ignored,
    }
}

/// Drops the closing machine message once tokens have streamed, since it
/// repeats them in full.
#[derive(Debug, Default)]
pub struct EventFilter {
    saw_tokens: bool,
}

impl EventFilter {
    pub fn admit(&mut self, event: StreamEvent) -> StreamEvent {
        match event {
            StreamEvent::Token(_) => {
                self.saw_tokens = true;
                event
            }
            StreamEvent::Message(_) if self.saw_tokens => StreamEvent::Ignored,
            other => other,
        }
    }
}

/// Reassembles lines from arbitrarily split byte chunks.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    /// Append a chunk and return every line it completed. Blank lines are
    /// dropped.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end_matches(['\n', '\r']);
            if !line.trim().is_empty() {
                lines.push(line.to_string());
            }
        }
        lines
    }

    /// Whatever is left once the byte stream ends.
    pub fn finish(&mut self) -> Option<String> {
        let rest = String::from_utf8_lossy(&self.pending).trim().to_string();
        self.pending.clear();
        Some(rest).filter(|r| !r.is_empty())
    }
}
