// Server-Sent Events encoding and decoding helpers.
//
// Outgoing: every event our API emits is a single `data: {json}` line.
// Incoming: the OpenAI streaming API is consumed as raw bytes and split into
// `data:` payloads here, terminated by the `[DONE]` sentinel.

use serde::Serialize;

/// Sentinel payload that terminates an OpenAI stream
pub const DONE_SENTINEL: &str = "[DONE]";

/// Encode a serializable event as an SSE frame
pub fn encode_event<T: Serialize>(event: &T) -> String {
    match serde_json::to_string(event) {
        Ok(json) => format!("data: {}\n\n", json),
        Err(e) => {
            tracing::warn!("Failed to serialize SSE event: {}", e);
            "data: {\"type\":\"error\",\"error\":\"Error formatting response\"}\n\n".to_string()
        }
    }
}

/// Incremental line buffer for an incoming SSE byte stream.
///
/// Feeding a chunk returns the complete `data:` payloads it finished;
/// partial lines are kept until the next chunk arrives.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: String,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes, returning all completed data payloads
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.push_str(&String::from_utf8_lossy(chunk));

        let mut payloads = Vec::new();
        while let Some(pos) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=pos).collect();
            let line = line.trim_end_matches(['\n', '\r']);

            if let Some(payload) = line.strip_prefix("data:") {
                let payload = payload.trim_start();
                if !payload.is_empty() {
                    payloads.push(payload.to_string());
                }
            }
            // Comment lines (":keepalive") and event fields are ignored
        }
        payloads
    }
}
