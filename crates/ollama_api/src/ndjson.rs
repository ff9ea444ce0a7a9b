use serde_json::Value;

use crate::events::{ChatDoneReason, ChatStreamEvent};

/// Incremental parser for NDJSON chat streams.
///
/// Ollama emits one JSON object per newline-terminated line. Bytes are fed
/// as they arrive off the wire; complete lines are drained as normalized
/// events and partial lines stay buffered.
#[derive(Debug, Default)]
pub struct NdjsonStreamParser {
    buffer: String,
}

impl NdjsonStreamParser {
    /// Feed arbitrary bytes into the parser and drain complete events.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<ChatStreamEvent> {
        self.buffer.push_str(&String::from_utf8_lossy(bytes));
        let mut events = Vec::new();

        while let Some(split) = self.buffer.find('\n') {
            let line = self.buffer[..split].to_string();
            self.buffer.drain(0..split + 1);

            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            if let Ok(value) = serde_json::from_str::<Value>(line) {
                events.extend(map_line(&value));
            }
        }

        events
    }

    /// Parse a complete NDJSON payload string in one shot.
    pub fn parse_lines(input: &str) -> Vec<ChatStreamEvent> {
        let mut parser = Self::default();
        let mut events = parser.feed(input.as_bytes());
        // A final line without a trailing newline still counts once the
        // payload is known to be complete.
        events.extend(parser.feed(b"\n"));
        events
    }

    pub fn is_empty_buffer(&self) -> bool {
        self.buffer.trim().is_empty()
    }
}

fn map_line(value: &Value) -> Vec<ChatStreamEvent> {
    if let Some(message) = value.get("error").and_then(|error| error.as_str()) {
        return vec![ChatStreamEvent::Error {
            message: message.to_string(),
        }];
    }

    let mut events = Vec::new();

    if let Some(message) = value.get("message") {
        if let Some(content) = message.get("content").and_then(|content| content.as_str()) {
            if !content.is_empty() {
                events.push(ChatStreamEvent::ContentDelta {
                    delta: content.to_string(),
                });
            }
        }

        if let Some(tool_calls) = message.get("tool_calls").and_then(|calls| calls.as_array()) {
            for call in tool_calls {
                let function = call.get("function");
                let tool_name = function
                    .and_then(|function| function.get("name"))
                    .and_then(|name| name.as_str())
                    .map(ToString::to_string);
                let arguments = function
                    .and_then(|function| function.get("arguments"))
                    .cloned();

                events.push(ChatStreamEvent::ToolCallRequested {
                    tool_name,
                    arguments,
                });
            }
        }
    }

    if value.get("done").and_then(|done| done.as_bool()) == Some(true) {
        let reason = value
            .get("done_reason")
            .and_then(|reason| reason.as_str())
            .and_then(ChatDoneReason::parse);
        events.push(ChatStreamEvent::Done { reason });
    }

    events
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{ChatDoneReason, ChatStreamEvent, NdjsonStreamParser};

    #[test]
    fn parse_ndjson_lines_incrementally() {
        let mut parser = NdjsonStreamParser::default();
        let mut events = Vec::new();

        events.extend(parser.feed(b"{\"message\":{\"role\":\"assistant\",\"con"));
        assert!(events.is_empty());

        events.extend(parser.feed(b"tent\":\"Hello\"},\"done\":false}\n"));
        assert_eq!(
            events,
            vec![ChatStreamEvent::ContentDelta {
                delta: "Hello".to_string(),
            }]
        );
        assert!(parser.is_empty_buffer());
    }

    #[test]
    fn done_line_maps_to_terminal_event_with_reason() {
        let events =
            NdjsonStreamParser::parse_lines("{\"done\":true,\"done_reason\":\"stop\"}\n");

        assert_eq!(
            events,
            vec![ChatStreamEvent::Done {
                reason: Some(ChatDoneReason::Stop),
            }]
        );
    }

    #[test]
    fn tool_calls_map_to_requested_events_in_wire_order() {
        let line = concat!(
            "{\"message\":{\"role\":\"assistant\",\"content\":\"\",\"tool_calls\":[",
            "{\"function\":{\"name\":\"list_files\",\"arguments\":{\"path\":\".\"}}},",
            "{\"function\":{\"name\":\"read_file\",\"arguments\":{\"path\":\"a.py\"}}}",
            "]},\"done\":false}\n",
        );

        let events = NdjsonStreamParser::parse_lines(line);

        assert_eq!(
            events,
            vec![
                ChatStreamEvent::ToolCallRequested {
                    tool_name: Some("list_files".to_string()),
                    arguments: Some(json!({ "path": "." })),
                },
                ChatStreamEvent::ToolCallRequested {
                    tool_name: Some("read_file".to_string()),
                    arguments: Some(json!({ "path": "a.py" })),
                },
            ]
        );
    }

    #[test]
    fn content_and_done_on_one_line_emit_both_events_in_order() {
        let events = NdjsonStreamParser::parse_lines(
            "{\"message\":{\"role\":\"assistant\",\"content\":\"bye\"},\"done\":true,\"done_reason\":\"stop\"}",
        );

        assert_eq!(
            events,
            vec![
                ChatStreamEvent::ContentDelta {
                    delta: "bye".to_string(),
                },
                ChatStreamEvent::Done {
                    reason: Some(ChatDoneReason::Stop),
                },
            ]
        );
    }

    #[test]
    fn error_line_maps_to_error_event() {
        let events =
            NdjsonStreamParser::parse_lines("{\"error\":\"model 'missing' not found\"}\n");

        assert_eq!(
            events,
            vec![ChatStreamEvent::Error {
                message: "model 'missing' not found".to_string(),
            }]
        );
    }

    #[test]
    fn malformed_lines_are_skipped_not_fatal() {
        let payload = concat!(
            "not json at all\n",
            "{\"message\":{\"role\":\"assistant\",\"content\":\"ok\"},\"done\":false}\n",
        );

        let events = NdjsonStreamParser::parse_lines(payload);

        assert_eq!(
            events,
            vec![ChatStreamEvent::ContentDelta {
                delta: "ok".to_string(),
            }]
        );
    }

    #[test]
    fn unknown_done_reason_is_preserved_as_none() {
        let events =
            NdjsonStreamParser::parse_lines("{\"done\":true,\"done_reason\":\"surprise\"}\n");

        assert_eq!(events, vec![ChatStreamEvent::Done { reason: None }]);
    }
}
