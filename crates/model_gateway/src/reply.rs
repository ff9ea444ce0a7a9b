//! Detection of tool-call intent embedded in plain model text.
//!
//! Models express tool calls in two shapes: native structured call fields on
//! the wire (handled by each adapter), and JSON objects embedded inline in
//! the reply text, either fenced or bare. All inline-shape heuristics live
//! here so adapters and tests share one boundary instead of scattering
//! per-model parsing through the turn loop.

use serde_json::Value;

use crate::ToolCallRequest;

/// Outcome of scanning one turn's raw text for embedded tool calls.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedReply {
    /// Prose surrounding any extracted call blocks, surfaced as assistant text.
    pub text: String,
    /// Extracted call requests, in the order they appear in the reply.
    pub requests: Vec<ToolCallRequest>,
}

impl ParsedReply {
    fn text_only(raw: &str) -> Self {
        Self {
            text: raw.to_string(),
            requests: Vec::new(),
        }
    }
}

/// Splits a raw model reply into assistant prose and embedded tool requests.
///
/// An embedded request is a JSON object carrying a string `name` and an
/// object `arguments`, either bare or inside a ```json fence; a JSON array of
/// such objects yields one request per element. Anything that fails to parse
/// or match that shape stays prose. Prose before an extracted block is
/// preserved; the block itself is not surfaced as text.
pub fn parse_model_reply(raw: &str) -> ParsedReply {
    for candidate in candidate_offsets(raw) {
        let (head, tail) = raw.split_at(candidate);
        let Some((specs, rest)) = extract_inline_requests(tail) else {
            continue;
        };

        let mut text = head.trim_end().to_string();
        let rest = rest.trim();
        if !rest.is_empty() {
            if !text.is_empty() {
                text.push('\n');
            }
            text.push_str(rest);
        }

        let requests = specs
            .into_iter()
            .enumerate()
            .map(|(index, (tool_name, arguments))| ToolCallRequest {
                call_id: format!("call_{index}"),
                tool_name,
                arguments,
            })
            .collect();

        return ParsedReply { text, requests };
    }

    ParsedReply::text_only(raw)
}

/// Returns the byte offset of the earliest position that may begin an
/// embedded tool call.
///
/// Streaming adapters use this to hold back a suspected tail instead of
/// forwarding it as fragments; a tail that turns out not to parse is flushed
/// as ordinary text. The offset is a suspicion, not a verdict.
#[must_use]
pub fn find_inline_call_start(text: &str) -> Option<usize> {
    candidate_offsets(text).into_iter().next()
}

fn candidate_offsets(text: &str) -> Vec<usize> {
    let mut offsets = Vec::new();
    let mut line_start = 0;

    for line in text.split_inclusive('\n') {
        let trimmed = line.trim_start();
        let indent = line.len() - trimmed.len();

        if trimmed.starts_with("```json") {
            offsets.push(line_start + indent);
        } else if trimmed.starts_with('{') && trimmed.contains("\"name\"") {
            offsets.push(line_start + indent);
        }

        line_start += line.len();
    }

    offsets
}

fn extract_inline_requests(tail: &str) -> Option<(Vec<(String, Value)>, &str)> {
    let trimmed = tail.trim_start();

    if trimmed.starts_with("```") {
        let body = &trimmed[trimmed.find('\n')? + 1..];
        let (inner, rest) = match body.find("\n```") {
            Some(end) => (&body[..end], &body[end + 4..]),
            None => (body, ""),
        };

        let value: Value = serde_json::from_str(inner.trim()).ok()?;
        Some((request_specs(&value)?, rest))
    } else {
        let (value, consumed) = parse_leading_json(trimmed)?;
        Some((request_specs(&value)?, &trimmed[consumed..]))
    }
}

fn parse_leading_json(input: &str) -> Option<(Value, usize)> {
    let mut stream = serde_json::Deserializer::from_str(input).into_iter::<Value>();
    match stream.next() {
        Some(Ok(value)) => Some((value, stream.byte_offset())),
        _ => None,
    }
}

fn request_specs(value: &Value) -> Option<Vec<(String, Value)>> {
    match value {
        Value::Object(_) => request_spec(value).map(|spec| vec![spec]),
        Value::Array(items) if !items.is_empty() => {
            items.iter().map(request_spec).collect::<Option<Vec<_>>>()
        }
        _ => None,
    }
}

fn request_spec(value: &Value) -> Option<(String, Value)> {
    let name = value.get("name")?.as_str()?;
    if name.trim().is_empty() {
        return None;
    }

    // Requiring an object `arguments` keeps arbitrary JSON mentioning a
    // "name" field (manifests, sample payloads) out of the routing path.
    let arguments = value.get("arguments")?;
    if !arguments.is_object() {
        return None;
    }

    Some((name.to_string(), arguments.clone()))
}
