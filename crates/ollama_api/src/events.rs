use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Canonical completion reason mapped from the `done_reason` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatDoneReason {
    Stop,
    Length,
    Load,
    Unload,
}

impl ChatDoneReason {
    pub fn parse(value: &str) -> Option<Self> {
        Some(match value {
            "stop" => Self::Stop,
            "length" => Self::Length,
            "load" => Self::Load,
            "unload" => Self::Unload,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stop => "stop",
            Self::Length => "length",
            Self::Load => "load",
            Self::Unload => "unload",
        }
    }
}

/// Stream event emitted by the parser after normalization.
///
/// One NDJSON line can normalize to several events: a content delta, tool
/// calls, and the terminal `done` marker may share a line.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatStreamEvent {
    /// Incremental assistant text from `message.content`.
    ContentDelta { delta: String },
    /// Native structured tool call from `message.tool_calls`.
    ToolCallRequested {
        tool_name: Option<String>,
        arguments: Option<Value>,
    },
    /// Terminal line (`done: true`).
    Done { reason: Option<ChatDoneReason> },
    /// Server-reported stream error line.
    Error { message: String },
}
