use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionRecordType {
    Session,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRecordType {
    Message,
}

/// First line of every session file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionHeader {
    #[serde(rename = "type")]
    pub record_type: SessionRecordType,
    pub version: u32,
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub created_at: String,
}

impl SessionHeader {
    #[must_use]
    pub fn v1(
        session_id: impl Into<String>,
        name: Option<impl Into<String>>,
        created_at: impl Into<String>,
    ) -> Self {
        Self {
            record_type: SessionRecordType::Session,
            version: 1,
            session_id: session_id.into(),
            name: name.map(Into::into),
            created_at: created_at.into(),
        }
    }
}

/// Role attached to one stored message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Tool,
}

impl MessageRole {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
        }
    }
}

/// One appended message line. Immutable once written; ordering within a
/// session file is the session's total message order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MessageEntry {
    #[serde(rename = "type")]
    pub record_type: MessageRecordType,
    pub role: MessageRole,
    pub content: String,
    pub ts: String,
}

impl MessageEntry {
    #[must_use]
    pub fn new(role: MessageRole, content: impl Into<String>, ts: impl Into<String>) -> Self {
        Self {
            record_type: MessageRecordType::Message,
            role,
            content: content.into(),
            ts: ts.into(),
        }
    }
}

/// Metadata returned by session listings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionMeta {
    pub session_id: String,
    pub name: Option<String>,
    pub created_at: String,
    pub last_updated: String,
}

// Untagged on purpose: the single-variant record-type enums inside the
// header and message structs already discriminate on the "type" field, and
// this keeps that field visible to their deny_unknown_fields parsing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub(crate) enum JsonLine {
    Session(SessionHeader),
    Message(MessageEntry),
}
