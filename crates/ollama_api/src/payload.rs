use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Canonical request payload shape for the chat endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    /// JSON array of role-tagged chat messages. Kept as raw JSON so callers
    /// own message shaping; the client validates the array shape before send.
    pub messages: Value,
    /// Default: true.
    #[serde(default = "default_true")]
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keep_alive: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<ChatOptions>,
}

fn default_true() -> bool {
    true
}

impl ChatRequest {
    pub fn new(model: impl Into<String>, messages: impl Into<Value>) -> Self {
        Self {
            model: model.into(),
            messages: messages.into(),
            stream: true,
            keep_alive: None,
            tools: Vec::new(),
            options: None,
        }
    }

    #[must_use]
    pub fn with_tools(mut self, tools: Vec<Value>) -> Self {
        self.tools = tools;
        self
    }

    #[must_use]
    pub fn with_options(mut self, options: ChatOptions) -> Self {
        self.options = Some(options);
        self
    }
}

/// Model sampling options forwarded verbatim to the server.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_ctx: Option<u32>,
}
