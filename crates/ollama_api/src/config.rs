use std::time::Duration;

use crate::url::DEFAULT_OLLAMA_BASE_URL;

/// How long the server keeps the model loaded between requests. Matches the
/// warm-model window the assistant backend relies on for latency.
pub const DEFAULT_KEEP_ALIVE: &str = "20m";

/// Transport configuration for Ollama chat requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OllamaApiConfig {
    /// Base URL of the Ollama server.
    pub base_url: String,
    /// `keep_alive` value forwarded with every request.
    pub keep_alive: String,
    /// Optional request timeout.
    pub timeout: Option<Duration>,
}

impl Default for OllamaApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_OLLAMA_BASE_URL.to_string(),
            keep_alive: DEFAULT_KEEP_ALIVE.to_string(),
            timeout: None,
        }
    }
}

impl OllamaApiConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    #[must_use]
    pub fn with_keep_alive(mut self, keep_alive: impl Into<String>) -> Self {
        self.keep_alive = keep_alive.into();
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}
