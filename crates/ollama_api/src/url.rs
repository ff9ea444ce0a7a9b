/// Default endpoint of a locally running Ollama server.
pub const DEFAULT_OLLAMA_BASE_URL: &str = "http://127.0.0.1:11434";

const CHAT_PATH: &str = "/api/chat";

/// Normalizes a configured base URL into the chat endpoint URL.
///
/// Accepts bare hosts, hosts with trailing slashes, and URLs that already
/// name the chat path.
#[must_use]
pub fn normalize_chat_url(base_url: &str) -> String {
    let trimmed = base_url.trim().trim_end_matches('/');
    let base = if trimmed.is_empty() {
        DEFAULT_OLLAMA_BASE_URL
    } else {
        trimmed
    };

    if base.ends_with(CHAT_PATH) {
        base.to_string()
    } else {
        format!("{base}{CHAT_PATH}")
    }
}
