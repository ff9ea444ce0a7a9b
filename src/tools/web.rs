//! Web tools: DuckDuckGo search and readable page-text extraction.
//!
//! No API key is required; search goes through the DuckDuckGo HTML endpoint
//! and pages are reduced to visible text (scripts and styles dropped, tags
//! stripped, whitespace collapsed) with a character cap.

use std::sync::OnceLock;
use std::time::Duration;

use model_gateway::ToolDefinition;
use regex::Regex;
use serde_json::{json, Value};

use crate::registry::Tool;

/// Search results returned when the model does not ask for a count.
pub const DEFAULT_MAX_RESULTS: usize = 5;
/// Page-text cap when the model does not ask for a length.
pub const DEFAULT_MAX_CHARS: usize = 4000;

const FETCH_TIMEOUT: Duration = Duration::from_secs(10);
const SEARCH_ENDPOINT: &str = "https://html.duckduckgo.com/html/";
const USER_AGENT: &str = "codeloom/0.1 (+local coding assistant)";

/// Performs a DuckDuckGo search and returns the top results.
pub struct WebSearchTool;

impl WebSearchTool {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Default for WebSearchTool {
    fn default() -> Self {
        Self::new()
    }
}

impl Tool for WebSearchTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "web_search".to_string(),
            description: Some(
                "Perform a web search using DuckDuckGo and return top results.".to_string(),
            ),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "Search query"
                    },
                    "max_results": {
                        "type": "integer",
                        "description": "Maximum number of results"
                    }
                },
                "required": ["query"]
            }),
        }
    }

    fn invoke(&self, arguments: &Value) -> Result<String, String> {
        let query = arguments
            .get("query")
            .and_then(|value| value.as_str())
            .ok_or_else(|| "web_search requires a 'query' string argument".to_string())?;
        let max_results = arguments
            .get("max_results")
            .and_then(|value| value.as_u64())
            .map_or(DEFAULT_MAX_RESULTS, |value| value as usize);

        let url = format!("{SEARCH_ENDPOINT}?q={}", urlencoding::encode(query));
        let html = http_get_text(&url).map_err(|error| format!("Search failed: {error}"))?;

        let results = extract_search_results(&html, max_results);
        if results.is_empty() {
            return Ok("No results found.".to_string());
        }

        Ok(format_search_results(&results))
    }
}

/// Fetches a page and returns its readable text content.
pub struct FetchWebsiteTextTool;

impl FetchWebsiteTextTool {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Default for FetchWebsiteTextTool {
    fn default() -> Self {
        Self::new()
    }
}

impl Tool for FetchWebsiteTextTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "fetch_website_text".to_string(),
            description: Some(
                "Fetch and clean readable text content from a webpage.".to_string(),
            ),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "url": {
                        "type": "string",
                        "description": "Page URL to fetch"
                    },
                    "max_chars": {
                        "type": "integer",
                        "description": "Maximum characters of extracted text"
                    }
                },
                "required": ["url"]
            }),
        }
    }

    fn invoke(&self, arguments: &Value) -> Result<String, String> {
        let url = arguments
            .get("url")
            .and_then(|value| value.as_str())
            .ok_or_else(|| "fetch_website_text requires a 'url' string argument".to_string())?;
        let max_chars = arguments
            .get("max_chars")
            .and_then(|value| value.as_u64())
            .map_or(DEFAULT_MAX_CHARS, |value| value as usize);

        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err("Invalid URL: must start with http:// or https://".to_string());
        }

        let html = http_get_text(url).map_err(|error| format!("Failed to fetch page: {error}"))?;
        let text = extract_page_text(&html, max_chars);

        if text.is_empty() {
            Ok("(Empty or unreadable content)".to_string())
        } else {
            Ok(text)
        }
    }
}

/// One parsed search hit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SearchHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

fn result_link_regex() -> &'static Regex {
    static CACHED: OnceLock<Regex> = OnceLock::new();
    CACHED.get_or_init(|| {
        Regex::new(r#"(?is)<a[^>]*class="result__a"[^>]*href="([^"]+)"[^>]*>(.*?)</a>"#)
            .expect("result link regex must compile")
    })
}

fn result_snippet_regex() -> &'static Regex {
    static CACHED: OnceLock<Regex> = OnceLock::new();
    CACHED.get_or_init(|| {
        Regex::new(r#"(?is)<a[^>]*class="result__snippet"[^>]*>(.*?)</a>"#)
            .expect("result snippet regex must compile")
    })
}

pub(crate) fn extract_search_results(html: &str, max_results: usize) -> Vec<SearchHit> {
    let snippets: Vec<String> = result_snippet_regex()
        .captures_iter(html)
        .map(|captures| collapse_whitespace(&strip_tags(&captures[1])))
        .collect();

    result_link_regex()
        .captures_iter(html)
        .take(max_results)
        .enumerate()
        .map(|(index, captures)| SearchHit {
            title: collapse_whitespace(&strip_tags(&captures[2])),
            url: decode_entities(&captures[1]),
            snippet: snippets.get(index).cloned().unwrap_or_default(),
        })
        .collect()
}

pub(crate) fn format_search_results(results: &[SearchHit]) -> String {
    results
        .iter()
        .enumerate()
        .map(|(index, hit)| {
            let mut line = format!("{}. {}\n   {}", index + 1, hit.title, hit.url);
            if !hit.snippet.is_empty() {
                line.push_str("\n   ");
                line.push_str(&hit.snippet);
            }
            line
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn dropped_block_regex() -> &'static Regex {
    static CACHED: OnceLock<Regex> = OnceLock::new();
    CACHED.get_or_init(|| {
        Regex::new(r"(?is)<(script|style|noscript)[^>]*>.*?</(script|style|noscript)>")
            .expect("dropped block regex must compile")
    })
}

fn tag_regex() -> &'static Regex {
    static CACHED: OnceLock<Regex> = OnceLock::new();
    CACHED.get_or_init(|| Regex::new(r"(?s)<[^>]+>").expect("tag regex must compile"))
}

pub(crate) fn extract_page_text(html: &str, max_chars: usize) -> String {
    let without_blocks = dropped_block_regex().replace_all(html, " ");
    let without_tags = tag_regex().replace_all(&without_blocks, " ");
    let decoded = decode_entities(&without_tags);
    let collapsed = collapse_whitespace(&decoded);

    match collapsed.char_indices().nth(max_chars) {
        Some((index, _)) => collapsed[..index].to_string(),
        None => collapsed,
    }
}

fn strip_tags(html: &str) -> String {
    decode_entities(&tag_regex().replace_all(html, " "))
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn decode_entities(text: &str) -> String {
    text.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
}

fn http_get_text(url: &str) -> Result<String, String> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|error| format!("failed to initialize tokio runtime: {error}"))?;

    runtime.block_on(async {
        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|error| error.to_string())?;

        let response = client
            .get(url)
            .send()
            .await
            .map_err(|error| error.to_string())?
            .error_for_status()
            .map_err(|error| error.to_string())?;

        response.text().await.map_err(|error| error.to_string())
    })
}
