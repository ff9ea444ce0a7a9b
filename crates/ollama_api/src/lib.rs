//! Transport-only Ollama chat client primitives.
//!
//! This crate owns request building and response-stream parsing for the
//! local Ollama `/api/chat` endpoint only. It intentionally contains no
//! prompt assembly and no orchestration coupling.
//!
//! Ollama streams one JSON object per line (NDJSON) rather than SSE frames;
//! normalization includes native tool-call extraction via
//! [`ChatStreamEvent::ToolCallRequested`], while malformed lines are skipped
//! so a noisy stream degrades instead of aborting.

pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod ndjson;
pub mod payload;
pub mod retry;
pub mod url;

pub use client::OllamaApiClient;
pub use client::StreamResult;
pub use config::OllamaApiConfig;
pub use error::OllamaApiError;
pub use events::{ChatDoneReason, ChatStreamEvent};
pub use ndjson::NdjsonStreamParser;
pub use payload::ChatRequest;
pub use url::normalize_chat_url;
