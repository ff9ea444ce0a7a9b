use std::fmt;

use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Error as JsonError;

#[derive(Debug)]
pub enum OllamaApiError {
    InvalidBaseUrl(String),
    InvalidRequestPayload(String),
    Request(reqwest::Error),
    Status(StatusCode, String),
    Serde(JsonError),
    RetryExhausted {
        status: Option<StatusCode>,
        last_error: Option<String>,
    },
    StreamFailed {
        message: String,
    },
    Cancelled,
    Unknown(String),
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorPayload {
    pub error: Option<String>,
}

impl fmt::Display for OllamaApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidBaseUrl(value) => write!(f, "invalid base URL: {value}"),
            Self::InvalidRequestPayload(message) => {
                write!(f, "invalid request payload: {message}")
            }
            Self::Request(error) => write!(f, "request error: {error}"),
            Self::Status(status, message) => write!(f, "HTTP {status} {message}"),
            Self::Serde(error) => write!(f, "serialization error: {error}"),
            Self::RetryExhausted { status, last_error } => {
                let status = status
                    .map(|status| status.as_u16().to_string())
                    .unwrap_or_else(|| "n/a".to_owned());
                write!(f, "retry exhausted after max attempts (status: {status}, last_error: {last_error:?})")
            }
            Self::StreamFailed { message } => write!(f, "stream failed: {message}"),
            Self::Cancelled => write!(f, "request was cancelled"),
            Self::Unknown(message) => write!(f, "{message}"),
        }
    }
}

impl std::error::Error for OllamaApiError {}

impl From<reqwest::Error> for OllamaApiError {
    fn from(error: reqwest::Error) -> Self {
        Self::Request(error)
    }
}

impl From<JsonError> for OllamaApiError {
    fn from(error: JsonError) -> Self {
        Self::Serde(error)
    }
}

/// Extracts a readable error message from a non-success response body.
///
/// Ollama reports failures as `{"error": "..."}`; anything else falls back
/// to the raw body or the status reason.
pub fn parse_error_message(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ErrorPayload>(body) {
        if let Some(message) = payload.error.filter(|message| !message.trim().is_empty()) {
            return message;
        }
    }

    if body.is_empty() {
        status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string()
    } else {
        body.to_string()
    }
}
