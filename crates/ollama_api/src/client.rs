use std::future::Future;
use std::sync::{atomic::AtomicBool, atomic::Ordering, Arc};
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::{Client, Response, StatusCode};
use tracing::warn;

use crate::config::OllamaApiConfig;
use crate::error::{parse_error_message, OllamaApiError};
use crate::events::{ChatDoneReason, ChatStreamEvent};
use crate::ndjson::NdjsonStreamParser;
use crate::payload::ChatRequest;
use crate::retry::{is_retryable_http_error, retry_delay_ms, MAX_RETRIES};
use crate::url::normalize_chat_url;

/// Optional cancellation signal shared across request and stream loops.
pub type CancellationSignal = Arc<AtomicBool>;

const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(25);

#[derive(Debug)]
pub struct OllamaApiClient {
    http: Client,
    config: OllamaApiConfig,
}

#[derive(Debug, Clone)]
pub struct StreamResult {
    pub events: Vec<ChatStreamEvent>,
    /// Terminal reason reported by the server; `None` when the stream ended
    /// without a `done` line.
    pub done: Option<ChatDoneReason>,
}

impl OllamaApiClient {
    pub fn new(config: OllamaApiConfig) -> Result<Self, OllamaApiError> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().map_err(OllamaApiError::from)?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &OllamaApiConfig {
        &self.config
    }

    pub fn normalized_endpoint(&self) -> String {
        normalize_chat_url(&self.config.base_url)
    }

    pub fn build_request(
        &self,
        request: &ChatRequest,
    ) -> Result<reqwest::RequestBuilder, OllamaApiError> {
        validate_request_payload_shape(request)?;

        let payload = self.request_with_transport_defaults(request);
        Ok(self.http.post(self.normalized_endpoint()).json(&payload))
    }

    fn request_with_transport_defaults(&self, request: &ChatRequest) -> ChatRequest {
        let mut payload = request.clone();
        payload.stream = true;
        if payload.keep_alive.is_none() {
            payload.keep_alive = Some(self.config.keep_alive.clone());
        }
        payload
    }

    pub async fn send_with_retry(
        &self,
        request: &ChatRequest,
        cancellation: Option<&CancellationSignal>,
    ) -> Result<Response, OllamaApiError> {
        let mut last_status: Option<StatusCode> = None;
        let mut last_error = None;

        for attempt in 0..=MAX_RETRIES {
            if is_cancelled(cancellation) {
                return Err(OllamaApiError::Cancelled);
            }

            let response = self.build_request(request)?.send();
            let response = await_or_cancel(response, cancellation)
                .await?
                .map_err(OllamaApiError::from);

            match response {
                Ok(response) => {
                    if response.status().is_success() {
                        return Ok(response);
                    }

                    let status = response.status();
                    last_status = Some(status);
                    let body = await_or_cancel(response.text(), cancellation)
                        .await?
                        .unwrap_or_else(|_| {
                            status
                                .canonical_reason()
                                .unwrap_or("request failed")
                                .to_string()
                        });
                    let message = parse_error_message(status, &body);
                    last_error = Some(message.clone());

                    if attempt < MAX_RETRIES && is_retryable_http_error(status.as_u16(), &body) {
                        warn!(%status, attempt, "retrying chat request after server error");
                        await_or_cancel(tokio::time::sleep(retry_delay_ms(attempt)), cancellation)
                            .await?;
                        continue;
                    }

                    return Err(OllamaApiError::Status(status, message));
                }
                Err(error) => {
                    last_error = Some(error.to_string());
                    if attempt < MAX_RETRIES {
                        warn!(attempt, "retrying chat request after transport error");
                        await_or_cancel(tokio::time::sleep(retry_delay_ms(attempt)), cancellation)
                            .await?;
                        continue;
                    }
                    return Err(OllamaApiError::RetryExhausted {
                        status: last_status,
                        last_error,
                    });
                }
            }
        }

        Err(OllamaApiError::RetryExhausted {
            status: last_status,
            last_error,
        })
    }

    pub async fn stream_with_handler<F>(
        &self,
        request: &ChatRequest,
        cancellation: Option<&CancellationSignal>,
        mut on_event: F,
    ) -> Result<Option<ChatDoneReason>, OllamaApiError>
    where
        F: FnMut(ChatStreamEvent),
    {
        let response = self.send_with_retry(request, cancellation).await?;
        let mut bytes = response.bytes_stream();
        let mut parser = NdjsonStreamParser::default();
        let mut done = None;

        loop {
            let Some(chunk) = await_or_cancel(bytes.next(), cancellation).await? else {
                break;
            };
            if is_cancelled(cancellation) {
                return Err(OllamaApiError::Cancelled);
            }
            let chunk = chunk.map_err(OllamaApiError::from)?;
            for event in parser.feed(&chunk) {
                process_stream_event(event, &mut done, &mut on_event)?;
            }
        }

        if is_cancelled(cancellation) {
            return Err(OllamaApiError::Cancelled);
        }

        Ok(done.flatten())
    }

    pub async fn stream(
        &self,
        request: &ChatRequest,
        cancellation: Option<&CancellationSignal>,
    ) -> Result<StreamResult, OllamaApiError> {
        let mut events = Vec::new();
        let done = self
            .stream_with_handler(request, cancellation, |event| {
                events.push(event);
            })
            .await?;

        Ok(StreamResult { events, done })
    }
}

fn validate_request_payload_shape(request: &ChatRequest) -> Result<(), OllamaApiError> {
    if request.messages.is_array() {
        return Ok(());
    }

    Err(OllamaApiError::InvalidRequestPayload(format!(
        "'messages' must be a JSON array/list, got {}",
        value_type_name(&request.messages)
    )))
}

fn value_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

fn process_stream_event<F>(
    event: ChatStreamEvent,
    done: &mut Option<Option<ChatDoneReason>>,
    on_event: &mut F,
) -> Result<(), OllamaApiError>
where
    F: FnMut(ChatStreamEvent),
{
    if let ChatStreamEvent::Error { message } = &event {
        return Err(OllamaApiError::StreamFailed {
            message: message.clone(),
        });
    }

    if let ChatStreamEvent::Done { reason } = &event {
        *done = Some(*reason);
    }

    on_event(event);
    Ok(())
}

fn is_cancelled(cancel: Option<&CancellationSignal>) -> bool {
    cancel.is_some_and(|token| token.load(Ordering::Acquire))
}

async fn await_or_cancel<F>(
    future: F,
    cancellation: Option<&CancellationSignal>,
) -> Result<F::Output, OllamaApiError>
where
    F: Future,
{
    if cancellation.is_none() {
        return Ok(future.await);
    }

    let mut future = Box::pin(future);

    loop {
        if is_cancelled(cancellation) {
            return Err(OllamaApiError::Cancelled);
        }

        if let Ok(output) = tokio::time::timeout(CANCEL_POLL_INTERVAL, &mut future).await {
            if is_cancelled(cancellation) {
                return Err(OllamaApiError::Cancelled);
            }
            return Ok(output);
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{process_stream_event, validate_request_payload_shape};
    use crate::error::OllamaApiError;
    use crate::events::{ChatDoneReason, ChatStreamEvent};
    use crate::ndjson::NdjsonStreamParser;
    use crate::payload::ChatRequest;

    #[test]
    fn string_messages_payloads_are_rejected_before_send() {
        let request = ChatRequest::new("qwen2.5-coder:7b", json!("not a list"));
        let error = validate_request_payload_shape(&request)
            .expect_err("string messages should be rejected");

        assert!(matches!(error, OllamaApiError::InvalidRequestPayload(message) if message.contains("string")));
    }

    #[test]
    fn list_messages_payloads_pass_preflight() {
        let request = ChatRequest::new(
            "qwen2.5-coder:7b",
            json!([{ "role": "user", "content": "hi" }]),
        );
        assert!(validate_request_payload_shape(&request).is_ok());
    }

    #[test]
    fn process_stream_event_emits_deltas_in_parser_order() {
        let payload = concat!(
            "{\"message\":{\"role\":\"assistant\",\"content\":\"A\"},\"done\":false}\n",
            "{\"message\":{\"role\":\"assistant\",\"content\":\"B\"},\"done\":false}\n",
        );
        let parsed = NdjsonStreamParser::parse_lines(payload);

        let mut done = None;
        let mut observed = Vec::new();
        for event in parsed {
            process_stream_event(event, &mut done, &mut |event| observed.push(event))
                .expect("content deltas should process successfully");
        }

        assert!(done.is_none());
        assert_eq!(
            observed,
            vec![
                ChatStreamEvent::ContentDelta {
                    delta: "A".to_string(),
                },
                ChatStreamEvent::ContentDelta {
                    delta: "B".to_string(),
                },
            ]
        );
    }

    #[test]
    fn process_stream_event_tracks_terminal_done_reason() {
        let parsed =
            NdjsonStreamParser::parse_lines("{\"done\":true,\"done_reason\":\"stop\"}\n");

        let mut done = None;
        let mut observed = Vec::new();
        for event in parsed {
            process_stream_event(event, &mut done, &mut |event| observed.push(event))
                .expect("done line should process successfully");
        }

        assert_eq!(done.flatten(), Some(ChatDoneReason::Stop));
        assert_eq!(observed.len(), 1);
    }

    #[test]
    fn process_stream_event_surfaces_server_error_lines() {
        let parsed = NdjsonStreamParser::parse_lines("{\"error\":\"out of memory\"}\n");

        let mut done = None;
        let mut observed = Vec::new();
        let mut failure = None;
        for event in parsed {
            if let Err(error) =
                process_stream_event(event, &mut done, &mut |event| observed.push(event))
            {
                failure = Some(error);
            }
        }

        assert!(observed.is_empty());
        assert!(matches!(
            failure,
            Some(OllamaApiError::StreamFailed { message }) if message == "out of memory"
        ));
    }
}
