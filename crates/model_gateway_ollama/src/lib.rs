//! Ollama-backed implementation of the shared `model_gateway` contract.
//!
//! This adapter translates `ollama_api` stream semantics into deterministic
//! `TurnEvent` lifecycle events expected by the orchestration engine. Native
//! structured tool calls are forwarded as they arrive; replies that embed a
//! tool call as inline JSON are withheld from the fragment stream at the
//! suspected block and routed through `parse_model_reply` when the turn
//! completes, so the embedded request becomes a request while surrounding
//! prose stays assistant text.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use model_gateway::{
    find_inline_call_start, parse_model_reply, CancelSignal, ChatMessage, GatewayInitError,
    GatewayProfile, ModelGateway, ToolCallRequest, ToolDefinition, TurnEvent, TurnRequest,
};
use ollama_api::{
    ChatDoneReason, ChatRequest, ChatStreamEvent, OllamaApiClient, OllamaApiConfig, OllamaApiError,
};
use serde_json::{json, Value};
use url::Url;

/// Stable gateway identifier used for explicit startup selection.
pub const OLLAMA_GATEWAY_ID: &str = "ollama";

const DEFAULT_MODEL_ID: &str = "qwen2.5-coder:7b";

/// Runtime configuration for the Ollama gateway.
///
/// Everything is explicit construction state: there is no lazily created
/// global client, and the enabled flag is part of the configuration rather
/// than process-wide mutable state.
#[derive(Debug, Clone, PartialEq)]
pub struct OllamaGatewayConfig {
    pub model: String,
    pub base_url: Option<String>,
    pub keep_alive: Option<String>,
    pub timeout: Option<Duration>,
    pub temperature: Option<f64>,
    pub enabled: bool,
}

impl OllamaGatewayConfig {
    #[must_use]
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            base_url: None,
            keep_alive: None,
            timeout: None,
            temperature: None,
            enabled: true,
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    #[must_use]
    pub fn with_keep_alive(mut self, keep_alive: impl Into<String>) -> Self {
        self.keep_alive = Some(keep_alive.into());
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    fn into_api_config(self) -> OllamaApiConfig {
        let mut config = OllamaApiConfig::new();

        if let Some(base_url) = self.base_url {
            config = config.with_base_url(base_url);
        }

        if let Some(keep_alive) = self.keep_alive {
            config = config.with_keep_alive(keep_alive);
        }

        if let Some(timeout) = self.timeout {
            config = config.with_timeout(timeout);
        }

        config
    }
}

trait StreamClient: Send + Sync {
    fn stream_with(
        &self,
        request: &ChatRequest,
        cancel: &CancelSignal,
        on_event: &mut dyn FnMut(ChatStreamEvent),
    ) -> Result<Option<ChatDoneReason>, OllamaApiError>;
}

#[derive(Debug)]
struct DefaultStreamClient {
    client: OllamaApiClient,
}

impl StreamClient for DefaultStreamClient {
    fn stream_with(
        &self,
        request: &ChatRequest,
        cancel: &CancelSignal,
        on_event: &mut dyn FnMut(ChatStreamEvent),
    ) -> Result<Option<ChatDoneReason>, OllamaApiError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|error| {
                OllamaApiError::Unknown(format!("failed to initialize tokio runtime: {error}"))
            })?;

        runtime.block_on(
            self.client
                .stream_with_handler(request, Some(cancel), |event| on_event(event)),
        )
    }
}

/// `ModelGateway` adapter backed by `ollama_api` transport primitives.
pub struct OllamaGateway {
    model: String,
    temperature: Option<f64>,
    enabled: bool,
    stream_client: Arc<dyn StreamClient>,
}

impl std::fmt::Debug for OllamaGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OllamaGateway")
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("enabled", &self.enabled)
            .finish_non_exhaustive()
    }
}

impl OllamaGateway {
    /// Creates a gateway using real Ollama transport.
    pub fn new(config: OllamaGatewayConfig) -> Result<Self, GatewayInitError> {
        if let Some(base_url) = config.base_url.as_deref() {
            Url::parse(base_url).map_err(|error| {
                GatewayInitError::new(format!("invalid Ollama base URL '{base_url}': {error}"))
            })?;
        }

        let model = sanitize_model_id(config.model.clone());
        let temperature = config.temperature;
        let enabled = config.enabled;
        let stream_client = Arc::new(DefaultStreamClient {
            client: OllamaApiClient::new(config.into_api_config()).map_err(map_init_error)?,
        });

        Ok(Self {
            model,
            temperature,
            enabled,
            stream_client,
        })
    }

    fn chat_request(&self, req: &TurnRequest) -> ChatRequest {
        let mut request = ChatRequest::new(self.model.clone(), wire_messages(req))
            .with_tools(wire_tools(&req.tools));

        if let Some(temperature) = self.temperature {
            request = request.with_options(ollama_api::payload::ChatOptions {
                temperature: Some(temperature),
                num_ctx: None,
            });
        }

        request
    }

    #[cfg(test)]
    fn with_stream_client_for_tests(model: String, stream_client: Arc<dyn StreamClient>) -> Self {
        Self {
            model: sanitize_model_id(model),
            temperature: None,
            enabled: true,
            stream_client,
        }
    }
}

impl ModelGateway for OllamaGateway {
    fn profile(&self) -> GatewayProfile {
        GatewayProfile {
            gateway_id: OLLAMA_GATEWAY_ID.to_string(),
            model_id: self.model.clone(),
        }
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn run_turn(
        &self,
        req: TurnRequest,
        cancel: CancelSignal,
        emit: &mut dyn FnMut(TurnEvent),
    ) -> Result<(), String> {
        let turn_id = req.turn_id;

        emit(TurnEvent::Started { turn_id });

        if cancel.load(Ordering::Acquire) {
            emit(TurnEvent::Cancelled { turn_id });
            return Ok(());
        }

        let request = self.chat_request(&req);
        let mut buffer = ReplyBuffer::default();
        let mut issued_calls = 0usize;

        let outcome = {
            let mut on_event = |event: ChatStreamEvent| match event {
                ChatStreamEvent::ContentDelta { delta } => {
                    if let Some(text) = buffer.push(&delta) {
                        emit(TurnEvent::Fragment { turn_id, text });
                    }
                }
                ChatStreamEvent::ToolCallRequested {
                    tool_name,
                    arguments,
                } => {
                    // Malformed native calls are preserved so the caller's
                    // unknown-tool containment reports them explicitly.
                    let request = ToolCallRequest {
                        call_id: format!("call_{issued_calls}"),
                        tool_name: tool_name.unwrap_or_default(),
                        arguments: arguments.unwrap_or_else(|| json!({})),
                    };
                    issued_calls += 1;
                    emit(TurnEvent::ToolCallRequested { turn_id, request });
                }
                ChatStreamEvent::Done { .. } | ChatStreamEvent::Error { .. } => {}
            };

            self.stream_client
                .stream_with(&request, &cancel, &mut on_event)
        };

        match outcome {
            Ok(done) => {
                let tail = buffer.finish();
                if !tail.is_empty() {
                    let parsed = parse_model_reply(&tail);
                    if !parsed.text.is_empty() {
                        emit(TurnEvent::Fragment {
                            turn_id,
                            text: parsed.text,
                        });
                    }
                    for mut request in parsed.requests {
                        request.call_id = format!("call_{issued_calls}");
                        issued_calls += 1;
                        emit(TurnEvent::ToolCallRequested { turn_id, request });
                    }
                }

                if done.is_some() {
                    emit(TurnEvent::Finished { turn_id });
                } else {
                    emit(TurnEvent::Failed {
                        turn_id,
                        error: "Ollama chat stream ended without done marker".to_string(),
                    });
                }
            }
            Err(OllamaApiError::Cancelled) => emit(TurnEvent::Cancelled { turn_id }),
            Err(error) => emit(TurnEvent::Failed {
                turn_id,
                error: format!("Ollama chat request failed: {error}"),
            }),
        }

        Ok(())
    }
}

/// Accumulates streamed reply text, forwarding what is safely prose and
/// withholding from the first position that may begin an inline tool call.
#[derive(Debug, Default)]
struct ReplyBuffer {
    full: String,
    emitted: usize,
}

impl ReplyBuffer {
    fn push(&mut self, delta: &str) -> Option<String> {
        self.full.push_str(delta);
        let safe = streamable_prefix(&self.full);
        if safe > self.emitted {
            let text = self.full[self.emitted..safe].to_string();
            self.emitted = safe;
            Some(text)
        } else {
            None
        }
    }

    fn finish(&mut self) -> String {
        let tail = self.full[self.emitted..].to_string();
        self.emitted = self.full.len();
        tail
    }
}

fn streamable_prefix(full: &str) -> usize {
    if let Some(start) = find_inline_call_start(full) {
        return start;
    }

    // The trailing partial line is withheld while it could still grow into
    // a call marker; everything before it is safe to forward.
    let line_start = full.rfind('\n').map_or(0, |index| index + 1);
    let last_line = &full[line_start..];
    let trimmed = last_line.trim_start();
    let indent = last_line.len() - trimmed.len();

    if might_become_call_marker(trimmed) {
        line_start + indent
    } else {
        full.len()
    }
}

fn might_become_call_marker(tail: &str) -> bool {
    if tail.is_empty() {
        return false;
    }

    "```json".starts_with(tail) || tail.starts_with("```json") || tail.starts_with('{')
}

fn wire_messages(req: &TurnRequest) -> Value {
    let mut messages = vec![json!({
        "role": "system",
        "content": req.instructions,
    })];

    for message in &req.messages {
        messages.push(match message {
            ChatMessage::UserText { text } => json!({
                "role": "user",
                "content": text,
            }),
            ChatMessage::AssistantText { text } => json!({
                "role": "assistant",
                "content": text,
            }),
            ChatMessage::ToolResult {
                tool_name, content, ..
            } => json!({
                "role": "tool",
                "tool_name": tool_name,
                "content": content,
            }),
        });
    }

    Value::Array(messages)
}

fn wire_tools(tools: &[ToolDefinition]) -> Vec<Value> {
    tools
        .iter()
        .map(|tool| {
            json!({
                "type": "function",
                "function": {
                    "name": tool.name,
                    "description": tool.description.clone().unwrap_or_default(),
                    "parameters": tool.input_schema,
                },
            })
        })
        .collect()
}

fn sanitize_model_id(model: String) -> String {
    let trimmed = model.trim();
    if trimmed.is_empty() {
        DEFAULT_MODEL_ID.to_string()
    } else {
        trimmed.to_string()
    }
}

fn map_init_error(error: OllamaApiError) -> GatewayInitError {
    GatewayInitError::new(format!("Failed to initialize ollama gateway: {error}"))
}
