//! Orchestration of one client exchange.
//!
//! An exchange alternates inference turns and tool execution until the model
//! stops requesting tools, a terminal failure occurs, or the turn guard
//! trips. Each exchange runs on its own worker thread and feeds one tagged
//! chunk stream; multiple exchanges may run concurrently, serialized only by
//! the store's per-append atomicity.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use model_gateway::{
    CancelSignal, ChatMessage, ModelGateway, ToolCallRequest, ToolCallResult, TurnEvent,
    TurnRequest,
};
use session_store::{MessageRole, SessionStore};
use tracing::{debug, warn};

use crate::error::EngineError;
use crate::invoker::{ToolInvoker, DEFAULT_TOOL_TIMEOUT};
use crate::memory::{
    build_task_message, default_system_instructions, prompt_from_history, TaskInput,
    DEFAULT_MEMORY_LIMIT,
};
use crate::registry::ToolRegistry;
use crate::stream::{StreamMux, TaggedChunk};

/// Upper bound on inference turns per exchange. Keeps a model that never
/// stops requesting tools from looping forever.
pub const DEFAULT_MAX_TURNS: u32 = 8;

/// Tunable engine policy, explicit at construction.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Stored messages replayed into each prompt.
    pub memory_limit: usize,
    /// Inference turns allowed before the guard synthesizes a terminal
    /// notice.
    pub max_turns: u32,
    /// Per-tool-call execution budget.
    pub tool_timeout: Duration,
    /// System instruction block leading every prompt.
    pub system_instructions: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            memory_limit: DEFAULT_MEMORY_LIMIT,
            max_turns: DEFAULT_MAX_TURNS,
            tool_timeout: DEFAULT_TOOL_TIMEOUT,
            system_instructions: default_system_instructions(),
        }
    }
}

/// Final accounting for one completed exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeOutcome {
    /// Concatenation of every assistant fragment surfaced, in emission
    /// order, including any synthesized terminal notice. This is exactly
    /// what gets persisted as the assistant's reply.
    pub assistant_text: String,
    /// Inference turns that ran.
    pub turns: u32,
    /// Tool results produced, in request order across turns.
    pub tool_results: Vec<ToolCallResult>,
}

/// Handle on one in-flight exchange.
pub struct ExchangeHandle {
    chunks: Option<Receiver<TaggedChunk>>,
    cancel: CancelSignal,
    join_handle: JoinHandle<Result<ExchangeOutcome, EngineError>>,
}

impl ExchangeHandle {
    /// Takes the receiving end of the chunk stream. Yields `None` after the
    /// first call; dropping the receiver disconnects the stream without
    /// abandoning an in-flight tool step.
    pub fn take_chunks(&mut self) -> Option<Receiver<TaggedChunk>> {
        self.chunks.take()
    }

    /// Requests cooperative cancellation of the in-flight turn.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    /// Waits for the worker and returns its outcome. Storage failures
    /// propagate here rather than being swallowed into the stream.
    pub fn wait(self) -> Result<ExchangeOutcome, EngineError> {
        match self.join_handle.join() {
            Ok(result) => result,
            Err(_) => Err(EngineError::WorkerPanicked),
        }
    }
}

/// The agent execution engine: one instance serves many exchanges.
pub struct Engine {
    gateway: Arc<dyn ModelGateway>,
    registry: Arc<ToolRegistry>,
    store: Arc<SessionStore>,
    config: EngineConfig,
    next_exchange_id: AtomicU64,
}

impl Engine {
    pub fn new(
        gateway: Arc<dyn ModelGateway>,
        registry: Arc<ToolRegistry>,
        store: Arc<SessionStore>,
        config: EngineConfig,
    ) -> Self {
        Self {
            gateway,
            registry,
            store,
            config,
            next_exchange_id: AtomicU64::new(1),
        }
    }

    pub(crate) fn gateway(&self) -> &Arc<dyn ModelGateway> {
        &self.gateway
    }

    /// Starts one exchange against a session and returns its stream handle.
    ///
    /// The task's user message is appended before the first inference call,
    /// so an aborted stream still leaves the request recorded. A disabled
    /// gateway refuses the exchange up front.
    pub fn run_exchange(
        &self,
        session_id: &str,
        task: TaskInput,
    ) -> Result<ExchangeHandle, EngineError> {
        if !self.gateway.is_enabled() {
            return Err(EngineError::GatewayDisabled);
        }

        let exchange_id = self.next_exchange_id.fetch_add(1, Ordering::SeqCst);
        let task_message = build_task_message(&task);

        // Prior history is captured before the task lands so the prompt
        // carries the task exactly once.
        let history = self
            .store
            .fetch(session_id, Some(self.config.memory_limit))?;
        self.store
            .append(session_id, MessageRole::User, &task_message)?;

        let mut messages = prompt_from_history(&history);
        messages.push(ChatMessage::UserText {
            text: task_message,
        });

        let (mux, receiver) = StreamMux::channel();
        let cancel: CancelSignal = Arc::new(AtomicBool::new(false));

        let worker = ExchangeWorker {
            gateway: Arc::clone(&self.gateway),
            invoker: ToolInvoker::new(Arc::clone(&self.registry))
                .with_timeout(self.config.tool_timeout),
            store: Arc::clone(&self.store),
            config: self.config.clone(),
            tools: self.registry.definitions(),
            session_id: session_id.to_string(),
            messages,
            mux,
            cancel: Arc::clone(&cancel),
            exchange_id,
        };

        let join_handle = thread::Builder::new()
            .name(format!("exchange-{exchange_id}"))
            .spawn(move || worker.run())
            .map_err(EngineError::Spawn)?;

        Ok(ExchangeHandle {
            chunks: Some(receiver),
            cancel,
            join_handle,
        })
    }
}

struct ExchangeWorker {
    gateway: Arc<dyn ModelGateway>,
    invoker: ToolInvoker,
    store: Arc<SessionStore>,
    config: EngineConfig,
    tools: Vec<model_gateway::ToolDefinition>,
    session_id: String,
    messages: Vec<ChatMessage>,
    mux: StreamMux,
    cancel: CancelSignal,
    exchange_id: u64,
}

impl ExchangeWorker {
    fn run(mut self) -> Result<ExchangeOutcome, EngineError> {
        let mut assistant_text = String::new();
        let mut tool_results: Vec<ToolCallResult> = Vec::new();
        let mut turns: u32 = 0;

        loop {
            turns += 1;
            debug!(exchange = self.exchange_id, turn = turns, "starting inference turn");

            let (turn_text, requests, turn_error, cancelled) =
                self.run_gateway_turn(turns, &mut assistant_text);

            if let Some(error) = turn_error {
                // Terminal by design: a flaky backend fails fast and
                // visibly instead of retrying into a loop.
                warn!(exchange = self.exchange_id, %error, "gateway turn failed");
                self.surface_notice(&mut assistant_text, &format!("[agent error] {error}"));
                break;
            }

            if cancelled {
                debug!(exchange = self.exchange_id, "turn cancelled mid-stream");
                break;
            }

            if requests.is_empty() {
                break;
            }

            if turns >= self.config.max_turns {
                warn!(exchange = self.exchange_id, turns, "turn limit exceeded");
                self.surface_notice(
                    &mut assistant_text,
                    &format!(
                        "[turn limit exceeded] stopping after {} tool-calling turns",
                        self.config.max_turns
                    ),
                );
                break;
            }

            // A started tool step runs to completion even if the client has
            // disconnected; side effects are not abandoned half-done.
            let results = self.invoker.invoke_batch(&requests);

            if !turn_text.is_empty() {
                self.messages.push(ChatMessage::AssistantText {
                    text: turn_text,
                });
            }

            for result in &results {
                self.mux.send_tool(&result.output);
                self.store
                    .append(&self.session_id, MessageRole::Tool, &result.output)?;
                self.messages.push(ChatMessage::ToolResult {
                    call_id: result.call_id.clone(),
                    tool_name: result.tool_name.clone(),
                    content: result.output.clone(),
                    is_error: result.is_error,
                });
            }
            tool_results.extend(results);

            if !self.mux.is_connected() {
                debug!(exchange = self.exchange_id, "client disconnected, winding down");
                break;
            }
        }

        // Whatever accumulated is the assistant's reply, partial or not;
        // the log must agree with what the client saw.
        if !assistant_text.trim().is_empty() {
            self.store
                .append(&self.session_id, MessageRole::Assistant, &assistant_text)?;
        }

        Ok(ExchangeOutcome {
            assistant_text,
            turns,
            tool_results,
        })
    }

    fn run_gateway_turn(
        &mut self,
        turn: u32,
        assistant_text: &mut String,
    ) -> (String, Vec<ToolCallRequest>, Option<String>, bool) {
        let request = TurnRequest {
            turn_id: u64::from(turn),
            messages: self.messages.clone(),
            instructions: self.config.system_instructions.clone(),
            tools: self.tools.clone(),
        };

        let mut turn_text = String::new();
        let mut requests = Vec::new();
        let mut turn_error: Option<String> = None;
        let mut cancelled = false;

        let gateway = Arc::clone(&self.gateway);
        let cancel = Arc::clone(&self.cancel);
        let mux = &mut self.mux;

        let run_result = catch_unwind(AssertUnwindSafe(|| {
            gateway.run_turn(request, Arc::clone(&cancel), &mut |event| match event {
                TurnEvent::Started { .. } => {}
                TurnEvent::Fragment { text, .. } => {
                    turn_text.push_str(&text);
                    assistant_text.push_str(&text);
                    if !mux.send_assistant(&text) {
                        // Client gone: stop the model, keep accumulating for
                        // the persistence flush.
                        cancel.store(true, Ordering::SeqCst);
                    }
                }
                TurnEvent::ToolCallRequested { request, .. } => {
                    requests.push(request);
                }
                TurnEvent::Finished { .. } => {}
                TurnEvent::Failed { error, .. } => {
                    turn_error = Some(error);
                }
                TurnEvent::Cancelled { .. } => {
                    cancelled = true;
                }
            })
        }));

        match run_result {
            Ok(Ok(())) => {}
            Ok(Err(error)) => turn_error = Some(error),
            Err(_) => turn_error = Some("model gateway panicked".to_string()),
        }

        (turn_text, requests, turn_error, cancelled)
    }

    fn surface_notice(&mut self, assistant_text: &mut String, notice: &str) {
        assistant_text.push_str(notice);
        self.mux.send_assistant(notice);
    }
}
