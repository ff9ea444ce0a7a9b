//! Minimal gateway-agnostic contract for executing a single inference turn.
//!
//! This crate intentionally defines only the shared turn lifecycle and the
//! tool-calling envelope types. It excludes transport details, wire payloads,
//! and multi-turn orchestration concerns, which live with the adapters and
//! the engine respectively.

use std::fmt;
use std::sync::{atomic::AtomicBool, Arc};

use serde_json::Value;

mod reply;

pub use reply::{find_inline_call_start, parse_model_reply, ParsedReply};

/// Identifier for one inference turn within an exchange.
pub type TurnId = u64;

/// Shared cancellation flag for a turn.
pub type CancelSignal = Arc<AtomicBool>;

/// Error returned while constructing/configuring a gateway before any turn runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayInitError {
    message: String,
}

impl GatewayInitError {
    /// Creates a new gateway initialization error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Returns the underlying error message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for GatewayInitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for GatewayInitError {}

impl From<String> for GatewayInitError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for GatewayInitError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// Gateway-neutral model-facing message history item.
///
/// System instructions are not a variant: they travel on
/// [`TurnRequest::instructions`] so adapters cannot reorder or duplicate the
/// leading system block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatMessage {
    UserText {
        text: String,
    },
    AssistantText {
        text: String,
    },
    ToolResult {
        call_id: String,
        tool_name: String,
        content: String,
        is_error: bool,
    },
}

/// Input required to run one inference turn.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnRequest {
    pub turn_id: TurnId,
    pub messages: Vec<ChatMessage>,
    pub instructions: String,
    pub tools: Vec<ToolDefinition>,
}

/// Generic tool definition advertised to the model for one turn.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDefinition {
    pub name: String,
    pub description: Option<String>,
    pub input_schema: Value,
}

/// Request envelope for one tool call elected by the model.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallRequest {
    pub call_id: String,
    pub tool_name: String,
    pub arguments: Value,
}

/// Result returned to the model for one tool call.
///
/// Every request receives exactly one result; failures (timeout, unknown
/// tool, tool error) are carried in `is_error`/`output`, never raised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCallResult {
    pub call_id: String,
    pub tool_name: String,
    pub output: String,
    pub is_error: bool,
}

impl ToolCallResult {
    /// Constructs a successful tool result.
    #[must_use]
    pub fn success(
        call_id: impl Into<String>,
        tool_name: impl Into<String>,
        output: impl Into<String>,
    ) -> Self {
        Self {
            call_id: call_id.into(),
            tool_name: tool_name.into(),
            output: output.into(),
            is_error: false,
        }
    }

    /// Constructs a tool error result.
    #[must_use]
    pub fn error(
        call_id: impl Into<String>,
        tool_name: impl Into<String>,
        output: impl Into<String>,
    ) -> Self {
        Self {
            call_id: call_id.into(),
            tool_name: tool_name.into(),
            output: output.into(),
            is_error: true,
        }
    }
}

/// Gateway-emitted lifecycle event for a turn.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnEvent {
    Started {
        turn_id: TurnId,
    },
    Fragment {
        turn_id: TurnId,
        text: String,
    },
    ToolCallRequested {
        turn_id: TurnId,
        request: ToolCallRequest,
    },
    Finished {
        turn_id: TurnId,
    },
    Failed {
        turn_id: TurnId,
        error: String,
    },
    Cancelled {
        turn_id: TurnId,
    },
}

impl TurnEvent {
    /// Returns the turn identifier associated with this event.
    #[must_use]
    pub fn turn_id(&self) -> TurnId {
        match self {
            Self::Started { turn_id }
            | Self::Fragment { turn_id, .. }
            | Self::ToolCallRequested { turn_id, .. }
            | Self::Finished { turn_id }
            | Self::Failed { turn_id, .. }
            | Self::Cancelled { turn_id } => *turn_id,
        }
    }

    /// Returns true when this event terminates the turn lifecycle.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Finished { .. } | Self::Failed { .. } | Self::Cancelled { .. }
        )
    }
}

/// Immutable metadata describing a gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayProfile {
    pub gateway_id: String,
    pub model_id: String,
}

/// Gateway interface for executing one inference turn.
pub trait ModelGateway: Send + Sync + 'static {
    /// Returns gateway/model identity metadata.
    fn profile(&self) -> GatewayProfile;

    /// Reports whether the gateway is configured to serve turns.
    ///
    /// Callers check this before starting an exchange; a disabled gateway is
    /// an explicit configuration state, not an error path inside the turn.
    fn is_enabled(&self) -> bool {
        true
    }

    /// Executes one turn and emits lifecycle events in generation order.
    ///
    /// Fragments are emitted as soon as the model produces them. Tool-call
    /// requests may arrive interleaved with fragments; the caller collects
    /// them and decides whether the turn loops. Implementations report
    /// transport-level failure either through the returned `Err` or a
    /// `Failed` event; the caller treats both as terminal for the exchange.
    fn run_turn(
        &self,
        req: TurnRequest,
        cancel: CancelSignal,
        emit: &mut dyn FnMut(TurnEvent),
    ) -> Result<(), String>;
}
