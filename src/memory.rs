//! Prompt assembly from stored conversation memory and the incoming task.
//!
//! The sequence fed to every inference call is: the system instruction block
//! (carried separately on the turn request), the session's prior messages in
//! original order, the current task as one user message, then any tool
//! results generated so far in the exchange. Absent memory is an empty
//! sequence, never an error.

use model_gateway::ChatMessage;
use session_store::{MessageEntry, MessageRole};

/// How many stored messages are replayed into a prompt by default.
pub const DEFAULT_MEMORY_LIMIT: usize = 50;

/// Env override for the base system instruction block.
pub const SYSTEM_INSTRUCTIONS_ENV_VAR: &str = "CODELOOM_SYSTEM_INSTRUCTIONS";

const DEFAULT_SYSTEM_INSTRUCTIONS: &str = "You are a helpful AI coding assistant.\n\
Be concise (don't show detail unless asked) and use Markdown for code.\n\
If you want to perform a tool action, you may call the available tools.";

/// One client-submitted coding task.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TaskInput {
    pub instruction: String,
    pub code: String,
}

impl TaskInput {
    #[must_use]
    pub fn new(instruction: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            instruction: instruction.into(),
            code: code.into(),
        }
    }
}

/// Returns the default system instructions, honoring the env override.
#[must_use]
pub fn system_instructions_from_env() -> String {
    std::env::var(SYSTEM_INSTRUCTIONS_ENV_VAR)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(default_system_instructions)
}

#[must_use]
pub fn default_system_instructions() -> String {
    DEFAULT_SYSTEM_INSTRUCTIONS.to_string()
}

/// Formats a task as the single user message sent to the model.
///
/// Code context is carried verbatim in a labeled block; a task without code
/// is the instruction alone.
#[must_use]
pub fn build_task_message(task: &TaskInput) -> String {
    if task.code.is_empty() {
        task.instruction.clone()
    } else {
        format!(
            "Task: {}\n\nCode:\n```text\n{}\n```",
            task.instruction, task.code
        )
    }
}

/// Maps stored messages into the gateway's chat history shape, preserving
/// order.
///
/// Stored tool entries replay as tool-result messages; their call ids are
/// not persisted, so replays carry the output text alone. System entries are
/// never stored, but any encountered are skipped since instructions travel
/// separately.
#[must_use]
pub fn prompt_from_history(history: &[MessageEntry]) -> Vec<ChatMessage> {
    history
        .iter()
        .filter_map(|entry| match entry.role {
            MessageRole::User => Some(ChatMessage::UserText {
                text: entry.content.clone(),
            }),
            MessageRole::Assistant => Some(ChatMessage::AssistantText {
                text: entry.content.clone(),
            }),
            MessageRole::Tool => Some(ChatMessage::ToolResult {
                call_id: String::new(),
                tool_name: String::new(),
                content: entry.content.clone(),
                is_error: false,
            }),
            MessageRole::System => None,
        })
        .collect()
}
