//! One-shot code completion on top of the gateway.
//!
//! Completion is a single no-tools inference turn with its own prompt shape:
//! bounded context windows around a cursor marker, and cleanup of the
//! markdown artifacts chat-tuned models produce. Unlike exchanges, a failed
//! or disabled completion degrades to an empty suggestion; ghost text is not
//! worth surfacing errors for.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use model_gateway::{CancelSignal, ChatMessage, TurnEvent, TurnRequest};
use tracing::warn;

use crate::error::EngineError;
use crate::exchange::Engine;

/// Characters of context kept before the cursor.
pub const BEFORE_WINDOW_CHARS: usize = 1000;
/// Characters of context kept after the cursor.
pub const AFTER_WINDOW_CHARS: usize = 500;

/// One inline completion request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRequest {
    pub before: String,
    pub after: String,
    pub language: String,
}

impl CompletionRequest {
    #[must_use]
    pub fn new(before: impl Into<String>, after: impl Into<String>) -> Self {
        Self {
            before: before.into(),
            after: after.into(),
            language: "plain".to_string(),
        }
    }

    #[must_use]
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }
}

/// Builds the cursor-marker prompt with bounded context windows.
#[must_use]
pub fn build_completion_prompt(before: &str, after: &str, language: &str) -> String {
    let safe_before = tail_chars(before, BEFORE_WINDOW_CHARS);
    let safe_after = head_chars(after, AFTER_WINDOW_CHARS);

    format!(
        "### Context ({language}):\n{safe_before}<CURSOR>{safe_after}\n\n\
         ### Instruction:\nFill in the code at <CURSOR>. Provide only the missing code block."
    )
}

/// Removes markdown code fences chat models wrap completions in.
#[must_use]
pub fn strip_code_fences(content: &str, language: &str) -> String {
    content
        .replace(&format!("```{language}"), "")
        .replace("```", "")
        .trim()
        .to_string()
}

fn completion_instructions(language: &str) -> String {
    format!("You are a fast {language} code completion engine. Output ONLY code. No markdown.")
}

fn tail_chars(text: &str, limit: usize) -> &str {
    let count = text.chars().count();
    if count <= limit {
        return text;
    }

    match text.char_indices().nth(count - limit) {
        Some((index, _)) => &text[index..],
        None => text,
    }
}

fn head_chars(text: &str, limit: usize) -> &str {
    match text.char_indices().nth(limit) {
        Some((index, _)) => &text[..index],
        None => text,
    }
}

impl Engine {
    /// Runs one completion turn and returns the cleaned suggestion.
    ///
    /// A disabled gateway or a failed turn yields an empty suggestion;
    /// storage is never involved.
    pub fn run_completion(&self, req: CompletionRequest) -> Result<String, EngineError> {
        if !self.gateway().is_enabled() {
            return Ok(String::new());
        }

        let prompt = build_completion_prompt(&req.before, &req.after, &req.language);
        let request = TurnRequest {
            turn_id: 0,
            messages: vec![ChatMessage::UserText { text: prompt }],
            instructions: completion_instructions(&req.language),
            tools: Vec::new(),
        };

        let cancel: CancelSignal = Arc::new(AtomicBool::new(false));
        let mut reply = String::new();
        let mut failed = false;

        let run_result = self.gateway().run_turn(request, cancel, &mut |event| {
            match event {
                TurnEvent::Fragment { text, .. } => reply.push_str(&text),
                TurnEvent::Failed { error, .. } => {
                    warn!(%error, "completion turn failed");
                    failed = true;
                }
                _ => {}
            }
        });

        if failed || run_result.is_err() {
            return Ok(String::new());
        }

        Ok(strip_code_fences(&reply, &req.language))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use model_gateway_mock::{MockGateway, ScriptedTurn};
    use tempfile::TempDir;

    use super::*;
    use crate::exchange::EngineConfig;
    use crate::registry::ToolRegistry;
    use session_store::SessionStore;

    fn engine(gateway: MockGateway, dir: &TempDir) -> Engine {
        let store =
            Arc::new(SessionStore::open(dir.path().join("sessions")).expect("store should open"));
        Engine::new(
            Arc::new(gateway),
            Arc::new(ToolRegistry::builder().build()),
            store,
            EngineConfig::default(),
        )
    }

    #[test]
    fn prompt_carries_cursor_marker_between_context_windows() {
        let prompt = build_completion_prompt("let x = ", "; x + 1", "rust");

        assert!(prompt.contains("### Context (rust):"));
        assert!(prompt.contains("let x = <CURSOR>; x + 1"));
        assert!(prompt.contains("Provide only the missing code block."));
    }

    #[test]
    fn context_windows_are_bounded() {
        let before = "a".repeat(5000);
        let after = "b".repeat(5000);

        let prompt = build_completion_prompt(&before, &after, "plain");
        let before_context = prompt
            .split("<CURSOR>")
            .next()
            .expect("prompt should contain marker");
        let after_context = prompt
            .split("<CURSOR>")
            .nth(1)
            .expect("prompt should contain marker")
            .split("\n\n### Instruction")
            .next()
            .expect("prompt should contain instruction section");

        assert_eq!(before_context.matches('a').count(), BEFORE_WINDOW_CHARS);
        assert_eq!(after_context.matches('b').count(), AFTER_WINDOW_CHARS);
    }

    #[test]
    fn fences_are_stripped_from_model_replies() {
        assert_eq!(
            strip_code_fences("```python\nreturn x + 1\n```", "python"),
            "return x + 1"
        );
        assert_eq!(strip_code_fences("plain code", "python"), "plain code");
    }

    #[test]
    fn completion_accumulates_fragments_and_cleans_them() {
        let dir = TempDir::new().expect("tempdir");
        let gateway = MockGateway::scripted(vec![ScriptedTurn::text(vec![
            "```rust\n".to_string(),
            "x + 1\n".to_string(),
            "```".to_string(),
        ])]);

        let suggestion = engine(gateway, &dir)
            .run_completion(CompletionRequest::new("let y = ", ";").with_language("rust"))
            .expect("completion should run");

        assert_eq!(suggestion, "x + 1");
    }

    #[test]
    fn failed_completion_turns_yield_empty_suggestions() {
        let dir = TempDir::new().expect("tempdir");
        let gateway = MockGateway::failing("backend unreachable");

        let suggestion = engine(gateway, &dir)
            .run_completion(CompletionRequest::new("let y = ", ";"))
            .expect("failure should degrade, not error");

        assert!(suggestion.is_empty());
    }

    #[test]
    fn disabled_gateway_yields_empty_suggestion_without_error() {
        let dir = TempDir::new().expect("tempdir");
        let gateway = MockGateway::default().disabled();

        let suggestion = engine(gateway, &dir)
            .run_completion(CompletionRequest::new("a", "b"))
            .expect("disabled completion degrades");

        assert!(suggestion.is_empty());
    }
}
