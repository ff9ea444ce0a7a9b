//! Deterministic mock implementation of the shared `model_gateway` contract.
//!
//! This crate contains no transport/protocol logic and is intended for local
//! development and contract-level integration testing. Turns are scripted:
//! each `run_turn` call plays the next scripted turn, so an orchestrator's
//! infer/invoke loop can be driven without a model server.

use std::collections::VecDeque;
use std::sync::atomic::Ordering;
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use model_gateway::{
    CancelSignal, GatewayProfile, ModelGateway, ToolCallRequest, TurnEvent, TurnRequest,
};

/// Stable gateway identifier used for explicit startup selection.
pub const MOCK_GATEWAY_ID: &str = "mock";

/// One scripted inference turn: streamed chunks plus any tool-call requests
/// the fake model elects at the end of the turn.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptedTurn {
    pub chunks: Vec<String>,
    pub requests: Vec<ToolCallRequest>,
}

impl ScriptedTurn {
    /// A turn that streams text and requests nothing.
    #[must_use]
    pub fn text(chunks: Vec<String>) -> Self {
        Self {
            chunks,
            requests: Vec::new(),
        }
    }

    /// A turn that streams text and then requests the given tool calls.
    #[must_use]
    pub fn with_requests(chunks: Vec<String>, requests: Vec<ToolCallRequest>) -> Self {
        Self { chunks, requests }
    }
}

#[derive(Debug)]
enum Script {
    /// Plays turns front-to-back; an exhausted script finishes with no output.
    Sequence(Mutex<VecDeque<ScriptedTurn>>),
    /// Plays the same turn forever. Used to exercise turn-limit guards.
    Repeat(ScriptedTurn),
    /// Fails every turn with the given transport-style error.
    Fail(String),
}

/// Deterministic mock gateway used by engine tests and local runs.
#[derive(Debug)]
pub struct MockGateway {
    script: Script,
    model_id: String,
    enabled: bool,
    token_delay: Duration,
}

impl MockGateway {
    /// Creates a mock gateway that plays `turns` in order.
    #[must_use]
    pub fn scripted(turns: Vec<ScriptedTurn>) -> Self {
        Self {
            script: Script::Sequence(Mutex::new(turns.into())),
            model_id: "mock".to_string(),
            enabled: true,
            token_delay: Duration::ZERO,
        }
    }

    /// Creates a mock gateway that plays the same turn on every call.
    #[must_use]
    pub fn repeating(turn: ScriptedTurn) -> Self {
        Self {
            script: Script::Repeat(turn),
            model_id: "mock".to_string(),
            enabled: true,
            token_delay: Duration::ZERO,
        }
    }

    /// Creates a mock gateway whose every turn fails with `error`.
    #[must_use]
    pub fn failing(error: impl Into<String>) -> Self {
        Self {
            script: Script::Fail(error.into()),
            model_id: "mock".to_string(),
            enabled: true,
            token_delay: Duration::ZERO,
        }
    }

    /// Overrides the reported model id.
    #[must_use]
    pub fn with_model_id(mut self, model_id: impl Into<String>) -> Self {
        let model_id = model_id.into();
        if !model_id.trim().is_empty() {
            self.model_id = model_id.trim().to_string();
        }
        self
    }

    /// Marks the gateway disabled; callers should refuse to start exchanges.
    #[must_use]
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Adds a per-token delay so local runs stream visibly.
    #[must_use]
    pub fn with_token_delay(mut self, delay: Duration) -> Self {
        self.token_delay = delay;
        self
    }

    fn next_turn(&self) -> Result<ScriptedTurn, String> {
        match &self.script {
            Script::Sequence(turns) => Ok(lock_unpoisoned(turns)
                .pop_front()
                .unwrap_or_else(|| ScriptedTurn::text(Vec::new()))),
            Script::Repeat(turn) => Ok(turn.clone()),
            Script::Fail(error) => Err(error.clone()),
        }
    }

    fn pause(&self) {
        if !self.token_delay.is_zero() {
            thread::sleep(self.token_delay);
        }
    }
}

impl Default for MockGateway {
    fn default() -> Self {
        Self::scripted(vec![ScriptedTurn::text(vec![
            "## Mocked assistant run\n".to_string(),
            "- Reading the task and code context.\n".to_string(),
            "- No tool calls are needed for this reply.\n".to_string(),
            "Completed.\n".to_string(),
        ])])
        .with_token_delay(Duration::from_millis(50))
    }
}

impl ModelGateway for MockGateway {
    fn profile(&self) -> GatewayProfile {
        GatewayProfile {
            gateway_id: MOCK_GATEWAY_ID.to_string(),
            model_id: self.model_id.clone(),
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
        let _ = req.messages;
        let _ = req.instructions;

        emit(TurnEvent::Started { turn_id });

        if cancel.load(Ordering::SeqCst) {
            emit(TurnEvent::Cancelled { turn_id });
            return Ok(());
        }

        let turn = match self.next_turn() {
            Ok(turn) => turn,
            Err(error) => {
                emit(TurnEvent::Failed { turn_id, error });
                return Ok(());
            }
        };

        for chunk in &turn.chunks {
            let mut pending_token = String::new();
            for ch in chunk.chars() {
                pending_token.push(ch);

                if matches!(ch, ' ' | '\n') {
                    if cancel.load(Ordering::SeqCst) {
                        emit(TurnEvent::Cancelled { turn_id });
                        return Ok(());
                    }

                    emit(TurnEvent::Fragment {
                        turn_id,
                        text: std::mem::take(&mut pending_token),
                    });
                    self.pause();
                }
            }

            if !pending_token.is_empty() {
                if cancel.load(Ordering::SeqCst) {
                    emit(TurnEvent::Cancelled { turn_id });
                    return Ok(());
                }

                emit(TurnEvent::Fragment {
                    turn_id,
                    text: pending_token,
                });
                self.pause();
            }
        }

        for request in turn.requests {
            emit(TurnEvent::ToolCallRequested { turn_id, request });
        }

        if cancel.load(Ordering::SeqCst) {
            emit(TurnEvent::Cancelled { turn_id });
        } else {
            emit(TurnEvent::Finished { turn_id });
        }

        Ok(())
    }
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    use model_gateway::ChatMessage;
    use serde_json::json;

    use super::*;

    fn collect_events(gateway: &MockGateway, cancel: CancelSignal) -> Vec<TurnEvent> {
        let mut events = Vec::new();
        gateway
            .run_turn(
                TurnRequest {
                    turn_id: 7,
                    messages: vec![ChatMessage::UserText {
                        text: "test".to_string(),
                    }],
                    instructions: "system instructions".to_string(),
                    tools: Vec::new(),
                },
                cancel,
                &mut |event| events.push(event),
            )
            .expect("mock turn should succeed");
        events
    }

    #[test]
    fn profile_exposes_explicit_mock_gateway_identity() {
        let profile = MockGateway::scripted(Vec::new()).profile();

        assert_eq!(profile.gateway_id, MOCK_GATEWAY_ID);
        assert_eq!(profile.model_id, "mock");
    }

    #[test]
    fn run_turn_emits_started_fragments_and_finished() {
        let gateway = MockGateway::scripted(vec![ScriptedTurn::text(vec!["one two".to_string()])]);
        let cancel = Arc::new(AtomicBool::new(false));

        let events = collect_events(&gateway, cancel);

        assert!(matches!(
            events.first(),
            Some(TurnEvent::Started { turn_id: 7 })
        ));
        assert!(matches!(
            events.last(),
            Some(TurnEvent::Finished { turn_id: 7 })
        ));
        assert!(events
            .iter()
            .any(|event| matches!(event, TurnEvent::Fragment { text, .. } if !text.is_empty())));
    }

    #[test]
    fn scripted_requests_are_emitted_after_fragments_in_order() {
        let requests = vec![
            ToolCallRequest {
                call_id: "call_0".to_string(),
                tool_name: "list_files".to_string(),
                arguments: json!({ "path": "." }),
            },
            ToolCallRequest {
                call_id: "call_1".to_string(),
                tool_name: "read_file".to_string(),
                arguments: json!({ "path": "a.py" }),
            },
        ];
        let gateway = MockGateway::scripted(vec![ScriptedTurn::with_requests(
            vec!["checking ".to_string()],
            requests.clone(),
        )]);
        let cancel = Arc::new(AtomicBool::new(false));

        let events = collect_events(&gateway, cancel);

        let observed: Vec<_> = events
            .iter()
            .filter_map(|event| match event {
                TurnEvent::ToolCallRequested { request, .. } => Some(request.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(observed, requests);

        let first_request = events
            .iter()
            .position(|event| matches!(event, TurnEvent::ToolCallRequested { .. }))
            .expect("requests should be emitted");
        let last_fragment = events
            .iter()
            .rposition(|event| matches!(event, TurnEvent::Fragment { .. }))
            .expect("fragments should be emitted");
        assert!(last_fragment < first_request);
    }

    #[test]
    fn sequence_plays_turns_in_order_then_goes_silent() {
        let gateway = MockGateway::scripted(vec![
            ScriptedTurn::text(vec!["first".to_string()]),
            ScriptedTurn::text(vec!["second".to_string()]),
        ]);
        let cancel = Arc::new(AtomicBool::new(false));

        let first = collect_events(&gateway, Arc::clone(&cancel));
        let second = collect_events(&gateway, Arc::clone(&cancel));
        let exhausted = collect_events(&gateway, cancel);

        assert!(first
            .iter()
            .any(|event| matches!(event, TurnEvent::Fragment { text, .. } if text == "first")));
        assert!(second
            .iter()
            .any(|event| matches!(event, TurnEvent::Fragment { text, .. } if text == "second")));
        assert!(!exhausted
            .iter()
            .any(|event| matches!(event, TurnEvent::Fragment { .. })));
        assert!(matches!(
            exhausted.last(),
            Some(TurnEvent::Finished { turn_id: 7 })
        ));
    }

    #[test]
    fn repeating_script_never_exhausts() {
        let turn = ScriptedTurn::with_requests(
            Vec::new(),
            vec![ToolCallRequest {
                call_id: "call_0".to_string(),
                tool_name: "list_files".to_string(),
                arguments: json!({}),
            }],
        );
        let gateway = MockGateway::repeating(turn);
        let cancel = Arc::new(AtomicBool::new(false));

        for _ in 0..3 {
            let events = collect_events(&gateway, Arc::clone(&cancel));
            assert!(events
                .iter()
                .any(|event| matches!(event, TurnEvent::ToolCallRequested { .. })));
        }
    }

    #[test]
    fn failing_script_emits_failed_terminal_event() {
        let gateway = MockGateway::failing("backend unreachable");
        let cancel = Arc::new(AtomicBool::new(false));

        let events = collect_events(&gateway, cancel);

        assert!(matches!(
            events.last(),
            Some(TurnEvent::Failed { turn_id: 7, error }) if error == "backend unreachable"
        ));
    }

    #[test]
    fn run_turn_emits_cancelled_when_cancel_is_set() {
        let gateway = MockGateway::scripted(vec![ScriptedTurn::text(vec!["ignored".to_string()])]);
        let cancel = Arc::new(AtomicBool::new(true));

        let events = collect_events(&gateway, cancel);

        assert!(matches!(
            events.first(),
            Some(TurnEvent::Started { turn_id: 7 })
        ));
        assert!(matches!(
            events.last(),
            Some(TurnEvent::Cancelled { turn_id: 7 })
        ));
    }

    #[test]
    fn disabled_gateway_reports_disabled_status() {
        let gateway = MockGateway::scripted(Vec::new()).disabled();
        assert!(!gateway.is_enabled());
    }
}
