//! End-to-end exchange flow over the public API: scripted gateway turns,
//! real builtin tools in a temporary workspace, and the session log on disk.

use std::fs;
use std::sync::Arc;

use codeloom::exchange::{Engine, EngineConfig};
use codeloom::memory::TaskInput;
use codeloom::stream::ChunkOrigin;
use codeloom::tools::builtin_registry;
use model_gateway::ToolCallRequest;
use model_gateway_mock::{MockGateway, ScriptedTurn};
use serde_json::json;
use session_store::{MessageRole, SessionStore};
use tempfile::TempDir;

fn seeded_workspace() -> TempDir {
    let dir = TempDir::new().expect("tempdir");
    fs::write(dir.path().join("a.py"), "print('a')").expect("seed a.py");
    fs::write(dir.path().join("b.py"), "print('b')").expect("seed b.py");
    dir
}

#[test]
fn tool_assisted_exchange_flows_from_request_to_persisted_log() {
    let workspace = seeded_workspace();
    let store_dir = TempDir::new().expect("tempdir");

    let gateway = Arc::new(MockGateway::scripted(vec![
        ScriptedTurn::with_requests(
            vec!["Listing the project first.\n".to_string()],
            vec![ToolCallRequest {
                call_id: "call_0".to_string(),
                tool_name: "list_files".to_string(),
                arguments: json!({ "path": "." }),
            }],
        ),
        ScriptedTurn::text(vec![
            "Two Python modules: ".to_string(),
            "a.py and b.py.\n".to_string(),
        ]),
    ]));
    let registry = Arc::new(builtin_registry(workspace.path()).expect("registry"));
    let store = Arc::new(
        SessionStore::open(store_dir.path().join("sessions")).expect("store should open"),
    );

    let engine = Engine::new(
        gateway,
        registry,
        Arc::clone(&store),
        EngineConfig::default(),
    );

    let mut handle = engine
        .run_exchange("demo", TaskInput::new("What files are here?", ""))
        .expect("exchange should start");
    let chunks: Vec<_> = handle
        .take_chunks()
        .expect("chunks should be available")
        .iter()
        .collect();
    let outcome = handle.wait().expect("exchange should complete");

    // The tool block is one atomic chunk carrying the real listing, placed
    // between turn-1 prose and turn-2 continuation.
    let tool_position = chunks
        .iter()
        .position(|chunk| chunk.origin == ChunkOrigin::Tool)
        .expect("tool chunk should be present");
    assert_eq!(chunks[tool_position].text, "[\"a.py\",\"b.py\"]");
    assert!(chunks[..tool_position]
        .iter()
        .any(|chunk| chunk.origin == ChunkOrigin::Assistant));
    assert!(chunks[tool_position + 1..]
        .iter()
        .any(|chunk| chunk.origin == ChunkOrigin::Assistant));

    // Assistant-tagged chunks concatenate to the persisted reply.
    let assistant_concat: String = chunks
        .iter()
        .filter(|chunk| chunk.origin == ChunkOrigin::Assistant)
        .map(|chunk| chunk.text.as_str())
        .collect();
    assert_eq!(assistant_concat, outcome.assistant_text);
    assert!(outcome.assistant_text.ends_with("a.py and b.py.\n"));

    let log = store.fetch("demo", Some(10)).expect("fetch");
    let roles: Vec<_> = log.iter().map(|entry| entry.role).collect();
    assert_eq!(
        roles,
        vec![MessageRole::User, MessageRole::Tool, MessageRole::Assistant]
    );
    assert_eq!(log[0].content, "What files are here?");
    assert_eq!(log[1].content, "[\"a.py\",\"b.py\"]");
    assert_eq!(log[2].content, outcome.assistant_text);

    // Fetch is idempotent without intervening appends.
    assert_eq!(log, store.fetch("demo", Some(10)).expect("second fetch"));
}

#[test]
fn consecutive_exchanges_share_the_session_history() {
    let workspace = seeded_workspace();
    let store_dir = TempDir::new().expect("tempdir");

    let gateway = Arc::new(MockGateway::scripted(vec![
        ScriptedTurn::text(vec!["First answer.\n".to_string()]),
        ScriptedTurn::text(vec!["Second answer.\n".to_string()]),
    ]));
    let registry = Arc::new(builtin_registry(workspace.path()).expect("registry"));
    let store = Arc::new(
        SessionStore::open(store_dir.path().join("sessions")).expect("store should open"),
    );

    let engine = Engine::new(
        gateway,
        registry,
        Arc::clone(&store),
        EngineConfig::default(),
    );

    for instruction in ["first question", "second question"] {
        let mut handle = engine
            .run_exchange("demo", TaskInput::new(instruction, ""))
            .expect("exchange should start");
        let _: Vec<_> = handle
            .take_chunks()
            .expect("chunks should be available")
            .iter()
            .collect();
        handle.wait().expect("exchange should complete");
    }

    let log = store.fetch("demo", None).expect("fetch");
    let observed: Vec<_> = log
        .iter()
        .map(|entry| (entry.role, entry.content.as_str()))
        .collect();
    assert_eq!(
        observed,
        vec![
            (MessageRole::User, "first question"),
            (MessageRole::Assistant, "First answer.\n"),
            (MessageRole::User, "second question"),
            (MessageRole::Assistant, "Second answer.\n"),
        ]
    );
}
