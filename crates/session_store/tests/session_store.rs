use std::fs::File;
use std::io::Write;
use std::path::PathBuf;

use serde_json::json;
use session_store::{MessageRole, SessionStore, SessionStoreError};
use tempfile::TempDir;

fn store_with_session_file(lines: &[String]) -> (TempDir, SessionStore) {
    let dir = tempfile::tempdir().expect("tempdir should be created");
    let store = SessionStore::open(dir.path().join("sessions")).expect("store should open");

    let path = store.root().join("session-1.jsonl");
    let mut file = File::create(&path).expect("session file should be created");
    for line in lines {
        writeln!(file, "{line}").expect("line should be written");
    }

    (dir, store)
}

fn session_file_path(store: &SessionStore) -> PathBuf {
    store.root().join("session-1.jsonl")
}

fn header_line() -> String {
    json!({
        "type": "session",
        "version": 1,
        "session_id": "session-1",
        "created_at": "2026-02-14T00:00:00Z",
    })
    .to_string()
}

fn message_line(role: &str, content: &str, ts: &str) -> String {
    json!({
        "type": "message",
        "role": role,
        "content": content,
        "ts": ts,
    })
    .to_string()
}

#[test]
fn fetch_rejects_missing_header() {
    let (_dir, store) = store_with_session_file(&[]);

    let error = store
        .fetch("session-1", None)
        .err()
        .expect("empty file must fail");
    assert!(matches!(error, SessionStoreError::MissingHeader { .. }));
}

#[test]
fn fetch_rejects_non_header_first_line() {
    let (_dir, store) = store_with_session_file(&[message_line(
        "user",
        "hello",
        "2026-02-14T00:00:01Z",
    )]);

    let error = store
        .fetch("session-1", None)
        .err()
        .expect("message as first line must fail");
    assert!(matches!(
        error,
        SessionStoreError::InvalidHeaderRecord { line: 1, .. }
    ));
}

#[test]
fn fetch_rejects_unsupported_header_version() {
    let (_dir, store) = store_with_session_file(&[json!({
        "type": "session",
        "version": 2,
        "session_id": "session-1",
        "created_at": "2026-02-14T00:00:00Z",
    })
    .to_string()]);

    let error = store
        .fetch("session-1", None)
        .err()
        .expect("unsupported version must fail");
    assert!(matches!(
        error,
        SessionStoreError::UnsupportedVersion {
            line: 1,
            found: 2,
            ..
        }
    ));
}

#[test]
fn fetch_rejects_unknown_header_fields() {
    let (_dir, store) = store_with_session_file(&[json!({
        "type": "session",
        "version": 1,
        "session_id": "session-1",
        "created_at": "2026-02-14T00:00:00Z",
        "unexpected": true,
    })
    .to_string()]);

    let error = store
        .fetch("session-1", None)
        .err()
        .expect("unknown header field must fail");
    assert!(matches!(
        error,
        SessionStoreError::JsonLineParse { line: 1, .. }
    ));
}

#[test]
fn fetch_rejects_malformed_json_line_with_line_context() {
    let (_dir, store) = store_with_session_file(&[
        header_line(),
        "{ this is invalid json".to_string(),
    ]);

    let error = store
        .fetch("session-1", None)
        .err()
        .expect("malformed json line must fail");
    assert!(matches!(
        error,
        SessionStoreError::JsonLineParse { line: 2, .. }
    ));
}

#[test]
fn fetch_rejects_unknown_message_fields() {
    let (_dir, store) = store_with_session_file(&[
        header_line(),
        json!({
            "type": "message",
            "role": "assistant",
            "content": "hi",
            "ts": "2026-02-14T00:00:01Z",
            "extra": "nope",
        })
        .to_string(),
    ]);

    let error = store
        .fetch("session-1", None)
        .err()
        .expect("unknown message field must fail");
    assert!(matches!(
        error,
        SessionStoreError::JsonLineParse { line: 2, .. }
    ));
}

#[test]
fn fetch_rejects_unknown_roles() {
    let (_dir, store) = store_with_session_file(&[
        header_line(),
        json!({
            "type": "message",
            "role": "narrator",
            "content": "hi",
            "ts": "2026-02-14T00:00:01Z",
        })
        .to_string(),
    ]);

    let error = store
        .fetch("session-1", None)
        .err()
        .expect("unknown role must fail");
    assert!(matches!(
        error,
        SessionStoreError::JsonLineParse { line: 2, .. }
    ));
}

#[test]
fn fetch_rejects_invalid_timestamps() {
    let (_dir, store) = store_with_session_file(&[
        header_line(),
        message_line("user", "hello", "yesterday"),
    ]);

    let error = store
        .fetch("session-1", None)
        .err()
        .expect("invalid timestamp must fail");
    assert!(matches!(
        error,
        SessionStoreError::InvalidTimestamp {
            line: 2,
            field: "ts",
            ..
        }
    ));
}

#[test]
fn fetch_reads_hand_written_logs_in_order() {
    let (_dir, store) = store_with_session_file(&[
        header_line(),
        message_line("user", "hello", "2026-02-14T00:00:01Z"),
        message_line("assistant", "world", "2026-02-14T00:00:02Z"),
        message_line("tool", "[\"a.py\"]", "2026-02-14T00:00:03Z"),
    ]);

    let messages = store.fetch("session-1", None).expect("fetch should succeed");
    let observed: Vec<_> = messages
        .iter()
        .map(|entry| (entry.role, entry.content.as_str()))
        .collect();

    assert_eq!(
        observed,
        vec![
            (MessageRole::User, "hello"),
            (MessageRole::Assistant, "world"),
            (MessageRole::Tool, "[\"a.py\"]"),
        ]
    );
}

#[test]
fn appends_interleave_at_message_granularity() {
    let (_dir, store) = store_with_session_file(&[header_line()]);

    // Two logical writers appending alternately; each append lands whole.
    store
        .append("session-1", MessageRole::User, "from writer A")
        .expect("append A");
    store
        .append("session-1", MessageRole::User, "from writer B")
        .expect("append B");
    store
        .append("session-1", MessageRole::Assistant, "reply A")
        .expect("append A reply");

    let raw = std::fs::read_to_string(session_file_path(&store)).expect("raw read");
    assert_eq!(raw.lines().count(), 4);

    let messages = store.fetch("session-1", None).expect("fetch");
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[2].content, "reply A");
}

#[test]
fn clear_then_append_restarts_the_log_cleanly() {
    let (_dir, store) = store_with_session_file(&[
        header_line(),
        message_line("user", "old question", "2026-02-14T00:00:01Z"),
    ]);

    assert!(store.clear("session-1").expect("clear should succeed"));
    store
        .append("session-1", MessageRole::User, "fresh start")
        .expect("append after clear");

    let messages = store.fetch("session-1", None).expect("fetch");
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].content, "fresh start");
}
