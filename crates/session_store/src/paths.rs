use std::path::{Path, PathBuf};

pub const SESSION_DIR: [&str; 2] = [".codeloom", "sessions"];

const CURRENT_POINTER_FILE: &str = "current";

#[must_use]
pub fn session_root(cwd: &Path) -> PathBuf {
    cwd.join(SESSION_DIR[0]).join(SESSION_DIR[1])
}

#[must_use]
pub fn session_file_name(session_id: &str) -> String {
    format!("{session_id}.jsonl")
}

#[must_use]
pub fn current_pointer_path(root: &Path) -> PathBuf {
    root.join(CURRENT_POINTER_FILE)
}
