//! Shell command execution with a hard timeout and bounded output.

use std::io::Read;
use std::path::PathBuf;
use std::process::{Command, ExitStatus, Stdio};
use std::time::Duration;

use model_gateway::ToolDefinition;
use serde_json::{json, Value};
use wait_timeout::ChildExt;

use crate::registry::Tool;

/// Default wall-clock budget before a command is killed.
pub const DEFAULT_COMMAND_TIMEOUT_SEC: u64 = 10;

const DEFAULT_MAX_OUTPUT_BYTES: usize = 100 * 1024;

/// Executes one shell command in the workspace root.
pub struct RunTerminalCommandTool {
    workspace_root: PathBuf,
    timeout_sec: u64,
    max_output_bytes: usize,
}

impl RunTerminalCommandTool {
    pub fn new(workspace_root: impl Into<PathBuf>) -> Result<Self, String> {
        let workspace_root = workspace_root.into();
        let canonical_root = workspace_root
            .canonicalize()
            .map_err(|error| format!("Failed to resolve workspace root: {error}"))?;

        if !canonical_root.is_dir() {
            return Err("Workspace root must be a directory".to_string());
        }

        Ok(Self {
            workspace_root: canonical_root,
            timeout_sec: DEFAULT_COMMAND_TIMEOUT_SEC,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
        })
    }

    #[must_use]
    pub fn with_timeout_sec(mut self, timeout_sec: u64) -> Self {
        self.timeout_sec = timeout_sec;
        self
    }
}

impl Tool for RunTerminalCommandTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "run_terminal_command".to_string(),
            description: Some(
                "Execute a terminal command and return its output.".to_string(),
            ),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "command": {
                        "type": "string",
                        "description": "The command to run in the shell"
                    }
                },
                "required": ["command"]
            }),
        }
    }

    fn invoke(&self, arguments: &Value) -> Result<String, String> {
        let command = arguments
            .get("command")
            .and_then(|value| value.as_str())
            .ok_or_else(|| "run_terminal_command requires a 'command' string argument".to_string())?;

        let mut child = Command::new("bash")
            .arg("-lc")
            .arg(command)
            .current_dir(&self.workspace_root)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|error| format!("Failed to launch command: {error}"))?;

        let wait_result = child.wait_timeout(Duration::from_secs(self.timeout_sec));

        let status = match wait_result {
            Ok(Some(status)) => status,
            Ok(None) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(format!(
                    "[Error] Command timed out after {} seconds.",
                    self.timeout_sec
                ));
            }
            Err(error) => {
                let _ = child.kill();
                return Err(format!("Failed waiting for command: {error}"));
            }
        };

        let stdout = read_pipe_bytes(child.stdout.take());
        let stderr = read_pipe_bytes(child.stderr.take());

        if status.success() {
            let output = String::from_utf8_lossy(&stdout).trim().to_string();
            Ok(truncate_to_byte_limit(output, self.max_output_bytes))
        } else {
            let stderr_text = String::from_utf8_lossy(&stderr).trim().to_string();
            Err(truncate_to_byte_limit(
                format!(
                    "[Error] Command failed ({}):\n{stderr_text}",
                    format_exit_status(status)
                ),
                self.max_output_bytes,
            ))
        }
    }
}

fn read_pipe_bytes(pipe: Option<impl Read>) -> Vec<u8> {
    let Some(mut pipe) = pipe else {
        return Vec::new();
    };

    let mut bytes = Vec::new();
    let _ = pipe.read_to_end(&mut bytes);
    bytes
}

fn truncate_to_byte_limit(content: String, max_bytes: usize) -> String {
    if content.len() <= max_bytes {
        return content;
    }

    let mut cutoff = max_bytes.min(content.len());
    while cutoff > 0 && !content.is_char_boundary(cutoff) {
        cutoff -= 1;
    }

    let mut truncated = content[..cutoff].to_string();
    truncated.push_str("\n[truncated]");
    truncated
}

fn format_exit_status(status: ExitStatus) -> String {
    match status.code() {
        Some(code) => format!("exit_code={code}"),
        None => "exit_code=terminated_by_signal".to_string(),
    }
}
