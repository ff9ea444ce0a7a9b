//! Filesystem tools: directory listing, bounded reads, and confined writes.
//!
//! Paths are resolved relative to a canonicalized workspace root and must
//! stay inside it; escape attempts and missing targets come back as error
//! text, never as panics.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use model_gateway::ToolDefinition;
use serde_json::{json, Value};

use crate::registry::Tool;

const DEFAULT_READ_MAX_BYTES: usize = 200 * 1024;

/// Shared root resolution for the filesystem tool family.
#[derive(Debug, Clone)]
struct WorkspacePaths {
    root: PathBuf,
}

impl WorkspacePaths {
    fn new(root: impl Into<PathBuf>) -> Result<Self, String> {
        let root = root.into();
        let canonical_root = root
            .canonicalize()
            .map_err(|error| format!("Failed to resolve workspace root: {error}"))?;

        if !canonical_root.is_dir() {
            return Err("Workspace root must be a directory".to_string());
        }

        Ok(Self {
            root: canonical_root,
        })
    }

    fn resolve_existing(&self, path: &str) -> Result<PathBuf, String> {
        if path.trim().is_empty() {
            return Err("Path must not be empty".to_string());
        }

        let candidate = self.absolute_candidate(path);
        let canonical = candidate
            .canonicalize()
            .map_err(|_| format!("Path not found: {path}"))?;

        self.ensure_inside_root(&canonical)?;
        Ok(canonical)
    }

    fn resolve_write(&self, path: &str) -> Result<PathBuf, String> {
        if path.trim().is_empty() {
            return Err("Path must not be empty".to_string());
        }

        let candidate = self.absolute_candidate(path);
        let parent = candidate.parent().ok_or_else(|| {
            format!(
                "Path {} has no parent directory and cannot be written safely",
                candidate.display()
            )
        })?;

        let anchor = canonicalize_existing_ancestor(parent)?;
        self.ensure_inside_root(&anchor)?;

        Ok(candidate)
    }

    fn absolute_candidate(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    fn ensure_inside_root(&self, canonical_path: &Path) -> Result<(), String> {
        if canonical_path.starts_with(&self.root) {
            Ok(())
        } else {
            Err(format!(
                "Path escapes workspace root: {}",
                canonical_path.display()
            ))
        }
    }
}

fn canonicalize_existing_ancestor(path: &Path) -> Result<PathBuf, String> {
    for ancestor in path.ancestors() {
        if ancestor.exists() {
            return ancestor.canonicalize().map_err(|error| {
                format!("Failed to resolve path {}: {error}", ancestor.display())
            });
        }
    }

    Err(format!(
        "No existing ancestor found for path {}",
        path.display()
    ))
}

fn string_argument<'a>(arguments: &'a Value, key: &str) -> Option<&'a str> {
    arguments.get(key).and_then(|value| value.as_str())
}

/// Lists files and folders in a directory, as a JSON array of names.
pub struct ListFilesTool {
    paths: WorkspacePaths,
}

impl ListFilesTool {
    pub fn new(workspace_root: impl Into<PathBuf>) -> Result<Self, String> {
        Ok(Self {
            paths: WorkspacePaths::new(workspace_root)?,
        })
    }
}

impl Tool for ListFilesTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "list_files".to_string(),
            description: Some("List files and folders in a directory.".to_string()),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "Directory path relative to project root"
                    }
                }
            }),
        }
    }

    fn invoke(&self, arguments: &Value) -> Result<String, String> {
        let path = string_argument(arguments, "path").unwrap_or(".");
        let resolved = self.paths.resolve_existing(path)?;

        if !resolved.is_dir() {
            return Err(format!("Path is not a directory: {path}"));
        }

        let dir = fs::read_dir(&resolved)
            .map_err(|error| format!("Error listing files: {error}"))?;
        let mut names = Vec::new();
        for dir_entry in dir {
            let dir_entry = dir_entry.map_err(|error| format!("Error listing files: {error}"))?;
            names.push(dir_entry.file_name().to_string_lossy().to_string());
        }
        names.sort();

        serde_json::to_string(&names).map_err(|error| format!("Error listing files: {error}"))
    }
}

/// Reads a UTF-8 file, bounded by a size cap.
pub struct ReadFileTool {
    paths: WorkspacePaths,
    read_max_bytes: usize,
}

impl ReadFileTool {
    pub fn new(workspace_root: impl Into<PathBuf>) -> Result<Self, String> {
        Ok(Self {
            paths: WorkspacePaths::new(workspace_root)?,
            read_max_bytes: DEFAULT_READ_MAX_BYTES,
        })
    }
}

impl Tool for ReadFileTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "read_file".to_string(),
            description: Some("Read file content.".to_string()),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "File path relative to project root"
                    }
                },
                "required": ["path"]
            }),
        }
    }

    fn invoke(&self, arguments: &Value) -> Result<String, String> {
        let path = string_argument(arguments, "path")
            .ok_or_else(|| "read_file requires a 'path' string argument".to_string())?;
        let resolved = self.paths.resolve_existing(path)?;

        let bytes =
            fs::read(&resolved).map_err(|error| format!("Error reading file {path}: {error}"))?;

        if bytes.len() > self.read_max_bytes {
            return Err(format!(
                "File exceeds max read size ({} bytes > {} bytes)",
                bytes.len(),
                self.read_max_bytes
            ));
        }

        String::from_utf8(bytes).map_err(|_| "File is not valid UTF-8 text".to_string())
    }
}

/// Writes (overwrites) a file, creating parent directories as needed.
pub struct WriteFileTool {
    paths: WorkspacePaths,
}

impl WriteFileTool {
    pub fn new(workspace_root: impl Into<PathBuf>) -> Result<Self, String> {
        Ok(Self {
            paths: WorkspacePaths::new(workspace_root)?,
        })
    }
}

impl Tool for WriteFileTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "write_file".to_string(),
            description: Some("Write content to a file (overwrite).".to_string()),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "File path relative to project root"
                    },
                    "content": {
                        "type": "string",
                        "description": "Content to write"
                    }
                },
                "required": ["path", "content"]
            }),
        }
    }

    fn invoke(&self, arguments: &Value) -> Result<String, String> {
        let path = string_argument(arguments, "path")
            .ok_or_else(|| "write_file requires a 'path' string argument".to_string())?;
        let content = string_argument(arguments, "content")
            .ok_or_else(|| "write_file requires a 'content' string argument".to_string())?;

        let resolved = self.paths.resolve_write(path)?;

        if let Some(parent) = resolved.parent() {
            fs::create_dir_all(parent).map_err(|error| {
                format!(
                    "Failed to create parent directories {}: {error}",
                    parent.display()
                )
            })?;
        }

        fs::write(&resolved, content)
            .map_err(|error| format!("Error writing file {path}: {error}"))?;

        Ok(format!("File {path} written successfully"))
    }
}

/// Registers the filesystem tool family against one workspace root.
pub(crate) fn filesystem_tools(
    workspace_root: &Path,
) -> Result<Vec<Arc<dyn Tool>>, String> {
    let tools: Vec<Arc<dyn Tool>> = vec![
        Arc::new(ListFilesTool::new(workspace_root)?),
        Arc::new(ReadFileTool::new(workspace_root)?),
        Arc::new(WriteFileTool::new(workspace_root)?),
    ];

    Ok(tools)
}
