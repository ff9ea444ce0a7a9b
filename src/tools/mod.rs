//! Builtin tools the model can invoke during an exchange.

use std::path::Path;
use std::sync::Arc;

use crate::registry::ToolRegistry;

mod fs;
mod shell;
mod web;

pub use fs::{ListFilesTool, ReadFileTool, WriteFileTool};
pub use shell::{RunTerminalCommandTool, DEFAULT_COMMAND_TIMEOUT_SEC};
pub use web::{FetchWebsiteTextTool, WebSearchTool, DEFAULT_MAX_CHARS, DEFAULT_MAX_RESULTS};

/// Builds the full builtin registry rooted at one workspace directory:
/// filesystem, shell, and web tools.
pub fn builtin_registry(workspace_root: &Path) -> Result<ToolRegistry, String> {
    let mut builder = ToolRegistry::builder();

    for tool in fs::filesystem_tools(workspace_root)? {
        builder = builder.register(tool)?;
    }

    builder = builder.register(Arc::new(RunTerminalCommandTool::new(workspace_root)?))?;
    builder = builder.register(Arc::new(WebSearchTool::new()))?;
    builder = builder.register(Arc::new(FetchWebsiteTextTool::new()))?;

    Ok(builder.build())
}
