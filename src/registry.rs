//! Named tool registry shared by every exchange.
//!
//! The registry is built once at startup and stays immutable for the process
//! lifetime; exchanges share it through an `Arc`. A tool is one named,
//! invocable action behind a single-method trait, whatever its kind
//! (filesystem, shell, network).

use std::collections::BTreeMap;
use std::sync::Arc;

use model_gateway::ToolDefinition;
use serde_json::Value;

/// One invocable tool.
pub trait Tool: Send + Sync {
    /// Definition advertised to the model.
    fn definition(&self) -> ToolDefinition;

    /// Runs the tool against structured arguments.
    ///
    /// The returned error is operator-readable text; the invoker converts it
    /// into an error-flagged result rather than letting it escape.
    fn invoke(&self, arguments: &Value) -> Result<String, String>;
}

/// Immutable name → tool mapping.
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    #[must_use]
    pub fn builder() -> ToolRegistryBuilder {
        ToolRegistryBuilder {
            tools: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).map(Arc::clone)
    }

    /// Definitions for every registered tool, in stable name order.
    #[must_use]
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|tool| tool.definition()).collect()
    }

    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// Build-time registry assembly; duplicate names are rejected.
pub struct ToolRegistryBuilder {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl std::fmt::Debug for ToolRegistryBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistryBuilder")
            .field("tools", &self.tools.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ToolRegistryBuilder {
    pub fn register(mut self, tool: Arc<dyn Tool>) -> Result<Self, String> {
        let name = tool.definition().name;
        if name.trim().is_empty() {
            return Err("tool name must not be empty".to_string());
        }
        if self.tools.contains_key(&name) {
            return Err(format!("duplicate tool name '{name}'"));
        }

        self.tools.insert(name, tool);
        Ok(self)
    }

    #[must_use]
    pub fn build(self) -> ToolRegistry {
        ToolRegistry { tools: self.tools }
    }
}
