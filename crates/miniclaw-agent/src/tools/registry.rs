//! Tool registry — name → tool map scoped to one agent.
//!
//! Cloning is cheap (tools are `Arc`-shared), which lets the orchestrator
//! take a consistent snapshot at the start of each turn.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use miniclaw_core::error::ToolError;
use miniclaw_core::types::{ToolDefinition, ToolInput};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::base::Tool;

/// Stores tools keyed by name and dispatches calls.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.tool_names())
            .finish()
    }
}

impl ToolRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Overwrites any previous tool with the same name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        info!(tool = tool.name(), "registered tool");
        self.tools.insert(tool.name().to_string(), tool);
    }

    /// Unregister a tool by name. Returns the removed tool, if any.
    pub fn unregister(&mut self, name: &str) -> Option<Arc<dyn Tool>> {
        let removed = self.tools.remove(name);
        if removed.is_some() {
            info!(tool = name, "unregistered tool");
        }
        removed
    }

    /// Look up a tool by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn has(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Names of all registered tools, sorted.
    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// Definitions of every registered tool, sorted by name.
    pub fn list(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> =
            self.tools.values().map(|t| t.to_definition()).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Execute a tool by name.
    ///
    /// Unknown names fail with [`ToolError::NotFound`]. Errors and panics
    /// raised by the tool are wrapped in [`ToolError::Execution`].
    pub async fn execute(&self, name: &str, params: ToolInput) -> Result<Value, ToolError> {
        let tool = self.tools.get(name).ok_or_else(|| {
            warn!(tool = name, "tool not found");
            ToolError::NotFound(name.to_string())
        })?;

        debug!(tool = name, "executing tool");
        match AssertUnwindSafe(tool.execute(params)).catch_unwind().await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                warn!(tool = name, error = %e, "tool execution failed");
                Err(ToolError::Execution {
                    name: name.to_string(),
                    message: e.to_string(),
                })
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                warn!(tool = name, panic = %message, "tool panicked");
                Err(ToolError::Execution {
                    name: name.to_string(),
                    message: format!("tool panicked: {message}"),
                })
            }
        }
    }

    /// Number of registered tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
