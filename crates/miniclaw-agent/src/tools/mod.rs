//! Tool modules for the miniclaw agent.

pub mod base;
pub mod filesystem;
pub mod registry;
pub mod shell;

use std::sync::Arc;

use miniclaw_core::config::ToolsConfig;
use miniclaw_core::utils::expand_home;
use tracing::warn;

pub use base::{require_string, Tool};
pub use filesystem::{ReadFileTool, WriteFileTool};
pub use registry::ToolRegistry;
pub use shell::BashTool;

/// Names of the tools that ship with miniclaw.
pub const BUILTIN_TOOLS: &[&str] = &["read_file", "write_file", "bash"];

/// Build a registry holding the built-in tools listed in `tools.enabled`.
pub fn builtin_registry(config: &ToolsConfig) -> ToolRegistry {
    let base_dir = config.bash.working_dir.as_deref().map(expand_home);
    let mut registry = ToolRegistry::new();

    for name in &config.enabled {
        match name.as_str() {
            "read_file" => registry.register(Arc::new(ReadFileTool::new(base_dir.clone()))),
            "write_file" => registry.register(Arc::new(WriteFileTool::new(base_dir.clone()))),
            "bash" => registry.register(Arc::new(BashTool::from_config(&config.bash))),
            other => warn!(tool = other, "unknown tool in tools.enabled, skipping"),
        }
    }
    registry
}
