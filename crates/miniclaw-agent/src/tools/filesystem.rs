//! Filesystem tools — read and write whole files.
//!
//! Relative paths resolve against an optional base directory (the configured
//! working directory), otherwise against the process's current directory.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use miniclaw_core::types::ToolInput;
use miniclaw_core::utils::expand_home;
use serde_json::{json, Value};
use tracing::debug;

use super::base::{require_string, Tool};

fn resolve_path(path: &str, base_dir: Option<&Path>) -> PathBuf {
    let expanded = expand_home(path);
    match base_dir {
        Some(base) if expanded.is_relative() => base.join(expanded),
        _ => expanded,
    }
}

// ─────────────────────────────────────────────
// ReadFileTool
// ─────────────────────────────────────────────

/// Returns the entire UTF-8 content of a file as `{content}`.
pub struct ReadFileTool {
    base_dir: Option<PathBuf>,
}

impl ReadFileTool {
    pub fn new(base_dir: Option<PathBuf>) -> Self {
        Self { base_dir }
    }
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read the contents of a file at the given path. Returns the full text content."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Absolute or relative path to the file to read"
                }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, params: ToolInput) -> anyhow::Result<Value> {
        let path_str = require_string(&params, "path")?;
        let path = resolve_path(&path_str, self.base_dir.as_deref());

        if !path.exists() {
            anyhow::bail!("File not found: {}", path.display());
        }
        if !path.is_file() {
            anyhow::bail!("Not a file: {}", path.display());
        }

        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to read {}: {e}", path.display()))?;
        debug!(path = %path.display(), bytes = content.len(), "read file");
        Ok(json!({ "content": content }))
    }
}

// ─────────────────────────────────────────────
// WriteFileTool
// ─────────────────────────────────────────────

/// Writes (overwrites) a file, creating parent directories as needed.
pub struct WriteFileTool {
    base_dir: Option<PathBuf>,
}

impl WriteFileTool {
    pub fn new(base_dir: Option<PathBuf>) -> Self {
        Self { base_dir }
    }
}

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write content to a file, creating it (and any missing parent directories) \
         or replacing its existing content."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Path of the file to write"
                },
                "content": {
                    "type": "string",
                    "description": "Full text to write into the file"
                }
            },
            "required": ["path", "content"]
        })
    }

    async fn execute(&self, params: ToolInput) -> anyhow::Result<Value> {
        let path_str = require_string(&params, "path")?;
        let content = require_string(&params, "content")?;
        let path = resolve_path(&path_str, self.base_dir.as_deref());

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| anyhow::anyhow!("Failed to create {}: {e}", parent.display()))?;
        }
        tokio::fs::write(&path, &content)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to write {}: {e}", path.display()))?;

        debug!(path = %path.display(), bytes = content.len(), "wrote file");
        Ok(json!({ "success": true, "bytes": content.len() }))
    }
}
