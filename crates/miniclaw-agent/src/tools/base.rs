//! Tool trait — the interface every agent tool implements.

use async_trait::async_trait;
use serde_json::Value;

use miniclaw_core::types::{ToolDefinition, ToolInput};

// ─────────────────────────────────────────────
// Tool trait
// ─────────────────────────────────────────────

/// Every agent tool implements this trait.
///
/// The orchestrator sends `to_definition()` to the model and dispatches the
/// model's calls to `execute()` with the raw `input` object.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique name used by the model to call this tool (e.g. `"read_file"`).
    fn name(&self) -> &str;

    /// Human-readable description shown to the model.
    fn description(&self) -> &str;

    /// JSON Schema for the input: `{"type": "object", "properties": ..., "required": ...}`.
    fn input_schema(&self) -> Value;

    /// Run the tool. The returned value is reported back as the tool result.
    ///
    /// Tools validate their own input; an `Err` becomes a failed result.
    async fn execute(&self, params: ToolInput) -> anyhow::Result<Value>;

    /// Build the `ToolDefinition` sent to the model.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition::new(self.name(), self.description(), self.input_schema())
    }
}

// ─────────────────────────────────────────────
// Param helpers
// ─────────────────────────────────────────────

/// Extract a required string param, returning a readable error.
pub fn require_string(params: &ToolInput, key: &str) -> anyhow::Result<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| anyhow::anyhow!("Missing required parameter: {key}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_require_string_present() {
        let mut params = ToolInput::new();
        params.insert("path".into(), json!("/tmp/foo.txt"));
        assert_eq!(require_string(&params, "path").unwrap(), "/tmp/foo.txt");
    }

    #[test]
    fn test_require_string_missing_or_wrong_type() {
        let mut params = ToolInput::new();
        assert!(require_string(&params, "path").is_err());
        params.insert("path".into(), json!(42));
        let err = require_string(&params, "path").unwrap_err();
        assert!(err.to_string().contains("path"));
    }

    #[test]
    fn test_to_definition_default() {
        struct DummyTool;

        #[async_trait]
        impl Tool for DummyTool {
            fn name(&self) -> &str {
                "dummy"
            }
            fn description(&self) -> &str {
                "A test tool"
            }
            fn input_schema(&self) -> Value {
                json!({"type": "object", "properties": {"msg": {"type": "string"}}})
            }
            async fn execute(&self, _params: ToolInput) -> anyhow::Result<Value> {
                Ok(json!("ok"))
            }
        }

        let def = DummyTool.to_definition();
        assert_eq!(def.name, "dummy");
        assert_eq!(def.description, "A test tool");
        assert_eq!(def.input_schema["type"], "object");
    }
}
