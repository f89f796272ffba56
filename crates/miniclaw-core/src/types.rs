//! Core types for miniclaw — the canonical message model.
//!
//! Every provider adapter translates these shapes to and from its backend's
//! native wire format, so the orchestrator never sees a vendor payload.
//! Content blocks serialize with a `type` tag, matching the block-style
//! format most chat backends accept.

use std::collections::HashMap;
use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Tool arguments as produced by the model: a JSON object keyed by name.
pub type ToolInput = HashMap<String, Value>;

// ─────────────────────────────────────────────
// Messages
// ─────────────────────────────────────────────

/// Who authored a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }

    /// User and assistant messages count toward a session's turn total.
    pub fn is_conversational(&self) -> bool {
        matches!(self, Role::User | Role::Assistant)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tagged unit of message content.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    /// Plain text.
    Text { text: String },
    /// The model asking for a tool invocation.
    ToolUse {
        id: String,
        name: String,
        input: ToolInput,
    },
    /// The outcome of an earlier `ToolUse`, referenced by its id.
    ToolResult { tool_use_id: String, content: String },
}

/// Message content: either plain text or an ordered list of blocks.
///
/// When serialized: text becomes a plain string, blocks become an array.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

impl MessageContent {
    /// Flatten to a single string for persistence.
    ///
    /// Plain text is returned as-is; block content is JSON-encoded so no
    /// tool payload is lost.
    pub fn to_persisted_text(&self) -> String {
        match self {
            MessageContent::Text(text) => text.clone(),
            MessageContent::Blocks(blocks) => {
                serde_json::to_string(blocks).unwrap_or_default()
            }
        }
    }

    /// Concatenate only the `text` blocks (or return the plain text).
    pub fn joined_text(&self) -> String {
        match self {
            MessageContent::Text(text) => text.clone(),
            MessageContent::Blocks(blocks) => blocks
                .iter()
                .filter_map(|b| match b {
                    ContentBlock::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join(""),
        }
    }
}

impl From<String> for MessageContent {
    fn from(text: String) -> Self {
        MessageContent::Text(text)
    }
}

impl From<&str> for MessageContent {
    fn from(text: &str) -> Self {
        MessageContent::Text(text.to_string())
    }
}

/// A chat message in the canonical format.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub role: Role,
    pub content: MessageContent,
}

impl Message {
    pub fn new(role: Role, content: impl Into<MessageContent>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    /// Create a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, MessageContent::Text(content.into()))
    }

    /// Create a user message with text content.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, MessageContent::Text(content.into()))
    }

    /// Create an assistant message with text content.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, MessageContent::Text(content.into()))
    }

    /// Create a message made of content blocks.
    pub fn blocks(role: Role, blocks: Vec<ContentBlock>) -> Self {
        Self::new(role, MessageContent::Blocks(blocks))
    }
}

/// Check that every `tool_result` block refers to a `tool_use` block that
/// appeared earlier in the same message sequence.
pub fn validate_tool_results(messages: &[Message]) -> Result<(), String> {
    let mut seen: HashSet<&str> = HashSet::new();
    for message in messages {
        let MessageContent::Blocks(blocks) = &message.content else {
            continue;
        };
        for block in blocks {
            match block {
                ContentBlock::ToolUse { id, .. } => {
                    seen.insert(id.as_str());
                }
                ContentBlock::ToolResult { tool_use_id, .. } => {
                    if !seen.contains(tool_use_id.as_str()) {
                        return Err(format!(
                            "tool_result references unknown tool_use id '{tool_use_id}'"
                        ));
                    }
                }
                ContentBlock::Text { .. } => {}
            }
        }
    }
    Ok(())
}

// ─────────────────────────────────────────────
// Tools
// ─────────────────────────────────────────────

/// Definition of a tool, sent to the model so it knows what it may call.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON-Schema-shaped object; passed through to the backend untouched.
    pub input_schema: Value,
}

impl ToolDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>, input_schema: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }
}

/// A tool invocation requested by the model.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub input: ToolInput,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, input: ToolInput) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            input,
        }
    }
}

/// Outcome of one tool call within a turn.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ToolResult {
    pub name: String,
    pub success: bool,
    /// Tool output; `null` on failure.
    pub result: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolResult {
    pub fn ok(name: impl Into<String>, result: Value) -> Self {
        Self {
            name: name.into(),
            success: true,
            result,
            error: None,
        }
    }

    pub fn failed(name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            success: false,
            result: Value::Null,
            error: Some(error.into()),
        }
    }
}

// ─────────────────────────────────────────────
// Requests / responses
// ─────────────────────────────────────────────

/// Token accounting for one model call.
///
/// Built through [`TokenUsage::new`], so `total_tokens` always equals
/// `input_tokens + output_tokens`.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
}

impl TokenUsage {
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens: input_tokens + output_tokens,
        }
    }
}

/// One provider round-trip's worth of input. Built fresh per turn.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ChatRequest {
    pub messages: Vec<Message>,
    pub tools: Option<Vec<ToolDefinition>>,
    pub system: Option<String>,
    pub model: Option<String>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
}

impl ChatRequest {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            ..Default::default()
        }
    }

    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = Some(tools);
        self
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_temperature(mut self, temperature: Option<f64>) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: Option<u32>) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// A complete (non-streamed) model answer.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ChatResponse {
    /// Final assistant text; empty when the model only called tools.
    pub content: String,
    /// Tool calls in the order the model emitted them.
    pub tool_calls: Vec<ToolCall>,
    pub usage: Option<TokenUsage>,
}

impl ChatResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }

    /// Whether the response contains tool calls.
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// One item of a streamed response.
#[derive(Clone, Debug, PartialEq)]
pub enum Chunk {
    /// Incremental assistant text.
    Text(String),
    /// A tool invocation whose arguments are now complete.
    ToolUse(ToolCall),
    /// Terminal chunk; carries final usage when the backend reported it.
    Done { usage: Option<TokenUsage> },
}

// ─────────────────────────────────────────────
// Session types
// ─────────────────────────────────────────────

/// Record of a tool call attached to a persisted assistant message.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ToolCallRecord {
    pub name: String,
    #[serde(default)]
    pub params: ToolInput,
}

/// One persisted conversation message.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SessionMessage {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallRecord>>,
}

impl SessionMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: None,
            tool_calls: None,
        }
    }

    pub fn with_tool_calls(mut self, records: Vec<ToolCallRecord>) -> Self {
        self.tool_calls = if records.is_empty() { None } else { Some(records) };
        self
    }
}

/// Counters kept alongside a session's history.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionMetadata {
    pub total_turns: u64,
    pub total_tokens: u64,
}

/// A named, durable conversation history plus counters.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SessionData {
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub messages: Vec<SessionMessage>,
    #[serde(default)]
    pub metadata: SessionMetadata,
}

impl SessionData {
    /// Create a new empty session.
    pub fn new(session_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.into(),
            created_at: now,
            updated_at: now,
            messages: Vec::new(),
            metadata: SessionMetadata::default(),
        }
    }

    /// Recompute `total_turns` as the number of user + assistant messages.
    pub fn recount_turns(&mut self) {
        self.metadata.total_turns = self
            .messages
            .iter()
            .filter(|m| m.role.is_conversational())
            .count() as u64;
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
