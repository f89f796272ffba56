//! Anthropic Messages API adapter.
//!
//! The canonical content blocks already match Anthropic's block format, so
//! message content serializes straight through. System messages are pulled
//! out of the list into the top-level `system` field.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use eventsource_stream::Event;
use miniclaw_core::error::ProviderError;
use miniclaw_core::types::{
    ChatRequest, ChatResponse, Chunk, Message, Role, TokenUsage, ToolCall,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::http::{build_client, check_status, network_error, parse_arguments, value_to_input, REQUEST_TIMEOUT};
use crate::stream::{parse_event, sse_chunk_stream, SseDecoder};
use crate::traits::{ChunkStream, LlmProvider};

const PROVIDER: &str = "anthropic";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Models this adapter advertises.
pub const ANTHROPIC_MODELS: &[&str] = &[
    "claude-3-5-sonnet-20241022",
    "claude-3-5-haiku-20241022",
    "claude-3-5-opus-20241022",
];

// ─────────────────────────────────────────────
// Provider
// ─────────────────────────────────────────────

pub struct AnthropicProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    default_model: String,
}

impl std::fmt::Debug for AnthropicProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicProvider")
            .field("base_url", &self.base_url)
            .field("default_model", &self.default_model)
            .finish()
    }
}

impl AnthropicProvider {
    pub fn new(
        api_key: impl Into<String>,
        default_model: impl Into<String>,
        base_url: Option<&str>,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            client: build_client(PROVIDER)?,
            api_key: api_key.into(),
            base_url: base_url
                .unwrap_or(DEFAULT_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            default_model: default_model.into(),
        })
    }

    fn messages_url(&self) -> String {
        format!("{}/v1/messages", self.base_url)
    }

    fn resolve_model<'a>(&'a self, request: &'a ChatRequest) -> &'a str {
        request
            .model
            .as_deref()
            .filter(|m| !m.is_empty())
            .unwrap_or(&self.default_model)
    }

    /// Translate a canonical request into a Messages API body.
    fn build_body(&self, request: &ChatRequest, stream: bool) -> Value {
        let mut system_parts: Vec<String> = Vec::new();
        if let Some(system) = request.system.as_deref().filter(|s| !s.is_empty()) {
            system_parts.push(system.to_string());
        }

        let mut messages = Vec::with_capacity(request.messages.len());
        for message in &request.messages {
            match message.role {
                Role::System => system_parts.push(message.content.joined_text()),
                Role::User | Role::Assistant => messages.push(wire_message(message)),
            }
        }

        let mut body = json!({
            "model": self.resolve_model(request),
            "max_tokens": request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            "messages": messages,
        });
        if !system_parts.is_empty() {
            body["system"] = json!(system_parts.join("\n\n"));
        }
        if let Some(temperature) = request.temperature {
            body["temperature"] = json!(temperature);
        }
        if let Some(tools) = request.tools.as_ref().filter(|t| !t.is_empty()) {
            body["tools"] = json!(tools);
        }
        if stream {
            body["stream"] = json!(true);
        }
        body
    }

    async fn send(&self, body: &Value, timeout: bool) -> Result<reqwest::Response, ProviderError> {
        let mut builder = self
            .client
            .post(self.messages_url())
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(body);
        if timeout {
            builder = builder.timeout(REQUEST_TIMEOUT);
        }
        let response = builder.send().await.map_err(|e| network_error(PROVIDER, e))?;
        check_status(PROVIDER, response).await
    }
}

fn wire_message(message: &Message) -> Value {
    json!({
        "role": message.role.as_str(),
        "content": message.content,
    })
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    async fn chat_complete(&self, request: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        let body = self.build_body(request, false);
        debug!(
            provider = PROVIDER,
            model = %self.resolve_model(request),
            messages = request.messages.len(),
            tools = request.tools.as_ref().map_or(0, |t| t.len()),
            "Calling LLM"
        );

        let response = self.send(&body, true).await?;
        let parsed: MessagesResponse =
            response
                .json()
                .await
                .map_err(|e| ProviderError::InvalidResponse {
                    provider: PROVIDER.to_string(),
                    message: e.to_string(),
                })?;

        let chat = parsed.into_chat_response();
        debug!(
            provider = PROVIDER,
            content_len = chat.content.len(),
            tool_calls = chat.tool_calls.len(),
            "LLM response received"
        );
        Ok(chat)
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChunkStream, ProviderError> {
        let body = self.build_body(request, true);
        debug!(
            provider = PROVIDER,
            model = %self.resolve_model(request),
            "Opening LLM stream"
        );
        let response = self.send(&body, false).await?;
        Ok(sse_chunk_stream(response, AnthropicDecoder::default(), PROVIDER))
    }

    fn models(&self) -> Vec<String> {
        ANTHROPIC_MODELS.iter().map(|m| m.to_string()).collect()
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }

    fn display_name(&self) -> &str {
        "Anthropic"
    }
}

// ─────────────────────────────────────────────
// Wire types
// ─────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<WireBlock>,
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        #[serde(default)]
        input: Value,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Default, Deserialize)]
struct WireUsage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

impl MessagesResponse {
    fn into_chat_response(self) -> ChatResponse {
        let mut content = String::new();
        let mut tool_calls = Vec::new();
        for block in self.content {
            match block {
                WireBlock::Text { text } => content.push_str(&text),
                WireBlock::ToolUse { id, name, input } => {
                    let input = value_to_input(PROVIDER, &name, input);
                    tool_calls.push(ToolCall::new(id, name, input));
                }
                WireBlock::Other => {}
            }
        }
        ChatResponse {
            content,
            tool_calls,
            usage: self
                .usage
                .map(|u| TokenUsage::new(u.input_tokens, u.output_tokens)),
        }
    }
}

// ─────────────────────────────────────────────
// Streaming
// ─────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StreamEvent {
    MessageStart {
        message: StartMessage,
    },
    ContentBlockStart {
        index: usize,
        content_block: WireBlock,
    },
    ContentBlockDelta {
        index: usize,
        delta: BlockDelta,
    },
    ContentBlockStop {
        index: usize,
    },
    MessageDelta {
        #[serde(default)]
        usage: Option<WireUsage>,
    },
    MessageStop,
    Error {
        error: StreamErrorBody,
    },
    #[serde(other)]
    Ignored,
}

#[derive(Debug, Deserialize)]
struct StartMessage {
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum BlockDelta {
    TextDelta { text: String },
    InputJsonDelta { partial_json: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct StreamErrorBody {
    message: String,
}

#[derive(Debug)]
struct PendingToolUse {
    id: String,
    name: String,
    json: String,
}

/// Assembles tool-use blocks from their input-json deltas and tracks usage.
#[derive(Debug, Default)]
struct AnthropicDecoder {
    input_tokens: u64,
    output_tokens: u64,
    tool_uses: HashMap<usize, PendingToolUse>,
}

impl SseDecoder for AnthropicDecoder {
    fn on_event(&mut self, event: &Event, out: &mut VecDeque<Chunk>) -> Result<bool, ProviderError> {
        if event.data.trim().is_empty() {
            return Ok(false);
        }
        match parse_event::<StreamEvent>(PROVIDER, &event.data)? {
            StreamEvent::MessageStart { message } => {
                if let Some(usage) = message.usage {
                    self.input_tokens = usage.input_tokens;
                    self.output_tokens = usage.output_tokens;
                }
            }
            StreamEvent::ContentBlockStart {
                index,
                content_block,
            } => match content_block {
                WireBlock::ToolUse { id, name, .. } => {
                    self.tool_uses.insert(
                        index,
                        PendingToolUse {
                            id,
                            name,
                            json: String::new(),
                        },
                    );
                }
                WireBlock::Text { text } if !text.is_empty() => out.push_back(Chunk::Text(text)),
                _ => {}
            },
            StreamEvent::ContentBlockDelta { index, delta } => match delta {
                BlockDelta::TextDelta { text } => out.push_back(Chunk::Text(text)),
                BlockDelta::InputJsonDelta { partial_json } => {
                    if let Some(pending) = self.tool_uses.get_mut(&index) {
                        pending.json.push_str(&partial_json);
                    }
                }
                BlockDelta::Other => {}
            },
            StreamEvent::ContentBlockStop { index } => {
                if let Some(pending) = self.tool_uses.remove(&index) {
                    let input = parse_arguments(PROVIDER, &pending.name, &pending.json);
                    out.push_back(Chunk::ToolUse(ToolCall::new(pending.id, pending.name, input)));
                }
            }
            StreamEvent::MessageDelta { usage } => {
                if let Some(usage) = usage {
                    if usage.input_tokens > 0 {
                        self.input_tokens = usage.input_tokens;
                    }
                    self.output_tokens = usage.output_tokens;
                }
            }
            StreamEvent::MessageStop => {
                out.push_back(Chunk::Done {
                    usage: Some(TokenUsage::new(self.input_tokens, self.output_tokens)),
                });
                return Ok(true);
            }
            StreamEvent::Error { error } => {
                return Err(ProviderError::Stream {
                    provider: PROVIDER.to_string(),
                    message: error.message,
                });
            }
            StreamEvent::Ignored => {}
        }
        Ok(false)
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
