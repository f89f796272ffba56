//! OpenAI Chat Completions adapter.
//!
//! System text stays in the message list. Assistant `tool_use` blocks become
//! `tool_calls` with JSON-encoded arguments, and `tool_result` blocks become
//! `role: "tool"` messages.

use std::collections::{BTreeMap, VecDeque};

use async_trait::async_trait;
use eventsource_stream::Event;
use miniclaw_core::error::ProviderError;
use miniclaw_core::types::{
    ChatRequest, ChatResponse, Chunk, ContentBlock, Message, MessageContent, Role, TokenUsage,
    ToolCall,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::http::{build_client, check_status, network_error, parse_arguments, REQUEST_TIMEOUT};
use crate::stream::{parse_event, sse_chunk_stream, SseDecoder};
use crate::traits::{ChunkStream, LlmProvider};

const PROVIDER: &str = "openai";
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Models this adapter advertises.
pub const OPENAI_MODELS: &[&str] = &["gpt-4o", "gpt-4o-mini", "gpt-4-turbo"];

// ─────────────────────────────────────────────
// Provider
// ─────────────────────────────────────────────

pub struct OpenAiProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    default_model: String,
}

impl std::fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("base_url", &self.base_url)
            .field("default_model", &self.default_model)
            .finish()
    }
}

impl OpenAiProvider {
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

    /// Build the full chat completions URL.
    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn resolve_model<'a>(&'a self, request: &'a ChatRequest) -> &'a str {
        request
            .model
            .as_deref()
            .filter(|m| !m.is_empty())
            .unwrap_or(&self.default_model)
    }

    fn build_body(&self, request: &ChatRequest, stream: bool) -> Value {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        if let Some(system) = request.system.as_deref().filter(|s| !s.is_empty()) {
            messages.push(json!({"role": "system", "content": system}));
        }
        for message in &request.messages {
            push_wire_messages(message, &mut messages);
        }

        let mut body = json!({
            "model": self.resolve_model(request),
            "messages": messages,
        });
        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }
        if let Some(temperature) = request.temperature {
            body["temperature"] = json!(temperature);
        }
        if let Some(tools) = request.tools.as_ref().filter(|t| !t.is_empty()) {
            let wire: Vec<Value> = tools
                .iter()
                .map(|t| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.input_schema,
                        }
                    })
                })
                .collect();
            body["tools"] = json!(wire);
            body["tool_choice"] = json!("auto");
        }
        if stream {
            body["stream"] = json!(true);
            body["stream_options"] = json!({"include_usage": true});
        }
        body
    }

    async fn send(&self, body: &Value, timeout: bool) -> Result<reqwest::Response, ProviderError> {
        let mut builder = self
            .client
            .post(self.completions_url())
            .bearer_auth(&self.api_key)
            .json(body);
        if timeout {
            builder = builder.timeout(REQUEST_TIMEOUT);
        }
        let response = builder.send().await.map_err(|e| network_error(PROVIDER, e))?;
        check_status(PROVIDER, response).await
    }
}

/// Append the wire form of one canonical message.
///
/// A block message may expand into several wire messages: tool results go
/// first, as one `tool` message each, followed by any remaining text.
fn push_wire_messages(message: &Message, out: &mut Vec<Value>) {
    let role = message.role.as_str();
    let blocks = match &message.content {
        MessageContent::Text(text) => {
            out.push(json!({"role": role, "content": text}));
            return;
        }
        MessageContent::Blocks(blocks) => blocks,
    };

    let mut text = String::new();
    let mut tool_calls = Vec::new();
    for block in blocks {
        match block {
            ContentBlock::Text { text: t } => text.push_str(t),
            ContentBlock::ToolUse { id, name, input } => {
                let arguments = serde_json::to_string(input).unwrap_or_else(|_| "{}".into());
                tool_calls.push(json!({
                    "id": id,
                    "type": "function",
                    "function": {"name": name, "arguments": arguments},
                }));
            }
            ContentBlock::ToolResult {
                tool_use_id,
                content,
            } => out.push(json!({
                "role": "tool",
                "tool_call_id": tool_use_id,
                "content": content,
            })),
        }
    }

    if message.role == Role::Assistant && !tool_calls.is_empty() {
        let content = if text.is_empty() { Value::Null } else { json!(text) };
        out.push(json!({"role": role, "content": content, "tool_calls": tool_calls}));
    } else if !text.is_empty() {
        out.push(json!({"role": role, "content": text}));
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
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
        let parsed: CompletionResponse =
            response
                .json()
                .await
                .map_err(|e| ProviderError::InvalidResponse {
                    provider: PROVIDER.to_string(),
                    message: e.to_string(),
                })?;

        let chat = parsed.into_chat_response()?;
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
        Ok(sse_chunk_stream(response, OpenAiDecoder::default(), PROVIDER))
    }

    fn models(&self) -> Vec<String> {
        OPENAI_MODELS.iter().map(|m| m.to_string()).collect()
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }

    fn display_name(&self) -> &str {
        "OpenAI"
    }
}

// ─────────────────────────────────────────────
// Wire types
// ─────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Debug, Deserialize)]
struct WireToolCall {
    id: String,
    function: WireFunction,
}

#[derive(Debug, Deserialize)]
struct WireFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

impl WireUsage {
    fn to_usage(&self) -> TokenUsage {
        TokenUsage::new(self.prompt_tokens, self.completion_tokens)
    }
}

impl CompletionResponse {
    fn into_chat_response(self) -> Result<ChatResponse, ProviderError> {
        let usage = self.usage.as_ref().map(WireUsage::to_usage);
        let choice = self
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::InvalidResponse {
                provider: PROVIDER.to_string(),
                message: "response has no choices".into(),
            })?;

        let tool_calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| {
                let input = parse_arguments(PROVIDER, &tc.function.name, &tc.function.arguments);
                ToolCall::new(tc.id, tc.function.name, input)
            })
            .collect();

        Ok(ChatResponse {
            content: choice.message.content.unwrap_or_default(),
            tool_calls,
            usage,
        })
    }
}

// ─────────────────────────────────────────────
// Streaming
// ─────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<StreamToolCall>,
}

#[derive(Debug, Deserialize)]
struct StreamToolCall {
    index: usize,
    id: Option<String>,
    function: Option<StreamFunction>,
}

#[derive(Debug, Deserialize)]
struct StreamFunction {
    name: Option<String>,
    arguments: Option<String>,
}

#[derive(Debug, Default)]
struct PendingCall {
    id: String,
    name: String,
    arguments: String,
}

/// Accumulates fragmented tool-call arguments by index until the choice
/// finishes, then emits them in index order.
#[derive(Debug, Default)]
struct OpenAiDecoder {
    calls: BTreeMap<usize, PendingCall>,
    usage: Option<TokenUsage>,
}

impl OpenAiDecoder {
    fn flush_calls(&mut self, out: &mut VecDeque<Chunk>) {
        for (_, call) in std::mem::take(&mut self.calls) {
            let input = parse_arguments(PROVIDER, &call.name, &call.arguments);
            out.push_back(Chunk::ToolUse(ToolCall::new(call.id, call.name, input)));
        }
    }
}

impl SseDecoder for OpenAiDecoder {
    fn on_event(&mut self, event: &Event, out: &mut VecDeque<Chunk>) -> Result<bool, ProviderError> {
        let data = event.data.trim();
        if data.is_empty() {
            return Ok(false);
        }
        if data == "[DONE]" {
            self.flush_calls(out);
            out.push_back(Chunk::Done { usage: self.usage });
            return Ok(true);
        }

        let chunk: StreamChunk = parse_event(PROVIDER, data)?;
        if let Some(usage) = chunk.usage.as_ref() {
            self.usage = Some(usage.to_usage());
        }

        for choice in chunk.choices {
            if let Some(text) = choice.delta.content.filter(|t| !t.is_empty()) {
                out.push_back(Chunk::Text(text));
            }
            for fragment in choice.delta.tool_calls {
                let pending = self.calls.entry(fragment.index).or_default();
                if let Some(id) = fragment.id {
                    pending.id = id;
                }
                if let Some(function) = fragment.function {
                    if let Some(name) = function.name {
                        pending.name.push_str(&name);
                    }
                    if let Some(arguments) = function.arguments {
                        pending.arguments.push_str(&arguments);
                    }
                }
            }
            if choice.finish_reason.is_some() {
                self.flush_calls(out);
            }
        }
        Ok(false)
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use miniclaw_core::types::{ToolDefinition, ToolInput};
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider_for(server: &MockServer) -> OpenAiProvider {
        OpenAiProvider::new("test-key-123", "gpt-4o", Some(&server.uri())).unwrap()
    }

    #[test]
    fn test_completions_url_trailing_slash() {
        let provider = OpenAiProvider::new("k", "gpt-4o", Some("https://example.com/v1/")).unwrap();
        assert_eq!(provider.completions_url(), "https://example.com/v1/chat/completions");
    }

    #[test]
    fn test_default_base_url() {
        let provider = OpenAiProvider::new("k", "gpt-4o", None).unwrap();
        assert_eq!(provider.completions_url(), "https://api.openai.com/v1/chat/completions");
        assert_eq!(provider.models(), vec!["gpt-4o", "gpt-4o-mini", "gpt-4-turbo"]);
    }

    #[test]
    fn test_tool_exchange_wire_format() {
        let provider = OpenAiProvider::new("k", "gpt-4o", None).unwrap();
        let mut input = ToolInput::new();
        input.insert("command".into(), json!("pwd"));
        let request = ChatRequest::new(vec![
            Message::user("where am I?"),
            Message::blocks(
                Role::Assistant,
                vec![ContentBlock::ToolUse {
                    id: "call_1".into(),
                    name: "bash".into(),
                    input,
                }],
            ),
            Message::blocks(
                Role::User,
                vec![ContentBlock::ToolResult {
                    tool_use_id: "call_1".into(),
                    content: "/home/me".into(),
                }],
            ),
        ])
        .with_system("You are miniclaw.");

        let body = provider.build_body(&request, false);
        let messages = body["messages"].as_array().unwrap();

        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[2]["role"], "assistant");
        assert_eq!(messages[2]["content"], Value::Null);
        assert_eq!(messages[2]["tool_calls"][0]["function"]["name"], "bash");
        let args: Value =
            serde_json::from_str(messages[2]["tool_calls"][0]["function"]["arguments"].as_str().unwrap())
                .unwrap();
        assert_eq!(args["command"], "pwd");
        assert_eq!(messages[3]["role"], "tool");
        assert_eq!(messages[3]["tool_call_id"], "call_1");
        assert!(body.get("max_tokens").is_none());
    }

    #[tokio::test]
    async fn test_chat_complete_success() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("Authorization", "Bearer test-key-123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "chatcmpl-test",
                "choices": [{
                    "message": {"role": "assistant", "content": "Hello! I'm miniclaw."},
                    "finish_reason": "stop"
                }],
                "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
            })))
            .mount(&mock_server)
            .await;

        let provider = provider_for(&mock_server);
        let resp = provider
            .chat_complete(&ChatRequest::new(vec![Message::user("Hello")]))
            .await
            .unwrap();

        assert_eq!(resp.content, "Hello! I'm miniclaw.");
        assert!(!resp.has_tool_calls());
        assert_eq!(resp.usage, Some(TokenUsage::new(10, 5)));
    }

    #[tokio::test]
    async fn test_chat_complete_tool_calls() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_partial_json(json!({
                "tool_choice": "auto",
                "tools": [{"type": "function", "function": {"name": "write_file"}}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{
                    "message": {
                        "content": null,
                        "tool_calls": [
                            {
                                "id": "call_a",
                                "type": "function",
                                "function": {"name": "write_file", "arguments": "{\"path\": \"a.txt\", \"content\": \"hi\"}"}
                            },
                            {
                                "id": "call_b",
                                "type": "function",
                                "function": {"name": "write_file", "arguments": "{not json"}
                            }
                        ]
                    },
                    "finish_reason": "tool_calls"
                }]
            })))
            .mount(&mock_server)
            .await;

        let provider = provider_for(&mock_server);
        let tool = ToolDefinition::new("write_file", "Write a file", json!({"type": "object"}));
        let request = ChatRequest::new(vec![Message::user("write it")]).with_tools(vec![tool]);
        let resp = provider.chat_complete(&request).await.unwrap();

        assert_eq!(resp.content, "");
        assert_eq!(resp.tool_calls.len(), 2);
        assert_eq!(resp.tool_calls[0].input.get("path"), Some(&json!("a.txt")));
        assert!(resp.tool_calls[1].input.is_empty());
        assert!(resp.usage.is_none());
    }

    #[tokio::test]
    async fn test_chat_complete_rate_limited() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(429).set_body_json(json!({
                "error": {"message": "Rate limit exceeded", "type": "rate_limit_error"}
            })))
            .mount(&mock_server)
            .await;

        let provider = provider_for(&mock_server);
        let err = provider
            .chat_complete(&ChatRequest::new(vec![Message::user("Hello")]))
            .await
            .unwrap_err();
        match err {
            ProviderError::RateLimited { message, .. } => assert!(message.contains("Rate limit")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_chat_complete_no_choices() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
            .mount(&mock_server)
            .await;

        let provider = provider_for(&mock_server);
        let err = provider
            .chat_complete(&ChatRequest::new(vec![Message::user("Hello")]))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::InvalidResponse { .. }));
    }

    #[tokio::test]
    async fn test_chat_stream_fragments() {
        let mock_server = MockServer::start().await;

        let sse = concat!(
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\",\"content\":\"On \"},\"finish_reason\":null}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"it.\"},\"finish_reason\":null}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"id\":\"call_x\",\"type\":\"function\",\"function\":{\"name\":\"read_file\",\"arguments\":\"\"}}]},\"finish_reason\":null}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"function\":{\"arguments\":\"{\\\"path\\\":\"}}]},\"finish_reason\":null}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"function\":{\"arguments\":\"\\\"b.md\\\"}\"}}]},\"finish_reason\":null}]}\n\n",
            "data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"tool_calls\"}]}\n\n",
            "data: {\"choices\":[],\"usage\":{\"prompt_tokens\":9,\"completion_tokens\":4,\"total_tokens\":13}}\n\n",
            "data: [DONE]\n\n",
        );

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_partial_json(json!({
                "stream": true,
                "stream_options": {"include_usage": true}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_raw(sse, "text/event-stream"))
            .mount(&mock_server)
            .await;

        let provider = provider_for(&mock_server);
        let chunks: Vec<Chunk> = provider
            .chat(&ChatRequest::new(vec![Message::user("read b.md")]))
            .await
            .unwrap()
            .map(|c| c.unwrap())
            .collect()
            .await;

        let mut expected_input = ToolInput::new();
        expected_input.insert("path".into(), json!("b.md"));
        assert_eq!(
            chunks,
            vec![
                Chunk::Text("On ".into()),
                Chunk::Text("it.".into()),
                Chunk::ToolUse(ToolCall::new("call_x", "read_file", expected_input)),
                Chunk::Done {
                    usage: Some(TokenUsage::new(9, 4))
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_chat_stream_http_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
            .mount(&mock_server)
            .await;

        let provider = provider_for(&mock_server);
        let result = provider
            .chat(&ChatRequest::new(vec![Message::user("hi")]))
            .await;
        match result {
            Err(ProviderError::Api { status, body, .. }) => {
                assert_eq!(status, 500);
                assert_eq!(body, "upstream exploded");
            }
            Err(other) => panic!("unexpected error: {other:?}"),
            Ok(_) => panic!("expected an error"),
        }
    }
}
