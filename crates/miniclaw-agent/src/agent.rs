//! Agent orchestrator — one provider round-trip per turn.
//!
//! A turn moves through fixed stages:
//!
//! 1. resolve the session (auto-create if absent)
//! 2. build the system prompt and snapshot the tool list
//! 3. call the provider once
//! 4. dispatch any tool calls, sequentially, in the order returned
//! 5. persist the caller's messages and one assistant message
//! 6. return the response, tool results, and post-persist session
//!
//! Turns on the same session id serialise on a per-id lock. A failed or
//! cancelled turn persists nothing.

use std::path::PathBuf;
use std::sync::Arc;

use miniclaw_core::config::Config;
use miniclaw_core::error::{ConfigError, SessionError, ToolError};
use miniclaw_core::session::{SessionLocks, SessionStore};
use miniclaw_core::types::{
    validate_tool_results, ChatRequest, ChatResponse, Message, Role, SessionData,
    SessionMessage, ToolCall, ToolCallRecord, ToolDefinition, ToolResult,
};
use miniclaw_providers::{create_provider, LlmProvider};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::context::ContextBuilder;
use crate::error::AgentError;
use crate::memory::AgentMemoryStore;
use crate::tools::{builtin_registry, Tool, ToolRegistry};

/// Used when neither the call nor the provider names a model.
pub const FALLBACK_MODEL: &str = "claude-3-5-sonnet-20241022";

// ─────────────────────────────────────────────
// Configuration and per-call options
// ─────────────────────────────────────────────

/// Storage locations and sampling defaults for an [`Agent`].
#[derive(Clone, Debug)]
pub struct AgentConfig {
    pub sessions_dir: PathBuf,
    pub workspace: PathBuf,
    /// Session used when a call does not name one.
    pub default_session: String,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f64>,
}

impl AgentConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            sessions_dir: config.sessions_dir(),
            workspace: config.workspace_dir(),
            default_session: config.memory.session.default_session.clone(),
            max_tokens: config.llm.max_tokens,
            temperature: config.llm.temperature,
        }
    }
}

/// Per-turn options. Everything is optional.
#[derive(Clone, Debug, Default)]
pub struct RunOptions {
    pub session_id: Option<String>,
    pub model: Option<String>,
    /// Replaces the assembled system prompt entirely.
    pub system: Option<String>,
    /// Appended to the assembled prompt as a `# Supplementary Context` section.
    pub supplementary_context: Option<String>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
    pub cancel: Option<CancellationToken>,
}

impl RunOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(mut self, id: impl Into<String>) -> Self {
        self.session_id = Some(id.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_supplementary_context(mut self, context: impl Into<String>) -> Self {
        self.supplementary_context = Some(context.into());
        self
    }

    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

/// Outcome of a successful turn.
#[derive(Clone, Debug)]
pub struct AgentResult {
    pub response: ChatResponse,
    /// `None` when the model made no tool calls.
    pub tool_results: Option<Vec<ToolResult>>,
    /// Session snapshot taken after this turn was persisted.
    pub session_used: SessionData,
}

// ─────────────────────────────────────────────
// Agent
// ─────────────────────────────────────────────

/// Ties a provider, a tool registry, and the two stores into turns.
pub struct Agent {
    provider: Arc<dyn LlmProvider>,
    tools: RwLock<ToolRegistry>,
    sessions: SessionStore,
    memory: AgentMemoryStore,
    locks: SessionLocks,
    config: AgentConfig,
}

impl Agent {
    pub fn new(provider: Arc<dyn LlmProvider>, tools: ToolRegistry, config: AgentConfig) -> Self {
        info!(
            provider = provider.display_name(),
            tools = tools.len(),
            sessions_dir = %config.sessions_dir.display(),
            workspace = %config.workspace.display(),
            "agent initialized"
        );
        Self {
            provider,
            tools: RwLock::new(tools),
            sessions: SessionStore::new(config.sessions_dir.clone()),
            memory: AgentMemoryStore::new(config.workspace.clone()),
            locks: SessionLocks::new(),
            config,
        }
    }

    /// Build the provider and the enabled built-in tools from `config`.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let provider = create_provider(&config.llm)?;
        let tools = builtin_registry(&config.tools);
        Ok(Self::new(provider, tools, AgentConfig::from_config(config)))
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn memory(&self) -> &AgentMemoryStore {
        &self.memory
    }

    pub fn provider(&self) -> &Arc<dyn LlmProvider> {
        &self.provider
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Add or replace a tool. Takes effect on the next turn.
    pub async fn register_tool(&self, tool: Arc<dyn Tool>) {
        self.tools.write().await.register(tool);
    }

    /// Remove a tool. Takes effect on the next turn.
    pub async fn unregister_tool(&self, name: &str) -> bool {
        self.tools.write().await.unregister(name).is_some()
    }

    pub async fn tool_definitions(&self) -> Vec<ToolDefinition> {
        self.tools.read().await.list()
    }

    /// Model for a turn: per-call override, then the provider's default,
    /// then [`FALLBACK_MODEL`].
    pub fn resolve_model(&self, requested: Option<&str>) -> String {
        requested
            .filter(|m| !m.is_empty())
            .or_else(|| Some(self.provider.default_model()).filter(|m| !m.is_empty()))
            .unwrap_or(FALLBACK_MODEL)
            .to_string()
    }

    /// Run one turn.
    pub async fn run(
        &self,
        messages: Vec<Message>,
        options: RunOptions,
    ) -> Result<AgentResult, AgentError> {
        validate_tool_results(&messages).map_err(AgentError::InvalidMessages)?;

        let session_id = options
            .session_id
            .clone()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| self.config.default_session.clone());
        let cancel = options.cancel.clone().unwrap_or_default();

        let _guard = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(AgentError::Cancelled),
            guard = self.locks.acquire(&session_id) => guard,
        };

        self.resolve_session(&session_id)?;

        let context = ContextBuilder::new(&self.memory);
        let system_prompt = context.resolve_system_prompt(
            options.system.as_deref(),
            options.supplementary_context.as_deref(),
        );
        // Snapshot so tools (de)registered mid-turn only affect later turns.
        let tools = self.tools.read().await.clone();
        let tool_defs = tools.list();

        let model = self.resolve_model(options.model.as_deref());
        let mut request = ChatRequest::new(ContextBuilder::build_messages(system_prompt, &messages))
            .with_model(model.clone())
            .with_temperature(options.temperature.or(self.config.temperature))
            .with_max_tokens(options.max_tokens.or(self.config.max_tokens));
        if !tool_defs.is_empty() {
            request = request.with_tools(tool_defs);
        }

        info!(
            session_id = %session_id,
            model = %model,
            messages = messages.len(),
            tools = tools.len(),
            "calling provider"
        );
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!(session_id = %session_id, "turn cancelled during provider call");
                return Err(AgentError::Cancelled);
            }
            result = self.provider.chat_complete(&request) => result.map_err(|e| {
                warn!(session_id = %session_id, error = %e, "provider call failed");
                AgentError::Provider(e)
            })?,
        };

        let tool_results = if response.has_tool_calls() {
            Some(dispatch_tools(&tools, &response.tool_calls, &cancel).await?)
        } else {
            None
        };

        let session_used = self.persist_turn(&session_id, &messages, &response)?;

        info!(
            session_id = %session_id,
            tool_calls = response.tool_calls.len(),
            total_turns = session_used.metadata.total_turns,
            "turn complete"
        );
        Ok(AgentResult {
            response,
            tool_results,
            session_used,
        })
    }

    /// One user message in, response text out.
    pub async fn chat(
        &self,
        user_message: &str,
        session_id: Option<&str>,
    ) -> Result<String, AgentError> {
        let mut options = RunOptions::new();
        options.session_id = session_id.map(str::to_string);
        let result = self.run(vec![Message::user(user_message)], options).await?;
        Ok(result.response.content)
    }

    fn resolve_session(&self, id: &str) -> Result<SessionData, AgentError> {
        match self.sessions.load(id) {
            Ok(session) => Ok(session),
            Err(SessionError::NotFound(_)) => {
                debug!(session_id = id, "session absent, creating");
                Ok(self.sessions.create(Some(id))?)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn persist_turn(
        &self,
        session_id: &str,
        messages: &[Message],
        response: &ChatResponse,
    ) -> Result<SessionData, AgentError> {
        let mut turn: Vec<SessionMessage> = messages
            .iter()
            .map(|m| SessionMessage::new(m.role, m.content.to_persisted_text()))
            .collect();

        let records = response
            .tool_calls
            .iter()
            .map(|call| ToolCallRecord {
                name: call.name.clone(),
                params: call.input.clone(),
            })
            .collect();
        turn.push(
            SessionMessage::new(Role::Assistant, response.content.clone()).with_tool_calls(records),
        );

        let tokens = response.usage.map(|u| u.total_tokens).unwrap_or(0);
        Ok(self.sessions.append_turn(session_id, turn, tokens)?)
    }
}

/// Run tool calls one after another. A failing tool becomes a failed
/// result; only cancellation stops the sequence.
async fn dispatch_tools(
    tools: &ToolRegistry,
    calls: &[ToolCall],
    cancel: &CancellationToken,
) -> Result<Vec<ToolResult>, AgentError> {
    let mut results = Vec::with_capacity(calls.len());
    for call in calls {
        if cancel.is_cancelled() {
            info!(tool = %call.name, "turn cancelled before tool dispatch");
            return Err(AgentError::Cancelled);
        }

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!(tool = %call.name, "turn cancelled during tool execution");
                return Err(AgentError::Cancelled);
            }
            outcome = tools.execute(&call.name, call.input.clone()) => outcome,
        };

        let result = match outcome {
            Ok(value) => {
                debug!(tool = %call.name, "tool executed");
                ToolResult::ok(&call.name, value)
            }
            Err(ToolError::Execution { message, .. }) => ToolResult::failed(&call.name, message),
            Err(e) => ToolResult::failed(&call.name, e.to_string()),
        };
        if let Some(err) = &result.error {
            warn!(tool = %call.name, error = %err, "tool call failed");
        }
        results.push(result);
    }
    Ok(results)
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use miniclaw_core::error::ProviderError;
    use miniclaw_core::types::{ContentBlock, MessageContent, TokenUsage, ToolInput};
    use miniclaw_providers::ChunkStream;
    use serde_json::{json, Value};
    use tempfile::TempDir;

    /// Returns canned responses in order and records every request.
    struct MockProvider {
        responses: Mutex<VecDeque<Result<ChatResponse, ProviderError>>>,
        requests: Mutex<Vec<ChatRequest>>,
        delay: Duration,
        default_model: String,
    }

    impl MockProvider {
        fn new(responses: Vec<Result<ChatResponse, ProviderError>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                requests: Mutex::new(Vec::new()),
                delay: Duration::ZERO,
                default_model: "mock-model".into(),
            }
        }

        fn texts(texts: &[&str]) -> Self {
            Self::new(texts.iter().map(|t| Ok(ChatResponse::text(*t))).collect())
        }

        fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        fn requests(&self) -> Vec<ChatRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl LlmProvider for MockProvider {
        async fn chat_complete(
            &self,
            request: &ChatRequest,
        ) -> Result<ChatResponse, ProviderError> {
            self.requests.lock().unwrap().push(request.clone());
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(ChatResponse::text("(no more responses)")))
        }

        async fn chat(&self, _request: &ChatRequest) -> Result<ChunkStream, ProviderError> {
            Err(ProviderError::Stream {
                provider: "mock".into(),
                message: "streaming not supported".into(),
            })
        }

        fn models(&self) -> Vec<String> {
            vec![self.default_model.clone()]
        }

        fn default_model(&self) -> &str {
            &self.default_model
        }

        fn display_name(&self) -> &str {
            "Mock"
        }
    }

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "Echo the text parameter"
        }
        fn input_schema(&self) -> Value {
            json!({"type": "object", "properties": {"text": {"type": "string"}}})
        }
        async fn execute(&self, params: ToolInput) -> anyhow::Result<Value> {
            Ok(json!({ "echo": params.get("text").cloned().unwrap_or(Value::Null) }))
        }
    }

    struct BrokenTool;

    #[async_trait]
    impl Tool for BrokenTool {
        fn name(&self) -> &str {
            "broken"
        }
        fn description(&self) -> &str {
            "Always fails"
        }
        fn input_schema(&self) -> Value {
            json!({"type": "object", "properties": {}})
        }
        async fn execute(&self, _params: ToolInput) -> anyhow::Result<Value> {
            anyhow::bail!("disk on fire")
        }
    }

    fn test_agent(provider: Arc<MockProvider>, tools: ToolRegistry) -> (Agent, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let config = AgentConfig {
            sessions_dir: dir.path().join("sessions"),
            workspace: dir.path().join("workspace"),
            default_session: "default".into(),
            max_tokens: Some(1024),
            temperature: None,
        };
        (Agent::new(provider, tools, config), dir)
    }

    fn call(id: &str, name: &str, input: Value) -> ToolCall {
        let input = match input {
            Value::Object(map) => map.into_iter().collect(),
            _ => ToolInput::new(),
        };
        ToolCall::new(id, name, input)
    }

    #[tokio::test]
    async fn test_auto_creates_session() {
        let provider = Arc::new(MockProvider::texts(&["hello!"]));
        let (agent, _dir) = test_agent(provider, ToolRegistry::new());
        assert!(!agent.sessions().exists("new-id"));

        let result = agent
            .run(vec![Message::user("hi")], RunOptions::new().with_session("new-id"))
            .await
            .unwrap();

        assert_eq!(result.response.content, "hello!");
        assert!(result.tool_results.is_none());
        assert_eq!(result.session_used.metadata.total_turns, 2);
        assert_eq!(agent.sessions().load("new-id").unwrap().messages.len(), 2);
    }

    #[tokio::test]
    async fn test_persistence_ordering_and_tokens() {
        let response = ChatResponse {
            content: "pong".into(),
            usage: Some(TokenUsage::new(10, 5)),
            ..Default::default()
        };
        let provider = Arc::new(MockProvider::new(vec![Ok(response)]));
        let (agent, _dir) = test_agent(provider, ToolRegistry::new());

        let session = agent
            .run(vec![Message::user("ping")], RunOptions::new())
            .await
            .unwrap()
            .session_used;

        assert_eq!(session.session_id, "default");
        let roles: Vec<Role> = session.messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant]);
        assert_eq!(session.messages[0].content, "ping");
        assert_eq!(session.messages[1].content, "pong");
        assert!(session.messages.iter().all(|m| m.timestamp.is_some()));
        assert_eq!(session.metadata.total_turns, 2);
        assert_eq!(session.metadata.total_tokens, 15);
    }

    #[tokio::test]
    async fn test_system_prompt_assembled_and_prepended() {
        let provider = Arc::new(MockProvider::texts(&["ok"]));
        let (agent, _dir) = test_agent(provider.clone(), ToolRegistry::new());
        agent.memory().write_identity("I am Claw").unwrap();
        agent.memory().write_memory("User prefers Rust").unwrap();

        agent.chat("hello", None).await.unwrap();

        let request = &provider.requests()[0];
        assert_eq!(request.model.as_deref(), Some("mock-model"));
        assert_eq!(request.max_tokens, Some(1024));
        assert!(request.tools.is_none());
        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.messages[0].role, Role::System);
        assert_eq!(
            request.messages[0].content.joined_text(),
            "# Your Identity\nI am Claw\n\n\
             # Core Instructions\nYou are a helpful AI assistant with access to tools.\n\n\
             # Context\nUser prefers Rust"
        );
        assert_eq!(request.messages[1], Message::user("hello"));
    }

    #[tokio::test]
    async fn test_explicit_system_and_model_override() {
        let provider = Arc::new(MockProvider::texts(&["ok"]));
        let (agent, _dir) = test_agent(provider.clone(), ToolRegistry::new());
        agent.memory().write_identity("ignored").unwrap();

        agent
            .run(
                vec![Message::user("hi")],
                RunOptions::new()
                    .with_system("Be terse.")
                    .with_model("other-model")
                    .with_supplementary_context("also ignored"),
            )
            .await
            .unwrap();

        let request = &provider.requests()[0];
        assert_eq!(request.messages[0].content.joined_text(), "Be terse.");
        assert_eq!(request.model.as_deref(), Some("other-model"));
    }

    #[tokio::test]
    async fn test_supplementary_context_section() {
        let provider = Arc::new(MockProvider::texts(&["ok"]));
        let (agent, _dir) = test_agent(provider.clone(), ToolRegistry::new());

        agent
            .run(
                vec![Message::user("hi")],
                RunOptions::new().with_supplementary_context("Skill: deploy"),
            )
            .await
            .unwrap();

        let system = provider.requests()[0].messages[0].content.joined_text();
        assert!(system.ends_with("# Supplementary Context\nSkill: deploy"));
    }

    #[test]
    fn test_model_fallback() {
        let mut mock = MockProvider::texts(&[]);
        mock.default_model = String::new();
        let (agent, _dir) = test_agent(Arc::new(mock), ToolRegistry::new());
        assert_eq!(agent.resolve_model(None), FALLBACK_MODEL);
        assert_eq!(agent.resolve_model(Some("x")), "x");
    }

    #[tokio::test]
    async fn test_tool_partial_failure() {
        let response = ChatResponse {
            content: String::new(),
            tool_calls: vec![
                call("t1", "broken", json!({})),
                call("t2", "echo", json!({"text": "still here"})),
            ],
            usage: None,
        };
        let provider = Arc::new(MockProvider::new(vec![Ok(response)]));
        let mut tools = ToolRegistry::new();
        tools.register(Arc::new(BrokenTool));
        tools.register(Arc::new(EchoTool));
        let (agent, _dir) = test_agent(provider.clone(), tools);

        let result = agent
            .run(vec![Message::user("do things")], RunOptions::new())
            .await
            .unwrap();

        let results = result.tool_results.unwrap();
        assert_eq!(results.len(), 2);
        assert!(!results[0].success);
        assert_eq!(results[0].name, "broken");
        assert_eq!(results[0].error.as_deref(), Some("disk on fire"));
        assert!(results[1].success);
        assert_eq!(results[1].result, json!({"echo": "still here"}));

        let assistant = result.session_used.messages.last().unwrap();
        assert_eq!(assistant.role, Role::Assistant);
        assert_eq!(assistant.content, "");
        let records = assistant.tool_calls.as_ref().unwrap();
        assert_eq!(records[0].name, "broken");
        assert_eq!(records[1].params.get("text"), Some(&json!("still here")));

        let sent_tools = provider.requests()[0].tools.clone().unwrap();
        let names: Vec<&str> = sent_tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["broken", "echo"]);
    }

    #[tokio::test]
    async fn test_unknown_tool_is_failed_result() {
        let response = ChatResponse {
            tool_calls: vec![call("t1", "ghost", json!({}))],
            ..Default::default()
        };
        let provider = Arc::new(MockProvider::new(vec![Ok(response)]));
        let (agent, _dir) = test_agent(provider, ToolRegistry::new());

        let results = agent
            .run(vec![Message::user("x")], RunOptions::new())
            .await
            .unwrap()
            .tool_results
            .unwrap();
        assert!(!results[0].success);
        assert!(results[0].error.as_deref().unwrap().contains("ghost"));
    }

    #[tokio::test]
    async fn test_provider_failure_persists_nothing() {
        let provider = Arc::new(MockProvider::new(vec![
            Ok(ChatResponse::text("first")),
            Err(ProviderError::Authentication {
                provider: "mock".into(),
                message: "bad key".into(),
            }),
        ]));
        let (agent, _dir) = test_agent(provider, ToolRegistry::new());

        agent.chat("one", Some("s")).await.unwrap();
        let before = agent.sessions().load("s").unwrap().messages.len();

        let err = agent.chat("two", Some("s")).await.unwrap_err();
        assert!(matches!(
            err,
            AgentError::Provider(ProviderError::Authentication { .. })
        ));
        assert_eq!(agent.sessions().load("s").unwrap().messages.len(), before);
    }

    #[tokio::test]
    async fn test_dynamic_tool_registration() {
        let provider = Arc::new(MockProvider::texts(&["a", "b", "c"]));
        let (agent, _dir) = test_agent(provider.clone(), ToolRegistry::new());

        agent.chat("1", None).await.unwrap();
        agent.register_tool(Arc::new(EchoTool)).await;
        agent.chat("2", None).await.unwrap();
        assert!(agent.unregister_tool("echo").await);
        agent.chat("3", None).await.unwrap();

        let requests = provider.requests();
        assert!(requests[0].tools.is_none());
        assert_eq!(requests[1].tools.as_ref().unwrap()[0].name, "echo");
        assert!(requests[2].tools.is_none());
    }

    #[tokio::test]
    async fn test_block_content_persisted_as_json() {
        let provider = Arc::new(MockProvider::texts(&["noted"]));
        let (agent, _dir) = test_agent(provider, ToolRegistry::new());

        let mut input = ToolInput::new();
        input.insert("path".into(), json!("a.txt"));
        let messages = vec![
            Message::user("read it"),
            Message::blocks(
                Role::Assistant,
                vec![ContentBlock::ToolUse {
                    id: "tu_1".into(),
                    name: "read_file".into(),
                    input,
                }],
            ),
            Message::blocks(
                Role::User,
                vec![ContentBlock::ToolResult {
                    tool_use_id: "tu_1".into(),
                    content: "file body".into(),
                }],
            ),
        ];
        let expected = MessageContent::Blocks(vec![ContentBlock::ToolResult {
            tool_use_id: "tu_1".into(),
            content: "file body".into(),
        }])
        .to_persisted_text();

        let session = agent
            .run(messages, RunOptions::new())
            .await
            .unwrap()
            .session_used;
        assert_eq!(session.messages.len(), 4);
        assert_eq!(session.messages[2].content, expected);
        assert_eq!(session.metadata.total_turns, 4);
    }

    #[tokio::test]
    async fn test_orphan_tool_result_rejected() {
        let provider = Arc::new(MockProvider::texts(&["never"]));
        let (agent, _dir) = test_agent(provider.clone(), ToolRegistry::new());

        let orphan = Message::blocks(
            Role::User,
            vec![ContentBlock::ToolResult {
                tool_use_id: "missing".into(),
                content: "x".into(),
            }],
        );
        let err = agent.run(vec![orphan], RunOptions::new()).await.unwrap_err();
        assert!(matches!(err, AgentError::InvalidMessages(_)));
        assert!(provider.requests().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_during_provider_call() {
        let provider = Arc::new(
            MockProvider::texts(&["too late"]).with_delay(Duration::from_secs(10)),
        );
        let (agent, _dir) = test_agent(provider, ToolRegistry::new());
        let token = CancellationToken::new();

        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            canceller.cancel();
        });

        let err = agent
            .run(
                vec![Message::user("slow")],
                RunOptions::new().with_session("c").with_cancel(token),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Cancelled));
        assert!(agent.sessions().load("c").unwrap().messages.is_empty());
    }

    #[tokio::test]
    async fn test_already_cancelled_token() {
        let provider = Arc::new(MockProvider::texts(&["x"]));
        let (agent, _dir) = test_agent(provider.clone(), ToolRegistry::new());
        let token = CancellationToken::new();
        token.cancel();

        let err = agent
            .run(vec![Message::user("x")], RunOptions::new().with_cancel(token))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Cancelled));
        assert!(provider.requests().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_turns_same_session_serialise() {
        let provider = Arc::new(
            MockProvider::texts(&["a", "b"]).with_delay(Duration::from_millis(50)),
        );
        let (agent, _dir) = test_agent(provider, ToolRegistry::new());

        let (r1, r2) = tokio::join!(
            agent.chat("first", Some("shared")),
            agent.chat("second", Some("shared")),
        );
        r1.unwrap();
        r2.unwrap();

        let session = agent.sessions().load("shared").unwrap();
        assert_eq!(session.messages.len(), 4);
        assert_eq!(session.metadata.total_turns, 4);
    }
}
