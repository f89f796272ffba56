//! LLM provider trait — one uniform contract over every chat backend.
//!
//! Adapters own authentication and wire-format translation. Callers only
//! ever see the canonical [`ChatRequest`] / [`ChatResponse`] / [`Chunk`]
//! shapes from `miniclaw_core::types`.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use miniclaw_core::error::ProviderError;
use miniclaw_core::types::{ChatRequest, ChatResponse, Chunk};

/// Lazily produced response chunks.
///
/// Finite and not restartable. Dropping the stream closes the underlying
/// HTTP connection.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<Chunk, ProviderError>> + Send>>;

/// Trait that all chat backends implement.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Single non-streaming round-trip.
    ///
    /// A response with no text and only tool calls is a normal outcome
    /// (`content` is empty, `tool_calls` is not).
    async fn chat_complete(&self, request: &ChatRequest) -> Result<ChatResponse, ProviderError>;

    /// Streaming round-trip. Yields `Text` and `ToolUse` chunks, then a
    /// terminal `Done`.
    async fn chat(&self, request: &ChatRequest) -> Result<ChunkStream, ProviderError>;

    /// Model identifiers this backend is known to serve. No I/O.
    fn models(&self) -> Vec<String>;

    /// The configured default model for this provider instance.
    fn default_model(&self) -> &str;

    /// Display name for logging.
    fn display_name(&self) -> &str;
}
