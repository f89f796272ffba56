//! Chat-completion backends for miniclaw.
//!
//! # Architecture
//!
//! - [`traits::LlmProvider`] — trait that all backends implement
//! - [`anthropic::AnthropicProvider`] — Anthropic Messages API
//! - [`openai::OpenAiProvider`] — OpenAI Chat Completions API
//! - [`factory::create_provider`] — picks the backend named in config

pub mod anthropic;
pub mod factory;
mod http;
pub mod openai;
mod stream;
pub mod traits;

pub use anthropic::AnthropicProvider;
pub use factory::create_provider;
pub use openai::OpenAiProvider;
pub use traits::{ChunkStream, LlmProvider};
