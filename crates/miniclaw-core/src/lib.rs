//! miniclaw core — the canonical data model, error types, configuration,
//! and session storage shared by every other crate in the workspace.

pub mod config;
pub mod error;
pub mod session;
pub mod types;
pub mod utils;

pub use error::{ConfigError, ProviderError, SessionError, SkillError, ToolError};
