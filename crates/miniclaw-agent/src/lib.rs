//! miniclaw agent — orchestrator, tools, memory, and context.
//!
//! This crate contains:
//! - **agent**: the turn orchestrator ([`Agent`])
//! - **tools**: tool trait, registry, and built-in tools (files, shell)
//! - **memory**: the identity / memory / user documents
//! - **context**: system prompt assembly
//! - **skills**: `SKILL.md` loading, independent of orchestration

pub mod agent;
pub mod context;
pub mod error;
pub mod memory;
pub mod skills;
pub mod tools;

pub use agent::{Agent, AgentConfig, AgentResult, RunOptions, FALLBACK_MODEL};
pub use context::ContextBuilder;
pub use error::AgentError;
pub use memory::{AgentMemoryStore, MemoryCategory, MemoryMatch};
pub use skills::{Skill, SkillsLoader};
pub use tools::{Tool, ToolRegistry};
