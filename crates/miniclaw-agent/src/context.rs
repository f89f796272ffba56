//! Context builder — assembles the system prompt for a turn.
//!
//! Section order is fixed: identity (if any), core instructions, memory
//! context (if any), then an optional supplementary section. Each section is
//! a `# Header` line followed by its body and a blank line.

use miniclaw_core::types::Message;
use tracing::debug;

use crate::memory::AgentMemoryStore;

/// Paragraph always present in an assembled prompt.
pub const CORE_INSTRUCTIONS: &str = "You are a helpful AI assistant with access to tools.";

const IDENTITY_HEADER: &str = "# Your Identity";
const INSTRUCTIONS_HEADER: &str = "# Core Instructions";
const CONTEXT_HEADER: &str = "# Context";
const SUPPLEMENTARY_HEADER: &str = "# Supplementary Context";

/// Builds system prompts from the agent-memory documents.
pub struct ContextBuilder<'a> {
    memory: &'a AgentMemoryStore,
}

impl<'a> ContextBuilder<'a> {
    pub fn new(memory: &'a AgentMemoryStore) -> Self {
        Self { memory }
    }

    /// Read identity and memory from the store and assemble the prompt.
    pub fn build_system_prompt(&self, supplementary: Option<&str>) -> String {
        let identity = self.memory.read_identity();
        let memory = self.memory.read_memory();
        debug!(
            identity_bytes = identity.len(),
            memory_bytes = memory.len(),
            supplementary = supplementary.is_some(),
            "building system prompt"
        );
        assemble_system_prompt(&identity, &memory, supplementary)
    }

    /// Resolve the prompt for a turn. An explicit `system` replaces the
    /// assembled prompt entirely.
    pub fn resolve_system_prompt(
        &self,
        system: Option<&str>,
        supplementary: Option<&str>,
    ) -> String {
        match system {
            Some(explicit) => explicit.to_string(),
            None => self.build_system_prompt(supplementary),
        }
    }

    /// Prepend the system message to the caller's messages.
    pub fn build_messages(system_prompt: String, messages: &[Message]) -> Vec<Message> {
        let mut all = Vec::with_capacity(messages.len() + 1);
        all.push(Message::system(system_prompt));
        all.extend_from_slice(messages);
        all
    }
}

/// Pure prompt assembly. Empty identity, memory, and supplementary text
/// omit their sections.
pub fn assemble_system_prompt(identity: &str, memory: &str, supplementary: Option<&str>) -> String {
    let mut prompt = String::new();

    if !identity.is_empty() {
        prompt.push_str(&format!("{IDENTITY_HEADER}\n{identity}\n\n"));
    }

    prompt.push_str(&format!("{INSTRUCTIONS_HEADER}\n{CORE_INSTRUCTIONS}\n\n"));

    if !memory.is_empty() {
        prompt.push_str(&format!("{CONTEXT_HEADER}\n{memory}\n\n"));
    }

    if let Some(extra) = supplementary.filter(|s| !s.is_empty()) {
        prompt.push_str(&format!("{SUPPLEMENTARY_HEADER}\n{extra}\n\n"));
    }

    prompt.trim().to_string()
}
