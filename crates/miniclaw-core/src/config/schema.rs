//! Configuration schema.
//!
//! Hierarchy: `Config` → `LlmConfig`, `ToolsConfig`, `SkillsConfig`,
//! `MemoryConfig`, `LoggingConfig`. YAML keys are snake_case, same as the
//! Rust field names. Everything has a default except `llm.provider`, which
//! the loader checks before deserializing.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::utils::expand_home;

// ─────────────────────────────────────────────
// Root Config
// ─────────────────────────────────────────────

/// Root configuration, loaded from `config.yaml`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub llm: LlmConfig,
    pub tools: ToolsConfig,
    pub skills: SkillsConfig,
    pub memory: MemoryConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Directory that holds one subdirectory per session.
    pub fn sessions_dir(&self) -> PathBuf {
        expand_home(&self.memory.session.storage_path)
    }

    /// Directory that holds MEMORY.md / IDENTITY.md / USER.md.
    pub fn workspace_dir(&self) -> PathBuf {
        expand_home(&self.memory.agent.workspace_path)
    }

    /// Skill search directories with `~` expanded, in configured order.
    pub fn skill_dirs(&self) -> Vec<PathBuf> {
        self.skills
            .directories
            .iter()
            .map(|d| expand_home(d))
            .collect()
    }
}

// ─────────────────────────────────────────────
// LLM
// ─────────────────────────────────────────────

/// Which chat backend to talk to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    Anthropic,
    Openai,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Anthropic => "anthropic",
            ProviderKind::Openai => "openai",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Credentials and defaults for one backend.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    pub api_key: String,
    pub default_model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

/// LLM section: backend selection plus sampling defaults.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: ProviderKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anthropic: Option<ProviderSettings>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub openai: Option<ProviderSettings>,
    /// Default output token cap, used when a call sets none.
    pub max_tokens: Option<u32>,
    /// Default sampling temperature, used when a call sets none.
    pub temperature: Option<f64>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::default(),
            anthropic: None,
            openai: None,
            max_tokens: Some(4096),
            temperature: None,
        }
    }
}

impl LlmConfig {
    /// Settings block of the selected backend, if present.
    pub fn active_settings(&self) -> Option<&ProviderSettings> {
        match self.provider {
            ProviderKind::Anthropic => self.anthropic.as_ref(),
            ProviderKind::Openai => self.openai.as_ref(),
        }
    }
}

// ─────────────────────────────────────────────
// Tools
// ─────────────────────────────────────────────

/// Tools configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// Names of built-in tools to register.
    pub enabled: Vec<String>,
    pub bash: BashConfig,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            enabled: vec!["read_file".into(), "write_file".into(), "bash".into()],
            bash: BashConfig::default(),
        }
    }
}

impl ToolsConfig {
    pub fn is_enabled(&self, name: &str) -> bool {
        self.enabled.iter().any(|n| n == name)
    }
}

/// Shell tool configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct BashConfig {
    /// Program names the model may run; `"*"` allows anything.
    pub allowed_commands: Vec<String>,
    /// Hard wall-clock limit per command.
    pub timeout_seconds: u64,
    /// Working directory; `None` means the process's current directory.
    pub working_dir: Option<String>,
}

impl Default for BashConfig {
    fn default() -> Self {
        Self {
            allowed_commands: vec!["*".into()],
            timeout_seconds: 30,
            working_dir: None,
        }
    }
}

// ─────────────────────────────────────────────
// Skills / memory / logging
// ─────────────────────────────────────────────

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SkillsConfig {
    pub directories: Vec<String>,
    pub auto_load: bool,
}

impl Default for SkillsConfig {
    fn default() -> Self {
        Self {
            directories: vec!["./skills".into(), "~/.miniclaw/skills".into()],
            auto_load: true,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    pub session: SessionConfig,
    pub agent: AgentMemoryConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub storage_path: String,
    /// Session id used when a call names none.
    pub default_session: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            storage_path: "~/.miniclaw/sessions".into(),
            default_session: "default".into(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentMemoryConfig {
    pub workspace_path: String,
}

impl Default for AgentMemoryConfig {
    fn default() -> Self {
        Self {
            workspace_path: "~/.miniclaw/workspace".into(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `trace` | `debug` | `info` | `warn` | `error`.
    pub level: String,
    /// Append logs to this file instead of stderr.
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            file: None,
        }
    }
}
