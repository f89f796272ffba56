//! Configuration system — YAML schema, lookup, and `${VAR}` expansion.
//!
//! # Usage
//! ```no_run
//! use miniclaw_core::config;
//!
//! let cfg = config::load_config(None).expect("config");
//! println!("Provider: {}", cfg.llm.provider);
//! ```

pub mod loader;
pub mod schema;

pub use loader::{
    create_default_config, get_config_path, load_config, parse_config, resolve_config_path,
    DEFAULT_CONFIG_TEMPLATE,
};
pub use schema::{
    BashConfig, Config, LlmConfig, LoggingConfig, ProviderKind, ProviderSettings, SkillsConfig,
    ToolsConfig,
};
