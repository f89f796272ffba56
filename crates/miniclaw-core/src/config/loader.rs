//! Config loader — finds `config.yaml`, expands `${VAR}` references, and
//! deserializes into [`Config`].
//!
//! # Lookup order
//! 1. Explicit path (`--config`)
//! 2. `./config.yaml`
//! 3. `~/.miniclaw/config.yaml`

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::{Captures, Regex};
use serde_yaml::Value;
use tracing::{debug, info};

use super::schema::Config;
use crate::error::ConfigError;

/// Starter config written by `miniclaw config init`.
pub const DEFAULT_CONFIG_TEMPLATE: &str = r#"# miniclaw configuration
llm:
  provider: anthropic
  anthropic:
    api_key: ${ANTHROPIC_API_KEY}
    default_model: claude-3-5-sonnet-20241022
    base_url: https://api.anthropic.com
  openai:
    api_key: ${OPENAI_API_KEY}
    default_model: gpt-4o
    base_url: https://api.openai.com/v1
  max_tokens: 4096

tools:
  enabled: [read_file, write_file, bash]
  bash:
    allowed_commands: ["*"]
    timeout_seconds: 30

skills:
  directories: ["./skills", "~/.miniclaw/skills"]
  auto_load: true

memory:
  session:
    storage_path: ~/.miniclaw/sessions
    default_session: default
  agent:
    workspace_path: ~/.miniclaw/workspace

logging:
  level: info
"#;

/// Default user-level config path (`~/.miniclaw/config.yaml`).
pub fn get_config_path() -> PathBuf {
    crate::utils::get_data_path().join("config.yaml")
}

/// Pick the config file to load, following the lookup order.
pub fn resolve_config_path(path: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(explicit) = path {
        if explicit.is_file() {
            return Ok(explicit.to_path_buf());
        }
        return Err(ConfigError::NotFound {
            searched: explicit.display().to_string(),
        });
    }

    let local = PathBuf::from("config.yaml");
    let user = get_config_path();
    for candidate in [&local, &user] {
        if candidate.is_file() {
            return Ok(candidate.clone());
        }
    }

    Err(ConfigError::NotFound {
        searched: format!("{}, {}", local.display(), user.display()),
    })
}

/// Load configuration from the resolved path.
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let config_path = resolve_config_path(path)?;
    debug!("Loading config from {}", config_path.display());

    let content = std::fs::read_to_string(&config_path).map_err(|source| ConfigError::Read {
        path: config_path.clone(),
        source,
    })?;

    let config = parse_config(&content, &|name| std::env::var(name).ok())?;
    info!(
        path = %config_path.display(),
        provider = %config.llm.provider,
        "Config loaded"
    );
    Ok(config)
}

/// Parse YAML text, expanding `${VAR}` through `lookup`.
pub fn parse_config(
    content: &str,
    lookup: &dyn Fn(&str) -> Option<String>,
) -> Result<Config, ConfigError> {
    let raw: Value = serde_yaml::from_str(content)?;
    let expanded = expand_env_vars(raw, lookup)?;

    let has_provider = expanded
        .get("llm")
        .and_then(|llm| llm.get("provider"))
        .is_some_and(|p| !p.is_null());
    if !has_provider {
        return Err(ConfigError::MissingKey("llm.provider".into()));
    }

    Ok(serde_yaml::from_value(expanded)?)
}

fn env_ref_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"\$\{([^}]+)\}").ok())
        .as_ref()
}

/// Replace every `${VAR}` in every string scalar of the tree.
///
/// A reference to a variable `lookup` cannot resolve is an error.
pub fn expand_env_vars(
    value: Value,
    lookup: &dyn Fn(&str) -> Option<String>,
) -> Result<Value, ConfigError> {
    match value {
        Value::String(s) => {
            let Some(pattern) = env_ref_pattern() else {
                return Ok(Value::String(s));
            };
            let mut missing = None;
            let replaced = pattern.replace_all(&s, |caps: &Captures| {
                let name = &caps[1];
                match lookup(name) {
                    Some(v) => v,
                    None => {
                        missing.get_or_insert_with(|| name.to_string());
                        String::new()
                    }
                }
            });
            match missing {
                Some(name) => Err(ConfigError::MissingEnvVar(name)),
                None => Ok(Value::String(replaced.into_owned())),
            }
        }
        Value::Sequence(items) => items
            .into_iter()
            .map(|item| expand_env_vars(item, lookup))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Sequence),
        Value::Mapping(map) => {
            let mut out = serde_yaml::Mapping::with_capacity(map.len());
            for (key, val) in map {
                out.insert(key, expand_env_vars(val, lookup)?);
            }
            Ok(Value::Mapping(out))
        }
        other => Ok(other),
    }
}

/// Write the starter config. Refuses to overwrite an existing file.
pub fn create_default_config(path: Option<&Path>) -> Result<PathBuf, ConfigError> {
    let target = path.map(PathBuf::from).unwrap_or_else(get_config_path);
    if target.exists() {
        return Err(ConfigError::AlreadyExists(target));
    }

    if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    std::fs::write(&target, DEFAULT_CONFIG_TEMPLATE).map_err(|source| ConfigError::Write {
        path: target.clone(),
        source,
    })?;
    info!(path = %target.display(), "Default config created");
    Ok(target)
}
