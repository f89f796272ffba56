//! Error taxonomy shared across the workspace.
//!
//! Each seam gets its own `thiserror` enum so callers can tell recoverable
//! absences (missing session, unknown tool) apart from turn-fatal failures.

use std::path::PathBuf;

use thiserror::Error;

/// Malformed or missing configuration. Always fatal.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found (searched: {searched}); run `miniclaw config init` to create one")]
    NotFound { searched: String },

    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write config {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("config already exists at {0}")]
    AlreadyExists(PathBuf),

    #[error("invalid config YAML: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("environment variable '{0}' referenced in config is not set")]
    MissingEnvVar(String),

    #[error("missing required config key: {0}")]
    MissingKey(String),

    #[error("unsupported provider '{0}' (expected 'anthropic' or 'openai')")]
    UnsupportedProvider(String),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// A backend rejected the request or could not be reached.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{provider}: authentication failed ({message})")]
    Authentication { provider: String, message: String },

    #[error("{provider}: rate limited ({message})")]
    RateLimited { provider: String, message: String },

    #[error("{provider}: API error {status}: {body}")]
    Api {
        provider: String,
        status: u16,
        body: String,
    },

    #[error("{provider}: network error: {message}")]
    Network { provider: String, message: String },

    #[error("{provider}: invalid response: {message}")]
    InvalidResponse { provider: String, message: String },

    #[error("{provider}: stream error: {message}")]
    Stream { provider: String, message: String },
}

impl ProviderError {
    /// Map a non-success HTTP status onto the matching variant.
    pub fn from_status(provider: &str, status: u16, body: String) -> Self {
        match status {
            401 | 403 => ProviderError::Authentication {
                provider: provider.to_string(),
                message: body,
            },
            429 => ProviderError::RateLimited {
                provider: provider.to_string(),
                message: body,
            },
            _ => ProviderError::Api {
                provider: provider.to_string(),
                status,
                body,
            },
        }
    }
}

/// Session persistence failures.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session not found: {0}")]
    NotFound(String),

    #[error("session storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("session '{id}' is corrupt: {reason}")]
    Corrupt { id: String, reason: String },
}

/// Tool lookup and execution failures.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("tool not found: {0}")]
    NotFound(String),

    #[error("tool '{name}' failed: {message}")]
    Execution { name: String, message: String },
}

/// Per-skill load failures. Other skills keep loading.
#[derive(Debug, Error)]
pub enum SkillError {
    #[error("skill file not found: {0}")]
    NotFound(PathBuf),

    #[error("failed to read skill {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write skill {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid skill front-matter in {path}: {reason}")]
    InvalidFrontmatter { path: PathBuf, reason: String },

    #[error("skill at {0} is missing a name")]
    MissingName(PathBuf),

    #[error("skill '{skill}' is missing dependencies: {}", missing.join(", "))]
    MissingDependency { skill: String, missing: Vec<String> },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_error_from_status() {
        assert!(matches!(
            ProviderError::from_status("anthropic", 401, "bad key".into()),
            ProviderError::Authentication { .. }
        ));
        assert!(matches!(
            ProviderError::from_status("anthropic", 403, String::new()),
            ProviderError::Authentication { .. }
        ));
        assert!(matches!(
            ProviderError::from_status("openai", 429, "slow down".into()),
            ProviderError::RateLimited { .. }
        ));
        match ProviderError::from_status("openai", 500, "oops".into()) {
            ProviderError::Api { status, body, .. } => {
                assert_eq!(status, 500);
                assert_eq!(body, "oops");
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn test_missing_dependency_message() {
        let err = SkillError::MissingDependency {
            skill: "weather".into(),
            missing: vec!["bin:curl".into(), "env:API_KEY".into()],
        };
        assert_eq!(
            err.to_string(),
            "skill 'weather' is missing dependencies: bin:curl, env:API_KEY"
        );
    }

    #[test]
    fn test_config_not_found_hints_init() {
        let err = ConfigError::NotFound {
            searched: "./config.yaml".into(),
        };
        assert!(err.to_string().contains("miniclaw config init"));
    }
}
