//! Provider factory — selects the backend once, from config.

use std::sync::Arc;

use miniclaw_core::config::{LlmConfig, ProviderKind};
use miniclaw_core::error::ConfigError;
use tracing::debug;

use crate::anthropic::AnthropicProvider;
use crate::openai::OpenAiProvider;
use crate::traits::LlmProvider;

/// Build the provider named by `llm.provider`.
///
/// Fails if the selected backend's section or API key is missing.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, ConfigError> {
    let kind = config.provider;
    let settings = config
        .active_settings()
        .ok_or_else(|| ConfigError::MissingKey(format!("llm.{kind}")))?;
    if settings.api_key.trim().is_empty() {
        return Err(ConfigError::MissingKey(format!("llm.{kind}.api_key")));
    }

    debug!(
        provider = %kind,
        default_model = %settings.default_model,
        base_url = settings.base_url.as_deref().unwrap_or("default"),
        "Creating LLM provider"
    );

    let base_url = settings.base_url.as_deref();
    let provider: Arc<dyn LlmProvider> = match kind {
        ProviderKind::Anthropic => Arc::new(
            AnthropicProvider::new(&settings.api_key, &settings.default_model, base_url)
                .map_err(|e| ConfigError::Invalid(e.to_string()))?,
        ),
        ProviderKind::Openai => Arc::new(
            OpenAiProvider::new(&settings.api_key, &settings.default_model, base_url)
                .map_err(|e| ConfigError::Invalid(e.to_string()))?,
        ),
    };
    Ok(provider)
}
