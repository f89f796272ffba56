//! HTTP helpers shared by the backend adapters.

use std::time::Duration;

use miniclaw_core::error::ProviderError;
use miniclaw_core::types::ToolInput;
use serde_json::Value;
use tracing::{error, warn};

/// Upper bound for a non-streaming round-trip.
pub(crate) const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Build the shared, connection-pooled client.
///
/// No overall timeout here: streaming responses may legitimately run long,
/// so non-streaming calls set [`REQUEST_TIMEOUT`] per request instead.
pub(crate) fn build_client(provider: &str) -> Result<reqwest::Client, ProviderError> {
    reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .build()
        .map_err(|e| ProviderError::Network {
            provider: provider.to_string(),
            message: format!("failed to build HTTP client: {e}"),
        })
}

pub(crate) fn network_error(provider: &str, e: reqwest::Error) -> ProviderError {
    error!(provider, error = %e, "HTTP request failed");
    ProviderError::Network {
        provider: provider.to_string(),
        message: e.to_string(),
    }
}

/// Pass successful responses through; turn anything else into a typed error.
pub(crate) async fn check_status(
    provider: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Failed to read error body".to_string());
    error!(provider, status = %status, body = %body, "API error");
    Err(ProviderError::from_status(provider, status.as_u16(), body))
}

/// Convert a tool-argument value into an input map.
///
/// Anything that is not a JSON object is logged and replaced by an empty map.
pub(crate) fn value_to_input(provider: &str, tool: &str, value: Value) -> ToolInput {
    match value {
        Value::Object(map) => map.into_iter().collect(),
        Value::Null => ToolInput::new(),
        other => {
            warn!(provider, tool, "Tool input is not an object: {}", other);
            ToolInput::new()
        }
    }
}

/// Parse JSON-encoded tool arguments, falling back to an empty map.
pub(crate) fn parse_arguments(provider: &str, tool: &str, raw: &str) -> ToolInput {
    if raw.trim().is_empty() {
        return ToolInput::new();
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(value) => value_to_input(provider, tool, value),
        Err(e) => {
            warn!(provider, tool, error = %e, "Malformed tool arguments, using empty input");
            ToolInput::new()
        }
    }
}
